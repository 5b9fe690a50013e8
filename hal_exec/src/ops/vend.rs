//! # Vend
//!
//! Present the picker's disk to the customer through the vend door and wait for it to be taken.
//! A disk which the drum pulls back into the picker is pushed out again, once.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{error, info, Level};

// Internal
use super::{OpContext, Operation, PushOutOperation, VendResult};
use crate::control_system::RollerPosition;
use crate::error::ErrorCode;
use crate::runtime::Runtime;
use crate::sensors::PickerInput;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Time allowed to roll the disk to sensor 5 before the door opens.
///
/// Units: milliseconds
const ROLL_TO_DOOR_TIMEOUT_MS: u64 = 3000;

/// Pause between polls of the sensors while the customer takes the disk.
///
/// Units: milliseconds
const POLL_PAUSE_MS: u64 = 1000;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct VendOperation<'a> {
    ctx: &'a OpContext,
    poll_count: u32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'a> VendOperation<'a> {
    /// Vend with the configured number of polls.
    pub fn new(ctx: &'a OpContext) -> Self {
        let poll_count = ctx.params.behaviour.vend_disk_poll_count;
        Self::with_poll_count(ctx, poll_count)
    }

    pub fn with_poll_count(ctx: &'a OpContext, poll_count: u32) -> Self {
        Self { ctx, poll_count }
    }

    fn vend_disk_at_door(&self) -> VendResult {
        let ctx = self.ctx;
        let control = &ctx.control;
        let mut result = VendResult {
            status: ErrorCode::PickerEmpty,
            presented: true,
        };

        info!("VendDiskAtDoor: present the disk.");
        control.roller_to_position(RollerPosition::Position5, Some(ROLL_TO_DOOR_TIMEOUT_MS));

        let opened = ctx.open_door_checked();
        if !opened.is_success() {
            result.status = opened;
            return result;
        }

        let pushed = PushOutOperation::new(ctx).execute();
        if pushed == ErrorCode::TrackCloseTimeout || pushed == ErrorCode::SensorReadError {
            result.status = pushed;
            result.presented = false;
            return result;
        }

        control.track_cycle();
        let mut pushes = 0;

        for _ in 0..=self.poll_count {
            let read = control.read_picker_sensors();
            if !read.success() {
                result.status = ErrorCode::SensorReadError;
                return result;
            }

            let in_picker = [
                PickerInput::Sensor1,
                PickerInput::Sensor2,
                PickerInput::Sensor3,
                PickerInput::Sensor4,
            ]
            .iter()
            .any(|s| read.is_input_active(*s));

            if in_picker {
                read.log(Level::Info);
                if pushes == 1 && ctx.params.behaviour.track_push_out_failures {
                    error!(
                        "[VendItemInPicker] After 2 pushes, the disk has not cleared sensor 4."
                    );
                    result.presented = false;
                    result.status = ErrorCode::PickerFull;
                    return result;
                }

                pushes += 1;
                info!("[VendItemInPicker] Disc was pushed to the drum - push it back out.");
                control.track_cycle();
                PushOutOperation::new(ctx).execute();
                ctx.runtime.wait(POLL_PAUSE_MS);
            } else {
                pushes = 0;
                if read.is_input_active(PickerInput::Sensor5) {
                    ctx.runtime.wait(POLL_PAUSE_MS);
                } else if !read.is_input_active(PickerInput::Sensor6) {
                    result.status = ErrorCode::PickerEmpty;
                    return result;
                } else {
                    ctx.runtime.wait(POLL_PAUSE_MS);
                }
            }
        }

        let read = control.read_picker_sensors();
        result.status = if !read.success() {
            ErrorCode::SensorReadError
        } else if read.is_full() {
            ErrorCode::PickerFull
        } else {
            ErrorCode::PickerEmpty
        };
        result
    }
}

impl Operation for VendOperation<'_> {
    type Output = VendResult;

    fn execute(&mut self) -> VendResult {
        let mut result = self.vend_disk_at_door();

        // The door stays open for a disk the customer has not taken.
        if result.status == ErrorCode::PickerEmpty && !self.ctx.control.vend_door_close().success() {
            result.status = ErrorCode::VendDoorCloseTimeout;
        }

        if !result.presented {
            error!("VendItemInPicker: The disk was not presented to the user from the vend door.");
        }
        match result.status {
            ErrorCode::PickerFull | ErrorCode::PickerEmpty => {
                info!("Vend item in picker returned status {}", result.status)
            }
            status => error!("Vend item in picker returned error code {}", status),
        }
        result
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::ops::fixture::rig;
    use crate::sensors::AuxInput;

    #[test]
    fn test_vend_taken() {
        let rig = rig();
        rig.board
            .update_inputs(|i| i.set_presence(&[PickerInput::Sensor3, PickerInput::Sensor4]));
        rig.board.on_command("ROLLER OUT", |i| i.clear_presence());

        let result = VendOperation::new(&rig.ctx).execute();
        assert_eq!(
            result,
            VendResult {
                status: ErrorCode::PickerEmpty,
                presented: true
            }
        );
        assert!(rig.board.aux_input(AuxInput::VendDoorClosed));
    }

    #[test]
    fn test_vend_not_taken() {
        let rig = rig();
        rig.board.update_inputs(|i| i.set_presence(&[PickerInput::Sensor6]));

        let start = rig.board.runtime().now_ms();
        let result = VendOperation::with_poll_count(&rig.ctx, 3).execute();
        assert_eq!(result.status, ErrorCode::PickerFull);
        assert!(result.presented);
        assert!(rig.board.runtime().now_ms() - start >= 4 * POLL_PAUSE_MS);
        assert!(rig.board.aux_input(AuxInput::VendDoorRent));
    }

    #[test]
    fn test_vend_pulled_back_twice() {
        let rig = rig();
        rig.board.update_inputs(|i| i.set_presence(&[PickerInput::Sensor2]));
        rig.board.stall("ROLLER POS4");

        let result = VendOperation::new(&rig.ctx).execute();
        assert_eq!(result.status, ErrorCode::PickerFull);
        assert!(!result.presented);
    }

    #[test]
    fn test_vend_door_failure() {
        let rig = rig();
        rig.board.stall("VEND RENT");

        let result = VendOperation::new(&rig.ctx).execute();
        assert_eq!(result.status, ErrorCode::VendDoorRentTimeout);
        assert!(!rig.board.sent().contains("ROLLER OUT"));
    }
}
