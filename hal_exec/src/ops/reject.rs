//! # Reject
//!
//! Hand a disk the kiosk will not take back to the customer through the vend door, pushing it out
//! until it is gone or the attempts run out.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{error, info, Level};

// Internal
use super::{OpContext, Operation, PushOutOperation, MAX_SEATED_PRESENCE};
use crate::control_system::{RollerPosition, VendDoorState};
use crate::error::ErrorCode;
use crate::runtime::Runtime;
use crate::sensors::PickerInput;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Time allowed to pull a disk hanging out of the door back to sensor 3.
///
/// Units: milliseconds
const PULL_BACK_TIMEOUT_MS: u64 = 8000;

/// Pause after a disk at the back of the picker is handled.
///
/// Units: milliseconds
const BACK_PAUSE_MS: u64 = 1000;

/// Pause after pushing a disk at the front of the picker.
///
/// Units: milliseconds
const FRONT_PAUSE_MS: u64 = 1500;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct RejectOperation<'a> {
    ctx: &'a OpContext,
    attempts: u32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'a> RejectOperation<'a> {
    /// Reject with the configured number of attempts.
    pub fn new(ctx: &'a OpContext) -> Self {
        let attempts = ctx.params.behaviour.reject_at_door_attempts;
        Self::with_attempts(ctx, attempts)
    }

    pub fn with_attempts(ctx: &'a OpContext, attempts: u32) -> Self {
        Self { ctx, attempts }
    }

    fn reject_disk(&self) -> ErrorCode {
        let ctx = self.ctx;
        let control = &ctx.control;

        if !ctx.open_door_checked().is_success() {
            return ErrorCode::VendDoorRentTimeout;
        }

        for _ in 0..=self.attempts {
            control.track_cycle();

            let read = control.read_picker_sensors();
            if !read.success() {
                return ErrorCode::SensorReadError;
            }
            if read.presence_count() == 0 {
                return self.closed_or(ErrorCode::PickerEmpty);
            }

            read.log(Level::Info);
            let front = [
                PickerInput::Sensor1,
                PickerInput::Sensor2,
                PickerInput::Sensor3,
                PickerInput::Sensor4,
            ]
            .iter()
            .any(|s| read.is_input_active(*s));

            if read.is_input_active(PickerInput::Sensor6) {
                if front {
                    PushOutOperation::new(ctx).execute();
                } else if control
                    .roller_to_position(RollerPosition::Position3, Some(PULL_BACK_TIMEOUT_MS))
                    .success()
                {
                    // The customer did not take it, so keep it.
                    let read = control.read_picker_sensors();
                    if !read.success() {
                        return ErrorCode::SensorReadError;
                    }
                    if !read.is_full() {
                        return ErrorCode::PickerEmpty;
                    }
                    if read.presence_count() <= MAX_SEATED_PRESENCE {
                        return self.closed_or(ErrorCode::PickerFull);
                    }
                }
                ctx.runtime.wait(BACK_PAUSE_MS);
            } else if front {
                PushOutOperation::new(ctx).execute();
                ctx.runtime.wait(FRONT_PAUSE_MS);
            }
        }

        let read = control.read_picker_sensors();
        if !read.success() {
            ErrorCode::SensorReadError
        } else if !read.is_full() {
            ErrorCode::PickerEmpty
        } else if read.presence_count() > MAX_SEATED_PRESENCE || !ctx.close_door_checked() {
            ErrorCode::PickerObstructed
        } else {
            ErrorCode::PickerFull
        }
    }

    /// Close the door, reporting the picker obstructed if it will not close.
    fn closed_or(&self, status: ErrorCode) -> ErrorCode {
        if self.ctx.close_door_checked() {
            status
        } else {
            ErrorCode::PickerObstructed
        }
    }
}

impl Operation for RejectOperation<'_> {
    type Output = ErrorCode;

    fn execute(&mut self) -> ErrorCode {
        let mut result = self.reject_disk();

        if (result == ErrorCode::PickerEmpty || result == ErrorCode::PickerFull)
            && self.ctx.control.vend_door_state() != VendDoorState::Closed
            && !self.ctx.control.vend_door_close().success()
        {
            result = ErrorCode::VendDoorCloseTimeout;
        }

        match result {
            ErrorCode::PickerEmpty | ErrorCode::PickerFull => {
                info!("Reject disk returned status {}", result)
            }
            _ => error!("Reject disk returned error {}", result),
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
    fn test_reject_taken() {
        let rig = rig();
        rig.board.update_inputs(|i| i.set_presence(&[PickerInput::Sensor6]));
        rig.board.on_command("TRACK CLOSE", |i| i.clear_presence());

        assert_eq!(RejectOperation::new(&rig.ctx).execute(), ErrorCode::PickerEmpty);
        assert!(rig.board.aux_input(AuxInput::VendDoorClosed));
    }

    #[test]
    fn test_reject_front_disk_pushed_out() {
        let rig = rig();
        rig.board
            .update_inputs(|i| i.set_presence(&[PickerInput::Sensor3, PickerInput::Sensor4]));
        rig.board.on_command("ROLLER OUT", |i| i.clear_presence());

        assert_eq!(RejectOperation::new(&rig.ctx).execute(), ErrorCode::PickerEmpty);
        assert_eq!(rig.board.sent().count("ROLLER OUT"), 1);
    }

    #[test]
    fn test_reject_not_taken_kept() {
        let rig = rig();
        rig.board.update_inputs(|i| i.set_presence(&[PickerInput::Sensor6]));
        rig.board
            .on_command("ROLLER POS3", |i| i.set_presence(&[PickerInput::Sensor3]));

        assert_eq!(RejectOperation::new(&rig.ctx).execute(), ErrorCode::PickerFull);
        assert!(rig.board.aux_input(AuxInput::VendDoorClosed));
    }

    #[test]
    fn test_reject_attempts_exhausted() {
        let rig = rig();
        rig.board.update_inputs(|i| i.set_presence(&[PickerInput::Sensor5]));

        assert_eq!(
            RejectOperation::with_attempts(&rig.ctx, 2).execute(),
            ErrorCode::PickerFull
        );
        assert_eq!(rig.board.sent().count("TRACK OPEN"), 3);
    }
}
