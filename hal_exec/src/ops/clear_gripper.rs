//! # Clear gripper
//!
//! Get a disk out of the way of the gripper before the picker moves: a disk at the front is pushed
//! back into the slot, a disk at the back is rolled to the middle of the picker.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{error, Level};

// Internal
use super::{OpContext, Operation};
use crate::control_system::{GripperFingerState, RollerPosition, VendDoorState};
use crate::error::ErrorCode;
use crate::sensors::PickerInput;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of attempts at clearing the gripper.
const CLEAR_ATTEMPTS: usize = 2;

/// Time allowed to roll a disk at the back of the picker to sensor 3.
///
/// Units: milliseconds
const ROLL_TO_CENTRE_TIMEOUT_MS: u64 = 3000;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct ClearGripperOperation<'a> {
    ctx: &'a OpContext,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'a> ClearGripperOperation<'a> {
    pub fn new(ctx: &'a OpContext) -> Self {
        Self { ctx }
    }

    fn on_clear(&self) -> ErrorCode {
        let ctx = self.ctx;
        let control = &ctx.control;

        let closed = ctx.close_track_checked();
        if !closed.is_success() {
            return closed;
        }

        for _ in 0..CLEAR_ATTEMPTS {
            let read = control.read_picker_sensors();
            if !read.success() {
                return read.error();
            }
            if !read.is_full() {
                return ErrorCode::Success;
            }

            let front = read.is_input_active(PickerInput::Sensor1);
            let back = read.is_input_active(PickerInput::Sensor6);

            if !front {
                if !back {
                    return ErrorCode::Success;
                }

                // The disk hangs out of the back of the picker, pull it into the middle.
                control.set_finger(GripperFingerState::Rent);
                if ctx.motion.at_vend_door() && control.vend_door_state() != VendDoorState::Closed {
                    control.vend_door_rent();
                }
                control.roller_to_position(RollerPosition::Position3, Some(ROLL_TO_CENTRE_TIMEOUT_MS));
                if control.vend_door_state() != VendDoorState::Closed {
                    control.vend_door_close();
                }
            } else if back {
                // A disk spanning the whole picker.
                return ErrorCode::PickerObstructed;
            } else if read.blocked_count() == 0 {
                control.start_roller_in();
                ctx.push_into_slot();
                control.stop_roller();
            } else {
                control.set_finger(GripperFingerState::Rent);
                control.roller_to_position(RollerPosition::Position5, None);
            }
        }

        ErrorCode::PickerObstructed
    }
}

impl Operation for ClearGripperOperation<'_> {
    type Output = ErrorCode;

    fn execute(&mut self) -> ErrorCode {
        let result = self.on_clear();
        if !result.is_success() {
            error!("Clear gripper returned error status {}", result);
            self.ctx.control.log_picker_sensor_state(Level::Error);
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

    #[test]
    fn test_clear_empty_picker() {
        let rig = rig();
        assert_eq!(ClearGripperOperation::new(&rig.ctx).execute(), ErrorCode::Success);
        assert!(!rig.board.sent().contains("ROLLER IN"));
    }

    #[test]
    fn test_clear_disk_at_front_pushed_back() {
        let rig = rig();
        rig.board.update_inputs(|i| i.set_presence(&[PickerInput::Sensor1]));
        rig.board.on_command("ARM EXTEND TIMED", |i| i.clear_presence());

        assert_eq!(ClearGripperOperation::new(&rig.ctx).execute(), ErrorCode::Success);
        assert!(rig.board.sent().contains("ROLLER IN"));
        assert!(rig.board.sent().contains("ROLLER STOP"));
    }

    #[test]
    fn test_clear_disk_spanning_picker() {
        let rig = rig();
        rig.board
            .update_inputs(|i| i.set_presence(&[PickerInput::Sensor1, PickerInput::Sensor6]));

        assert_eq!(
            ClearGripperOperation::new(&rig.ctx).execute(),
            ErrorCode::PickerObstructed
        );
    }

    #[test]
    fn test_clear_disk_at_back_rolled_to_centre() {
        let rig = rig();
        rig.board.update_inputs(|i| i.set_presence(&[PickerInput::Sensor6]));
        rig.board.on_command("ROLLER POS3", |i| i.set_presence(&[PickerInput::Sensor3]));

        assert_eq!(ClearGripperOperation::new(&rig.ctx).execute(), ErrorCode::Success);
        assert!(rig.board.sent().contains("ROLLER POS3"));
        assert!(rig.board.sent().contains("VEND CLOSE"));
    }

    #[test]
    fn test_clear_gives_up() {
        let rig = rig();
        rig.board
            .update_inputs(|i| i.set_presence(&[PickerInput::Sensor1, PickerInput::Sensor3]));

        assert_eq!(
            ClearGripperOperation::new(&rig.ctx).execute(),
            ErrorCode::PickerObstructed
        );
        assert_eq!(rig.board.sent().count("ROLLER POS5"), 2);
    }
}
