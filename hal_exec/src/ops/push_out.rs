//! # Push out
//!
//! Roll a disk out through the back of the picker to the vend door, until the front sensors clear.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{error, Level};

// Internal
use super::helpers::WAIT_SENSOR_TIMEOUT_MS;
use super::{OpContext, Operation};
use crate::control_system::RollerPosition;
use crate::error::ErrorCode;
use crate::runtime::Runtime;
use crate::sensors::{InputState, PickerInput, PickerSensorReadResult};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PUSH_ATTEMPTS: usize = 3;

/// Pause once the disk reaches sensor 4 before rolling it on.
///
/// Units: milliseconds
const SENSOR_4_PAUSE_MS: u64 = 50;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct PushOutOperation<'a> {
    ctx: &'a OpContext,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'a> PushOutOperation<'a> {
    pub fn new(ctx: &'a OpContext) -> Self {
        Self { ctx }
    }

    fn on_push_out(&self) -> ErrorCode {
        let ctx = self.ctx;
        let control = &ctx.control;

        if !ctx.close_track_checked().is_success() {
            return ErrorCode::TrackCloseTimeout;
        }

        for _ in 0..PUSH_ATTEMPTS {
            let read = control.read_picker_sensors();
            if !read.success() {
                return ErrorCode::SensorReadError;
            }
            if !read.is_full() {
                return ErrorCode::Success;
            }

            if read.is_input_active(PickerInput::Sensor4) {
                control.start_roller_out();
                ctx.wait_sensor(PickerInput::Sensor4, InputState::Inactive, WAIT_SENSOR_TIMEOUT_MS);
                let sleep = ctx.params.timing.push_out_sleep_time_ms;
                if sleep > 0 {
                    ctx.runtime.wait(sleep);
                }
                control.stop_roller();
            } else if !front_blocked(&read) {
                return ErrorCode::Success;
            } else if !control
                .roller_to_position(RollerPosition::Position4, None)
                .success()
            {
                control.log_picker_sensor_state(Level::Error);
            } else {
                ctx.runtime.spin_wait(SENSOR_4_PAUSE_MS);
                control.start_roller_out();
                ctx.wait_sensor(PickerInput::Sensor4, InputState::Inactive, WAIT_SENSOR_TIMEOUT_MS);
                control.stop_roller();
            }
        }

        let read = control.read_picker_sensors();
        if !read.success() {
            ErrorCode::SensorReadError
        } else if front_blocked(&read) || read.is_input_active(PickerInput::Sensor4) {
            ErrorCode::PickerFull
        } else {
            ErrorCode::Success
        }
    }
}

impl Operation for PushOutOperation<'_> {
    type Output = ErrorCode;

    fn execute(&mut self) -> ErrorCode {
        let result = self.on_push_out();
        if !result.is_success() {
            error!("Push out disk returned error status {}", result);
            self.ctx.control.log_picker_sensor_state(Level::Error);
        }
        result
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Whether any of sensors 1 to 3 sees the disk.
fn front_blocked(read: &PickerSensorReadResult) -> bool {
    [PickerInput::Sensor1, PickerInput::Sensor2, PickerInput::Sensor3]
        .iter()
        .any(|s| read.is_input_active(*s))
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::ops::fixture::rig;

    #[test]
    fn test_push_out_empty_picker() {
        let rig = rig();
        assert_eq!(PushOutOperation::new(&rig.ctx).execute(), ErrorCode::Success);
        assert!(!rig.board.sent().contains("ROLLER OUT"));
    }

    #[test]
    fn test_push_out_disk_at_sensor_four() {
        let rig = rig();
        rig.board
            .update_inputs(|i| i.set_presence(&[PickerInput::Sensor4, PickerInput::Sensor5]));
        rig.board
            .on_command("ROLLER OUT", |i| i.set_presence(&[PickerInput::Sensor6]));

        assert_eq!(PushOutOperation::new(&rig.ctx).execute(), ErrorCode::Success);
        assert_eq!(rig.board.sent().count("ROLLER OUT"), 1);
        assert!(rig.board.sent().contains("ROLLER STOP"));
    }

    #[test]
    fn test_push_out_disk_at_front_rolled_through() {
        let rig = rig();
        rig.board
            .update_inputs(|i| i.set_presence(&[PickerInput::Sensor2, PickerInput::Sensor3]));
        rig.board
            .on_command("ROLLER POS4", |i| i.set_presence(&[PickerInput::Sensor4]));
        rig.board
            .on_command("ROLLER OUT", |i| i.set_presence(&[PickerInput::Sensor6]));

        assert_eq!(PushOutOperation::new(&rig.ctx).execute(), ErrorCode::Success);
        assert!(rig.board.sent().contains("ROLLER POS4"));
    }

    #[test]
    fn test_push_out_stuck_disk() {
        let rig = rig();
        rig.board.update_inputs(|i| i.set_presence(&[PickerInput::Sensor2]));
        rig.board.stall("ROLLER POS4");

        assert_eq!(PushOutOperation::new(&rig.ctx).execute(), ErrorCode::PickerFull);
        assert_eq!(rig.board.sent().count("ROLLER POS4"), 3);
    }

    #[test]
    fn test_push_out_needs_track() {
        let rig = rig();
        rig.board.stall("TRACK CLOSE");
        assert_eq!(
            PushOutOperation::new(&rig.ctx).execute(),
            ErrorCode::TrackCloseTimeout
        );
    }
}
