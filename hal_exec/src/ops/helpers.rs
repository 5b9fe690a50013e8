//! # Shared picker procedures
//!
//! Sensor waits, pulls and pushes used by more than one operation.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{error, info};

// Internal
use super::OpContext;
use crate::control_system::{GripperFingerState, TrackState, VendDoorState};
use crate::core_cmd::CoreResponse;
use crate::error::ErrorCode;
use crate::inventory::Location;
use crate::runtime::{ExecutionTimer, Runtime};
use crate::sensors::{InputState, PickerInput};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Time allowed for the centre sensors to clear while the roller pulls a disk in.
///
/// Units: milliseconds
pub const WAIT_TO_CLEAR_TIMEOUT_MS: u64 = 8000;

/// Time allowed for each confirmation that the centre sensors stayed clear.
///
/// Units: milliseconds
const CONFIRM_CLEAR_TIMEOUT_MS: u64 = 3000;

/// Number of confirmations of a clear picker.
const CONFIRM_CLEAR_PASSES: usize = 3;

/// Default time allowed for a sensor to reach a state.
///
/// Units: milliseconds
pub const WAIT_SENSOR_TIMEOUT_MS: u64 = 4000;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl OpContext {
    /// Wait for the centre sensors (2 to 5) to clear. Returns `true` if they did not clear within
    /// `timeout_ms` or the sensors could not be read.
    pub fn wait_to_clear(&self, timeout_ms: u64) -> bool {
        let pause = self.params.timing.clear_sensor_pause_delay_ms;
        let timer = ExecutionTimer::start(self.runtime.clone());

        loop {
            self.runtime.spin_wait(pause);
            let read = self.control.read_picker_sensors();
            if !read.success() {
                return true;
            }
            if read.blocked_count() == 0 {
                return false;
            }
            if timer.elapsed_ms() > timeout_ms {
                return true;
            }
        }
    }

    /// Wait for a disk being rolled in to clear the centre sensors, then confirm that they stay
    /// clear. Returns `true` if something is still in the picker.
    pub fn clear_disk_from_picker(&self) -> bool {
        let pause = self.params.timing.clear_sensor_pause_delay_ms;

        if self.wait_to_clear(WAIT_TO_CLEAR_TIMEOUT_MS) {
            return true;
        }

        self.runtime.spin_wait(pause);
        let mut blocked = true;
        let mut pass = 0;
        while pass < CONFIRM_CLEAR_PASSES && blocked {
            if pass > 0 {
                info!("2-5 didn't timeout; sensors show something in picker.");
            }
            self.wait_to_clear(CONFIRM_CLEAR_TIMEOUT_MS);

            let read = self.control.read_picker_sensors();
            if !read.success() {
                return true;
            }
            blocked = read.blocked_count() > 0;
            self.runtime.spin_wait(pause);
            pass += 1;
        }

        let read = self.control.read_picker_sensors();
        !read.success() || read.blocked_count() > 0
    }

    /// Poll a picker sensor until it reaches `state`.
    ///
    /// Returns `Timeout` if it does not get there within `timeout_ms`, `SensorReadError` if the
    /// sensors cannot be read.
    pub fn wait_sensor(&self, sensor: PickerInput, state: InputState, timeout_ms: u64) -> ErrorCode {
        let pause = self.params.timing.wait_sensor_pause_ms;
        let timer = ExecutionTimer::start(self.runtime.clone());

        let result = loop {
            self.runtime.spin_wait(pause);
            let read = self.control.read_picker_sensors();
            if !read.success() {
                break ErrorCode::SensorReadError;
            }
            if read.is_in_state(sensor, state) {
                break ErrorCode::Success;
            }
            if timer.elapsed_ms() > timeout_ms {
                break ErrorCode::Timeout;
            }
        };

        if !result.is_success() && result != ErrorCode::Timeout {
            error!("WaitSensor returned error {}.", result);
        }
        result
    }

    /// Work a loose disk in a wide slot back into place with the open fingers. The fingers are
    /// always left open and the arm retracted.
    pub fn settle_disk_in_slot(&self) -> ErrorCode {
        let result = self.settle_disk();
        self.control.set_finger(GripperFingerState::Open);
        self.control.retract_arm();
        result
    }

    fn settle_disk(&self) -> ErrorCode {
        if !self.control.set_finger(GripperFingerState::Open).success() {
            return ErrorCode::GripperOpenTimeout;
        }

        if self.extend_arm().timed_out() {
            self.control.retract_arm();
            self.control.set_finger(GripperFingerState::Closed);
            self.control.set_finger(GripperFingerState::Open);
            if !self.extend_arm().success() {
                self.control.retract_arm();
                return ErrorCode::GripperExtendTimeout;
            }
        }

        if !self.control.set_finger(GripperFingerState::Closed).success() {
            return ErrorCode::GripperCloseTimeout;
        }
        if !self.control.set_finger(GripperFingerState::Open).success() {
            return ErrorCode::GripperOpenTimeout;
        }
        if !self.control.retract_arm().success() {
            return ErrorCode::GripperRetractTimeout;
        }
        ErrorCode::Success
    }

    /// Pull a disk out of `location` with the gripper, `pulls` times. The fingers end in the rent
    /// position.
    pub fn pull_from(&self, location: &Location, pulls: u32) -> ErrorCode {
        let state = if location.is_wide {
            GripperFingerState::Open
        } else {
            GripperFingerState::Rent
        };

        for _ in 0..pulls {
            if !self.control.set_finger(state).success() {
                return match state {
                    GripperFingerState::Open => ErrorCode::GripperOpenTimeout,
                    _ => ErrorCode::GripperRentTimeout,
                };
            }

            if self.at_qlm_deck() {
                let extend_ms = self.params.timing.qlm_extend_time_ms;
                if self.params.behaviour.qlm_timed_extend {
                    self.control.timed_extend(extend_ms);
                } else {
                    self.control.extend_arm(extend_ms);
                }
            } else if self.extend_arm().timed_out() {
                self.control.retract_arm();
                self.control.set_finger(GripperFingerState::Closed);
                self.control.set_finger(state);
                if !self.extend_arm().success() {
                    self.control.retract_arm();
                    return ErrorCode::GripperExtendTimeout;
                }
            }

            if !self.control.set_finger(GripperFingerState::Closed).success() {
                return ErrorCode::GripperCloseTimeout;
            }
            if !self.control.retract_arm().success() {
                return ErrorCode::GripperRetractTimeout;
            }
        }

        if !self.control.set_finger(GripperFingerState::Rent).success() {
            return ErrorCode::GripperRentTimeout;
        }
        ErrorCode::Success
    }

    /// Seat the disk in the slot: a short push, a full push, and a second full push if configured.
    pub fn push_into_slot(&self) -> ErrorCode {
        let timing = &self.params.timing;

        let result = self.push_with_arm(timing.roll_in_extend_time_ms);
        if !result.is_success() {
            return result;
        }
        let result = self.push_with_arm(timing.push_time_ms);
        if !result.is_success() {
            return result;
        }

        if self.params.behaviour.additional_put_push {
            self.push_with_arm(timing.push_time_ms);
        }
        ErrorCode::Success
    }

    /// Push with closed fingers for `duration_ms`, then rent the fingers and retract.
    pub fn push_with_arm(&self, duration_ms: u64) -> ErrorCode {
        if !self.control.set_finger(GripperFingerState::Closed).success() {
            return ErrorCode::GripperCloseTimeout;
        }
        self.control.timed_extend(duration_ms);
        if !self.control.set_finger(GripperFingerState::Rent).success() {
            return ErrorCode::GripperRentTimeout;
        }
        if !self.control.retract_arm().success() {
            return ErrorCode::GripperRetractTimeout;
        }
        ErrorCode::Success
    }

    /// Open the vend door unless it is already known to be open.
    pub fn open_door_checked(&self) -> ErrorCode {
        if self.control.vend_door_state() != VendDoorState::Rent
            && !self.control.vend_door_rent().success()
        {
            return ErrorCode::VendDoorRentTimeout;
        }
        ErrorCode::Success
    }

    /// Close the track unless it is already known to be closed.
    pub fn close_track_checked(&self) -> ErrorCode {
        if self.control.track_state() != TrackState::Closed && !self.control.track_close().success()
        {
            return ErrorCode::TrackCloseTimeout;
        }
        ErrorCode::Success
    }

    /// Close the vend door unless it is already known to be closed. Returns whether the door is
    /// closed.
    pub fn close_door_checked(&self) -> bool {
        self.control.vend_door_state() == VendDoorState::Closed
            || self.control.vend_door_close().success()
    }

    /// Extend with the standard arm timeout.
    fn extend_arm(&self) -> CoreResponse {
        self.control
            .extend_arm(self.params.timing.gripper_arm_extend_retract_timeout_ms)
    }

    /// Whether the picker is in front of a slot of the QLM deck.
    fn at_qlm_deck(&self) -> bool {
        self.motion
            .current_location()
            .and_then(|loc| self.decks.get_by_number(loc.deck).map(|d| d.is_qlm))
            .unwrap_or(false)
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
    fn test_wait_to_clear() {
        let rig = rig();
        assert!(!rig.ctx.wait_to_clear(WAIT_TO_CLEAR_TIMEOUT_MS));

        rig.board.update_inputs(|i| i.set_presence(&[PickerInput::Sensor3]));
        let start = rig.board.runtime().now_ms();
        assert!(rig.ctx.wait_to_clear(1000));
        assert!(rig.board.runtime().now_ms() - start > 1000);
    }

    #[test]
    fn test_sensor_one_alone_is_not_blocking() {
        let rig = rig();
        rig.board.update_inputs(|i| i.set_presence(&[PickerInput::Sensor1, PickerInput::Sensor6]));
        assert!(!rig.ctx.clear_disk_from_picker());

        rig.board.update_inputs(|i| i.set_presence(&[PickerInput::Sensor2]));
        assert!(rig.ctx.clear_disk_from_picker());
    }

    #[test]
    fn test_wait_sensor() {
        let rig = rig();
        assert_eq!(
            rig.ctx.wait_sensor(PickerInput::Sensor4, InputState::Inactive, WAIT_SENSOR_TIMEOUT_MS),
            ErrorCode::Success
        );
        assert_eq!(
            rig.ctx.wait_sensor(PickerInput::Sensor4, InputState::Active, 500),
            ErrorCode::Timeout
        );

        rig.board.fail_command("INPUTS");
        assert_eq!(
            rig.ctx.wait_sensor(PickerInput::Sensor4, InputState::Active, 500),
            ErrorCode::SensorReadError
        );
    }

    #[test]
    fn test_pull_from_counts_pulls() {
        let rig = rig();
        let loc = Location::new(1, 1);

        assert_eq!(rig.ctx.pull_from(&loc, 2), ErrorCode::Success);
        assert_eq!(rig.board.sent().count("ARM EXTEND"), 2);
        assert_eq!(rig.board.sent().count("ARM RETRACT"), 2);
        assert!(rig.board.picker_input(PickerInput::FingerRent));
    }

    #[test]
    fn test_pull_from_reports_failed_finger() {
        let rig = rig();
        let mut loc = Location::new(1, 1);
        loc.is_wide = true;

        rig.board.stall("GRIPPER OPEN");
        assert_eq!(rig.ctx.pull_from(&loc, 1), ErrorCode::GripperOpenTimeout);
    }

    #[test]
    fn test_push_into_slot() {
        let mut params = crate::ops::fixture::params();
        params.behaviour.additional_put_push = true;
        let rig = crate::ops::fixture::rig_with(params);

        assert_eq!(rig.ctx.push_into_slot(), ErrorCode::Success);
        assert_eq!(rig.board.sent().count("ARM EXTEND TIMED"), 3);
    }

    #[test]
    fn test_settle_leaves_fingers_open() {
        let rig = rig();
        rig.board.stall("GRIPPER CLOSE");

        assert_eq!(rig.ctx.settle_disk_in_slot(), ErrorCode::GripperCloseTimeout);
        assert!(!rig.board.picker_input(PickerInput::Extend));
        assert!(rig.board.picker_input(PickerInput::Retract));
        assert_eq!(rig.board.sent().count("GRIPPER OPEN"), 2);
    }
}
