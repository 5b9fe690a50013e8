//! # Accept
//!
//! Take a disk the customer returns through the vend door into the picker.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{error, info, Level};

// Internal
use super::{OpContext, Operation};
use crate::control_system::RollerPosition;
use crate::error::ErrorCode;
use crate::sensors::{InputState, PickerInput};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// More blocked sensors than this means the disk is not lying flat in the picker.
pub const MAX_SEATED_PRESENCE: usize = 3;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct AcceptOperation<'a> {
    ctx: &'a OpContext,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'a> AcceptOperation<'a> {
    pub fn new(ctx: &'a OpContext) -> Self {
        Self { ctx }
    }

    fn accept_disk_at_door(&self) -> ErrorCode {
        let ctx = self.ctx;
        let control = &ctx.control;

        info!("[AcceptDiskAtDoor] Start");
        if !ctx.open_door_checked().is_success() {
            return ErrorCode::VendDoorRentTimeout;
        }

        control.start_roller_in();
        match ctx.wait_sensor(
            PickerInput::Sensor5,
            InputState::Active,
            ctx.params.timing.accept_disk_timeout_ms,
        ) {
            ErrorCode::SensorReadError => return ErrorCode::SensorReadError,
            ErrorCode::Timeout => {
                control.stop_roller();
                let read = control.read_picker_sensors();
                if !read.success() {
                    return ErrorCode::SensorReadError;
                }
                if !read.is_full() {
                    return ErrorCode::PickerEmpty;
                }
            }
            _ => (),
        }

        info!("[AcceptDiskAtDoor] Sensor 5 or 6 was tripped; pull into the picker.");
        if !control
            .roller_to_position(RollerPosition::Position3, None)
            .success()
        {
            error!("[AcceptDiskAtDoor] Unable to roll the disk to sensor 3.");
            let read = control.read_picker_sensors();
            read.log(Level::Error);
            return if read.is_full() {
                ErrorCode::PickerFull
            } else {
                ErrorCode::PickerEmpty
            };
        }

        let read = control.read_picker_sensors();
        if !read.success() {
            return ErrorCode::SensorReadError;
        }
        if read.presence_count() > MAX_SEATED_PRESENCE {
            error!("[AcceptDiskAtDoor] the gripper is obstructed.");
            read.log(Level::Error);
            return ErrorCode::PickerObstructed;
        }

        if read.is_full() {
            ErrorCode::PickerFull
        } else {
            ErrorCode::PickerEmpty
        }
    }
}

impl Operation for AcceptOperation<'_> {
    type Output = ErrorCode;

    fn execute(&mut self) -> ErrorCode {
        let mut result = self.accept_disk_at_door();

        if (result == ErrorCode::PickerEmpty || result == ErrorCode::PickerFull)
            && !self.ctx.control.vend_door_close().success()
        {
            result = ErrorCode::VendDoorCloseTimeout;
        }

        match result {
            ErrorCode::PickerEmpty | ErrorCode::PickerFull => {
                info!("Accept disk in picker returned status {}", result)
            }
            _ => error!("Accept disk at door returned error {}", result),
        }
        result
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
