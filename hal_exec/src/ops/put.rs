//! # Put
//!
//! Put the disk in the picker into the slot in front of it. The roller feeds the disk toward the
//! slot and the arm seats it. A disk which cannot clear sensor 2 is meeting something already in
//! the slot, so it is backed into the picker and the slot is marked `UNKNOWN` rather than forced.
//!
//! A successful put records the identifier against the slot. Identifiers already stored elsewhere
//! and identifiers which look like error codes are recorded as `UNKNOWN` according to the
//! configured policy.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{debug, error, info, Level};

// Internal
use super::{OpContext, Operation, PutObserver, PutResult};
use crate::control_system::{GripperFingerState, RollerPosition, TrackState};
use crate::error::ErrorCode;
use crate::inventory::{Location, KNOWN_TOKENS, UNKNOWN_ID};
use crate::runtime::Runtime;
use crate::sensors::PickerInput;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

pub const AGGRESSIVE_PUT_FAILURES_COUNTER: &str = "AggressivePutFailures";
pub const AGGRESSIVE_PUT_SUCCESSES_COUNTER: &str = "AggressivePutSuccesses";
pub const DUPLICATE_COUNTER: &str = "DUPLICATE-COUNT";

/// Suffix of a duplicate identifier kept under its own name.
const DUPLICATE_SUFFIX: &str = "(DUPLICATE)";

/// Units: milliseconds
const PUT_PAUSE_MS: u64 = 100;

/// Time allowed to roll a refused disk back to sensor 5.
///
/// Units: milliseconds
const ROLL_BACK_TIMEOUT_MS: u64 = 8000;

/// Time allowed to roll a pulled back disk to sensor 5.
///
/// Units: milliseconds
const RECOVER_TIMEOUT_MS: u64 = 5000;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct PutOperation<'a> {
    ctx: &'a OpContext,
    id: String,
    location: Location,
    observer: &'a dyn PutObserver,
    result: PutResult,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'a> PutOperation<'a> {
    pub fn new(
        ctx: &'a OpContext,
        id: &str,
        location: Location,
        observer: &'a dyn PutObserver,
    ) -> Self {
        Self {
            ctx,
            id: id.to_string(),
            result: PutResult::new(id, &location),
            location,
            observer,
        }
    }

    fn on_core_put(&mut self) -> ErrorCode {
        let ctx = self.ctx;
        let control = &ctx.control;

        if self.location.is_wide {
            ctx.settle_disk_in_slot();
        }

        if control.track_state() != TrackState::Closed && !control.track_close().success() {
            return ErrorCode::TrackCloseTimeout;
        }
        if !control.retract_arm().success() {
            return ErrorCode::GripperRetractTimeout;
        }
        if !control.set_finger(GripperFingerState::Rent).success() {
            error!("PUT: SetGripperFinger to Rent timed out.");
            return ErrorCode::GripperRentTimeout;
        }

        control.start_roller_in();
        let blocked = ctx.clear_disk_from_picker();
        ctx.runtime.spin_wait(PUT_PAUSE_MS);

        if blocked {
            error!(
                "PUT: Disk cannot be placed into {} because it cannot clear sensor 2.",
                self.location
            );
            control.log_picker_sensor_state(Level::Error);
            control.stop_roller();
            ctx.runtime.spin_wait(PUT_PAUSE_MS);

            if !control.track_open().success() {
                return ErrorCode::TrackOpenTimeout;
            }
            control.track_close();
            ctx.runtime.spin_wait(PUT_PAUSE_MS);

            if control
                .roller_to_position(RollerPosition::Position5, Some(ROLL_BACK_TIMEOUT_MS))
                .success()
            {
                return self.on_slot_in_use();
            }
            info!("Put: roll item back to sensor 5 returned TIMEOUT");
            error!("PUT: unable to roll item into slot, and cannot move it back into the picker.");
            control.log_picker_sensor_state(Level::Error);
            return ErrorCode::PickerObstructed;
        }

        debug!("Sensor wait for 2, 5 didn't time out.");
        let pushed = ctx.push_into_slot();
        if !pushed.is_success() {
            error!("PUT: item_cleared_gripper: PushIntoSlot returned {}", pushed);
        }
        control.stop_roller();

        let read = control.read_picker_sensors();
        if !read.success() {
            return ErrorCode::SensorReadError;
        }
        if !read.is_input_active(PickerInput::Sensor1) {
            self.update_inventory();
            return ErrorCode::Success;
        }

        error!("[PUT] can't put disk in slot.");
        control.log_picker_sensor_state(Level::Error);
        if ctx.params.behaviour.aggressive_clear_picker_on_put {
            return self.on_aggressive_put();
        }

        if !control.track_open().success() {
            return ErrorCode::TrackOpenTimeout;
        }
        ctx.pull_from(&self.location, ctx.params.behaviour.number_of_pulls);
        if !control.track_close().success() {
            return ErrorCode::TrackCloseTimeout;
        }

        if !control
            .roller_to_position(RollerPosition::Position5, Some(RECOVER_TIMEOUT_MS))
            .success()
        {
            control.log_picker_sensor_state(Level::Error);
            ctx.runtime.spin_wait(PUT_PAUSE_MS);
            control.stop_roller();
            return ErrorCode::PickerObstructed;
        }

        let read = control.read_picker_sensors();
        if read.is_input_active(PickerInput::Sensor1) || read.is_input_active(PickerInput::Sensor6) {
            ErrorCode::PickerObstructed
        } else {
            self.on_slot_in_use()
        }
    }

    /// Keep pushing a disk which would not seat, first with the track cycled and then with it
    /// open, before giving up and pulling it back.
    fn on_aggressive_put(&mut self) -> ErrorCode {
        let ctx = self.ctx;
        let control = &ctx.control;

        control.track_cycle();
        control.start_roller_in();
        ctx.push_into_slot();
        control.stop_roller();

        let read = control.read_picker_sensors();
        if !read.success() {
            return ErrorCode::SensorReadError;
        }
        if !read.is_input_active(PickerInput::Sensor1) {
            self.on_aggressive_success();
            return ErrorCode::Success;
        }

        control.track_open();
        ctx.push_into_slot();
        control.track_close();

        let read = control.read_picker_sensors();
        if !read.success() {
            return ErrorCode::SensorReadError;
        }
        if !read.is_input_active(PickerInput::Sensor1) {
            self.on_aggressive_success();
            return ErrorCode::Success;
        }

        error!("AggressivePut not able to clear the disk.");
        control.log_picker_sensor_state(Level::Error);
        ctx.counters.increment(AGGRESSIVE_PUT_FAILURES_COUNTER);

        control.start_roller_out();
        ctx.pull_from(&self.location, ctx.params.behaviour.number_of_pulls);
        let rolled =
            control.roller_to_position(RollerPosition::Position5, Some(RECOVER_TIMEOUT_MS));
        error!("[PUT] gripperClear: false, rollerTo 5 returned {}", rolled.error());
        control.read_picker_sensors().log(Level::Error);
        ctx.runtime.spin_wait(PUT_PAUSE_MS);
        control.stop_roller();
        ErrorCode::PickerObstructed
    }

    fn on_aggressive_success(&mut self) {
        info!("Aggressive PUT was able to clear disk.");
        self.ctx.counters.increment(AGGRESSIVE_PUT_SUCCESSES_COUNTER);
        self.update_inventory();
    }

    /// Something already occupies the slot. Its content is no longer known.
    fn on_slot_in_use(&mut self) -> ErrorCode {
        self.location.id = UNKNOWN_ID.to_string();
        self.ctx.inventory.save(&self.location);
        self.result.put_location = self.location.clone();
        ErrorCode::SlotInUse
    }

    fn update_inventory(&mut self) {
        let ctx = self.ctx;
        let behaviour = &ctx.params.behaviour;

        let duplicate = ctx.inventory.is_barcode_duplicate(&self.id);
        self.result.is_duplicate = duplicate.is_some();
        self.result.stored_id = if is_suspicious_id(&self.id) {
            UNKNOWN_ID.to_string()
        } else {
            self.id.clone()
        };

        if let Some(mut original) = duplicate {
            self.result.stored_id = if behaviour.mark_duplicates_unknown {
                UNKNOWN_ID.to_string()
            } else {
                format!("{}{}", self.id, DUPLICATE_SUFFIX)
            };
            info!(
                "The ID {} is a duplicate ( original at Deck = {} Slot = {} ); marking as {}",
                self.id, original.deck, original.slot, self.result.stored_id
            );

            if behaviour.mark_original_matrix_unknown {
                info!(
                    "Mark the original matrix ID = {} at {} ); marking as {}",
                    self.id, original, UNKNOWN_ID
                );
                original.id = UNKNOWN_ID.to_string();
                ctx.inventory.save(&original);
            }
            self.result.original_id_location = Some(original);
            ctx.counters.increment(DUPLICATE_COUNTER);
        }

        self.location.id = self.result.stored_id.clone();
        ctx.inventory.save(&self.location);
        self.result.put_location = self.location.clone();
    }
}

impl Operation for PutOperation<'_> {
    type Output = PutResult;

    fn execute(&mut self) -> PutResult {
        self.result.code = self.on_core_put();
        if self.result.success() {
            self.observer.on_successful_put(&self.result);
        } else {
            self.observer.on_failed_put(&self.result);
        }
        self.result.clone()
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// An identifier which is really an error code name, most likely a failed scan.
fn is_suspicious_id(id: &str) -> bool {
    if KNOWN_TOKENS.iter().any(|t| t.eq_ignore_ascii_case(id)) {
        return false;
    }
    ErrorCode::from_name(id).is_some()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
