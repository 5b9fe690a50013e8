//! # Get
//!
//! Take the disk out of the slot in front of the picker. The roller runs outward while the gripper
//! pulls, then the disk is rolled into the picker until it reaches sensor 4. A disk which never
//! gets there is either still in the slot (the slot is reported empty) or stuck half way, in
//! which case it is pushed back.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{error, info, Level};

// Internal
use super::{GetObserver, GetResult, OpContext, Operation};
use crate::control_system::{RollerPosition, TrackState};
use crate::error::ErrorCode;
use crate::inventory::Location;
use crate::runtime::Runtime;
use crate::sensors::PickerInput;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Time allowed for the disk to reach sensor 4 after the pull.
///
/// Units: milliseconds
const ROLL_TO_SENSOR_4_TIMEOUT_MS: u64 = 6000;

/// Pause before rolling the pulled disk in.
///
/// Units: milliseconds
const SETTLE_PAUSE_MS: u64 = 300;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct GetOperation<'a> {
    ctx: &'a OpContext,
    location: Location,
    observer: &'a dyn GetObserver,
    result: GetResult,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'a> GetOperation<'a> {
    pub fn new(ctx: &'a OpContext, location: Location, observer: &'a dyn GetObserver) -> Self {
        let result = GetResult::new(&location);
        Self {
            ctx,
            location,
            observer,
            result,
        }
    }

    /// The track must close and the picker must be empty.
    fn validate(&mut self) -> bool {
        let control = &self.ctx.control;

        if control.track_state() != TrackState::Closed && !control.track_close().success() {
            self.result.update(ErrorCode::TrackCloseTimeout);
            return false;
        }
        if control.read_picker_sensors().is_full() {
            self.result.update(ErrorCode::PickerFull);
            return false;
        }
        true
    }

    fn fetch_disk(&mut self) {
        let ctx = self.ctx;
        let control = &ctx.control;

        if self.location.is_wide {
            ctx.settle_disk_in_slot();
        }

        if !control.track_open().success() {
            self.result.update(ErrorCode::TrackOpenTimeout);
            return;
        }

        control.start_roller_out();
        let pulled = ctx.pull_from(&self.location, ctx.params.behaviour.number_of_pulls);
        if !pulled.is_success() {
            control.stop_roller();
            control.track_close();
            self.result.update(pulled);
            return;
        }

        if !control.track_close().success() {
            control.stop_roller();
            ctx.push_into_slot();
            self.result.update(ErrorCode::TrackCloseTimeout);
            return;
        }

        let read = control.read_picker_sensors();
        if !read.success() {
            self.result.update(read.error());
            return;
        }

        // Caught only by its edge, so take another bite.
        if read.is_input_active(PickerInput::Sensor1) && !read.is_input_active(PickerInput::Sensor2) {
            ctx.pull_from(&self.location, 1);
        }
        ctx.runtime.spin_wait(SETTLE_PAUSE_MS);

        if control
            .roller_to_position_quiet(RollerPosition::Position4, Some(ROLL_TO_SENSOR_4_TIMEOUT_MS))
            .success()
        {
            ctx.inventory.reset(&mut self.location);
            return;
        }

        let read = control.read_picker_sensors();
        if !read.success() {
            self.result.update(ErrorCode::SensorReadError);
        } else if read.is_full() {
            info!("[GET] Disk did not make it to sensor 4.");
            read.log(Level::Error);
            self.on_stuck();
        } else {
            info!("[GET] no disk in picker after pull.");
            read.log(Level::Info);
            self.result.update(ErrorCode::SlotEmpty);
            if self.observer.on_empty(&self.result) {
                ctx.inventory.reset(&mut self.location);
            }
        }
    }

    /// Push a disk stuck between slot and picker back into the slot.
    fn on_stuck(&mut self) {
        let ctx = self.ctx;
        let control = &ctx.control;

        control.start_roller_in();
        let timed_out = ctx.clear_disk_from_picker();
        ctx.push_into_slot();
        error!(
            "[GET] couldn't get disc, ClearDiscFromPicker returned {}",
            if timed_out { "TIMEOUT" } else { "SUCCESS" }
        );

        let read = control.read_picker_sensors();
        read.log(Level::Error);
        self.result.update(if !read.success() {
            ErrorCode::SensorReadError
        } else if read.is_full() {
            ErrorCode::PickerObstructed
        } else {
            ErrorCode::ItemStuck
        });
        control.stop_roller();

        self.observer.on_stuck(&self.result);
    }
}

impl Operation for GetOperation<'_> {
    type Output = GetResult;

    fn execute(&mut self) -> GetResult {
        if self.validate() {
            self.fetch_disk();
        }
        self.result.clone()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::inventory::EMPTY_ID;
    use crate::ops::fixture::rig;
    use crate::ops::DefaultGetObserver;
    use std::cell::Cell;

    #[derive(Default)]
    struct Recorder {
        stuck: Cell<bool>,
        allow_empty: bool,
    }

    impl GetObserver for Recorder {
        fn on_stuck(&self, _result: &GetResult) {
            self.stuck.set(true);
        }

        fn on_empty(&self, _result: &GetResult) -> bool {
            self.allow_empty
        }
    }

    #[test]
    fn test_get_empties_slot() {
        let rig = rig();
        let loc = rig.stock(1, 5, "ABC123");

        let result = GetOperation::new(&rig.ctx, loc, &DefaultGetObserver).execute();
        assert_eq!(result.hardware_error, ErrorCode::Success);
        assert_eq!(result.previous, "ABC123");
        assert_eq!(rig.id_at(1, 5), EMPTY_ID);
        assert_eq!(rig.board.sent().count("ARM EXTEND"), 2);
        assert!(rig.board.sent().contains("ROLLER POS4"));
    }

    #[test]
    fn test_get_refuses_full_picker() {
        let rig = rig();
        let loc = rig.stock(1, 5, "ABC123");
        rig.board.update_inputs(|i| i.set_presence(&[PickerInput::Sensor3]));

        let result = GetOperation::new(&rig.ctx, loc, &DefaultGetObserver).execute();
        assert_eq!(result.hardware_error, ErrorCode::PickerFull);
        assert!(!rig.board.sent().contains("TRACK OPEN"));
        assert_eq!(rig.id_at(1, 5), "ABC123");
    }

    #[test]
    fn test_get_pulls_again_for_disk_at_sensor_one() {
        let rig = rig();
        let loc = rig.stock(1, 5, "ABC123");
        rig.board
            .on_command("ROLLER OUT", |i| i.set_presence(&[PickerInput::Sensor1]));

        let result = GetOperation::new(&rig.ctx, loc, &DefaultGetObserver).execute();
        assert!(result.success());
        assert_eq!(rig.board.sent().count("ARM EXTEND"), 3);
    }

    #[test]
    fn test_get_empty_slot() {
        let rig = rig();
        let loc = rig.stock(1, 5, "ABC123");
        rig.board.stall("ROLLER POS4");

        let observer = Recorder::default();
        let result = GetOperation::new(&rig.ctx, loc.clone(), &observer).execute();
        assert!(result.is_slot_empty());
        assert_eq!(rig.id_at(1, 5), "ABC123");

        let result = GetOperation::new(&rig.ctx, loc, &DefaultGetObserver).execute();
        assert!(result.is_slot_empty());
        assert_eq!(rig.id_at(1, 5), EMPTY_ID);
    }

    #[test]
    fn test_get_stuck_disk_pushed_back() {
        let rig = rig();
        let loc = rig.stock(1, 5, "ABC123");
        rig.board.stall("ROLLER POS4");
        rig.board
            .on_command("ROLLER OUT", |i| i.set_presence(&[PickerInput::Sensor1]));
        rig.board.on_command("ARM EXTEND TIMED", |i| i.clear_presence());

        let observer = Recorder::default();
        let result = GetOperation::new(&rig.ctx, loc, &observer).execute();
        assert!(result.item_stuck());
        assert!(observer.stuck.get());
        assert_eq!(rig.id_at(1, 5), "ABC123");
        assert!(rig.board.sent().contains("ROLLER STOP"));
    }

    #[test]
    fn test_get_obstructed_picker() {
        let rig = rig();
        let loc = rig.stock(1, 5, "ABC123");
        rig.board.stall("ROLLER POS4");
        rig.board
            .on_command("ROLLER OUT", |i| i.set_presence(&[PickerInput::Sensor1]));

        let observer = Recorder::default();
        let result = GetOperation::new(&rig.ctx, loc, &observer).execute();
        assert_eq!(result.hardware_error, ErrorCode::PickerObstructed);
        assert!(observer.stuck.get());
    }

    #[test]
    fn test_get_track_open_failure() {
        let rig = rig();
        let loc = rig.stock(1, 5, "ABC123");
        rig.board.stall("TRACK OPEN");

        let result = GetOperation::new(&rig.ctx, loc, &DefaultGetObserver).execute();
        assert_eq!(result.hardware_error, ErrorCode::TrackOpenTimeout);
        assert!(!rig.board.sent().contains("ROLLER OUT"));
    }
}
