//! # Controller service
//!
//! The face of the HAL to the kiosk's jobs. Every picker procedure is run from here, and every
//! move of the picker is vetoed here first: the picker may only move with the vend door shut, the
//! gripper clear and the arm retracted.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{error, info, Level};
use std::sync::Weak;

// Internal
use crate::control_system::{ControlBoard, GripperFingerState, VendDoorState};
use crate::error::ErrorCode;
use crate::inventory::{Location, EMPTY_ID};
use crate::motion::{MoveMode, MoveVeto};
use crate::ops::*;
use crate::sensors::PickerInput;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct ControllerService {
    ctx: OpContext,
}

/// Move veto backed by the controller service.
///
/// The motion service holds its vetoes while the controller service holds the motion service, so
/// the veto only keeps a weak reference. A dropped service never vetoes.
pub struct ControllerVeto(pub Weak<ControllerService>);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ControllerService {
    pub fn new(ctx: OpContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &OpContext {
        &self.ctx
    }

    pub fn shutdown(&self) {
        self.ctx.motion.shutdown();
        self.ctx.control.shutdown();
    }

    /// Whether the picker is safe to move.
    pub fn can_move(&self) -> ErrorCode {
        let control = &self.ctx.control;
        let behaviour = &self.ctx.params.behaviour;

        if control.vend_door_state() != VendDoorState::Closed && !control.vend_door_close().success()
        {
            return ErrorCode::VendDoorNotClosed;
        }

        if !self.clear_gripper().is_success() {
            return ErrorCode::ObstructionDetected;
        }

        let inputs = control.read_picker_inputs();
        if !inputs.success() {
            return ErrorCode::SensorReadError;
        }

        if !inputs.is_input_active(PickerInput::Retract) {
            if behaviour.gripper_rent_on_move
                && !inputs.is_input_active(PickerInput::FingerRent)
                && !control.set_finger(GripperFingerState::Rent).success()
            {
                return ErrorCode::GripperRentTimeout;
            }
            if !control.retract_arm().success() {
                return ErrorCode::GripperRetractTimeout;
            }
        }

        if behaviour.check_gripper_arm_sensors_on_move
            && inputs.is_input_active(PickerInput::Extend)
            && inputs.is_input_active(PickerInput::Retract)
        {
            error!("MOVE: can't move because extend/retract both triggered.");
            return ErrorCode::SensorError;
        }

        ErrorCode::Success
    }

    // ---- GET ----

    /// Get from the slot the picker is parked at.
    pub fn get(&self) -> GetResult {
        self.get_with(&DefaultGetObserver)
    }

    pub fn get_with(&self, observer: &dyn GetObserver) -> GetResult {
        match self.ctx.motion.current_location() {
            Some(location) => self.on_get(location, observer),
            None => {
                error!("GET: the picker is not at a slot.");
                GetResult::no_location()
            }
        }
    }

    /// Move to a slot and get from it.
    pub fn get_from(&self, location: &Location) -> GetFromResult {
        self.get_from_with(location, &DefaultGetObserver)
    }

    pub fn get_from_with(&self, location: &Location, observer: &dyn GetObserver) -> GetFromResult {
        let move_result = self.ctx.motion.move_to_location(location, MoveMode::Get);
        if !move_result.is_success() {
            observer.on_move_error(move_result);
            return GetFromResult {
                move_result,
                get_result: None,
            };
        }

        GetFromResult {
            move_result,
            get_result: Some(self.get_with(observer)),
        }
    }

    fn on_get(&self, location: Location, observer: &dyn GetObserver) -> GetResult {
        let printable = location.to_string();
        let result = GetOperation::new(&self.ctx, location, observer).execute();

        if result.is_slot_empty() {
            info!("GET {} returned SLOTEMPTY", printable);
        } else if !result.success() {
            error!("GET {} returned error status {}", printable, result);
        } else {
            info!("GET {} ID={}", printable, result.previous);
            self.check_inventory(EMPTY_ID);
        }
        result
    }

    // ---- PUT ----

    /// Put the picker's disk into the slot the picker is parked at.
    pub fn put(&self, id: &str) -> PutResult {
        self.put_with(id, &DefaultPutObserver)
    }

    pub fn put_with(&self, id: &str, observer: &dyn PutObserver) -> PutResult {
        match self.ctx.motion.current_location() {
            Some(location) => self.on_put(location, id, observer),
            None => {
                error!("PUT: the picker is not at a slot.");
                PutResult::no_location(id)
            }
        }
    }

    /// Move to a slot and put the picker's disk into it.
    pub fn put_to(&self, id: &str, location: &Location) -> PutToResult {
        self.put_to_with(id, location, &DefaultPutObserver)
    }

    pub fn put_to_with(&self, id: &str, location: &Location, observer: &dyn PutObserver) -> PutToResult {
        let move_result = self.ctx.motion.move_to_location(location, MoveMode::Put);
        if !move_result.is_success() {
            observer.on_move_error(move_result);
            return PutToResult {
                move_result,
                put_result: None,
            };
        }

        self.ctx.control.track_cycle();
        PutToResult {
            move_result,
            put_result: Some(self.put_with(id, observer)),
        }
    }

    fn on_put(&self, location: Location, id: &str, observer: &dyn PutObserver) -> PutResult {
        let control = &self.ctx.control;

        let read = control.read_picker_sensors();
        if !read.success() {
            return PutResult::with_code(id, &location, ErrorCode::SensorReadError);
        }
        if !read.is_full() {
            error!("PUT: picker is empty.");
            read.log(Level::Error);
            control.log_inputs(ControlBoard::Picker, Level::Error);
            return PutResult::with_code(id, &location, ErrorCode::PickerEmpty);
        }

        let printable = location.to_string();
        let result = PutOperation::new(&self.ctx, id, location, observer).execute();
        if result.success() {
            info!("PUT {} ID={}", printable, result.stored_id);
            self.check_inventory(&result.stored_id);
        } else {
            error!("PUT {} ID={} returned error status {}", printable, id, result);
        }
        result
    }

    /// Compare what the inventory holds for the current slot against what it should hold.
    fn check_inventory(&self, expected: &str) {
        let current = match self.ctx.motion.current_location() {
            Some(l) => l,
            None => return,
        };

        if let Some(stored) = self.ctx.inventory.get(current.deck, current.slot) {
            if stored.id != expected {
                error!(
                    "** INVENTORY CHECK ERROR** - location shows ID {} expected {}",
                    stored.id, expected
                );
            }
        }
    }

    // ---- TRANSFER ----

    pub fn transfer(&self, source: &Location, destination: &Location, preserve_flags: bool) -> TransferResult {
        self.transfer_to_any(source, &[destination.clone()], None, preserve_flags)
    }

    /// Move the disk at `source` to the first destination which takes it, or back to `source`.
    pub fn transfer_to_any(
        &self,
        source: &Location,
        destinations: &[Location],
        observer: Option<&dyn GetObserver>,
        preserve_flags: bool,
    ) -> TransferResult {
        TransferOperation::new(
            self,
            source.clone(),
            destinations.to_vec(),
            observer,
            preserve_flags,
        )
        .execute()
    }

    // ---- PICKER ----

    pub fn push_out(&self) -> ErrorCode {
        PushOutOperation::new(&self.ctx).execute()
    }

    pub fn clear_gripper(&self) -> ErrorCode {
        ClearGripperOperation::new(&self.ctx).execute()
    }

    pub fn peek(&self) -> PeekResult {
        PeekOperation::new(&self.ctx).execute()
    }

    // ---- QLM ----

    /// Engage the QLM lifter, homing X through the motion service first.
    pub fn engage_qlm(&self) -> ErrorCode {
        self.ctx.control.engage_qlm(self.ctx.motion.as_ref())
    }

    /// Disengage the QLM lifter, homing X through the motion service first.
    pub fn disengage_qlm(&self) -> ErrorCode {
        self.ctx.control.disengage_qlm(self.ctx.motion.as_ref())
    }

    // ---- VEND DOOR ----

    pub fn vend_item_in_picker(&self) -> VendResult {
        VendOperation::new(&self.ctx).execute()
    }

    pub fn vend_item_in_picker_with(&self, poll_count: u32) -> VendResult {
        VendOperation::with_poll_count(&self.ctx, poll_count).execute()
    }

    pub fn accept_disk_at_door(&self) -> ErrorCode {
        AcceptOperation::new(&self.ctx).execute()
    }

    pub fn reject_disk_in_picker(&self) -> ErrorCode {
        RejectOperation::new(&self.ctx).execute()
    }

    pub fn reject_disk_in_picker_with(&self, attempts: u32) -> ErrorCode {
        RejectOperation::with_attempts(&self.ctx, attempts).execute()
    }
}

impl MoveVeto for ControllerVeto {
    fn can_move(&self) -> ErrorCode {
        match self.0.upgrade() {
            Some(service) => service.can_move(),
            None => ErrorCode::Success,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::ops::fixture::{controlled_rig, rig};
    use chrono::{DateTime, Utc};
    use std::cell::Cell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_move_with_clear_picker() {
        let (rig, _service) = controlled_rig();
        assert_eq!(rig.ctx.motion.move_to(1, 6, MoveMode::Put), ErrorCode::Success);
        assert!(rig.board.aux_input(crate::sensors::AuxInput::VendDoorClosed));
    }

    #[test]
    fn test_veto_on_obstruction() {
        let (rig, _service) = controlled_rig();
        rig.board
            .update_inputs(|i| i.set_presence(&[PickerInput::Sensor1, PickerInput::Sensor6]));

        assert_eq!(
            rig.ctx.motion.move_to(1, 6, MoveMode::Put),
            ErrorCode::ObstructionDetected
        );
        assert_eq!(rig.ctx.motion.current_location(), None);
    }

    #[test]
    fn test_veto_retracts_arm() {
        let (rig, _service) = controlled_rig();
        rig.board.update_inputs(|i| {
            i.set_picker(PickerInput::Extend, true);
            i.set_picker(PickerInput::Retract, false);
        });

        assert_eq!(rig.ctx.motion.move_to(1, 6, MoveMode::Put), ErrorCode::Success);
        assert!(rig.board.picker_input(PickerInput::Retract));
        assert!(rig.board.sent().contains("GRIPPER RENT"));
    }

    #[test]
    fn test_veto_on_both_arm_sensors() {
        let (rig, _service) = controlled_rig();
        rig.board.set_picker_input(PickerInput::Extend, true);

        assert_eq!(rig.ctx.motion.move_to(1, 6, MoveMode::Put), ErrorCode::SensorError);
    }

    #[test]
    fn test_dropped_service_never_vetoes() {
        let rig = rig();
        let service = Arc::new(ControllerService::new(rig.ctx.clone()));
        let veto = ControllerVeto(Arc::downgrade(&service));
        drop(service);

        rig.board.set_picker_input(PickerInput::Extend, true);
        assert_eq!(veto.can_move(), ErrorCode::Success);
    }

    #[test]
    fn test_engage_qlm_homes_x_first() {
        let (rig, service) = controlled_rig();
        let arcus_sent = rig.arcus.sent();
        let homes_before = arcus_sent.count("HOMEX-");

        let homes_at_engage = Arc::new(AtomicUsize::new(0));
        let seen = homes_at_engage.clone();
        rig.board.on_command("QLM ENGAGE", move |_| {
            seen.store(arcus_sent.count("HOMEX-"), Ordering::SeqCst)
        });

        assert_eq!(service.engage_qlm(), ErrorCode::Success);
        assert_eq!(homes_at_engage.load(Ordering::SeqCst), homes_before + 1);
        assert!(rig.board.sent().contains("QLM ENGAGE"));
    }

    #[test]
    fn test_get_needs_location() {
        let rig = rig();
        let service = ControllerService::new(rig.ctx.clone());
        assert_eq!(service.get().hardware_error, ErrorCode::LocationOutOfRange);
        assert_eq!(service.put("ABC123").code, ErrorCode::LocationOutOfRange);
    }

    #[test]
    fn test_get_from_reports_move_error() {
        struct Moves(Cell<Option<ErrorCode>>);
        impl GetObserver for Moves {
            fn on_move_error(&self, error: ErrorCode) {
                self.0.set(Some(error));
            }
        }

        let (_rig, service) = controlled_rig();
        let observer = Moves(Cell::new(None));
        let result = service.get_from_with(&Location::new(9, 1), &observer);

        assert_eq!(result.move_result, ErrorCode::DeckOutOfRange);
        assert!(result.get_result.is_none());
        assert_eq!(observer.0.get(), Some(ErrorCode::DeckOutOfRange));
    }

    #[test]
    fn test_put_to_with_empty_picker() {
        let (rig, service) = controlled_rig();
        let result = service.put_to("ABC123", &Location::new(1, 7));

        assert!(result.move_result.is_success());
        assert!(result.put_result.map_or(false, |p| p.picker_empty()));
        assert_eq!(rig.id_at(1, 7), EMPTY_ID);
    }

    #[test]
    fn test_get_then_put() {
        let (rig, service) = controlled_rig();
        rig.feed_disks();
        let source = rig.stock(1, 5, "ABC123");

        assert!(service.get_from(&source).success());
        assert_eq!(rig.id_at(1, 5), EMPTY_ID);

        let result = service.put_to("ABC123", &Location::new(1, 8));
        assert!(result.success());
        assert_eq!(rig.id_at(1, 8), "ABC123");
    }

    #[test]
    fn test_transfer_keeps_return_date() {
        let (rig, service) = controlled_rig();
        rig.feed_disks();

        let mut source = rig.stock(1, 5, "ABC123");
        source.flags = 3;
        source.return_date = Some("2020-06-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap());
        assert!(rig.ctx.inventory.save(&source));

        let result = service.transfer(&source, &Location::new(1, 10), true);
        assert!(result.transferred());
        assert!(!result.returned_to_source);

        let moved = rig.ctx.inventory.get(1, 10).unwrap();
        assert_eq!(moved.id, "ABC123");
        assert_eq!(moved.flags, 3);
        assert_eq!(moved.return_date, source.return_date);
        assert_eq!(rig.id_at(1, 5), EMPTY_ID);
    }

    #[test]
    fn test_transfer_without_destination_returns_to_source() {
        let (rig, service) = controlled_rig();
        rig.feed_disks();
        let source = rig.stock(1, 5, "ABC123");

        let result = service.transfer_to_any(&source, &[], None, false);
        assert!(result.returned_to_source);
        assert!(!result.transferred());
        assert_eq!(rig.id_at(1, 5), "ABC123");
    }

    #[test]
    fn test_transfer_skips_bad_destination() {
        let (rig, service) = controlled_rig();
        rig.feed_disks();
        let source = rig.stock(1, 5, "ABC123");

        let result = service.transfer_to_any(
            &source,
            &[Location::new(1, 500), Location::new(1, 11)],
            None,
            false,
        );
        assert!(result.transferred());
        assert_eq!(result.destination.map(|d| d.slot), Some(11));
        assert_eq!(rig.id_at(1, 11), "ABC123");
    }
}
