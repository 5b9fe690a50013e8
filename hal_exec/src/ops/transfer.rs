//! # Transfer
//!
//! Move a disk from one slot to the first of a list of destinations which takes it. The disk goes
//! back to its source if no destination does, and the slot it ends up in keeps the source's
//! return date (and, if asked, its flags).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{error, info, warn};

// Internal
use super::{
    DefaultGetObserver, GetObserver, GetResult, Operation, PutObserver, PutResult, TransferResult,
};
use crate::controller::ControllerService;
use crate::inventory::{InventoryStore, Location};
use crate::motion::MoveMode;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct TransferOperation<'a> {
    service: &'a ControllerService,
    source: Location,
    destinations: Vec<Location>,
    observer: Option<&'a dyn GetObserver>,
    preserve_flags: bool,
}

/// Copies what the source slot recorded about its disk onto the slot the disk was put in.
struct RestoreObserver<'a> {
    inventory: &'a dyn InventoryStore,
    get_result: &'a GetResult,
    preserve_flags: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'a> TransferOperation<'a> {
    pub fn new(
        service: &'a ControllerService,
        source: Location,
        destinations: Vec<Location>,
        observer: Option<&'a dyn GetObserver>,
        preserve_flags: bool,
    ) -> Self {
        Self {
            service,
            source,
            destinations,
            observer,
            preserve_flags,
        }
    }

    fn fetch_source(&self, result: &mut TransferResult) -> Option<GetResult> {
        let motion = &self.service.context().motion;

        let moved = motion.move_to_location(&self.source, MoveMode::Get);
        if !moved.is_success() {
            error!("[Transfer] Move to source {} returned {}", self.source, moved);
            result.transfer_error = moved;
            return None;
        }

        let get = match self.observer {
            Some(o) => self.service.get_with(o),
            None => self.service.get_with(&DefaultGetObserver),
        };
        if !get.success() {
            result.transfer_error = get.hardware_error;
            return None;
        }

        result.source = Some(self.source.clone());
        Some(get)
    }

    /// Try one destination. Returns whether the disk was put there.
    fn move_and_put(&self, destination: &Location, get: &GetResult, result: &mut TransferResult) -> bool {
        let ctx = self.service.context();

        let moved = ctx.motion.move_to_location(destination, MoveMode::Put);
        if !moved.is_success() {
            warn!("[Transfer] Move to destination {} returned {}", destination, moved);
            result.transfer_error = moved;
            return false;
        }

        ctx.control.track_cycle();
        let observer = RestoreObserver {
            inventory: ctx.inventory.as_ref(),
            get_result: get,
            preserve_flags: self.preserve_flags,
        };
        let put = self.service.put_with(&get.previous, &observer);
        result.transfer_error = put.code;
        if !put.success() {
            return false;
        }

        info!("[Transfer] {} moved from {} to {}", get.previous, self.source, put.put_location);
        result.destination = Some(put.put_location);
        true
    }

    fn return_to_source(&self, get: &GetResult, result: &mut TransferResult) {
        let ctx = self.service.context();
        info!("[Transfer] No destination took {}; return it to {}", get.previous, self.source);

        let moved = ctx.motion.move_to_location(&self.source, MoveMode::Put);
        if !moved.is_success() {
            error!("[Transfer] Move back to source {} returned {}", self.source, moved);
            result.transfer_error = moved;
            return;
        }

        ctx.control.track_cycle();
        let observer = RestoreObserver {
            inventory: ctx.inventory.as_ref(),
            get_result: get,
            preserve_flags: true,
        };
        if self.service.put_with(&get.previous, &observer).success() {
            result.returned_to_source = true;
        }
    }
}

impl Operation for TransferOperation<'_> {
    type Output = TransferResult;

    fn execute(&mut self) -> TransferResult {
        let mut result = TransferResult::new();

        let get = match self.fetch_source(&mut result) {
            Some(g) => g,
            None => return result,
        };

        for destination in self.destinations.iter() {
            if self.move_and_put(destination, &get, &mut result) {
                return result;
            }
        }

        self.return_to_source(&get, &mut result);
        result
    }
}

impl PutObserver for RestoreObserver<'_> {
    fn on_successful_put(&self, result: &PutResult) {
        let put = &result.put_location;
        if let Some(mut location) = self.inventory.get(put.deck, put.slot) {
            if self.preserve_flags {
                location.flags = self.get_result.flags;
            }
            location.return_date = self.get_result.return_time;
            self.inventory.save(&location);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorCode;
    use crate::inventory::{EMPTY_ID, UNKNOWN_ID};
    use crate::motion::MoveVeto;
    use crate::ops::fixture::{controlled_rig, Rig};
    use crate::sensors::PickerInput;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Vetoes every move once set.
    struct Blocker(Arc<AtomicBool>);

    impl MoveVeto for Blocker {
        fn can_move(&self) -> ErrorCode {
            if self.0.load(Ordering::SeqCst) {
                ErrorCode::DoorOpen
            } else {
                ErrorCode::Success
            }
        }
    }

    /// The first `blocked` puts jam on sensor 2 and are rolled back into the picker, later puts
    /// seat normally.
    fn jam_puts(rig: &Rig, blocked: usize) {
        let puts = AtomicUsize::new(0);
        rig.board.on_command("ROLLER IN", move |i| {
            if puts.fetch_add(1, Ordering::SeqCst) < blocked {
                i.set_presence(&[PickerInput::Sensor2, PickerInput::Sensor3]);
            } else {
                i.set_presence(&[PickerInput::Sensor1]);
            }
        });
        rig.board.on_command("ROLLER POS5", |i| {
            i.set_presence(&[PickerInput::Sensor3, PickerInput::Sensor4])
        });
    }

    #[test]
    fn test_every_destination_refuses() {
        let (rig, service) = controlled_rig();
        rig.feed_disks();
        jam_puts(&rig, 2);
        let source = rig.stock(1, 5, "ABC123");

        let result = service.transfer_to_any(
            &source,
            &[Location::new(1, 10), Location::new(1, 11)],
            None,
            false,
        );

        assert!(result.returned_to_source);
        assert!(!result.transferred());
        assert_eq!(result.transfer_error, ErrorCode::SlotInUse);
        assert_eq!(rig.id_at(1, 5), "ABC123");
        assert_eq!(rig.id_at(1, 10), UNKNOWN_ID);
        assert_eq!(rig.id_at(1, 11), UNKNOWN_ID);
    }

    #[test]
    fn test_failed_move_back_to_source() {
        let (rig, service) = controlled_rig();
        rig.feed_disks();
        jam_puts(&rig, 1);
        let source = rig.stock(1, 5, "ABC123");

        let blocked = Arc::new(AtomicBool::new(false));
        rig.ctx.motion.add_veto(Arc::new(Blocker(blocked.clone())));
        let flag = blocked.clone();
        rig.board
            .on_command("ROLLER POS5", move |_| flag.store(true, Ordering::SeqCst));

        let result = service.transfer(&source, &Location::new(1, 10), false);

        assert!(!result.returned_to_source);
        assert!(!result.transferred());
        assert_eq!(result.transfer_error, ErrorCode::DoorOpen);
        assert_eq!(rig.id_at(1, 5), EMPTY_ID);
    }
}
