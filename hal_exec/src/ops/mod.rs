//! # Operations
//!
//! The picker procedures jobs are built from: get a disk out of a slot, put one back, move one
//! between slots, and the vend door exchanges with the customer. Each procedure is a short state
//! machine over the control system, run to completion by [`Operation::execute`]. They never retry
//! transport failures themselves, every loop they run is bounded by a count or a timer.
//!
//! The sensor waits, pulls and pushes most procedures share are methods of [`OpContext`].

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod accept;
mod clear_gripper;
mod clear_picker_front;
mod get;
mod helpers;
mod peek;
mod push_out;
mod put;
mod reject;
mod results;
mod transfer;
mod vend;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use accept::*;
pub use clear_gripper::*;
pub use clear_picker_front::*;
pub use get::*;
pub use peek::*;
pub use push_out::*;
pub use put::*;
pub use reject::*;
pub use results::*;
pub use transfer::*;
pub use vend::*;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::Arc;

use crate::control_system::ControlSystem;
use crate::counters::PersistentCounters;
use crate::decks::DeckGeometry;
use crate::error::ErrorCode;
use crate::inventory::InventoryStore;
use crate::motion::MotionControlService;
use crate::params::HalParams;
use crate::runtime::Runtime;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A procedure run to completion against the hardware.
pub trait Operation {
    type Output;

    fn execute(&mut self) -> Self::Output;
}

/// Callbacks from a get.
pub trait GetObserver {
    /// The disk stuck between the slot and the picker.
    fn on_stuck(&self, _result: &GetResult) {}

    /// Nothing came out of the slot. Returning `true` marks the slot empty.
    fn on_empty(&self, _result: &GetResult) -> bool {
        true
    }

    /// The move to the slot failed, so the get was never attempted.
    fn on_move_error(&self, _error: ErrorCode) {}
}

/// Callbacks from a put.
pub trait PutObserver {
    fn on_successful_put(&self, _result: &PutResult) {}

    fn on_failed_put(&self, _result: &PutResult) {}

    /// The move to the slot failed, so the put was never attempted.
    fn on_move_error(&self, _error: ErrorCode) {}
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Everything an operation drives or records to.
#[derive(Clone)]
pub struct OpContext {
    pub control: Arc<ControlSystem>,
    pub motion: Arc<MotionControlService>,
    pub inventory: Arc<dyn InventoryStore>,
    pub decks: Arc<dyn DeckGeometry>,
    pub counters: Arc<dyn PersistentCounters>,
    pub runtime: Arc<dyn Runtime>,
    pub params: Arc<HalParams>,
}

/// Observer accepting every outcome, which lets a get mark an empty slot.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultGetObserver;

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPutObserver;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GetObserver for DefaultGetObserver {}

impl PutObserver for DefaultPutObserver {}

// ------------------------------------------------------------------------------------------------
// TEST SUPPORT
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod fixture {
    use super::*;
    use crate::controller::{ControllerService, ControllerVeto};
    use crate::counters::CounterStore;
    use crate::decks::DeckTable;
    use crate::inventory::{Location, MemoryInventory};
    use crate::motion::{DoorSensorResult, LogExecutionContext};
    use crate::params::DeckParams;
    use crate::sim::{ArcusSim, CoreBoardSim, FixedDoor};
    use crate::runtime::SimRuntime;
    use crate::sensors::PickerInput;

    /// Both simulators on one clock with an operation context on top.
    pub struct Rig {
        pub board: CoreBoardSim,
        pub arcus: ArcusSim,
        pub ctx: OpContext,
    }

    pub fn params() -> HalParams {
        let mut params = HalParams::default();
        params.decks = vec![
            DeckParams {
                number: 1,
                y_offset: -18760,
                number_of_slots: 90,
                ..Default::default()
            },
            DeckParams {
                number: 2,
                y_offset: -40000,
                is_qlm: true,
                number_of_slots: 90,
                ..Default::default()
            },
        ];
        params
    }

    pub fn rig() -> Rig {
        rig_with(params())
    }

    pub fn rig_with(params: HalParams) -> Rig {
        let runtime = Arc::new(SimRuntime::new());
        let board = CoreBoardSim::with_runtime(runtime.clone());
        let arcus = ArcusSim::with_runtime(runtime.clone());

        let params = Arc::new(params);
        let decks = Arc::new(DeckTable::new(&params.decks).unwrap());
        let inventory = Arc::new(MemoryInventory::new(decks.as_ref()));
        let counters = Arc::new(CounterStore::in_memory());
        let control = Arc::new(board.control_system(params.clone(), counters.clone()));
        let controller =
            arcus.controller(params.clone(), Arc::new(FixedDoor(DoorSensorResult::Ok)));
        let motion = Arc::new(MotionControlService::new(
            Box::new(controller),
            params.clone(),
            decks.clone(),
            inventory.clone(),
            Arc::new(LogExecutionContext),
        ));

        let ctx = OpContext {
            control,
            motion,
            inventory,
            decks,
            counters,
            runtime,
            params,
        };
        Rig { board, arcus, ctx }
    }

    /// A rig whose moves are vetoed by a controller service, homed.
    pub fn controlled_rig() -> (Rig, Arc<ControllerService>) {
        let rig = rig();
        let service = Arc::new(ControllerService::new(rig.ctx.clone()));
        rig.ctx
            .motion
            .add_veto(Arc::new(ControllerVeto(Arc::downgrade(&service))));
        assert_eq!(rig.ctx.motion.init_axes(true), ErrorCode::Success);
        (rig, service)
    }

    impl Rig {
        /// The disk a get rolls in reaches the back of the picker, a put feeds it to the front
        /// and the push seats it.
        pub fn feed_disks(&self) {
            self.board.on_command("ROLLER POS4", |i| {
                i.set_presence(&[PickerInput::Sensor3, PickerInput::Sensor4])
            });
            self.board
                .on_command("ROLLER IN", |i| i.set_presence(&[PickerInput::Sensor1]));
            self.board.on_command("ARM EXTEND TIMED", |i| i.clear_presence());
        }

        /// Home both axes and park in front of a slot.
        pub fn park(&self, deck: i32, slot: i32) {
            assert_eq!(self.ctx.motion.init_axes(true), ErrorCode::Success);
            assert_eq!(
                self.ctx.motion.move_to(deck, slot, crate::motion::MoveMode::None),
                ErrorCode::Success
            );
        }

        /// Store `id` at a slot.
        pub fn stock(&self, deck: i32, slot: i32, id: &str) -> Location {
            let mut loc = self.ctx.inventory.get(deck, slot).unwrap();
            loc.id = id.to_string();
            assert!(self.ctx.inventory.save(&loc));
            loc
        }

        pub fn id_at(&self, deck: i32, slot: i32) -> String {
            self.ctx.inventory.get(deck, slot).unwrap().id
        }
    }
}
