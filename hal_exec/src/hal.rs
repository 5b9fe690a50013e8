//! # HAL assembly
//!
//! Builds the component graph of the control core from its two command channels: the control
//! system on the I/O board channel, the motion service on the motion controller channel, and the
//! controller service over both. The door sensor and the controller service are installed as move
//! vetoes, and the picker front clearer as the action run before homing.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{error, info};
use std::sync::Arc;
use thiserror::Error;

// Internal
use comms_if::CommandChannel;
use crate::control_system::{ControlSystem, ControlSystemRevision, CoreBoard};
use crate::controller::{ControllerService, ControllerVeto};
use crate::core_cmd::CoreCommandExecutor;
use crate::counters::PersistentCounters;
use crate::decks::{DeckError, DeckGeometry, DeckTable};
use crate::error::ErrorCode;
use crate::inventory::{InventoryStore, MemoryInventory};
use crate::motion::{
    ArcusController, DeviceResetter, DoorSensorService, LogExecutionContext,
    MotionControlService, MotionErrorLog,
};
use crate::ops::{OpContext, PickerFrontClearer};
use crate::params::HalParams;
use crate::runtime::Runtime;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Everything the HAL is built from.
pub struct HalParts {
    pub params: HalParams,
    pub runtime: Arc<dyn Runtime>,

    /// Channel to the I/O control boards.
    pub core_channel: Box<dyn CommandChannel>,

    /// Channel to the motion controller.
    pub motion_channel: Box<dyn CommandChannel>,

    pub counters: Arc<dyn PersistentCounters>,

    /// How the motion controller's device driver is reset when it stops answering.
    pub resetter: Box<dyn DeviceResetter>,

    pub error_log: MotionErrorLog,

    /// Run without the front door sensor even where one is fitted.
    pub door_override: bool,
}

/// The assembled control core.
pub struct Hal {
    pub params: Arc<HalParams>,
    pub control: Arc<ControlSystem>,
    pub motion: Arc<MotionControlService>,
    pub controller: Arc<ControllerService>,
    pub inventory: Arc<dyn InventoryStore>,
    pub door: Arc<DoorSensorService>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HalInitError {
    #[error("Invalid deck geometry: {0}")]
    Decks(#[from] DeckError),

    #[error("The control system failed to initialise: {0}")]
    ControlSystem(ErrorCode),

    #[error("The motion controller failed to start")]
    MotionController,

    #[error("Homing the axes failed: {0}")]
    Homing(ErrorCode),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Hal {
    pub fn new(parts: HalParts) -> Result<Self, HalInitError> {
        let params = Arc::new(parts.params);
        let runtime = parts.runtime;

        let decks: Arc<dyn DeckGeometry> = Arc::new(DeckTable::new(&params.decks)?);
        let inventory: Arc<dyn InventoryStore> = Arc::new(MemoryInventory::new(decks.as_ref()));
        info!("{} decks configured", params.decks.len());

        let executor = CoreCommandExecutor::new(
            parts.core_channel,
            runtime.clone(),
            params.timing.selector_timeout_ms,
            params.timing.command_wait_ms,
            params.behaviour.enable_command_trace,
        );
        let control = Arc::new(ControlSystem::new(
            CoreBoard::new(executor, runtime.clone(), params.clone()),
            runtime.clone(),
            params.clone(),
            parts.counters.clone(),
        ));

        let door = Arc::new(DoorSensorService::new(
            control.clone(),
            &params,
            parts.door_override,
        ));
        let arcus = ArcusController::new(
            parts.motion_channel,
            runtime.clone(),
            params.clone(),
            door.clone(),
            parts.resetter,
            parts.error_log,
        );
        let motion = Arc::new(MotionControlService::new(
            Box::new(arcus),
            params.clone(),
            decks.clone(),
            inventory.clone(),
            Arc::new(LogExecutionContext),
        ));

        let controller = Arc::new(ControllerService::new(OpContext {
            control: control.clone(),
            motion: motion.clone(),
            inventory: inventory.clone(),
            decks,
            counters: parts.counters,
            runtime,
            params: params.clone(),
        }));

        motion.add_veto(door.clone());
        motion.add_veto(Arc::new(ControllerVeto(Arc::downgrade(&controller))));
        motion.set_pre_home_action(Arc::new(PickerFrontClearer::new(
            control.clone(),
            params.clone(),
        )));

        Ok(Self {
            params,
            control,
            motion,
            controller,
            inventory,
            door,
        })
    }

    /// Bring up the control boards and the motion controller.
    pub fn initialize(&self) -> Result<(), HalInitError> {
        let response = self.control.initialize();
        if !response.success() {
            return Err(HalInitError::ControlSystem(response.error()));
        }

        if !self.motion.initialize() {
            return Err(HalInitError::MotionController);
        }
        Ok(())
    }

    /// Home both axes.
    pub fn home(&self, fast: bool) -> Result<(), HalInitError> {
        match self.motion.init_axes(fast) {
            ErrorCode::Success => Ok(()),
            e => {
                error!("Homing returned {}", e);
                Err(HalInitError::Homing(e))
            }
        }
    }

    pub fn revision(&self) -> ControlSystemRevision {
        self.control.get_revision()
    }

    pub fn shutdown(&self) {
        self.controller.shutdown();
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::counters::CounterStore;
    use crate::motion::MoveMode;
    use crate::params::DeckParams;
    use crate::runtime::SimRuntime;
    use crate::sensors::PickerInput;
    use crate::sim::{ArcusSim, CoreBoardSim};

    fn hal(params: HalParams) -> (CoreBoardSim, Hal) {
        let runtime = Arc::new(SimRuntime::new());
        let board = CoreBoardSim::with_runtime(runtime.clone());
        let arcus = ArcusSim::with_runtime(runtime.clone());

        let hal = Hal::new(HalParts {
            params,
            runtime: runtime.clone(),
            core_channel: Box::new(board.channel()),
            motion_channel: Box::new(arcus.channel()),
            counters: Arc::new(CounterStore::in_memory()),
            resetter: Box::new(crate::motion::SettleResetter::new(runtime)),
            error_log: MotionErrorLog::null(),
            door_override: false,
        })
        .unwrap();
        (board, hal)
    }

    fn one_deck() -> HalParams {
        let mut params = HalParams::default();
        params.decks = vec![DeckParams {
            number: 1,
            y_offset: -18760,
            number_of_slots: 90,
            ..Default::default()
        }];
        params
    }

    #[test]
    fn test_bring_up() {
        let (_board, hal) = hal(one_deck());
        hal.initialize().unwrap();
        hal.home(true).unwrap();

        assert!(hal.revision().success);
        assert_eq!(hal.motion.move_to(1, 3, MoveMode::None), ErrorCode::Success);
        hal.shutdown();
        assert!(!hal.motion.is_initialized());
    }

    #[test]
    fn test_controller_vetoes_moves() {
        let (board, hal) = hal(one_deck());
        hal.initialize().unwrap();
        hal.home(true).unwrap();

        board.update_inputs(|i| i.set_presence(&[PickerInput::Sensor1, PickerInput::Sensor6]));
        assert_eq!(
            hal.motion.move_to(1, 3, MoveMode::None),
            ErrorCode::ObstructionDetected
        );
    }

    #[test]
    fn test_bad_deck_geometry() {
        let mut params = one_deck();
        params.decks[0].number_of_slots = 0;
        let runtime = Arc::new(SimRuntime::new());

        let result = Hal::new(HalParts {
            params,
            runtime: runtime.clone(),
            core_channel: Box::new(CoreBoardSim::new().channel()),
            motion_channel: Box::new(ArcusSim::new().channel()),
            counters: Arc::new(CounterStore::in_memory()),
            resetter: Box::new(crate::motion::SettleResetter::new(runtime)),
            error_log: MotionErrorLog::null(),
            door_override: false,
        });
        assert!(matches!(result, Err(HalInitError::Decks(_))));
    }
}
