//! # Door sensor
//!
//! VMZ machines have a front door sensor wired to the aux board. While the door is open no axis may
//! move: the service is registered as a move veto and the motor wait loop queries it on every poll.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{error, info, warn, Level};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Internal
use super::MoveVeto;
use crate::control_system::ControlSystem;
use crate::error::ErrorCode;
use crate::params::HalParams;
use crate::sensors::AuxInput;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something able to report whether the door allows motion.
pub trait DoorSensor: Send + Sync {
    fn query(&self) -> DoorSensorResult;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DoorSensorResult {
    Ok,
    AuxReadError,
    FrontDoor,
    SoftwareOverride,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct DoorSensorService {
    control: Arc<ControlSystem>,
    enabled: bool,
    software_override: AtomicBool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DoorSensorService {
    pub fn new(control: Arc<ControlSystem>, params: &HalParams, software_override: bool) -> Self {
        let enabled = params.is_vmz_machine();

        if !enabled {
            info!("The door sensors are not configured.");
        } else if software_override {
            warn!("** WARNING **: Door sensors are configured, however a software override in place.");
            warn!("** WARNING **: Kiosk is operating without door sensors.");
        } else {
            info!("Door sensors are configured.");
        }

        Self {
            control,
            enabled,
            software_override: AtomicBool::new(software_override),
        }
    }

    /// The door state for display, which reports an active override instead of hiding it.
    pub fn query_state_for_display(&self) -> DoorSensorResult {
        if !self.enabled {
            DoorSensorResult::Ok
        } else if self.software_override() {
            DoorSensorResult::SoftwareOverride
        } else {
            self.raw_query()
        }
    }

    pub fn sensors_enabled(&self) -> bool {
        self.enabled && !self.software_override()
    }

    pub fn software_override(&self) -> bool {
        self.software_override.load(Ordering::SeqCst)
    }

    pub fn set_software_override(&self, value: bool) {
        self.software_override.store(value, Ordering::SeqCst);
    }

    fn raw_query(&self) -> DoorSensorResult {
        let inputs = self.control.read_aux_inputs();
        if !inputs.success() {
            return DoorSensorResult::AuxReadError;
        }

        if inputs.is_input_active(AuxInput::QlmDown) {
            return DoorSensorResult::Ok;
        }

        error!("[DoorSensorService] read inputs shows door not closed");
        inputs.log(Level::Error);
        DoorSensorResult::FrontDoor
    }
}

impl DoorSensor for DoorSensorService {
    fn query(&self) -> DoorSensorResult {
        if !self.enabled || self.software_override() {
            DoorSensorResult::Ok
        } else {
            self.raw_query()
        }
    }
}

impl MoveVeto for DoorSensorService {
    fn can_move(&self) -> ErrorCode {
        let result = self.query();
        if result == DoorSensorResult::Ok {
            return ErrorCode::Success;
        }

        error!("Door sensor query returned {}", result);
        ErrorCode::DoorOpen
    }
}

impl fmt::Display for DoorSensorResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::counters::CounterStore;
    use crate::sim::CoreBoardSim;

    fn service(sim: &CoreBoardSim, vmz: bool, software_override: bool) -> DoorSensorService {
        let mut params = HalParams::default();
        if vmz {
            params.behaviour.merch_mode = 1;
        }
        let params = Arc::new(params);
        let control = Arc::new(sim.control_system(params.clone(), Arc::new(CounterStore::in_memory())));
        DoorSensorService::new(control, &params, software_override)
    }

    #[test]
    fn test_not_vmz_never_reads() {
        let sim = CoreBoardSim::new();
        let door = service(&sim, false, false);
        sim.set_aux_input(AuxInput::QlmDown, false);

        assert_eq!(door.query(), DoorSensorResult::Ok);
        assert_eq!(door.can_move(), ErrorCode::Success);
        assert!(!sim.sent().contains("INPUTS"));
    }

    #[test]
    fn test_vmz_door_open() {
        let sim = CoreBoardSim::new();
        let door = service(&sim, true, false);
        assert_eq!(door.query(), DoorSensorResult::Ok);

        sim.set_aux_input(AuxInput::QlmDown, false);
        assert_eq!(door.query(), DoorSensorResult::FrontDoor);
        assert_eq!(door.can_move(), ErrorCode::DoorOpen);

        door.set_software_override(true);
        assert_eq!(door.query(), DoorSensorResult::Ok);
        assert_eq!(door.query_state_for_display(), DoorSensorResult::SoftwareOverride);
        assert!(!door.sensors_enabled());
    }

    #[test]
    fn test_aux_read_error() {
        let sim = CoreBoardSim::new();
        let door = service(&sim, true, false);
        sim.set_unresponsive(comms_if::AddressSelector::H002, true);

        assert_eq!(door.query(), DoorSensorResult::AuxReadError);
        assert_eq!(door.can_move(), ErrorCode::DoorOpen);
    }
}
