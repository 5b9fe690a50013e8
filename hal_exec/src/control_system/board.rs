//! # Core board
//!
//! Selects the core command for each capability and applies the command specific recovery rules.
//! Every failing actuator command is logged together with a fresh read of its board's inputs,
//! unless the failure was a communication error.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{debug, error, info, Level};
use std::sync::Arc;
use util::raise_error;

// Internal
use super::{
    AudioChannelState, BoardVersionResponse, ControlBoard, ControlSystemRevision,
    GripperFingerState, QlmOperation, QlmStatus, RollerPosition, RollerState, TrackState,
    VendDoorState,
};
use crate::core_cmd::{CommandType, CoreCommandExecutor, CoreResponse};
use crate::error::ErrorCode;
use crate::params::HalParams;
use crate::runtime::Runtime;
use crate::sensors::{AuxInput, PickerInput, ReadInputsResult};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Timeout of finger and track moves.
///
/// Units: milliseconds
const ACTUATOR_TIMEOUT_MS: u64 = 5000;

/// Timeout of a vend door move.
///
/// Units: milliseconds
const VEND_DOOR_TIMEOUT_MS: u64 = 5500;

/// Timeout of the extra close which seats the vend door on its sensor.
///
/// Units: milliseconds
const VEND_DOOR_SENSOR_TIMEOUT_MS: u64 = 5000;

/// Timeout of a QLM engage or disengage.
///
/// Units: milliseconds
const LIFTER_TIMEOUT_MS: u64 = 120_000;

/// Settle time after resetting the boards.
///
/// Units: milliseconds
const RESET_SETTLE_MS: u64 = 2000;

/// Attempts made for commands which may be dropped once under load.
const RETRY_COUNT: usize = 2;

/// Attempts made to close the vend door.
const VEND_DOOR_CLOSE_ATTEMPTS: usize = 2;

/// The boards queried for the control system revision.
const REVISION_BOARDS: [ControlBoard; 3] =
    [ControlBoard::Serial, ControlBoard::Picker, ControlBoard::Aux];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Capability level access to the I/O boards.
pub struct CoreBoard {
    executor: CoreCommandExecutor,
    runtime: Arc<dyn Runtime>,
    params: Arc<HalParams>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CoreBoard {
    pub fn new(executor: CoreCommandExecutor, runtime: Arc<dyn Runtime>, params: Arc<HalParams>) -> Self {
        Self {
            executor,
            runtime,
            params,
        }
    }

    /// Execute a raw core command, opening the channel if needed.
    pub fn execute(&self, kind: CommandType, timeout_ms: Option<u64>) -> CoreResponse {
        if !self.executor.open() {
            error!("Unable to open control port {}", self.executor.port_name());
            return CoreResponse::with_error(ErrorCode::CommunicationError);
        }

        self.executor.execute(kind, timeout_ms)
    }

    /// Reset the boards and silence the audio.
    pub fn initialize(&self) -> CoreResponse {
        let response = self.execute(CommandType::Reset, None);
        self.runtime.wait(RESET_SETTLE_MS);
        self.set_audio(AudioChannelState::Off);
        response
    }

    pub fn shutdown(&self) -> bool {
        self.executor.close()
    }

    pub fn set_audio(&self, state: AudioChannelState) -> CoreResponse {
        self.execute(
            match state {
                AudioChannelState::On => CommandType::AudioOn,
                AudioChannelState::Off => CommandType::AudioOff,
            },
            None,
        )
    }

    pub fn set_ringlight(&self, on: bool) -> CoreResponse {
        self.execute(
            if on {
                CommandType::RingLightOn
            } else {
                CommandType::RingLightOff
            },
            None,
        )
    }

    /// Switch the picker sensor bar illumination.
    pub fn set_picker_sensors(&self, on: bool) -> CoreResponse {
        self.execute(
            if on {
                CommandType::SensorBarOn
            } else {
                CommandType::SensorBarOff
            },
            None,
        )
    }

    /// Move the finger. With the secure disk validator enabled the finger may never fully open:
    /// an open request times out and rent uses the open command.
    pub fn set_finger(&self, state: GripperFingerState) -> CoreResponse {
        let secure = self.params.behaviour.enable_secure_disk_validator;

        let command = match state {
            GripperFingerState::Closed => CommandType::GripperClose,
            GripperFingerState::Open if secure => {
                return CoreResponse::with_error(ErrorCode::Timeout)
            }
            GripperFingerState::Open => CommandType::GripperOpen,
            GripperFingerState::Rent if secure => CommandType::GripperOpen,
            GripperFingerState::Rent => CommandType::GripperRent,
        };

        let response = self.on_retryable(command, RETRY_COUNT, ACTUATOR_TIMEOUT_MS);
        self.log_error(
            &response,
            &format!("Set finger {}", state),
            ControlBoard::Picker,
        );
        response
    }

    pub fn set_roller(&self, state: RollerState) -> CoreResponse {
        let command = match state {
            RollerState::None => raise_error!("Roller state cannot be none"),
            RollerState::In => CommandType::RollerIn,
            RollerState::Out => CommandType::RollerOut,
            RollerState::Stop => CommandType::RollerStop,
        };

        let response = self.execute(command, None);
        self.log_error(&response, &format!("Roller {:?}", state), ControlBoard::Picker);
        response
    }

    pub fn roller_to_position(&self, position: RollerPosition, timeout_ms: u64) -> CoreResponse {
        let command = match position {
            RollerPosition::Position1 => CommandType::RollerToPos1,
            RollerPosition::Position2 => CommandType::RollerToPos2,
            RollerPosition::Position3 => CommandType::RollerToPos3,
            RollerPosition::Position4 => CommandType::RollerToPos4,
            RollerPosition::Position5 => CommandType::RollerToPos5,
            RollerPosition::Position6 => CommandType::RollerToPos6,
        };
        self.execute(command, Some(timeout_ms))
    }

    /// Extend the arm for a fixed time. The arm is always halted afterwards.
    pub fn timed_arm_extend(&self, duration_ms: u64) -> CoreResponse {
        debug!("Timed arm extend for {} ms", duration_ms);

        let response = self.execute(CommandType::ExtendGripperArmForTime, None);
        self.runtime.wait(duration_ms);
        self.execute(CommandType::GripperExtendHalt, None);
        response
    }

    /// Extend the arm. A timeout is forgiven when the extend sensor shows the arm got there.
    pub fn extend_arm(&self, timeout_ms: u64) -> CoreResponse {
        let mut response = self.execute(CommandType::GripperExtend, Some(timeout_ms));
        self.log_error(&response, "Extend arm", ControlBoard::Picker);

        if response.timed_out() {
            let inputs = self.read_picker_inputs();
            if inputs.success() && inputs.is_input_active(PickerInput::Extend) {
                info!(
                    "GripperExtend status returned timeout; however, picker sensors read shows \
                    the forward sensor reached."
                );
                inputs.log(Level::Info);
                response.set_error(ErrorCode::Success);
            }
        }

        response
    }

    /// Retract the arm, retrying once.
    pub fn retract_arm(&self, timeout_ms: u64) -> CoreResponse {
        let response = self.on_retryable(CommandType::GripperRetract, RETRY_COUNT, timeout_ms);
        self.log_error(&response, "Retract arm", ControlBoard::Picker);

        if response.timed_out() {
            let inputs = self.read_picker_inputs();
            if inputs.success() && inputs.is_input_active(PickerInput::Retract) {
                info!(
                    "GripperRetract status returned timeout; however, picker sensors read shows \
                    the sensor tripped."
                );
                inputs.log(Level::Info);
            }
        }

        response
    }

    pub fn set_track(&self, state: TrackState) -> CoreResponse {
        let command = match state {
            TrackState::Open => CommandType::TrackOpen,
            _ => CommandType::TrackClose,
        };

        let response = self.on_retryable(command, RETRY_COUNT, ACTUATOR_TIMEOUT_MS);
        self.log_error(&response, &format!("Track {:?}", state), ControlBoard::Picker);
        response
    }

    pub fn set_vend_door(&self, state: VendDoorState) -> CoreResponse {
        let response = match state {
            VendDoorState::Rent => {
                self.on_retryable(CommandType::VendDoorRent, 1, VEND_DOOR_TIMEOUT_MS)
            }
            _ => self.close_vend_door(),
        };

        self.log_error(&response, &format!("Vend door {:?}", state), ControlBoard::Aux);
        response
    }

    /// Vend door position as reported by the aux sensors.
    pub fn read_vend_door_state(&self) -> VendDoorState {
        let inputs = self.read_aux_inputs();
        if !inputs.success() {
            error!("Read AUX sensors returned error {}", inputs.error());
            return VendDoorState::Unknown;
        }

        if inputs.is_input_active(AuxInput::VendDoorClosed) {
            VendDoorState::Closed
        } else if inputs.is_input_active(AuxInput::VendDoorRent) {
            VendDoorState::Rent
        } else {
            VendDoorState::Unknown
        }
    }

    pub fn get_qlm_status(&self) -> QlmStatus {
        let inputs = self.read_aux_inputs();
        if !inputs.success() {
            QlmStatus::AuxNotResponsive
        } else if !inputs.is_input_active(AuxInput::QlmPresence) {
            QlmStatus::Empty
        } else if !inputs.is_input_active(AuxInput::QlmUp) {
            QlmStatus::Disengaged
        } else {
            QlmStatus::Engaged
        }
    }

    pub fn on_qlm(&self, op: QlmOperation) -> CoreResponse {
        let response = match op {
            QlmOperation::None => raise_error!("QLM operation cannot be none"),
            QlmOperation::Engage => self.execute(CommandType::QlmEngage, Some(LIFTER_TIMEOUT_MS)),
            QlmOperation::Disengage => {
                self.execute(CommandType::QlmDisengage, Some(LIFTER_TIMEOUT_MS))
            }
            QlmOperation::Lift => self.execute(CommandType::QlmLift, None),
            QlmOperation::Drop => self.execute(CommandType::QlmDrop, None),
            QlmOperation::Halt => self.execute(CommandType::QlmHalt, None),
            QlmOperation::LockDoor => self.execute(CommandType::QlmLockDoor, None),
            QlmOperation::UnlockDoor => self.execute(CommandType::QlmUnlockDoor, None),
        };

        self.log_error(&response, &op.to_string(), ControlBoard::Aux);
        response
    }

    pub fn read_picker_inputs(&self) -> ReadInputsResult<PickerInput> {
        ReadInputsResult::from_response(
            self.execute(CommandType::PickerInputs, None),
            self.params.behaviour.validate_inputs_read_response,
        )
    }

    pub fn read_aux_inputs(&self) -> ReadInputsResult<AuxInput> {
        ReadInputsResult::from_response(
            self.execute(CommandType::AuxInputs, None),
            self.params.behaviour.validate_inputs_read_response,
        )
    }

    pub fn get_board_version(&self, board: ControlBoard) -> BoardVersionResponse {
        let command = match board {
            ControlBoard::Picker => CommandType::Version001,
            ControlBoard::Aux => CommandType::Version002,
            ControlBoard::Serial => CommandType::Version101,
        };
        BoardVersionResponse::new(board, &self.execute(command, None))
    }

    /// Query the version of every board.
    pub fn get_revision(&self) -> ControlSystemRevision {
        ControlSystemRevision::new(
            REVISION_BOARDS
                .iter()
                .map(|b| self.get_board_version(*b))
                .collect(),
        )
    }

    /// Run a command up to `attempts` times, stopping on success or on a communication error.
    fn on_retryable(&self, command: CommandType, attempts: usize, timeout_ms: u64) -> CoreResponse {
        let mut response = CoreResponse::with_error(ErrorCode::Timeout);
        for _ in 0..attempts {
            response = self.execute(command, Some(timeout_ms));
            if response.success() || response.comm_error() {
                break;
            }
        }
        response
    }

    fn close_vend_door(&self) -> CoreResponse {
        let mut response = CoreResponse::with_error(ErrorCode::Timeout);

        for _ in 0..VEND_DOOR_CLOSE_ATTEMPTS {
            response = self.execute(CommandType::VendDoorClose, Some(VEND_DOOR_TIMEOUT_MS));
            if response.comm_error() {
                return response;
            }

            if response.timed_out() {
                self.close_backoff();
            } else if self.read_vend_door_state() == VendDoorState::Closed
                || self.move_to_close_sensor()
            {
                return response;
            }
        }

        response
    }

    /// Nudge the door onto its closed sensor.
    fn move_to_close_sensor(&self) -> bool {
        if !self.params.behaviour.move_vend_door_to_aux_sensor {
            return true;
        }

        self.close_backoff();
        let response = self.execute(CommandType::VendDoorClose, Some(VEND_DOOR_SENSOR_TIMEOUT_MS));
        if response.comm_error() {
            return false;
        }

        self.runtime.spin_wait(100);
        !response.timed_out()
    }

    fn close_backoff(&self) {
        self.runtime.wait(200);
        self.execute(CommandType::UnknownVendDoorClose, None);
        self.runtime.wait(100);
        self.execute(CommandType::VendDoorKill, None);
        self.runtime.wait(100);
    }

    fn log_error(&self, response: &CoreResponse, command: &str, board: ControlBoard) {
        if response.success() {
            return;
        }

        error!("{} returned error status {}.", command, response.error());
        if response.comm_error() {
            return;
        }

        match board {
            ControlBoard::Aux => self.read_aux_inputs().log(Level::Error),
            ControlBoard::Picker => self.read_picker_inputs().log(Level::Error),
            ControlBoard::Serial => (),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::CoreBoardSim;

    fn board(sim: &CoreBoardSim, params: HalParams) -> CoreBoard {
        sim.core_board(Arc::new(params))
    }

    #[test]
    fn test_extend_timeout_forgiven_by_sensor() {
        let sim = CoreBoardSim::new();
        sim.stall("ARM EXTEND");
        sim.set_picker_input(PickerInput::Extend, true);
        let b = board(&sim, HalParams::default());

        let r = b.extend_arm(2000);
        assert!(r.success());
        assert!(sim.sent().contains("ARM HALT"));
    }

    #[test]
    fn test_extend_comm_error_not_rechecked() {
        let sim = CoreBoardSim::new();
        sim.fail_command("ARM EXTEND");
        let b = board(&sim, HalParams::default());

        let r = b.extend_arm(2000);
        assert_eq!(r.error(), ErrorCode::CommunicationError);
        assert!(!sim.sent().contains("INPUTS"));
    }

    #[test]
    fn test_retract_is_retried() {
        let sim = CoreBoardSim::new();
        sim.stall("ARM RETRACT");
        let b = board(&sim, HalParams::default());

        let r = b.retract_arm(2000);
        assert!(r.timed_out());
        assert_eq!(sim.sent().count("ARM RETRACT"), 2);
    }

    #[test]
    fn test_secure_validator_finger() {
        let sim = CoreBoardSim::new();
        let mut params = HalParams::default();
        params.behaviour.enable_secure_disk_validator = true;
        let b = board(&sim, params);

        assert!(b.set_finger(GripperFingerState::Open).timed_out());
        assert!(b.set_finger(GripperFingerState::Rent).success());
        assert!(sim.sent().contains("GRIPPER OPEN"));
        assert!(!sim.sent().contains("GRIPPER RENT"));
    }

    #[test]
    fn test_vend_door_close_backs_off_twice() {
        let sim = CoreBoardSim::new();
        sim.stall("VEND CLOSE");
        let b = board(&sim, HalParams::default());

        let r = b.set_vend_door(VendDoorState::Closed);
        assert!(r.timed_out());
        assert_eq!(sim.sent().count("VEND CLOSE"), 2);
        assert_eq!(sim.sent().count("VEND UNKNOWN"), 2);
        assert_eq!(sim.sent().count("VEND KILL"), 2);
    }

    #[test]
    fn test_qlm_status() {
        let sim = CoreBoardSim::new();
        let b = board(&sim, HalParams::default());
        assert_eq!(b.get_qlm_status(), QlmStatus::Empty);

        sim.set_aux_input(AuxInput::QlmPresence, true);
        assert_eq!(b.get_qlm_status(), QlmStatus::Disengaged);

        assert!(b.on_qlm(QlmOperation::Engage).success());
        assert_eq!(b.get_qlm_status(), QlmStatus::Engaged);
    }

    #[test]
    fn test_revision_needs_every_board() {
        let sim = CoreBoardSim::new();
        let b = board(&sim, HalParams::default());
        let rev = b.get_revision();
        assert!(rev.success);
        assert_eq!(rev.revision(), "A");

        sim.set_unresponsive(comms_if::AddressSelector::H002, true);
        let rev = b.get_revision();
        assert!(!rev.success);
        assert_eq!(rev.responses[2].to_string(), "TIMEOUT");
    }

    #[test]
    #[should_panic(expected = "Roller state cannot be none")]
    fn test_roller_none_panics() {
        let sim = CoreBoardSim::new();
        board(&sim, HalParams::default()).set_roller(RollerState::None);
    }

    #[test]
    #[should_panic(expected = "QLM operation cannot be none")]
    fn test_qlm_none_panics() {
        let sim = CoreBoardSim::new();
        board(&sim, HalParams::default()).on_qlm(QlmOperation::None);
    }
}
