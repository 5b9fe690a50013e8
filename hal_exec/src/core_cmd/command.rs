//! # Core command table
//!
//! Static description of every command understood by the I/O boards.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::AddressSelector;
use serde::{Deserialize, Serialize};
use std::fmt;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Status query, answered with one character per status bit.
pub const STATUS_QUERY: &str = "S";

/// Poll period used by every command which has a status bit.
///
/// Units: milliseconds
const STATUS_PAUSE_MS: u64 = 50;

/// Status bit positions.
const FINGER_BIT: usize = 0;
const ARM_BIT: usize = 1;
const ROLLER_BIT: usize = 2;
const TRACK_BIT: usize = 3;
const VEND_DOOR_BIT: usize = 4;
const QLM_BIT: usize = 5;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// How a command is addressed, sent and completed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandDescriptor {
    /// Board the command is routed to.
    pub address: AddressSelector,

    /// Literal command text.
    pub command: &'static str,

    /// Bit of the status query which is set while the command is in progress.
    pub status_bit: Option<usize>,

    /// Pause between status polls.
    ///
    /// Units: milliseconds
    pub wait_pause_ms: u64,

    /// Timeout of the command exchange itself, `None` for the executor default.
    ///
    /// Units: milliseconds
    pub command_wait_ms: Option<u64>,

    /// Comma separated commands sent when polling times out.
    pub reset: Option<&'static str>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Every command kind the I/O boards accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandType {
    // ---- SERIAL BOARD ----
    Reset,
    AudioOn,
    AudioOff,
    RingLightOn,
    RingLightOff,
    Version101,

    // ---- PICKER ----
    SensorBarOn,
    SensorBarOff,
    GripperClose,
    GripperOpen,
    GripperRent,
    GripperExtend,
    GripperRetract,
    ExtendGripperArmForTime,
    GripperExtendHalt,
    RollerIn,
    RollerOut,
    RollerStop,
    RollerToPos1,
    RollerToPos2,
    RollerToPos3,
    RollerToPos4,
    RollerToPos5,
    RollerToPos6,
    TrackOpen,
    TrackClose,
    PickerInputs,
    Version001,

    // ---- AUX BOARD ----
    VendDoorRent,
    VendDoorClose,
    UnknownVendDoorClose,
    VendDoorKill,
    QlmEngage,
    QlmDisengage,
    QlmLift,
    QlmDrop,
    QlmHalt,
    QlmLockDoor,
    QlmUnlockDoor,
    AuxInputs,
    Version002,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CommandDescriptor {
    const fn simple(address: AddressSelector, command: &'static str) -> Self {
        Self {
            address,
            command,
            status_bit: None,
            wait_pause_ms: 0,
            command_wait_ms: None,
            reset: None,
        }
    }

    const fn polled(
        address: AddressSelector,
        command: &'static str,
        bit: usize,
        reset: Option<&'static str>,
    ) -> Self {
        Self {
            address,
            command,
            status_bit: Some(bit),
            wait_pause_ms: STATUS_PAUSE_MS,
            command_wait_ms: None,
            reset,
        }
    }
}

impl CommandType {
    /// The static descriptor of this command.
    pub fn descriptor(&self) -> CommandDescriptor {
        use AddressSelector::*;
        use CommandType::*;

        match self {
            Reset => CommandDescriptor::simple(H101, "RESET"),
            AudioOn => CommandDescriptor::simple(H101, "AUDIO ON"),
            AudioOff => CommandDescriptor::simple(H101, "AUDIO OFF"),
            RingLightOn => CommandDescriptor::simple(H101, "LIGHT ON"),
            RingLightOff => CommandDescriptor::simple(H101, "LIGHT OFF"),
            Version101 => CommandDescriptor::simple(H101, "VERSION"),

            SensorBarOn => CommandDescriptor::simple(H001, "SENSOR ON"),
            SensorBarOff => CommandDescriptor::simple(H001, "SENSOR OFF"),
            GripperClose => CommandDescriptor::polled(H001, "GRIPPER CLOSE", FINGER_BIT, None),
            GripperOpen => CommandDescriptor::polled(H001, "GRIPPER OPEN", FINGER_BIT, None),
            GripperRent => CommandDescriptor::polled(H001, "GRIPPER RENT", FINGER_BIT, None),
            GripperExtend => {
                CommandDescriptor::polled(H001, "ARM EXTEND", ARM_BIT, Some("ARM HALT"))
            }
            GripperRetract => {
                CommandDescriptor::polled(H001, "ARM RETRACT", ARM_BIT, Some("ARM HALT"))
            }
            ExtendGripperArmForTime => CommandDescriptor::simple(H001, "ARM EXTEND TIMED"),
            GripperExtendHalt => CommandDescriptor::simple(H001, "ARM HALT"),
            RollerIn => CommandDescriptor::simple(H001, "ROLLER IN"),
            RollerOut => CommandDescriptor::simple(H001, "ROLLER OUT"),
            RollerStop => CommandDescriptor::simple(H001, "ROLLER STOP"),
            RollerToPos1 => roller_to("ROLLER POS1"),
            RollerToPos2 => roller_to("ROLLER POS2"),
            RollerToPos3 => roller_to("ROLLER POS3"),
            RollerToPos4 => roller_to("ROLLER POS4"),
            RollerToPos5 => roller_to("ROLLER POS5"),
            RollerToPos6 => roller_to("ROLLER POS6"),
            TrackOpen => CommandDescriptor::polled(H001, "TRACK OPEN", TRACK_BIT, None),
            TrackClose => CommandDescriptor::polled(H001, "TRACK CLOSE", TRACK_BIT, None),
            PickerInputs => CommandDescriptor::simple(H001, "INPUTS"),
            Version001 => CommandDescriptor::simple(H001, "VERSION"),

            VendDoorRent => CommandDescriptor::polled(H002, "VEND RENT", VEND_DOOR_BIT, None),
            VendDoorClose => CommandDescriptor::polled(H002, "VEND CLOSE", VEND_DOOR_BIT, None),
            UnknownVendDoorClose => CommandDescriptor::simple(H002, "VEND UNKNOWN"),
            VendDoorKill => CommandDescriptor::simple(H002, "VEND KILL"),
            QlmEngage => CommandDescriptor::polled(H002, "QLM ENGAGE", QLM_BIT, Some("QLM HALT")),
            QlmDisengage => {
                CommandDescriptor::polled(H002, "QLM DISENGAGE", QLM_BIT, Some("QLM HALT"))
            }
            QlmLift => CommandDescriptor::simple(H002, "QLM LIFT"),
            QlmDrop => CommandDescriptor::simple(H002, "QLM DROP"),
            QlmHalt => CommandDescriptor::simple(H002, "QLM HALT"),
            QlmLockDoor => CommandDescriptor::simple(H002, "QLM LOCK"),
            QlmUnlockDoor => CommandDescriptor::simple(H002, "QLM UNLOCK"),
            AuxInputs => CommandDescriptor::simple(H002, "INPUTS"),
            Version002 => CommandDescriptor::simple(H002, "VERSION"),
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn roller_to(command: &'static str) -> CommandDescriptor {
    CommandDescriptor::polled(AddressSelector::H001, command, ROLLER_BIT, Some("ROLLER STOP"))
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_descriptor_table() {
        let extend = CommandType::GripperExtend.descriptor();
        assert_eq!(extend.address, AddressSelector::H001);
        assert_eq!(extend.status_bit, Some(1));
        assert_eq!(extend.reset, Some("ARM HALT"));

        let door = CommandType::VendDoorClose.descriptor();
        assert_eq!(door.address, AddressSelector::H002);
        assert_eq!(door.status_bit, Some(4));
        assert!(door.reset.is_none());

        let light = CommandType::RingLightOn.descriptor();
        assert_eq!(light.address, AddressSelector::H101);
        assert!(light.status_bit.is_none());
        assert_eq!(light.wait_pause_ms, 0);

        // Same literal, different boards
        assert_eq!(CommandType::PickerInputs.descriptor().command, "INPUTS");
        assert_eq!(
            CommandType::AuxInputs.descriptor().address,
            AddressSelector::H002
        );
    }
}
