//! # Sensors
//!
//! Decoding of the I/O boards' input reads into named sensor states.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod inputs;
mod picker;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use inputs::*;
pub use picker::*;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of inputs reported by every inputs read.
pub const INPUT_COUNT: usize = 20;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A named bank of inputs on one board.
pub trait InputBank: Copy + std::fmt::Debug + 'static {
    /// Heading used when the bank is logged.
    const LOG_HEADER: &'static str;

    /// Position of this input in the decoded response.
    fn index(&self) -> usize;

    /// Every named input of the bank.
    fn all() -> &'static [Self];
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputState {
    Inactive,
    Active,
}

/// Picker board inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PickerInput {
    Sensor1,
    Sensor2,
    Sensor3,
    Sensor4,
    Sensor5,
    Sensor6,
    Extend,
    Retract,
    FingerRent,
}

/// Auxiliary board inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuxInput {
    VendDoorClosed,
    VendDoorRent,
    QlmPresence,
    QlmUp,
    QlmDown,
    QlmBayDoor,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PickerInput {
    /// The six disk presence sensors, front of the picker to the rear.
    pub const SENSORS: [PickerInput; 6] = [
        PickerInput::Sensor1,
        PickerInput::Sensor2,
        PickerInput::Sensor3,
        PickerInput::Sensor4,
        PickerInput::Sensor5,
        PickerInput::Sensor6,
    ];
}

impl InputBank for PickerInput {
    const LOG_HEADER: &'static str = "Picker Inputs";

    fn index(&self) -> usize {
        *self as usize
    }

    fn all() -> &'static [Self] {
        &[
            PickerInput::Sensor1,
            PickerInput::Sensor2,
            PickerInput::Sensor3,
            PickerInput::Sensor4,
            PickerInput::Sensor5,
            PickerInput::Sensor6,
            PickerInput::Extend,
            PickerInput::Retract,
            PickerInput::FingerRent,
        ]
    }
}

impl InputBank for AuxInput {
    const LOG_HEADER: &'static str = "AUX Inputs";

    fn index(&self) -> usize {
        *self as usize
    }

    fn all() -> &'static [Self] {
        &[
            AuxInput::VendDoorClosed,
            AuxInput::VendDoorRent,
            AuxInput::QlmPresence,
            AuxInput::QlmUp,
            AuxInput::QlmDown,
            AuxInput::QlmBayDoor,
        ]
    }
}
