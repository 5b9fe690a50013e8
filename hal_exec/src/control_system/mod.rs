//! # Control system
//!
//! Command level interface to the kiosk's I/O boards. [`CoreBoard`] selects the command for each
//! capability and adds the per-command recovery (retries, vend door backoff, extend sensor check).
//! [`ControlSystem`] sits above it and keeps the cached door and track states, counts failures in
//! the persistent counters, and notifies observers of the system lifecycle.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod board;
mod system;
mod version;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use board::*;
pub use system::*;
pub use version::*;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ErrorCode;
use crate::motion::Axis;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Receives control system lifecycle events.
pub trait ControlSystemObserver: Send + Sync {
    fn on_system_initialize(&self, status: ErrorCode);

    fn on_system_shutdown(&self);
}

/// Something able to home a motion axis. QLM lifter operations need the X axis homed first.
pub trait AxisHomer {
    fn home_axis(&self, axis: Axis) -> ErrorCode;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The logical boards behind the I/O channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlBoard {
    Serial,
    Picker,
    Aux,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioChannelState {
    On,
    Off,
}

/// Position of the gripper finger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GripperFingerState {
    Closed,
    Open,

    /// Partially open, the position used to hold a disk lightly.
    Rent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollerState {
    /// Not a valid request, asking for it is a programming fault.
    None,
    In,
    Out,
    Stop,
}

/// Picker sensor the roller drives a disk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollerPosition {
    Position1,
    Position2,
    Position3,
    Position4,
    Position5,
    Position6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackState {
    Unknown,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VendDoorState {
    Unknown,
    Rent,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QlmStatus {
    AuxNotResponsive,
    Empty,
    Disengaged,
    Engaged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QlmOperation {
    /// Not a valid request, asking for it is a programming fault.
    None,
    Engage,
    Disengage,
    Lift,
    Drop,
    Halt,
    LockDoor,
    UnlockDoor,
}

/// How to centre a disk in the picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CenterDiskMethod {
    None,

    /// Roll towards the drum, then back to sensor 5.
    DrumAndBack,

    /// Roll to the rear sensor, then forward to sensor 3.
    DrumAndFront,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RollerPosition {
    /// The timeout code reported when the roller does not reach this position.
    pub fn timeout_code(&self) -> ErrorCode {
        match self {
            RollerPosition::Position1 => ErrorCode::RollerToPos1Timeout,
            RollerPosition::Position2 => ErrorCode::RollerToPos2Timeout,
            RollerPosition::Position3 => ErrorCode::RollerToPos3Timeout,
            RollerPosition::Position4 => ErrorCode::RollerToPos4Timeout,
            RollerPosition::Position5 => ErrorCode::RollerToPos5Timeout,
            RollerPosition::Position6 => ErrorCode::RollerToPos6Timeout,
        }
    }
}

impl fmt::Display for GripperFingerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for RollerPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for QlmOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format!("{:?}", self).to_ascii_uppercase())
    }
}
