//! # Motion
//!
//! Control of the picker's X and Y axes. [`ArcusController`] speaks the Arcus stepper controller's
//! text protocol. [`MotionControlService`] sits above it: it tracks which axes are homed, runs the
//! registered move vetoes before anything moves, resolves deck and slot targets and owns the
//! reset-and-retry policy for an unresponsive controller.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod arcus;
mod decoder;
mod door;
mod error_log;
mod gear;
mod service;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use arcus::*;
pub use decoder::*;
pub use door::*;
pub use error_log::*;
pub use gear::*;
pub use service::*;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::ErrorCode;
use crate::params::HalParams;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A stepper motion controller.
pub trait MotionController: Send {
    /// Open the controller and send its initialisation commands.
    fn on_startup(&mut self) -> bool;

    fn on_shutdown(&mut self) -> bool;

    fn read_limits(&mut self) -> LimitResponse;

    fn communication_ok(&mut self) -> bool;

    fn read_positions(&mut self) -> ControllerPosition;

    fn move_to_target(&mut self, target: &MoveTarget) -> ErrorCode;

    /// Move the picker to the vend door.
    fn move_to_vend(&mut self, mode: MoveMode) -> ErrorCode;

    fn home_axis(&mut self, axis: Axis) -> ErrorCode;

    /// Shut down and reset the controller's device driver.
    fn on_reset_device_driver(&mut self) -> bool;

    /// Recompute everything derived from the parameters.
    fn reconfigure(&mut self, params: Arc<HalParams>);
}

/// A condition which can forbid any motion.
pub trait MoveVeto: Send + Sync {
    fn can_move(&self) -> ErrorCode;
}

/// Resets the device driver of the motion controller.
pub trait DeviceResetter: Send {
    fn reset_driver(&self) -> bool;
}

/// Run before the axes are homed.
pub trait PreHomeAction: Send + Sync {
    fn before_home(&self);
}

/// The job context hardware corrections are reported to.
pub trait ExecutionContext: Send + Sync {
    fn hardware_correction_start(&self, event: &HardwareCorrectionEvent);

    fn hardware_correction_end(&self, event: &HardwareCorrectionEvent);

    fn insert_correction_stat(&self, statistic: HardwareCorrectionStatistic, ok: bool);
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    XY,
}

/// What the picker is about to do at the target, which decides how it approaches the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveMode {
    None,
    Get,
    Put,
}

/// An absolute move of one or both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MoveTarget {
    X(i32),
    Y(i32),
    XY { x: i32, y: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HardwareCorrectionStatistic {
    Arcus,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Adjustments applied to a slot target.
///
/// Units: steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetMoveData {
    pub x_offset: Option<i32>,
    pub y_offset: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HardwareCorrectionEvent {
    pub statistic: HardwareCorrectionStatistic,
    pub correction_ok: bool,
}

/// Execution context which only logs corrections.
#[derive(Debug, Default)]
pub struct LogExecutionContext;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MoveTarget {
    /// Build a target from an axis and optional coordinates. Returns `None` if a coordinate the
    /// axis needs is missing.
    pub fn from_parts(axis: Axis, x: Option<i32>, y: Option<i32>) -> Option<Self> {
        match (axis, x, y) {
            (Axis::X, Some(x), _) => Some(MoveTarget::X(x)),
            (Axis::Y, _, Some(y)) => Some(MoveTarget::Y(y)),
            (Axis::XY, Some(x), Some(y)) => Some(MoveTarget::XY { x, y }),
            _ => None,
        }
    }

    pub fn axis(&self) -> Axis {
        match self {
            MoveTarget::X(_) => Axis::X,
            MoveTarget::Y(_) => Axis::Y,
            MoveTarget::XY { .. } => Axis::XY,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl HardwareCorrectionEvent {
    pub fn new(statistic: HardwareCorrectionStatistic) -> Self {
        Self {
            statistic,
            correction_ok: false,
        }
    }
}

impl ExecutionContext for LogExecutionContext {
    fn hardware_correction_start(&self, event: &HardwareCorrectionEvent) {
        info!("Hardware correction {:?} started", event.statistic);
    }

    fn hardware_correction_end(&self, event: &HardwareCorrectionEvent) {
        info!(
            "Hardware correction {:?} ended, ok = {}",
            event.statistic, event.correction_ok
        );
    }

    fn insert_correction_stat(&self, _statistic: HardwareCorrectionStatistic, _ok: bool) {}
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_target_from_parts() {
        assert_eq!(MoveTarget::from_parts(Axis::X, Some(-200), None), Some(MoveTarget::X(-200)));
        assert_eq!(
            MoveTarget::from_parts(Axis::XY, Some(1), Some(2)),
            Some(MoveTarget::XY { x: 1, y: 2 })
        );
        assert!(MoveTarget::from_parts(Axis::XY, Some(1), None).is_none());
        assert!(MoveTarget::from_parts(Axis::Y, Some(1), None).is_none());
        assert_eq!(MoveTarget::Y(5).axis(), Axis::Y);
    }
}
