//! # Peek
//!
//! Test whether the slot in front of the picker holds a disk by reaching into it with closed
//! fingers. An arm which cannot complete its extension ran into a disk.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{error, info};

// Internal
use super::{OpContext, Operation, PeekResult};
use crate::control_system::GripperFingerState;
use crate::error::ErrorCode;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct PeekOperation<'a> {
    ctx: &'a OpContext,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'a> PeekOperation<'a> {
    pub fn new(ctx: &'a OpContext) -> Self {
        Self { ctx }
    }

    fn on_peek(&self) -> PeekResult {
        let ctx = self.ctx;
        let control = &ctx.control;

        let current = ctx.motion.current_location();
        let mut result = PeekResult {
            location: current
                .as_ref()
                .and_then(|loc| ctx.inventory.get(loc.deck, loc.slot)),
            is_full: false,
            error: ErrorCode::Success,
        };

        let current = match current {
            Some(loc) => loc,
            None => {
                result.error = ErrorCode::LocationOutOfRange;
                return result;
            }
        };

        if current.is_wide {
            let settled = ctx.settle_disk_in_slot();
            if !settled.is_success() {
                result.error = settled;
                return result;
            }
        }

        if !control.set_finger(GripperFingerState::Closed).success() {
            result.error = ErrorCode::GripperCloseTimeout;
            return result;
        }

        let response = control.extend_arm(ctx.params.timing.test_extend_time_ms);
        if response.comm_error() {
            result.error = ErrorCode::CommunicationError;
            return result;
        }

        result.is_full = response.timed_out();
        control.retract_arm();
        control.set_finger(GripperFingerState::Rent);
        result
    }
}

impl Operation for PeekOperation<'_> {
    type Output = PeekResult;

    fn execute(&mut self) -> PeekResult {
        let result = self.on_peek();
        let location = self.ctx.motion.printable_location();

        if !result.test_ok() {
            error!("Peek {} returned error status {}", location, result.error);
        } else {
            info!(
                "Peek {} returned status {}",
                location,
                if result.is_full { "FULL" } else { "EMPTY" }
            );
        }
        result
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
