//! # Communications interface crate.
//!
//! Provides the request/response command channels used to talk to the kiosk's control boards and
//! to the stepper motion controller.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Channel abstraction, board addressing and response validation
pub mod channel;

/// Serial port backed channel
pub mod serial;

/// Scripted in-memory channel for exercising the protocol layers without hardware
pub mod sim;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use channel::*;
