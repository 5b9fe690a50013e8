//! # HAL library.
//!
//! The hardware control core of the kiosk: the command protocol of the I/O control boards, the
//! Arcus motion controller protocol, and the picker procedures built on top of them.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Closed set of result codes shared by every layer
pub mod error;

/// Clock and wait abstraction, real and simulated
pub mod runtime;

/// Parameters of the HAL
pub mod params;

/// Core command protocol - addressed, polled commands to the I/O boards
pub mod core_cmd;

/// Picker and aux board input decoding
pub mod sensors;

/// Persistent named counters
pub mod counters;

/// Slot inventory
pub mod inventory;

/// Deck geometry
pub mod decks;

/// Control system - the actuators and sensors of the I/O boards
pub mod control_system;

/// Motion - the Arcus controller protocol and the motion service
pub mod motion;

/// Picker procedures
pub mod ops;

/// Controller service - move veto and job facing facade
pub mod controller;

/// Assembly of the component graph
pub mod hal;

/// Simulated boards and motion controller
pub mod sim;
