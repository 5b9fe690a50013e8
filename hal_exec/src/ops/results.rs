//! # Operation results

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use std::fmt;

// Internal
use crate::error::ErrorCode;
use crate::inventory::Location;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Outcome of a get, with what the slot held before it.
#[derive(Debug, Clone, Serialize)]
pub struct GetResult {
    /// The slot the get was made from, `None` if the picker was at no known slot.
    pub location: Option<Location>,

    /// Identifier the slot held before the get.
    pub previous: String,

    pub flags: u32,
    pub return_time: Option<DateTime<Utc>>,
    pub hardware_error: ErrorCode,
}

/// Outcome of a put.
#[derive(Debug, Clone, Serialize)]
pub struct PutResult {
    pub code: ErrorCode,
    pub is_duplicate: bool,
    pub put_location: Location,

    /// Identifier the put was asked to store.
    pub original_id: String,

    /// Identifier actually written to the slot.
    pub stored_id: String,

    /// Where the identifier was already stored, for a duplicate.
    pub original_id_location: Option<Location>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub returned_to_source: bool,
    pub transfer_error: ErrorCode,
    pub source: Option<Location>,
    pub destination: Option<Location>,
}

/// Outcome of presenting the picker's disk at the vend door.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VendResult {
    /// `PickerEmpty` once the customer took the disk, `PickerFull` if it is still in the picker,
    /// otherwise the failure.
    pub status: ErrorCode,

    /// Whether the disk reached the door at all.
    pub presented: bool,
}

/// Outcome of testing whether a slot holds a disk.
#[derive(Debug, Clone, Serialize)]
pub struct PeekResult {
    pub location: Option<Location>,
    pub is_full: bool,
    pub error: ErrorCode,
}

/// A move to a slot followed by a get.
#[derive(Debug, Clone, Serialize)]
pub struct GetFromResult {
    pub move_result: ErrorCode,

    /// `None` when the move failed.
    pub get_result: Option<GetResult>,
}

/// A move to a slot followed by a put.
#[derive(Debug, Clone, Serialize)]
pub struct PutToResult {
    pub move_result: ErrorCode,

    /// `None` when the move failed.
    pub put_result: Option<PutResult>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GetResult {
    pub fn new(location: &Location) -> Self {
        let result = Self {
            location: Some(location.clone()),
            previous: location.id.clone(),
            flags: location.flags,
            return_time: location.return_date,
            hardware_error: ErrorCode::Success,
        };
        debug!(
            "[GET Result] Loc = {} Prev = {} Flags = {} r/t = {:?}",
            location, result.previous, result.flags, result.return_time
        );
        result
    }

    /// A get which could not start because the picker is at no known slot.
    pub fn no_location() -> Self {
        Self {
            location: None,
            previous: String::new(),
            flags: 0,
            return_time: None,
            hardware_error: ErrorCode::LocationOutOfRange,
        }
    }

    pub fn update(&mut self, error: ErrorCode) {
        self.hardware_error = error;
    }

    pub fn success(&self) -> bool {
        self.hardware_error.is_success()
    }

    pub fn is_slot_empty(&self) -> bool {
        self.hardware_error == ErrorCode::SlotEmpty
    }

    pub fn item_stuck(&self) -> bool {
        self.hardware_error == ErrorCode::ItemStuck
    }

    pub fn empty_or_stuck(&self) -> bool {
        self.is_slot_empty() || self.item_stuck()
    }
}

impl fmt::Display for GetResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.hardware_error, f)
    }
}

impl PutResult {
    pub fn new(id: &str, location: &Location) -> Self {
        Self {
            code: ErrorCode::Success,
            is_duplicate: false,
            put_location: location.clone(),
            original_id: id.to_string(),
            stored_id: id.to_string(),
            original_id_location: None,
        }
    }

    pub fn with_code(id: &str, location: &Location, code: ErrorCode) -> Self {
        let mut result = Self::new(id, location);
        result.code = code;
        result
    }

    /// A put which could not start because the picker is at no known slot. The put location is
    /// deck 0 slot 0, which no deck has.
    pub fn no_location(id: &str) -> Self {
        Self::with_code(id, &Location::new(0, 0), ErrorCode::LocationOutOfRange)
    }

    pub fn success(&self) -> bool {
        self.code.is_success()
    }

    pub fn is_slot_in_use(&self) -> bool {
        self.code == ErrorCode::SlotInUse
    }

    pub fn picker_empty(&self) -> bool {
        self.code == ErrorCode::PickerEmpty
    }

    pub fn picker_obstructed(&self) -> bool {
        self.code == ErrorCode::PickerObstructed
    }
}

impl fmt::Display for PutResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.code, f)
    }
}

impl TransferResult {
    pub fn new() -> Self {
        Self {
            returned_to_source: false,
            transfer_error: ErrorCode::Success,
            source: None,
            destination: None,
        }
    }

    /// Whether the disk ended up at one of the destinations.
    pub fn transferred(&self) -> bool {
        self.transfer_error.is_success() && self.destination.is_some()
    }
}

impl Default for TransferResult {
    fn default() -> Self {
        Self::new()
    }
}

impl PeekResult {
    /// Whether the test itself ran, whatever it found.
    pub fn test_ok(&self) -> bool {
        self.error.is_success()
    }
}

impl GetFromResult {
    pub fn success(&self) -> bool {
        self.move_result.is_success() && self.get_result.as_ref().map_or(false, |g| g.success())
    }
}

impl PutToResult {
    pub fn success(&self) -> bool {
        self.move_result.is_success() && self.put_result.as_ref().map_or(false, |p| p.success())
    }
}
