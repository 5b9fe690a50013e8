//! # Board versions

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;
use std::fmt;

use super::ControlBoard;
use crate::core_cmd::CoreResponse;
use crate::error::ErrorCode;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Revision of the FME control board set.
const FME_REVISION: &str = "A";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Firmware version reported by one board.
#[derive(Debug, Clone, Serialize)]
pub struct BoardVersionResponse {
    pub read_success: bool,
    pub version: String,
    pub board_name: String,
}

/// Versions of every board of the control system.
#[derive(Debug, Clone, Serialize)]
pub struct ControlSystemRevision {
    /// `true` only if every board answered.
    pub success: bool,
    pub responses: Vec<BoardVersionResponse>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BoardVersionResponse {
    pub fn new(board: ControlBoard, response: &CoreResponse) -> Self {
        let read_success = response.success();
        Self {
            read_success,
            version: if read_success {
                response.opcode().trim().to_string()
            } else {
                String::new()
            },
            board_name: format!("{:?}", board),
        }
    }
}

impl fmt::Display for BoardVersionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.read_success {
            f.write_str(&self.version)
        } else {
            write!(f, "{}", ErrorCode::Timeout)
        }
    }
}

impl ControlSystemRevision {
    pub fn new(responses: Vec<BoardVersionResponse>) -> Self {
        Self {
            success: responses.iter().all(|r| r.read_success),
            responses,
        }
    }

    pub fn revision(&self) -> &'static str {
        FME_REVISION
    }
}
