//! # Core response

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::AddressSelector;
use log::info;
use std::fmt;

use crate::error::ErrorCode;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Outcome of one core command exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreResponse {
    selector: AddressSelector,
    error: ErrorCode,
    opcode: String,

    /// Human readable explanation of a communication failure.
    pub diagnostic: Option<String>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CoreResponse {
    /// A successful, empty, response from the given board.
    pub fn new(selector: AddressSelector) -> Self {
        Self {
            selector,
            error: ErrorCode::Success,
            opcode: String::new(),
            diagnostic: None,
        }
    }

    /// A response carrying only an error, not produced by an exchange.
    pub fn with_error(error: ErrorCode) -> Self {
        let mut r = Self::new(AddressSelector::H101);
        r.set_error(error);
        r
    }

    pub fn selector(&self) -> AddressSelector {
        self.selector
    }

    pub fn error(&self) -> ErrorCode {
        self.error
    }

    /// Set the outcome. A communication error discards the opcode text.
    pub fn set_error(&mut self, error: ErrorCode) {
        self.error = error;
        if error == ErrorCode::CommunicationError {
            self.opcode.clear();
        }
    }

    /// Opcode text of the reply, without leading or trailing line breaks.
    pub fn opcode(&self) -> &str {
        &self.opcode
    }

    pub fn set_opcode(&mut self, raw: &str) {
        self.opcode = raw.trim_matches(|c| c == '\r' || c == '\n').to_string();
    }

    pub fn success(&self) -> bool {
        self.error == ErrorCode::Success
    }

    pub fn timed_out(&self) -> bool {
        self.error == ErrorCode::Timeout
    }

    pub fn comm_error(&self) -> bool {
        self.error == ErrorCode::CommunicationError
    }

    /// Whether the character at `bit` of the opcode is `'1'`.
    ///
    /// Failed responses have no bits set.
    pub fn is_bit_set(&self, bit: usize) -> bool {
        if !self.success() {
            return false;
        }

        match self.opcode.as_bytes().get(bit) {
            Some(c) => *c == b'1',
            None => {
                info!(
                    "IsBitSet: opcode response is {}; this is insufficient for bit test.",
                    self.opcode
                );
                false
            }
        }
    }
}

impl fmt::Display for CoreResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.diagnostic, self.comm_error()) {
            (Some(d), true) => f.write_str(d),
            _ => write!(f, "{}", self.error),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_comm_error_clears_opcode() {
        let mut r = CoreResponse::new(AddressSelector::H001);
        r.set_opcode("\r\n0100 OK\r\n");
        assert_eq!(r.opcode(), "0100 OK");
        assert!(r.is_bit_set(1));
        assert!(!r.is_bit_set(0));

        r.set_error(ErrorCode::CommunicationError);
        assert_eq!(r.opcode(), "");
        assert!(!r.is_bit_set(1));

        r.diagnostic = Some("PCB is not responsive.".into());
        assert_eq!(r.to_string(), "PCB is not responsive.");
    }

    #[test]
    fn test_bit_test_bounds() {
        let mut r = CoreResponse::new(AddressSelector::H002);
        r.set_opcode("01");
        assert!(r.is_bit_set(1));
        assert!(!r.is_bit_set(5));

        r.set_error(ErrorCode::Timeout);
        assert!(!r.is_bit_set(1));
        assert_eq!(r.to_string(), "TIMEOUT");
    }
}
