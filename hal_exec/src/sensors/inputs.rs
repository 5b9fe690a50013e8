//! # Inputs read result
//!
//! An inputs read answers with one character per input, `1` for active and `0` for inactive. In
//! strict mode the reply must have the board's exact layout:
//!
//! ```text
//! 0123456789012345 6789R
//! 1100000000000000 0000R OK
//! ```
//!
//! with whitespace at offset 16 and the `R` terminator at offset 21. In lenient mode every digit
//! of the reply is taken as an input. Either way exactly [`INPUT_COUNT`] inputs must be decoded,
//! otherwise the whole read is rejected.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{error, log, Level};
use std::marker::PhantomData;

use super::{InputBank, InputState, INPUT_COUNT};
use crate::core_cmd::CoreResponse;
use crate::error::ErrorCode;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Offset of the `R` terminator in a strict reply.
const TERMINATOR_OFFSET: usize = 21;

/// Offset of the separating whitespace in a strict reply.
const SEPARATOR_OFFSET: usize = 16;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Decoded inputs of one board.
#[derive(Debug, Clone)]
pub struct ReadInputsResult<T: InputBank> {
    error: ErrorCode,
    inputs: Option<[InputState; INPUT_COUNT]>,
    response: CoreResponse,
    decode_error: Option<InputDecodeError>,
    _bank: PhantomData<T>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Why an inputs reply could not be decoded.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDecodeError {
    #[error("The response does not have the inputs layout")]
    BogusResponse,

    #[error("The response holds more than {} inputs", INPUT_COUNT)]
    ParseError,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T: InputBank> ReadInputsResult<T> {
    /// Decode the reply of an inputs command.
    pub fn from_response(response: CoreResponse, validated: bool) -> Self {
        let mut result = Self {
            error: ErrorCode::Success,
            inputs: None,
            response,
            decode_error: None,
            _bank: PhantomData,
        };

        if !result.response.success() {
            result.error = ErrorCode::CommunicationError;
            return result;
        }

        let decoded = if validated {
            decode_validated(result.response.opcode())
        } else {
            decode_lenient(result.response.opcode())
        };

        match decoded {
            Ok(inputs) => result.inputs = Some(inputs),
            Err(e) => {
                match e {
                    InputDecodeError::BogusResponse => error!(
                        "[ReadInputs] Unexpected response from port {}",
                        result.response.opcode()
                    ),
                    InputDecodeError::ParseError => error!(
                        "[ReadInputs] Unable to parse response '{}'",
                        result.response.opcode()
                    ),
                }
                result.error = ErrorCode::CommunicationError;
                result.decode_error = Some(e);
            }
        }

        result
    }

    pub fn error(&self) -> ErrorCode {
        self.error
    }

    pub fn success(&self) -> bool {
        self.error.is_success()
    }

    /// Why decoding failed, when the exchange itself succeeded.
    pub fn decode_error(&self) -> Option<InputDecodeError> {
        self.decode_error
    }

    /// The exchange this result was decoded from.
    pub fn response(&self) -> &CoreResponse {
        &self.response
    }

    /// State of an input, `None` if the read failed.
    pub fn state(&self, input: T) -> Option<InputState> {
        self.inputs.as_ref().map(|i| i[input.index()])
    }

    /// Whether the input is in `state`. A failed read has no input in any state.
    pub fn is_in_state(&self, input: T, state: InputState) -> bool {
        self.state(input) == Some(state)
    }

    pub fn is_input_active(&self, input: T) -> bool {
        self.is_in_state(input, InputState::Active)
    }

    /// Log the raw inputs, or the failure diagnostic.
    pub fn log(&self, level: Level) {
        if self.success() {
            log!(level, "{} {}", T::LOG_HEADER, self.response.opcode());
        } else {
            log!(
                level,
                "{} read failed: {}",
                T::LOG_HEADER,
                self.response.to_string()
            );
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Decode a reply which must have the strict inputs layout.
pub fn decode_validated(opcode: &str) -> Result<[InputState; INPUT_COUNT], InputDecodeError> {
    let bytes = opcode.as_bytes();

    if opcode.find('R') != Some(TERMINATOR_OFFSET)
        || !bytes[SEPARATOR_OFFSET].is_ascii_whitespace()
    {
        return Err(InputDecodeError::BogusResponse);
    }

    collect(bytes[..TERMINATOR_OFFSET].iter().filter(|b| **b == b'0' || **b == b'1'))
}

/// Decode every digit of a reply as an input.
pub fn decode_lenient(opcode: &str) -> Result<[InputState; INPUT_COUNT], InputDecodeError> {
    collect(opcode.as_bytes().iter().filter(|b| b.is_ascii_digit()))
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn collect<'a, I>(digits: I) -> Result<[InputState; INPUT_COUNT], InputDecodeError>
where
    I: Iterator<Item = &'a u8>,
{
    let mut inputs = [InputState::Inactive; INPUT_COUNT];
    let mut count = 0;

    for d in digits {
        if count >= INPUT_COUNT {
            return Err(InputDecodeError::ParseError);
        }
        if *d == b'1' {
            inputs[count] = InputState::Active;
        }
        count += 1;
    }

    if count == INPUT_COUNT {
        Ok(inputs)
    } else {
        Err(InputDecodeError::BogusResponse)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::sensors::{AuxInput, PickerInput};
    use comms_if::AddressSelector;

    fn response(text: &str) -> CoreResponse {
        let mut r = CoreResponse::new(AddressSelector::H001);
        r.set_opcode(text);
        r
    }

    #[test]
    fn test_strict_layout() {
        let r: ReadInputsResult<PickerInput> =
            ReadInputsResult::from_response(response("0100100100000000 0000R OK"), true);
        assert!(r.success());
        assert!(!r.is_input_active(PickerInput::Sensor1));
        assert!(r.is_input_active(PickerInput::Sensor2));
        assert!(r.is_input_active(PickerInput::Sensor5));
        assert!(r.is_input_active(PickerInput::Retract));
        assert!(r.is_in_state(PickerInput::Extend, InputState::Inactive));
    }

    #[test]
    fn test_strict_rejects_bad_layout() {
        // Separator missing
        let r: ReadInputsResult<PickerInput> =
            ReadInputsResult::from_response(response("01001001000000000000R OK"), true);
        assert_eq!(r.error(), ErrorCode::CommunicationError);
        assert_eq!(r.decode_error(), Some(InputDecodeError::BogusResponse));
        assert!(!r.is_input_active(PickerInput::Sensor2));
        assert!(!r.is_in_state(PickerInput::Sensor1, InputState::Inactive));

        // Non-digit in place of an input
        let r: ReadInputsResult<PickerInput> =
            ReadInputsResult::from_response(response("010010010000000X 0000R OK"), true);
        assert_eq!(r.decode_error(), Some(InputDecodeError::BogusResponse));
    }

    #[test]
    fn test_lenient_counts_digits() {
        let r: ReadInputsResult<AuxInput> =
            ReadInputsResult::from_response(response("10001 000000000000000 OK"), false);
        assert!(r.success());
        assert!(r.is_input_active(AuxInput::VendDoorClosed));
        assert!(r.is_input_active(AuxInput::QlmDown));

        let r: ReadInputsResult<AuxInput> =
            ReadInputsResult::from_response(response("1000"), false);
        assert_eq!(r.decode_error(), Some(InputDecodeError::BogusResponse));

        let r: ReadInputsResult<AuxInput> =
            ReadInputsResult::from_response(response("1000000000000000000000"), false);
        assert_eq!(r.decode_error(), Some(InputDecodeError::ParseError));
    }

    #[test]
    fn test_failed_exchange() {
        let mut resp = CoreResponse::new(AddressSelector::H002);
        resp.set_error(ErrorCode::CommunicationError);
        let r: ReadInputsResult<AuxInput> = ReadInputsResult::from_response(resp, true);
        assert!(!r.success());
        assert!(r.decode_error().is_none());
        assert_eq!(r.state(AuxInput::QlmUp), None);
    }
}
