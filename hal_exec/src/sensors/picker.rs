//! # Picker sensor read result
//!
//! View of a picker inputs read restricted to the six disk presence sensors. A failed read is
//! pessimistic: every sensor reads as blocked, so callers that only look at sensor states never
//! mistake a failed read for an empty picker.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{error, log, Level};

use super::{InputState, PickerInput, ReadInputsResult};
use crate::error::ErrorCode;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Sensors in the middle of the picker, which only see a disk that is inside it.
const CENTRE_SENSORS: [PickerInput; 4] = [
    PickerInput::Sensor2,
    PickerInput::Sensor3,
    PickerInput::Sensor4,
    PickerInput::Sensor5,
];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PickerSensorReadResult {
    error: ErrorCode,
    read: Option<ReadInputsResult<PickerInput>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PickerSensorReadResult {
    /// Wrap a picker inputs read.
    pub fn from_read(read: ReadInputsResult<PickerInput>) -> Self {
        let result = Self {
            error: read.error(),
            read: Some(read),
        };
        result.on_error();
        result
    }

    /// A result for a read that could not be attempted.
    pub fn failed(error: ErrorCode) -> Self {
        let result = Self { error, read: None };
        result.on_error();
        result
    }

    pub fn error(&self) -> ErrorCode {
        self.error
    }

    pub fn success(&self) -> bool {
        self.error.is_success()
    }

    /// Whether the input is active. Always `true` for a failed read.
    pub fn is_input_active(&self, input: PickerInput) -> bool {
        match &self.read {
            Some(r) if self.success() => r.is_input_active(input),
            _ => true,
        }
    }

    /// Whether the input is in `state`. Always `false` for a failed read.
    pub fn is_in_state(&self, input: PickerInput, state: InputState) -> bool {
        match &self.read {
            Some(r) if self.success() => r.is_in_state(input, state),
            _ => false,
        }
    }

    /// Number of blocked presence sensors, 1 to 6.
    pub fn presence_count(&self) -> usize {
        PickerInput::SENSORS
            .iter()
            .filter(|s| self.is_input_active(**s))
            .count()
    }

    /// Number of blocked centre sensors, 2 to 5.
    pub fn blocked_count(&self) -> usize {
        CENTRE_SENSORS
            .iter()
            .filter(|s| self.is_input_active(**s))
            .count()
    }

    /// Whether any presence sensor is blocked.
    pub fn is_full(&self) -> bool {
        self.presence_count() > 0
    }

    /// Log the state of each presence sensor.
    pub fn log(&self, level: Level) {
        if !self.success() {
            self.on_error();
            return;
        }

        let states: String = PickerInput::SENSORS
            .iter()
            .enumerate()
            .map(|(i, s)| {
                format!(
                    "{} = {};",
                    i + 1,
                    if self.is_input_active(*s) {
                        "BLOCKED"
                    } else {
                        "CLEAR"
                    }
                )
            })
            .collect();

        log!(level, "PickerSensors: {}", states);
    }

    fn on_error(&self) {
        if !self.success() {
            error!("Read Picker sensors failed with error {}", self.error);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::core_cmd::CoreResponse;
    use comms_if::AddressSelector;

    fn read(text: &str) -> PickerSensorReadResult {
        let mut r = CoreResponse::new(AddressSelector::H001);
        r.set_opcode(text);
        PickerSensorReadResult::from_read(ReadInputsResult::from_response(r, true))
    }

    #[test]
    fn test_sensors_2_and_5_both_block() {
        // Both ends of the centre run count as blocked
        let r = read("0100100000000000 0000R OK");
        assert!(r.success());
        assert!(r.is_input_active(PickerInput::Sensor2));
        assert!(r.is_input_active(PickerInput::Sensor5));
        assert!(!r.is_input_active(PickerInput::Sensor3));
        assert_eq!(r.blocked_count(), 2);
        assert_eq!(r.presence_count(), 2);
        assert!(r.is_full());

        // Sensor 5 alone
        let r = read("0000100000000000 0000R OK");
        assert_eq!(r.blocked_count(), 1);
    }

    #[test]
    fn test_counts() {
        // Edge sensors only
        let r = read("1000010000000000 0000R OK");
        assert_eq!(r.blocked_count(), 0);
        assert_eq!(r.presence_count(), 2);
        assert!(r.is_full());

        let r = read("0000000000000000 0000R OK");
        assert!(!r.is_full());
        assert!(r.is_in_state(PickerInput::Sensor3, InputState::Inactive));
    }

    #[test]
    fn test_failed_read_is_pessimistic() {
        let r = read("garbage OK");
        assert!(!r.success());
        assert!(r.is_full());
        assert!(r.is_input_active(PickerInput::Sensor1));
        assert!(!r.is_in_state(PickerInput::Sensor1, InputState::Inactive));
        assert_eq!(r.presence_count(), 6);

        let r = PickerSensorReadResult::failed(ErrorCode::TrackCloseTimeout);
        assert_eq!(r.error(), ErrorCode::TrackCloseTimeout);
        assert_eq!(r.blocked_count(), 4);
    }
}
