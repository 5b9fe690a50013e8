//! # Motion controller replies
//!
//! Decoders for the motor status, position and limit replies of the motion controller.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;

use super::Axis;
use crate::error::ErrorCode;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Status code recorded for a reply which is not a number.
const UNPARSABLE_STATUS: i32 = 999;

const STATUS_STOPPED: i32 = 0;
const STATUS_UPPER_LIMIT: i32 = 8;
const STATUS_LOWER_LIMIT: i32 = 16;

/// Number of comma separated fields in a status dump.
const LIMIT_FIELD_COUNT: usize = 28;

/// Field of the status dump holding the limit bits.
const LIMIT_FIELD: usize = 13;

const UPPER_LIMIT_BIT: i32 = 16;
const LOWER_LIMIT_BIT: i32 = 32;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// How a motor status should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOperation {
    Normal,

    /// Backing off the Y limit before homing, where reaching the lower limit is the goal.
    Dropback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MotionControlLimit {
    Upper,
    Lower,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Decoded reply to a motor status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorWaitDecoder {
    pub status_code: i32,
    pub error: ErrorCode,
}

/// Encoder X and pulse Y positions. Either may be missing if its query failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControllerPosition {
    pub x: Option<i32>,
    pub y: Option<i32>,
}

/// Limit switch states decoded from a status dump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LimitResponse {
    /// `(upper, lower)` blocked flags, `None` if the dump could not be decoded.
    limits: Option<(bool, bool)>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotorWaitDecoder {
    /// Decode a status reply. Returns the decoded status and whether the motor is still running.
    pub fn decode(response: &str, operation: MoveOperation) -> (Self, bool) {
        let code = match response.trim().parse::<i32>() {
            Ok(c) => c,
            Err(_) => {
                return (
                    Self {
                        status_code: UNPARSABLE_STATUS,
                        error: ErrorCode::MotorError,
                    },
                    false,
                )
            }
        };

        let mut decoded = Self {
            status_code: code,
            error: ErrorCode::Success,
        };

        let running = match (code, operation) {
            (STATUS_STOPPED, _) => false,
            (STATUS_LOWER_LIMIT, MoveOperation::Dropback) => {
                decoded.status_code = STATUS_STOPPED;
                false
            }
            (STATUS_LOWER_LIMIT, MoveOperation::Normal) => {
                decoded.error = ErrorCode::LowerLimitError;
                false
            }
            (STATUS_UPPER_LIMIT, _) => {
                decoded.error = ErrorCode::UpperLimitError;
                false
            }
            _ => true,
        };

        (decoded, running)
    }

    pub fn diagnostic(&self) -> String {
        match self.status_code {
            0 => "Motor stopped".into(),
            1 => "Accelerating".into(),
            2 => "Decelerating".into(),
            4 => "Constant speed".into(),
            8 => "Upper Limit Error".into(),
            16 => "Lower Limit Error".into(),
            c => c.to_string(),
        }
    }

    pub fn format_error(&self, axis: Axis, response: &str) -> String {
        format!(
            "Unable to reach target on axis {}. Response {} ( diagnostic = {} )",
            axis,
            response,
            self.diagnostic()
        )
    }
}

impl ControllerPosition {
    pub fn read_ok(&self) -> bool {
        self.x.is_some() && self.y.is_some()
    }
}

impl LimitResponse {
    /// Decode the reply to the status dump query.
    pub fn parse(response: Option<&str>) -> Self {
        let limits = response.and_then(|r| {
            let fields: Vec<&str> = r.trim().split(',').collect();
            if fields.len() != LIMIT_FIELD_COUNT {
                return None;
            }
            let bits = fields[LIMIT_FIELD].trim_end_matches('.').parse::<i32>().ok()?;
            Some((bits & UPPER_LIMIT_BIT != 0, bits & LOWER_LIMIT_BIT != 0))
        });

        Self { limits }
    }

    pub fn read_ok(&self) -> bool {
        self.limits.is_some()
    }

    /// Whether the limit is blocked, `None` if the dump could not be decoded.
    pub fn is_limit_blocked(&self, limit: MotionControlLimit) -> Option<bool> {
        self.limits.map(|(upper, lower)| match limit {
            MotionControlLimit::Upper => upper,
            MotionControlLimit::Lower => lower,
        })
    }
}

/// Parse a position reply, which may carry a `name=` prefix.
pub fn parse_position(response: &str) -> Option<i32> {
    let value = match response.find('=') {
        Some(i) => &response[i + 1..],
        None => response,
    };
    value.trim().parse().ok()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lower_limit_depends_on_operation() {
        let (normal, running) = MotorWaitDecoder::decode("16", MoveOperation::Normal);
        assert!(!running);
        assert_eq!(normal.error, ErrorCode::LowerLimitError);
        assert_eq!(normal.diagnostic(), "Lower Limit Error");

        let (dropback, running) = MotorWaitDecoder::decode("16", MoveOperation::Dropback);
        assert!(!running);
        assert_eq!(dropback.error, ErrorCode::Success);
        assert_eq!(dropback.status_code, 0);
    }

    #[test]
    fn test_status_codes() {
        let (d, running) = MotorWaitDecoder::decode("0", MoveOperation::Normal);
        assert!(!running);
        assert!(d.error.is_success());

        for moving in ["1", "2", "4"].iter() {
            let (d, running) = MotorWaitDecoder::decode(moving, MoveOperation::Normal);
            assert!(running);
            assert!(d.error.is_success());
        }

        let (d, running) = MotorWaitDecoder::decode("8", MoveOperation::Normal);
        assert!(!running);
        assert_eq!(d.error, ErrorCode::UpperLimitError);

        let (d, running) = MotorWaitDecoder::decode("EER", MoveOperation::Normal);
        assert!(!running);
        assert_eq!(d.error, ErrorCode::MotorError);
        assert_eq!(d.status_code, 999);
        assert_eq!(
            d.format_error(Axis::Y, "EER"),
            "Unable to reach target on axis Y. Response EER ( diagnostic = 999 )"
        );
    }

    #[test]
    fn test_limits() {
        let mut fields = vec!["0"; 28];
        fields[13] = "48.";
        let dump = fields.join(",");

        let limits = LimitResponse::parse(Some(&dump));
        assert!(limits.read_ok());
        assert_eq!(limits.is_limit_blocked(MotionControlLimit::Upper), Some(true));
        assert_eq!(limits.is_limit_blocked(MotionControlLimit::Lower), Some(true));

        fields[13] = "32";
        let limits = LimitResponse::parse(Some(&fields.join(",")));
        assert_eq!(limits.is_limit_blocked(MotionControlLimit::Upper), Some(false));

        assert!(!LimitResponse::parse(Some("1,2,3")).read_ok());
        assert!(!LimitResponse::parse(None).read_ok());
    }

    #[test]
    fn test_positions() {
        assert_eq!(parse_position("EX=1200"), Some(1200));
        assert_eq!(parse_position("-86200"), Some(-86200));
        assert_eq!(parse_position("??"), None);
    }
}
