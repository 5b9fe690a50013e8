//! # Error codes
//!
//! [`ErrorCode`] is the outcome vocabulary shared by every layer of the hardware control core.
//! Hardware conditions are never raised as Rust errors, they are returned as one of these codes and
//! callers branch on the specific member.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;

// ------------------------------------------------------------------------------------------------
// MACROS
// ------------------------------------------------------------------------------------------------

/// Declares the error code enum along with the table of all members and their wire names.
macro_rules! error_codes {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        /// Outcome of a hardware operation.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum ErrorCode {
            $($(#[$meta])* $name),+
        }

        impl ErrorCode {
            /// Every error code, in declaration order.
            pub const ALL: &'static [ErrorCode] = &[$(ErrorCode::$name),+];

            /// Name of the code as declared.
            pub fn name(&self) -> &'static str {
                match self {
                    $(ErrorCode::$name => stringify!($name)),+
                }
            }
        }
    };
}

error_codes!(
    Success,
    Timeout,
    CommunicationError,
    SensorReadError,
    SensorError,

    // ---- ACTUATOR TIMEOUTS ----
    GripperOpenTimeout,
    GripperCloseTimeout,
    GripperRentTimeout,
    GripperExtendTimeout,
    GripperRetractTimeout,
    RollerToPos1Timeout,
    RollerToPos2Timeout,
    RollerToPos3Timeout,
    RollerToPos4Timeout,
    RollerToPos5Timeout,
    RollerToPos6Timeout,
    TrackOpenTimeout,
    TrackCloseTimeout,
    VendDoorRentTimeout,
    VendDoorCloseTimeout,
    VendDoorNotClosed,
    HomeXTimeout,
    HomeYTimeout,

    // ---- MOTION FAULTS ----
    ArcusNotResponsive,
    UpperLimitError,
    LowerLimitError,
    MotorError,
    MotorNotHomed,
    DoorOpen,

    // ---- DOMAIN OUTCOMES ----
    PickerFull,
    PickerEmpty,
    PickerObstructed,
    ObstructionDetected,
    SlotInUse,
    SlotEmpty,
    ItemStuck,

    // ---- LOGICAL ----
    SlotOutOfRange,
    DeckOutOfRange,
    LocationOutOfRange,
    StoreError,
);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ErrorCode {
    /// Whether this code is [`ErrorCode::Success`].
    pub fn is_success(&self) -> bool {
        *self == ErrorCode::Success
    }

    /// Look up a code by its name, ignoring case.
    pub fn from_name(name: &str) -> Option<ErrorCode> {
        let trimmed = name.trim();
        ErrorCode::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(trimmed))
    }

    /// Convert into a `Result`, with `Success` as the only `Ok` value.
    pub fn into_result(self) -> Result<(), ErrorCode> {
        match self {
            ErrorCode::Success => Ok(()),
            e => Err(e),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name().to_ascii_uppercase())
    }
}

impl Default for ErrorCode {
    fn default() -> Self {
        ErrorCode::Success
    }
}

impl From<Result<(), ErrorCode>> for ErrorCode {
    fn from(r: Result<(), ErrorCode>) -> Self {
        match r {
            Ok(()) => ErrorCode::Success,
            Err(e) => e,
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
    fn test_display_is_upper_case() {
        assert_eq!(ErrorCode::PickerFull.to_string(), "PICKERFULL");
        assert_eq!(ErrorCode::RollerToPos3Timeout.to_string(), "ROLLERTOPOS3TIMEOUT");
    }

    #[test]
    fn test_from_name() {
        assert_eq!(ErrorCode::from_name("SLOTINUSE"), Some(ErrorCode::SlotInUse));
        assert_eq!(ErrorCode::from_name(" timeout "), Some(ErrorCode::Timeout));
        assert_eq!(ErrorCode::from_name("ABC123"), None);
        assert_eq!(ErrorCode::ALL.len(), 40);
    }

    #[test]
    fn test_result_conversion() {
        assert_eq!(ErrorCode::Success.into_result(), Ok(()));
        assert_eq!(ErrorCode::DoorOpen.into_result(), Err(ErrorCode::DoorOpen));
        assert_eq!(ErrorCode::from(Err(ErrorCode::ItemStuck)), ErrorCode::ItemStuck);
    }
}
