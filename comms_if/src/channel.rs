//! # Command Channel
//!
//! A command channel is a synchronous request/response link to a piece of equipment. A command
//! string is written (with the channel's write terminator appended) and bytes are read back until
//! the channel's validity predicate accepts them, or until the timeout elapses.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Carriage return, used as the write terminator for the I/O boards.
pub const CR: u8 = 13;

/// End of transmission byte which marks a complete motion controller reply.
pub const EOT: u8 = 4;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A bidirectional request/response transport.
///
/// Each channel instance is single-owner: it is opened at startup, closed at shutdown or reset,
/// and never shared between protocol layers.
pub trait CommandChannel: Send {
    /// Open the underlying link. Returns `true` if the link is usable afterwards. Opening an
    /// already open channel is not an error.
    fn open(&mut self) -> bool;

    /// Close the underlying link. Returns `true` if the link was closed cleanly.
    fn close(&mut self) -> bool;

    /// Whether the link is currently open.
    fn is_open(&self) -> bool;

    /// Send a command and wait up to `timeout_ms` for a valid reply.
    fn send_recv(&mut self, command: &str, timeout_ms: u64) -> ChannelResponse;

    /// Human readable name of the channel, used in diagnostics.
    fn display_name(&self) -> &str;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Result of a single exchange on a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelResponse {
    /// `true` if a reply accepted by the validity predicate was received in time.
    pub comm_ok: bool,

    /// Raw reply bytes. Empty when `comm_ok` is `false`.
    pub raw: Vec<u8>,

    /// The reason the exchange failed, if it did.
    pub error: Option<ChannelError>,
}

/// Settings that shape how commands are framed and how replies are accepted.
#[derive(Clone)]
pub struct ChannelSettings {
    /// Bytes appended to every command before it is written.
    pub write_terminator: Vec<u8>,

    /// Pause after writing a command before reading begins.
    ///
    /// Units: milliseconds
    pub write_pause_ms: u64,

    /// Timeout applied to the write itself.
    ///
    /// Units: milliseconds
    pub write_timeout_ms: u64,

    /// Predicate deciding whether the bytes read so far form an acceptable reply.
    pub validate: ResponseValidator,
}

/// Serial line parameters for a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    /// OS name of the port, for example `/dev/ttyUSB0` or `COM3`.
    pub port_name: String,

    /// Line speed in bits per second.
    pub baud_rate: u32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Ways a channel exchange can fail.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    #[error("The channel is not open")]
    NotOpen,

    #[error("Could not open the port: {0}")]
    OpenFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("No valid response within {0} ms")]
    Timeout(u64),
}

/// Address selectors for the logical boards reachable over the I/O board channel.
///
/// The selector is sent as a preamble before each command to route it to the right board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressSelector {
    /// Picker control board (PCB)
    H001,

    /// Auxiliary board (vend door, QLM)
    H002,

    /// Serial board
    H101,

    /// QR reader device
    H555,
}

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Reply acceptance predicate, given the bytes read so far.
pub type ResponseValidator = fn(&[u8]) -> bool;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ChannelResponse {
    /// A successful exchange carrying `raw`.
    pub fn ok<B: Into<Vec<u8>>>(raw: B) -> Self {
        Self {
            comm_ok: true,
            raw: raw.into(),
            error: None,
        }
    }

    /// A failed exchange.
    pub fn failed(error: ChannelError) -> Self {
        Self {
            comm_ok: false,
            raw: Vec::new(),
            error: Some(error),
        }
    }

    /// The reply as ASCII text. Non-ASCII bytes are replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }

    /// Position of the first occurrence of `byte` in the reply.
    pub fn index_of(&self, byte: u8) -> Option<usize> {
        self.raw.iter().position(|b| *b == byte)
    }
}

impl ChannelSettings {
    /// Settings for the I/O board channel: CR terminated, replies must carry `OK` or `EER`.
    pub fn core_board() -> Self {
        Self {
            write_terminator: vec![CR],
            write_pause_ms: 0,
            write_timeout_ms: 5000,
            validate: core_board_response_valid,
        }
    }

    /// Settings for the motion controller channel: CR+NUL terminated, replies end with EOT.
    pub fn motion_controller(write_pause_ms: u64, write_timeout_ms: u64) -> Self {
        Self {
            write_terminator: vec![CR, 0],
            write_pause_ms,
            write_timeout_ms,
            validate: motion_controller_response_valid,
        }
    }

    /// Frame a command for writing.
    pub fn frame(&self, command: &str) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(command.len() + self.write_terminator.len());
        bytes.extend_from_slice(command.as_bytes());
        bytes.extend_from_slice(&self.write_terminator);
        bytes
    }
}

impl AddressSelector {
    /// The token sent on the wire to select this board.
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressSelector::H001 => "H001",
            AddressSelector::H002 => "H002",
            AddressSelector::H101 => "H101",
            AddressSelector::H555 => "H555",
        }
    }
}

impl fmt::Display for AddressSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// I/O board replies are acceptable once they contain either `OK` or `EER`.
pub fn core_board_response_valid(raw: &[u8]) -> bool {
    if raw.is_empty() {
        return false;
    }
    contains(raw, b"OK") || contains(raw, b"EER")
}

/// Motion controller replies are complete once the EOT byte has arrived.
pub fn motion_controller_response_valid(raw: &[u8]) -> bool {
    raw.contains(&EOT)
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
