//! # Serial Channel
//!
//! [`CommandChannel`] implementation over an RS-232 port using the `serialport` crate. The port is
//! opened lazily and reopened after a close, so a protocol layer can cycle it during a reset.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{debug, trace, warn};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

// Internal
use crate::channel::{ChannelError, ChannelResponse, ChannelSettings, CommandChannel, PortConfig};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Timeout of a single read call, the overall exchange timeout is enforced around it.
const READ_SLICE_MS: u64 = 10;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A command channel backed by a serial port.
pub struct SerialChannel {
    config: PortConfig,
    settings: ChannelSettings,
    display_name: String,
    port: Option<Box<dyn SerialPort>>,

    /// Log every exchange at debug level.
    pub enable_debugging: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SerialChannel {
    /// Create a new, closed, serial channel.
    pub fn new(config: PortConfig, settings: ChannelSettings, display_name: &str) -> Self {
        Self {
            config,
            settings,
            display_name: display_name.to_string(),
            port: None,
            enable_debugging: false,
        }
    }

    fn read_reply(&mut self, timeout_ms: u64) -> ChannelResponse {
        let validate = self.settings.validate;
        let port = match self.port.as_mut() {
            Some(p) => p,
            None => return ChannelResponse::failed(ChannelError::NotOpen),
        };

        let start = Instant::now();
        let mut raw = Vec::new();
        let mut buf = [0u8; 64];

        loop {
            match port.read(&mut buf) {
                Ok(0) => (),
                Ok(n) => {
                    raw.extend_from_slice(&buf[..n]);
                    if validate(&raw) {
                        return ChannelResponse::ok(raw);
                    }
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => (),
                Err(e) => return ChannelResponse::failed(ChannelError::ReadFailed(e.to_string())),
            }

            if start.elapsed() >= Duration::from_millis(timeout_ms) {
                trace!(
                    "{}: partial reply {:?} discarded",
                    self.display_name,
                    String::from_utf8_lossy(&raw)
                );
                return ChannelResponse::failed(ChannelError::Timeout(timeout_ms));
            }
        }
    }
}

impl CommandChannel for SerialChannel {
    fn open(&mut self) -> bool {
        if self.port.is_some() {
            return true;
        }

        match serialport::new(self.config.port_name.as_str(), self.config.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(READ_SLICE_MS))
            .open()
        {
            Ok(p) => {
                debug!(
                    "Opened {} on {} at {} baud",
                    self.display_name, self.config.port_name, self.config.baud_rate
                );
                self.port = Some(p);
                true
            }
            Err(e) => {
                warn!(
                    "Could not open {} on {}: {}",
                    self.display_name, self.config.port_name, e
                );
                false
            }
        }
    }

    fn close(&mut self) -> bool {
        // Dropping the handle closes the OS port
        self.port.take();
        true
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn send_recv(&mut self, command: &str, timeout_ms: u64) -> ChannelResponse {
        if !self.open() {
            return ChannelResponse::failed(ChannelError::OpenFailed(self.config.port_name.clone()));
        }

        let frame = self.settings.frame(command);
        let write_timeout = Duration::from_millis(self.settings.write_timeout_ms);
        let pause = self.settings.write_pause_ms;

        if let Some(port) = self.port.as_mut() {
            if let Err(e) = port.clear(ClearBuffer::Input) {
                warn!("{}: could not clear input buffer: {}", self.display_name, e);
            }

            if let Err(e) = write_frame(port.as_mut(), &frame, write_timeout) {
                return ChannelResponse::failed(ChannelError::WriteFailed(e.to_string()));
            }
        }

        if pause > 0 {
            std::thread::sleep(Duration::from_millis(pause));
        }

        let response = self.read_reply(timeout_ms);

        if self.enable_debugging {
            debug!(
                "{}: {} -> {:?} (ok = {})",
                self.display_name,
                command,
                response.text(),
                response.comm_ok
            );
        }

        response
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Write a framed command with the write timeout, then restore the short read timeout.
fn write_frame(
    port: &mut dyn SerialPort,
    frame: &[u8],
    write_timeout: Duration,
) -> Result<(), serialport::Error> {
    port.set_timeout(write_timeout)?;
    port.write_all(frame)?;
    port.flush()?;
    port.set_timeout(Duration::from_millis(READ_SLICE_MS))?;
    Ok(())
}
