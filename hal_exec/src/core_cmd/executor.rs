//! # Core command executor
//!
//! Runs one [`CommandType`] against the I/O board channel:
//!
//! 1. The board address selector is sent, then the command itself.
//! 2. If the command has a status bit, the status query is polled until the bit clears or the
//!    operation timeout elapses.
//! 3. On a poll timeout the command's reset sequence, if any, is sent. The caller still receives
//!    the timeout.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use comms_if::{AddressSelector, CommandChannel};
use log::{debug, error, warn};
use std::sync::{Arc, Mutex, MutexGuard};

// Internal
use super::{CommandDescriptor, CommandTrace, CommandType, CoreResponse, STATUS_QUERY};
use crate::error::ErrorCode;
use crate::runtime::{ExecutionTimer, Runtime};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Executes core commands over the single I/O board channel.
pub struct CoreCommandExecutor {
    channel: Mutex<Box<dyn CommandChannel>>,
    runtime: Arc<dyn Runtime>,

    /// Units: milliseconds
    selector_timeout_ms: u64,

    /// Units: milliseconds
    command_wait_ms: u64,

    enable_trace: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CoreCommandExecutor {
    pub fn new(
        channel: Box<dyn CommandChannel>,
        runtime: Arc<dyn Runtime>,
        selector_timeout_ms: u64,
        command_wait_ms: u64,
        enable_trace: bool,
    ) -> Self {
        Self {
            channel: Mutex::new(channel),
            runtime,
            selector_timeout_ms,
            command_wait_ms,
            enable_trace,
        }
    }

    /// Open the channel.
    pub fn open(&self) -> bool {
        self.lock_channel().open()
    }

    /// Close the channel.
    pub fn close(&self) -> bool {
        self.lock_channel().close()
    }

    /// Name of the underlying port.
    pub fn port_name(&self) -> String {
        self.lock_channel().display_name().to_string()
    }

    /// Execute a command, polling for completion for at most `timeout_ms` if the command has a
    /// status bit.
    pub fn execute(&self, kind: CommandType, timeout_ms: Option<u64>) -> CoreResponse {
        let desc = kind.descriptor();
        let timeout = timeout_ms.unwrap_or(0);

        if desc.status_bit.is_some() && (timeout == 0 || desc.wait_pause_ms == 0) {
            debug!(
                "[CoreCommand] On CommandType {} there is a status bit but Timeout = {} and \
                WaitPause = {}",
                kind, timeout, desc.wait_pause_ms
            );
        }

        let mut guard = self.lock_channel();
        let channel: &mut dyn CommandChannel = &mut **guard;
        let mut trace = CommandTrace::new(self.enable_trace);

        trace.line(format_args!("[CoreCommand] Executing command {}", kind));

        let mut response = self.send(channel, &desc, desc.command, &mut trace);

        if let (false, Some(bit)) = (response.comm_error(), desc.status_bit) {
            let outcome = self.wait_for_command(channel, &desc, bit, timeout, &mut trace);
            response.set_error(outcome);

            if response.timed_out() {
                if let Some(reset) = desc.reset {
                    for token in reset.split(',').filter(|t| !t.is_empty()) {
                        self.send(channel, &desc, token, &mut trace);
                    }
                }
            }
        }

        trace.line(format_args!("[CoreCommand] {} returned {}", kind, response));
        response
    }

    fn wait_for_command(
        &self,
        channel: &mut dyn CommandChannel,
        desc: &CommandDescriptor,
        bit: usize,
        timeout_ms: u64,
        trace: &mut CommandTrace,
    ) -> ErrorCode {
        trace.enter();
        trace.line(format_args!("[WaitForCommand] Start."));

        let timer = ExecutionTimer::start(self.runtime.clone());
        let outcome = loop {
            self.runtime.spin_wait(desc.wait_pause_ms);

            let status = self.send(channel, desc, STATUS_QUERY, trace);
            if status.comm_error() {
                break ErrorCode::CommunicationError;
            }

            trace.line(format_args!("[WaitForCommand] {}", status.opcode()));
            if !status.is_bit_set(bit) {
                break ErrorCode::Success;
            }

            if timer.elapsed_ms() > timeout_ms {
                break ErrorCode::Timeout;
            }
        };

        trace.exit();
        outcome
    }

    /// Select the board and send one command.
    fn send(
        &self,
        channel: &mut dyn CommandChannel,
        desc: &CommandDescriptor,
        command: &str,
        trace: &mut CommandTrace,
    ) -> CoreResponse {
        trace.enter();
        let mut response = CoreResponse::new(desc.address);

        let selected = channel.send_recv(desc.address.as_str(), self.selector_timeout_ms);
        if !selected.comm_ok {
            warn!(
                " [SendCommand] Selector {} ( port = {} )communication error.",
                desc.address,
                channel.display_name()
            );
            response.set_error(ErrorCode::CommunicationError);
            response.diagnostic = Some(unresponsive_board(desc.address));
            trace.exit();
            return response;
        }
        trace.line(format_args!(
            "[SendCommand] Command {} selector response {}",
            command,
            selected.text()
        ));

        let reply = channel.send_recv(command, desc.command_wait_ms.unwrap_or(self.command_wait_ms));
        if reply.comm_ok {
            response.set_opcode(&reply.text());
            trace.line(format_args!(
                "[SendCommand] Command {} response {}",
                command,
                response.opcode()
            ));
        } else {
            warn!(
                " [SendCommand] Command {} on address {} ( port = {} ) communication error.",
                command,
                desc.address,
                channel.display_name()
            );
            response.set_error(ErrorCode::CommunicationError);
        }

        trace.exit();
        response
    }

    fn lock_channel(&self) -> MutexGuard<Box<dyn CommandChannel>> {
        match self.channel.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn unresponsive_board(address: AddressSelector) -> String {
    let board = match address {
        AddressSelector::H001 => "PCB",
        AddressSelector::H002 => "AUX board",
        AddressSelector::H101 => "SER board",
        AddressSelector::H555 => "QR device",
    };
    let message = format!("{} is not responsive.", board);
    error!("{}", message);
    message
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::runtime::SimRuntime;
    use comms_if::sim::ScriptedChannel;
    use comms_if::{ChannelError, ChannelResponse};

    fn executor(chan: ScriptedChannel, rt: Arc<SimRuntime>) -> CoreCommandExecutor {
        CoreCommandExecutor::new(Box::new(chan), rt, 5000, 8000, true)
    }

    #[test]
    fn test_unpolled_command() {
        let chan = ScriptedChannel::new("core", |_| ChannelResponse::ok(b"OK\r\n".to_vec()));
        let sent = chan.sent();
        let exec = executor(chan, Arc::new(SimRuntime::new()));

        let r = exec.execute(CommandType::RingLightOn, None);
        assert!(r.success());
        assert_eq!(sent.commands(), vec!["H101", "LIGHT ON"]);
    }

    #[test]
    fn test_polls_until_bit_clears() {
        let mut polls = 0;
        let chan = ScriptedChannel::new("core", move |cmd| match cmd {
            "S" => {
                polls += 1;
                if polls < 3 {
                    ChannelResponse::ok(b"010000 OK".to_vec())
                } else {
                    ChannelResponse::ok(b"000000 OK".to_vec())
                }
            }
            _ => ChannelResponse::ok(b"OK".to_vec()),
        });
        let sent = chan.sent();
        let exec = executor(chan, Arc::new(SimRuntime::new()));

        let r = exec.execute(CommandType::GripperExtend, Some(2000));
        assert!(r.success());
        assert_eq!(sent.count("S"), 3);
        assert!(!sent.contains("ARM HALT"));
    }

    #[test]
    fn test_timeout_not_before_deadline_then_reset() {
        let chan = ScriptedChannel::new("core", |cmd| match cmd {
            "S" => ChannelResponse::ok(b"001000 OK".to_vec()),
            _ => ChannelResponse::ok(b"OK".to_vec()),
        });
        let sent = chan.sent();
        let rt = Arc::new(SimRuntime::new());
        let exec = executor(chan, rt.clone());

        let r = exec.execute(CommandType::RollerToPos3, Some(1000));
        assert!(r.timed_out());
        assert!(rt.now_ms() >= 1000);
        assert_eq!(sent.commands().last().map(String::as_str), Some("ROLLER STOP"));
    }

    #[test]
    fn test_selector_failure_names_board() {
        let chan = ScriptedChannel::new("core", |cmd| match cmd {
            "H002" => ChannelResponse::failed(ChannelError::Timeout(5000)),
            _ => ChannelResponse::ok(b"OK".to_vec()),
        });
        let sent = chan.sent();
        let exec = executor(chan, Arc::new(SimRuntime::new()));

        let r = exec.execute(CommandType::VendDoorClose, Some(5500));
        assert!(r.comm_error());
        assert_eq!(r.opcode(), "");
        assert_eq!(r.to_string(), "AUX board is not responsive.");
        assert_eq!(sent.commands(), vec!["H002"]);
    }

    #[test]
    fn test_comm_error_during_poll() {
        let chan = ScriptedChannel::new("core", |cmd| match cmd {
            "S" => ChannelResponse::failed(ChannelError::Timeout(8000)),
            _ => ChannelResponse::ok(b"OK".to_vec()),
        });
        let exec = executor(chan, Arc::new(SimRuntime::new()));

        let r = exec.execute(CommandType::GripperExtend, Some(2000));
        assert!(r.comm_error());
    }
}
