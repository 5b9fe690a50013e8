//! # Scripted Channel
//!
//! An in-memory [`CommandChannel`] whose replies are produced by a closure. Used to drive the
//! protocol layers in tests and in the `--sim` mode of the executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex};

use crate::channel::{ChannelError, ChannelResponse, CommandChannel};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Reply generator, given the command that was sent.
pub type Responder = Box<dyn FnMut(&str) -> ChannelResponse + Send>;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Shared record of every command sent on a scripted channel.
#[derive(Clone, Default)]
pub struct SentLog {
    inner: Arc<Mutex<Vec<String>>>,
}

/// A channel which answers from a closure instead of a device.
pub struct ScriptedChannel {
    name: String,
    responder: Responder,
    log: SentLog,
    opened: bool,

    /// When set, `open` fails. Used to simulate a missing port.
    pub refuse_open: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SentLog {
    /// All commands sent so far, oldest first.
    pub fn commands(&self) -> Vec<String> {
        match self.inner.lock() {
            Ok(l) => l.clone(),
            Err(p) => p.into_inner().clone(),
        }
    }

    /// Number of times exactly `command` was sent.
    pub fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|c| c.as_str() == command).count()
    }

    /// Whether `command` was ever sent.
    pub fn contains(&self, command: &str) -> bool {
        self.count(command) > 0
    }

    /// Forget all recorded commands.
    pub fn clear(&self) {
        if let Ok(mut l) = self.inner.lock() {
            l.clear();
        }
    }

    fn push(&self, command: &str) {
        if let Ok(mut l) = self.inner.lock() {
            l.push(command.to_string());
        }
    }
}

impl ScriptedChannel {
    /// Create a scripted channel answering with `responder`.
    pub fn new<F>(name: &str, responder: F) -> Self
    where
        F: FnMut(&str) -> ChannelResponse + Send + 'static,
    {
        Self::with_log(name, SentLog::default(), responder)
    }

    /// Create a scripted channel which records into an existing log, so that several channels
    /// (or a channel which is rebuilt) share one record.
    pub fn with_log<F>(name: &str, log: SentLog, responder: F) -> Self
    where
        F: FnMut(&str) -> ChannelResponse + Send + 'static,
    {
        Self {
            name: name.to_string(),
            responder: Box::new(responder),
            log,
            opened: false,
            refuse_open: false,
        }
    }

    /// A handle onto the log of sent commands, which stays valid after the channel is moved.
    pub fn sent(&self) -> SentLog {
        self.log.clone()
    }
}

impl CommandChannel for ScriptedChannel {
    fn open(&mut self) -> bool {
        if self.refuse_open {
            return false;
        }
        self.opened = true;
        true
    }

    fn close(&mut self) -> bool {
        self.opened = false;
        true
    }

    fn is_open(&self) -> bool {
        self.opened
    }

    fn send_recv(&mut self, command: &str, _timeout_ms: u64) -> ChannelResponse {
        if !self.opened && !self.open() {
            return ChannelResponse::failed(ChannelError::NotOpen);
        }

        self.log.push(command);
        (self.responder)(command)
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
