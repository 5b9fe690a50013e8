//! # Command trace
//!
//! Indented buffer of the steps of one core command, written to the log as a single record when
//! the trace is dropped.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::info;
use std::fmt::{self, Write};
use util::logger::TRACE_TARGET;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct CommandTrace {
    enabled: bool,
    depth: usize,
    buffer: String,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CommandTrace {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            depth: 0,
            buffer: String::new(),
        }
    }

    pub fn enter(&mut self) {
        self.depth += 1;
    }

    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Append a line at the current depth.
    pub fn line(&mut self, args: fmt::Arguments) {
        if !self.enabled {
            return;
        }

        for _ in 0..self.depth {
            self.buffer.push(' ');
        }
        // Writing into a String can't fail
        let _ = self.buffer.write_fmt(args);
        self.buffer.push('\n');
    }

    /// Buffered text, for inspection before the trace is flushed.
    pub fn contents(&self) -> &str {
        &self.buffer
    }
}

impl Drop for CommandTrace {
    fn drop(&mut self) {
        if self.enabled && !self.buffer.is_empty() {
            info!(target: TRACE_TARGET, "{}", self.buffer.trim_end());
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
    fn test_indentation() {
        let mut t = CommandTrace::new(true);
        t.line(format_args!("top {}", 1));
        t.enter();
        t.line(format_args!("nested"));
        t.exit();
        t.exit();
        t.line(format_args!("back"));

        assert_eq!(t.contents(), "top 1\n nested\nback\n");
    }

    #[test]
    fn test_disabled_trace_is_empty() {
        let mut t = CommandTrace::new(false);
        t.line(format_args!("ignored"));
        assert!(t.contents().is_empty());
    }
}
