//! # Motion control error log
//!
//! Motion failures are appended to their own file next to the session log so that a field engineer
//! can review controller faults without searching the main log.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::Local;
use log::warn;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

pub const MOTION_ERROR_LOG_NAME: &str = "MotionControlErrorLog.log";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Append-only log of motion failures. Writes to a sink that could not be opened are dropped.
pub struct MotionErrorLog {
    file: Option<Mutex<File>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotionErrorLog {
    /// Open (or create) the log in `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Self {
        let path = dir.as_ref().join(MOTION_ERROR_LOG_NAME);
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(f) => Self {
                file: Some(Mutex::new(f)),
            },
            Err(e) => {
                warn!("[MotionControl] Create motion control error log failed: {}", e);
                Self::null()
            }
        }
    }

    /// A log which discards everything.
    pub fn null() -> Self {
        Self { file: None }
    }

    pub fn write(&self, msg: &str) {
        let file = match &self.file {
            Some(f) => f,
            None => return,
        };

        let mut guard = match file.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Local::now();
        writeln!(guard, "{} {}", now.format("%m/%d/%Y %H:%M"), msg).ok();
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_appends_timestamped_lines() {
        let dir = std::env::temp_dir().join(format!("hal_motion_log_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let log = MotionErrorLog::open(&dir);
        log.write("first");
        log.write("second");

        let text = std::fs::read_to_string(dir.join(MOTION_ERROR_LOG_NAME)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" first"));
        assert!(lines[1].ends_with(" second"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_null_sink() {
        MotionErrorLog::null().write("dropped");
    }
}
