//! # Persistent counters
//!
//! Named counters which survive restarts. Every actuator failure increments a counter keyed by the
//! failing command category, which health monitoring reads back later.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A store of named persistent counters.
pub trait PersistentCounters: Send + Sync {
    /// Increment a counter, creating it at zero first if needed. Returns the new value, or `None`
    /// if the counter could not be persisted.
    fn increment(&self, name: &str) -> Option<i64>;

    /// Decrement a counter. Returns the new value, or `None` if it could not be persisted.
    fn decrement(&self, name: &str) -> Option<i64>;

    /// Current value of a counter, zero if it does not exist.
    fn value(&self, name: &str) -> i64;

    /// Set a counter back to zero.
    fn reset(&self, name: &str) -> bool;

    /// Increment the counter of an actuator timeout category.
    fn increment_timeout(&self, counter: TimeoutCounter) -> Option<i64> {
        self.increment(&counter.key())
    }

    /// Reset every actuator timeout counter.
    fn reset_weekly(&self) {
        for c in TimeoutCounter::ALL {
            self.reset(&c.key());
        }
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Counter store kept in memory and optionally mirrored to a JSON file.
pub struct CounterStore {
    path: Option<PathBuf>,
    counters: Mutex<BTreeMap<String, i64>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Actuator failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeoutCounter {
    FingerOpen,
    FingerClose,
    FingerRent,
    GripperExtend,
    GripperRetract,
    TrackOpen,
    TrackClose,
    VendDoorRent,
    VendDoorClose,
    QlmEngage,
    QlmDisengage,
}

#[derive(thiserror::Error, Debug)]
pub enum CounterStoreError {
    #[error("Cannot read the counter file {0:?}: {1}")]
    ReadError(PathBuf, std::io::Error),

    #[error("Cannot write the counter file {0:?}: {1}")]
    WriteError(PathBuf, std::io::Error),

    #[error("The counter file is not valid: {0}")]
    FormatError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TimeoutCounter {
    pub const ALL: [TimeoutCounter; 11] = [
        TimeoutCounter::FingerOpen,
        TimeoutCounter::FingerClose,
        TimeoutCounter::FingerRent,
        TimeoutCounter::GripperExtend,
        TimeoutCounter::GripperRetract,
        TimeoutCounter::TrackOpen,
        TimeoutCounter::TrackClose,
        TimeoutCounter::VendDoorRent,
        TimeoutCounter::VendDoorClose,
        TimeoutCounter::QlmEngage,
        TimeoutCounter::QlmDisengage,
    ];

    /// Name of the counter in the store, for example `TrackCloseTimeout`.
    pub fn key(&self) -> String {
        format!("{:?}Timeout", self)
    }
}

impl CounterStore {
    /// A store which is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            counters: Mutex::new(BTreeMap::new()),
        }
    }

    /// Open the store backed by the JSON file at `path`. A missing file is an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CounterStoreError> {
        let path = path.as_ref().to_path_buf();

        let counters = if path.exists() {
            let s = fs::read_to_string(&path)
                .map_err(|e| CounterStoreError::ReadError(path.clone(), e))?;
            serde_json::from_str(&s).map_err(CounterStoreError::FormatError)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: Some(path),
            counters: Mutex::new(counters),
        })
    }

    /// Apply `f` to the named counter and persist the store.
    fn update<F>(&self, name: &str, f: F) -> Option<i64>
    where
        F: FnOnce(i64) -> i64,
    {
        let mut counters = self.lock();
        let value = f(*counters.get(name).unwrap_or(&0));
        counters.insert(name.to_string(), value);

        match self.persist(&counters) {
            Ok(()) => Some(value),
            Err(e) => {
                warn!("[PersistentCounters] Unable to update counter {}: {}", name, e);
                None
            }
        }
    }

    fn persist(&self, counters: &BTreeMap<String, i64>) -> Result<(), CounterStoreError> {
        let path = match &self.path {
            Some(p) => p,
            None => return Ok(()),
        };

        let json = serde_json::to_string_pretty(counters).map_err(CounterStoreError::FormatError)?;
        fs::write(path, json).map_err(|e| CounterStoreError::WriteError(path.clone(), e))
    }

    fn lock(&self) -> MutexGuard<BTreeMap<String, i64>> {
        match self.counters.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl PersistentCounters for CounterStore {
    fn increment(&self, name: &str) -> Option<i64> {
        self.update(name, |v| v + 1)
    }

    fn decrement(&self, name: &str) -> Option<i64> {
        self.update(name, |v| v - 1)
    }

    fn value(&self, name: &str) -> i64 {
        *self.lock().get(name).unwrap_or(&0)
    }

    fn reset(&self, name: &str) -> bool {
        if self.value(name) == 0 {
            return true;
        }
        self.update(name, |_| 0).is_some()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_timeout_keys() {
        assert_eq!(TimeoutCounter::TrackClose.key(), "TrackCloseTimeout");
        assert_eq!(TimeoutCounter::QlmEngage.key(), "QlmEngageTimeout");
    }

    #[test]
    fn test_in_memory_counts() {
        let store = CounterStore::in_memory();
        assert_eq!(store.increment("DUPLICATE-COUNT"), Some(1));
        assert_eq!(store.increment("DUPLICATE-COUNT"), Some(2));
        assert_eq!(store.decrement("DUPLICATE-COUNT"), Some(1));

        store.increment_timeout(TimeoutCounter::VendDoorClose);
        assert_eq!(store.value("VendDoorCloseTimeout"), 1);

        store.reset_weekly();
        assert_eq!(store.value("VendDoorCloseTimeout"), 0);
        assert_eq!(store.value("DUPLICATE-COUNT"), 1);
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("hal_counters_{}.json", std::process::id()));
        let _ = fs::remove_file(&path);

        {
            let store = CounterStore::open(&path).unwrap();
            store.increment_timeout(TimeoutCounter::GripperExtend);
            store.increment_timeout(TimeoutCounter::GripperExtend);
        }

        let store = CounterStore::open(&path).unwrap();
        assert_eq!(store.value("GripperExtendTimeout"), 2);

        let _ = fs::remove_file(&path);
    }
}
