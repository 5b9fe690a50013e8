//! # Runtime
//!
//! Time source and sleeping used by every poll loop. Hardware sequences are synchronous and block
//! the calling thread, so waiting is literal sleeping. Swapping the runtime for [`SimRuntime`]
//! makes the same loops run against a virtual clock.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Source of time for hardware sequences.
pub trait Runtime: Send + Sync {
    /// Block for `ms` milliseconds, yielding the thread.
    fn wait(&self, ms: u64);

    /// Block for `ms` milliseconds inside a poll loop.
    fn spin_wait(&self, ms: u64);

    /// Monotonic milliseconds since an arbitrary epoch.
    fn now_ms(&self) -> u64;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Wall clock runtime.
pub struct SystemRuntime {
    epoch: Instant,
}

/// Virtual clock runtime. Time only advances when something waits, or when [`SimRuntime::advance`]
/// is called.
#[derive(Default)]
pub struct SimRuntime {
    now: AtomicU64,
}

/// Measures the elapsed time of a section of a sequence.
pub struct ExecutionTimer {
    runtime: Arc<dyn Runtime>,
    start_ms: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SystemRuntime {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime for SystemRuntime {
    fn wait(&self, ms: u64) {
        if ms > 0 {
            std::thread::sleep(Duration::from_millis(ms));
        }
    }

    fn spin_wait(&self, ms: u64) {
        self.wait(ms)
    }

    fn now_ms(&self) -> u64 {
        util::time::std_duration_to_millis(self.epoch.elapsed())
    }
}

impl SimRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Runtime for SimRuntime {
    fn wait(&self, ms: u64) {
        self.advance(ms)
    }

    fn spin_wait(&self, ms: u64) {
        self.advance(ms)
    }

    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl ExecutionTimer {
    /// Start timing now.
    pub fn start(runtime: Arc<dyn Runtime>) -> Self {
        let start_ms = runtime.now_ms();
        Self { runtime, start_ms }
    }

    /// Milliseconds since the timer was started.
    pub fn elapsed_ms(&self) -> u64 {
        self.runtime.now_ms().saturating_sub(self.start_ms)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sim_clock() {
        let rt = Arc::new(SimRuntime::new());
        let timer = ExecutionTimer::start(rt.clone());

        rt.wait(200);
        rt.spin_wait(75);
        assert_eq!(timer.elapsed_ms(), 275);

        rt.advance(25);
        assert_eq!(rt.now_ms(), 300);
    }
}
