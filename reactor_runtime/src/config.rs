//! Scheduler configuration (SPEC_FULL §2-FULL), mirroring the teacher's
//! `sched::Config` (`boomerang_runtime/src/sched/nonfed.rs`) with the same
//! builder-style `with_*` methods.

use reactor_core::Timestamp;

/// Programmatic configuration surface. No CLI parsing lives in this crate
/// (§1, §6): a generated binary or federated layer owns that.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Size of the reaction dispatch thread pool (§5: "a fixed pool of
    /// worker threads"). Only consulted under the `parallel` feature, which
    /// builds a `rayon::ThreadPool` of this size for `run_batch` rather than
    /// borrowing rayon's global pool; with `parallel` off, dispatch always
    /// runs on the calling thread and this is unused.
    pub workers: usize,
    /// Stop time (`timeout`), if any; `None` means run until the event
    /// queue drains and `keep_alive` is false.
    pub timeout: Option<Timestamp>,
    /// Keep the scheduler alive (waiting on the condvar) even when the
    /// event queue empties, e.g. to await physical actions from other
    /// threads.
    pub keep_alive: bool,
    /// Skip realtime pacing and run logical time as fast as events permit.
    pub fast_forward: bool,
    /// Default safe-to-process offset applied to realtime dispatch (§4.5,
    /// glossary: STP offset).
    pub stp_offset: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 1,
            timeout: None,
            keep_alive: false,
            fast_forward: true,
            stp_offset: 0,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Timestamp) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_fast_forward(mut self, fast_forward: bool) -> Self {
        self.fast_forward = fast_forward;
        self
    }

    pub fn with_stp_offset(mut self, stp_offset: i64) -> Self {
        self.stp_offset = stp_offset;
        self
    }
}
