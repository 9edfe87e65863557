//! Host-provided physical clock and sleep/wait primitives (§6).
//!
//! The core depends on these only through the [`PhysicalClock`] trait so
//! that tests can substitute a fake clock without touching the scheduler.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use reactor_core::Timestamp;

/// `physical_now()` and `sleep_until()` from §6.
pub trait PhysicalClock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// The ordinary wall-clock source, backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl PhysicalClock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Sleep until `target` physical time, waking early if `wakeable` receives an
/// item. Returns the item that woke us early, if any.
///
/// This is the realtime-mode suspension point of §4.5/§5: "sleeping in
/// realtime mode awaiting physical time", interruptible by a new
/// physical-action event that may have an earlier tag.
pub fn sleep_until<T>(
    clock: &dyn PhysicalClock,
    target: Timestamp,
    wakeable: &Receiver<T>,
) -> Option<T> {
    loop {
        let now = clock.now();
        let Some(remaining) = target.checked_duration_since(now) else {
            return None;
        };
        if remaining.is_zero() {
            return None;
        }
        match wakeable.recv_timeout(remaining) {
            Ok(item) => return Some(item),
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => {
                // No more waking events can ever arrive; fall back to a plain sleep
                // for whatever remains.
                std::thread::sleep(remaining.min(Duration::from_secs(3600)));
                return None;
            }
        }
    }
}
