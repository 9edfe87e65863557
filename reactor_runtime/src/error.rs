//! Error taxonomy (§7).
//!
//! Scheduling calls surface a three-way outcome (`Accepted`/`Rejected`/
//! `Misuse`) at the handle-returning API boundary for fidelity with the
//! source runtime's `trigger_handle_t` contract, but internally the engine
//! works in terms of `Result<_, ScheduleError>` rather than threading the
//! `0`/`-1` sentinels through the core.

use reactor_core::TriggerKey;

/// Why a `schedule_*` call did not result in a new event on the queue.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum ScheduleError {
    /// §4.4 step 1: `stop()` has been requested and this schedule carries a
    /// nonzero delay.
    #[error("stop has been requested; schedule with nonzero delay rejected")]
    StopRequested,

    /// §4.4 step 1: the computed tag would exceed `stop_tag`.
    #[error("intended tag is past the stop tag")]
    PastStopTag,

    /// §4.4 step 4: MIT violated and the trigger's policy is `DROP`.
    #[error("minimum interarrival time violated under DROP policy")]
    MitViolationDropped,

    /// §7 `Misuse`: invalid length/value combination (e.g. non-null value
    /// with length 0), or a logical action scheduled from outside a
    /// reaction invocation (§9 redesign flag).
    #[error("invalid scheduling call: {0}")]
    Misuse(&'static str),
}

impl ScheduleError {
    /// Project this error onto the legacy integer handle contract: `0` for a
    /// clean rejection, `-1` for misuse.
    pub fn as_handle(&self) -> i64 {
        match self {
            ScheduleError::Misuse(_) => -1,
            _ => 0,
        }
    }
}

/// Programming errors: broken invariants that the source spec says should
/// abort with a diagnostic (§7) rather than be recovered from.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("trigger {0:?} not found in the reactor graph")]
    UnknownTrigger(TriggerKey),

    #[error("token reference count went negative")]
    NegativeRefCount,

    #[error("dequeued event at tag {popped} is before current tag {current}")]
    NonMonotonicTag {
        popped: reactor_core::Tag,
        current: reactor_core::Tag,
    },

    #[error("reaction panicked: {0}")]
    ReactionPanicked(String),
}
