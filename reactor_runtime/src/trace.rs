//! Trace sink interface (§4.8).
//!
//! Grounded on `original_source/include/core/trace.h`'s `trace_event_t`,
//! restricted to the non-federated taxonomy per SPEC_FULL §2-FULL (the
//! `send_*`/`receive_*`/federated variants are out of scope, §1).

use reactor_core::{ReactorKey, Tag};

/// The closed set of tracepoints the core may emit (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    ReactionStarts {
        reactor: ReactorKey,
        reaction: reactor_core::ReactionKey,
        tag: Tag,
        worker: usize,
    },
    ReactionEnds {
        reactor: ReactorKey,
        reaction: reactor_core::ReactionKey,
        tag: Tag,
        worker: usize,
    },
    ReactionDeadlineMissed {
        reactor: ReactorKey,
        reaction: reactor_core::ReactionKey,
        tag: Tag,
    },
    ScheduleCalled {
        trigger: reactor_core::TriggerKey,
        tag: Tag,
        extra_delay: i64,
    },
    UserEvent {
        message: &'static str,
    },
    UserValue {
        name: &'static str,
        value: i64,
    },
    WorkerWaitStarts {
        worker: usize,
    },
    WorkerWaitEnds {
        worker: usize,
    },
    SchedulerAdvancingTimeStarts {
        tag: Tag,
    },
    SchedulerAdvancingTimeEnds {
        tag: Tag,
    },
}

/// §4.8: "a thin interface... the core never opens files or formats
/// records; it only emits calls. A sink may drop them or buffer to a binary
/// stream."
pub trait TraceSink: Send + Sync {
    fn trace(&self, event: TraceEvent);
}

/// The default sink: drops every tracepoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TraceSink for NoopSink {
    fn trace(&self, _event: TraceEvent) {}
}

/// Forwards tracepoints to `tracing` events, serving as this crate's own
/// "ambient logging" sink (SPEC_FULL §4.8) rather than a binary writer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn trace(&self, event: TraceEvent) {
        match event {
            TraceEvent::ReactionStarts { reactor, reaction, tag, worker } => {
                tracing::trace!(?reactor, ?reaction, %tag, worker, "reaction_starts");
            }
            TraceEvent::ReactionEnds { reactor, reaction, tag, worker } => {
                tracing::trace!(?reactor, ?reaction, %tag, worker, "reaction_ends");
            }
            TraceEvent::ReactionDeadlineMissed { reactor, reaction, tag } => {
                tracing::warn!(?reactor, ?reaction, %tag, "reaction_deadline_missed");
            }
            TraceEvent::ScheduleCalled { trigger, tag, extra_delay } => {
                tracing::debug!(?trigger, %tag, extra_delay, "schedule_called");
            }
            TraceEvent::UserEvent { message } => {
                tracing::debug!(message, "user_event");
            }
            TraceEvent::UserValue { name, value } => {
                tracing::debug!(name, value, "user_value");
            }
            TraceEvent::WorkerWaitStarts { worker } => {
                tracing::trace!(worker, "worker_wait_starts");
            }
            TraceEvent::WorkerWaitEnds { worker } => {
                tracing::trace!(worker, "worker_wait_ends");
            }
            TraceEvent::SchedulerAdvancingTimeStarts { tag } => {
                tracing::debug!(%tag, "scheduler_advancing_time_starts");
            }
            TraceEvent::SchedulerAdvancingTimeEnds { tag } => {
                tracing::debug!(%tag, "scheduler_advancing_time_ends");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_sink_accepts_every_variant_without_panicking() {
        let sink = NoopSink;
        sink.trace(TraceEvent::UserEvent { message: "hello" });
        sink.trace(TraceEvent::WorkerWaitStarts { worker: 0 });
    }
}
