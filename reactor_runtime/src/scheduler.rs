//! The scheduler core (§4.5, §5): `STARTUP` → `ADVANCE` → `EXECUTE(tag)` →
//! `DISPATCH` → `FINISH_STEP`.
//!
//! Grounded on the teacher's non-federated scheduler
//! (`boomerang_runtime/src/sched/{mod,common,nonfed}.rs`): a `Mutex`-guarded
//! state struct, a `Condvar` for the `ADVANCE` wait, and a `crossbeam_channel`
//! pair carrying physical-action events in from arbitrary threads, matching
//! the teacher's `event_tx`/`event_rx`. Reaction dispatch within a level runs
//! on the calling ("leader") thread by default; with the `parallel` feature
//! enabled, reactions at the same level whose `chain_id` bitmasks are
//! disjoint are instead handed to `rayon`'s `par_bridge`, matching §5's
//! guarantee that toggling the feature never changes *which* `(tag,
//! reaction)` pairs run, only their wall-clock concurrency.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use reactor_core::{ReactionKey, Tag};

use crate::clock::{sleep_until, PhysicalClock, SystemClock};
use crate::config::Config;
use crate::context::Context;
use crate::error::RuntimeError;
use crate::event::{Event, EventQueue};
use crate::graph::ReactorGraph;
use crate::reaction::ReactionQueue;
use crate::token::TokenStore;
use crate::trace::{NoopSink, TraceEvent, TraceSink};

/// A physical-action schedule request arriving from outside any reaction
/// invocation (§4.4, §5: "physical actions may be scheduled from any
/// thread").
pub struct PhysicalEvent {
    pub event: Event,
}

/// Mutable scheduler state behind the single scheduler mutex of §5: the
/// event queue, reaction queue, current tag, and stop state.
struct SchedulerState {
    events: EventQueue,
    reactions: ReactionQueue,
    current_tag: Tag,
    stop_requested: bool,
    stop_tag: Tag,
}

/// The non-federated scheduler (§4.5). Single-process, single-leader: one
/// call into [`Scheduler::run`] drives `STARTUP` through to termination.
pub struct Scheduler {
    pub graph: ReactorGraph,
    store: TokenStore,
    trace: Box<dyn TraceSink>,
    clock: Box<dyn PhysicalClock>,
    config: Config,
    start_time: reactor_core::Timestamp,
    state: Mutex<SchedulerState>,
    advance_cv: Condvar,
    physical_tx: Sender<PhysicalEvent>,
    physical_rx: Receiver<PhysicalEvent>,
    /// Sized from `config.workers` (§5: "a fixed pool of worker threads").
    /// Only built under the `parallel` feature: without it, dispatch always
    /// runs on the calling thread and a pool would sit idle.
    #[cfg(feature = "parallel")]
    thread_pool: rayon::ThreadPool,
}

impl Scheduler {
    pub fn new(graph: ReactorGraph, config: Config) -> Self {
        let (physical_tx, physical_rx) = crossbeam_channel::unbounded();
        Self {
            graph,
            store: TokenStore::new(),
            trace: Box::new(NoopSink),
            clock: Box::new(SystemClock),
            #[cfg(feature = "parallel")]
            thread_pool: rayon::ThreadPoolBuilder::new()
                .num_threads(config.workers)
                .build()
                .expect("failed to build the reaction dispatch thread pool"),
            config,
            start_time: reactor_core::Timestamp::ZERO,
            state: Mutex::new(SchedulerState {
                events: EventQueue::new(),
                reactions: ReactionQueue::new(),
                current_tag: Tag::ZERO,
                stop_requested: false,
                stop_tag: Tag::FOREVER,
            }),
            advance_cv: Condvar::new(),
            physical_tx,
            physical_rx,
        }
    }

    pub fn with_trace_sink(mut self, sink: impl TraceSink + 'static) -> Self {
        self.trace = Box::new(sink);
        self
    }

    pub fn with_clock(mut self, clock: impl PhysicalClock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// A sender reactions/other threads can clone to push physical-action
    /// events in from outside a reaction invocation (§4.4, §5).
    pub fn physical_sender(&self) -> Sender<PhysicalEvent> {
        self.physical_tx.clone()
    }

    /// Acquire the scheduler lock, recovering from poisoning rather than
    /// propagating it. A panicking reaction (§7, S9) must not take down
    /// every future lock acquisition; the mutex's poison flag exists for
    /// invariant violations elsewhere, not for this expected case.
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `request_stop()` (§4.5, §6): cooperative, takes effect at the next
    /// `ADVANCE`.
    pub fn request_stop(&self) {
        let mut state = self.lock_state();
        state.stop_requested = true;
        self.advance_cv.notify_all();
    }

    /// `STARTUP` (§4.5): run startup reactions (none declared by this core;
    /// a code generator would enqueue them here) and prime timers, then
    /// enter the `ADVANCE`/`EXECUTE`/`DISPATCH`/`FINISH_STEP` loop until
    /// termination.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        self.start_time = self.clock.now();
        if let Some(timeout) = self.config.timeout {
            self.lock_state().stop_tag = Tag::new(timeout, 0);
        }
        self.initialize_timers()?;

        loop {
            self.drain_physical_events();
            let Some(tag) = self.advance()? else {
                break;
            };
            self.trace.trace(TraceEvent::SchedulerAdvancingTimeStarts { tag });
            self.execute(tag)?;
            self.dispatch()?;
            self.finish_step(tag)?;
            self.trace.trace(TraceEvent::SchedulerAdvancingTimeEnds { tag });

            let stop_tag = self.lock_state().stop_tag;
            if tag >= stop_tag {
                break;
            }
        }
        Ok(())
    }

    fn initialize_timers(&mut self) -> Result<(), RuntimeError> {
        for (idx, trigger) in self.graph.triggers.iter().enumerate() {
            if let crate::trigger::TriggerKind::Timer { .. } = trigger.kind {
                let key = reactor_core::TriggerKey::from(idx);
                let tag = Tag::ZERO.delay(trigger.offset);
                let mut state = self.lock_state();
                state.events.push(Event { trigger: key, tag, token: None });
            }
        }
        Ok(())
    }

    fn drain_physical_events(&mut self) {
        let mut state = self.lock_state();
        for physical in self.physical_rx.try_iter() {
            state.events.push(physical.event);
        }
    }

    /// `ADVANCE` (§4.5): sleep until the next event tag (or wake on an
    /// external physical event), or terminate.
    fn advance(&mut self) -> Result<Option<Tag>, RuntimeError> {
        let mut state = self.lock_state();
        loop {
            if let Some(tag) = state.events.peek_min_tag() {
                if !self.config.fast_forward {
                    drop(state);
                    let target = self.start_time.saturating_add(
                        tag.time().as_nanos().saturating_add(self.config.stp_offset),
                    );
                    self.trace.trace(TraceEvent::WorkerWaitStarts { worker: 0 });
                    let woken = sleep_until(self.clock.as_ref(), target, &self.physical_rx);
                    self.trace.trace(TraceEvent::WorkerWaitEnds { worker: 0 });
                    state = self.lock_state();
                    // A physical event may have woken us with an earlier tag;
                    // fold it (and any others that arrived meanwhile) in and
                    // loop back around to re-peek.
                    if let Some(physical) = woken {
                        state.events.push(physical.event);
                    }
                    for physical in self.physical_rx.try_iter() {
                        state.events.push(physical.event);
                    }
                    continue;
                }
                return Ok(Some(tag));
            }
            if state.stop_requested || !self.config.keep_alive {
                return Ok(None);
            }
            self.trace.trace(TraceEvent::WorkerWaitStarts { worker: 0 });
            let (guard, _timeout) = self
                .advance_cv
                .wait_timeout(state, Duration::from_millis(50))
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            self.trace.trace(TraceEvent::WorkerWaitEnds { worker: 0 });
            state = guard;
            for physical in self.physical_rx.try_iter() {
                state.events.push(physical.event);
            }
        }
    }

    /// `EXECUTE(tag)` (§4.5): pop every event at `tag`, mark triggered ports
    /// present, and enqueue dependent reactions.
    fn execute(&mut self, tag: Tag) -> Result<(), RuntimeError> {
        let mut state = self.lock_state();
        // §8 testable property 1: `current_tag` is non-decreasing across
        // every `EXECUTE`. §7: a dequeued event behind the current tag is a
        // programming error, not a recoverable condition — abort with a
        // diagnostic, mirroring the ref-count assertion in token.rs.
        if tag < state.current_tag {
            panic!(
                "{}",
                RuntimeError::NonMonotonicTag { popped: tag, current: state.current_tag }
            );
        }
        state.current_tag = tag;
        let batch = state.events.pop_all_at_min_tag();
        drop(state);

        for event in batch {
            self.trace.trace(TraceEvent::ScheduleCalled {
                trigger: event.trigger,
                tag,
                extra_delay: 0,
            });
            let trigger = self.graph.trigger(event.trigger);
            let mut state = self.lock_state();
            for &reaction_key in &trigger.dependents {
                let reaction = self.graph.reaction(reaction_key);
                if reaction.status() == crate::reaction::ReactionStatus::Queued {
                    continue;
                }
                reaction.set_status(crate::reaction::ReactionStatus::Queued);
                let index = reaction.priority_index();
                state.reactions.push(index, reaction_key);
            }

            // Periodic timers re-arm themselves (§4.5 `STARTUP`: "initialize
            // timers"; a periodic timer's next firing is `tag.time + period`,
            // not derived from MIT, since timers have no `last_tag` policy).
            if let crate::trigger::TriggerKind::Timer { period: Some(period) } = trigger.kind {
                let next = Tag::new(tag.time().saturating_add(period), 0);
                if next <= state.stop_tag {
                    state.events.push(Event { trigger: event.trigger, tag: next, token: None });
                }
            }
        }
        Ok(())
    }

    /// `DISPATCH` (§4.5, §5): drain the reaction queue, grouping same-level
    /// reactions into chain-disjoint batches so that a batch may run
    /// concurrently (under `parallel`) while preserving the rule that a
    /// reaction at level `L` only starts after all overlapping reactions at
    /// levels `< L` have finished.
    fn dispatch(&mut self) -> Result<(), RuntimeError> {
        loop {
            let mut state = self.lock_state();
            let Some(level) = state.reactions.peek_min_level() else {
                break;
            };
            let mut batch = Vec::new();
            while state.reactions.peek_min_level() == Some(level) {
                let (_, key) = state.reactions.pop_min().expect("peeked level implies a pop succeeds");
                batch.push(key);
            }
            let current_tag = state.current_tag;
            drop(state);

            self.run_batch(&batch, current_tag)?;
        }
        Ok(())
    }

    fn run_batch(&mut self, batch: &[ReactionKey], tag: Tag) -> Result<(), RuntimeError> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            let groups = partition_disjoint_chains(batch, &self.graph);
            for group in groups {
                let results: Vec<_> = self
                    .thread_pool
                    .install(|| group.par_iter().map(|&key| self.invoke_reaction(key, tag)).collect());
                for result in results {
                    result?;
                }
            }
            return Ok(());
        }
        #[cfg(not(feature = "parallel"))]
        {
            for &key in batch {
                self.invoke_reaction(key, tag)?;
            }
            Ok(())
        }
    }

    fn invoke_reaction(&self, key: ReactionKey, tag: Tag) -> Result<(), RuntimeError> {
        let reaction = self.graph.reaction(key);
        self.trace.trace(TraceEvent::ReactionStarts {
            reactor: reaction.reactor,
            reaction: key,
            tag,
            worker: 0,
        });
        reaction.set_status(crate::reaction::ReactionStatus::Running);

        let start_physical = self.clock.now();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut state = self.lock_state();
            let mut stop_requested = state.stop_requested;
            let stop_tag = state.stop_tag;
            let mut ctx = Context {
                current_tag: tag,
                physical_now: start_physical,
                stop_requested,
                stop_tag,
                events: &mut state.events,
                store: &self.store,
                request_stop: &mut stop_requested,
            };
            // Route through the one `check_deadline` implementation (§4.7,
            // §6) rather than re-deriving the lag here.
            let missed =
                reaction.deadline != i64::MAX && ctx.check_deadline(start_physical, reaction.deadline);
            if missed {
                self.trace.trace(TraceEvent::ReactionDeadlineMissed {
                    reactor: reaction.reactor,
                    reaction: key,
                    tag,
                });
                if let Some(handler) = &reaction.deadline_handler {
                    handler(&mut ctx);
                } else {
                    (reaction.body)(&mut ctx);
                }
            } else {
                (reaction.body)(&mut ctx);
            }
            if stop_requested {
                state.stop_requested = true;
            }
        }));

        reaction.set_status(crate::reaction::ReactionStatus::Inactive);
        self.trace.trace(TraceEvent::ReactionEnds {
            reactor: reaction.reactor,
            reaction: key,
            tag,
            worker: 0,
        });

        if let Err(panic) = outcome {
            // §9 S9: a panicking reaction must not poison the rest of the
            // run, so this is logged and swallowed rather than returned as
            // an `Err` — the diagnostic is still the crate's own error type.
            let err = RuntimeError::ReactionPanicked(panic_message(&panic).to_string());
            self.trace.trace(TraceEvent::UserEvent { message: "reaction panicked, continuing" });
            tracing::error!(reaction = %reaction.name, %err, "reaction panicked; continuing with remaining reactions");
        }
        Ok(())
    }

    /// `FINISH_STEP` (§4.5, §4.6): reset every port (`is_present = false`,
    /// `unref` tokens), run shutdown reactions if stop has been requested,
    /// and compute the next `stop_tag`.
    fn finish_step(&mut self, tag: Tag) -> Result<(), RuntimeError> {
        for port in &mut self.graph.ports {
            port.cleanup(&self.store);
        }

        let mut state = self.lock_state();
        if state.stop_requested && state.stop_tag == Tag::FOREVER {
            state.stop_tag = tag.delay(0);
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &'static str {
    if payload.downcast_ref::<&'static str>().is_some() {
        "panic (static str)"
    } else if payload.downcast_ref::<String>().is_some() {
        "panic (String)"
    } else {
        "panic (unknown payload)"
    }
}

#[cfg(feature = "parallel")]
fn partition_disjoint_chains<'g>(
    batch: &[ReactionKey],
    graph: &'g ReactorGraph,
) -> Vec<Vec<ReactionKey>> {
    let mut groups: Vec<(crate::reaction::ChainId, Vec<ReactionKey>)> = Vec::new();
    for &key in batch {
        let chain = graph.reactions[reactor_core::Key::index(&key)].chain_id;
        if let Some((mask, members)) = groups.iter_mut().find(|(mask, _)| !mask.overlapping(chain)) {
            mask.0 |= chain.0;
            members.push(key);
        } else {
            groups.push((chain, vec![key]));
        }
    }
    groups.into_iter().map(|(_, members)| members).collect()
}
