//! The reaction-invocation context (§6): the handle every reaction body
//! receives, bundling `schedule_*`, port setters, and `check_deadline`.
//!
//! Grounded on the teacher's `boomerang_runtime/src/context.rs` `Context`
//! struct, adapted to this crate's token/MIT-aware `schedule_token` instead
//! of the teacher's `ActionStore::push`.

use reactor_core::{Tag, Timestamp, TriggerKey};

use crate::action::{self, ScheduleRequest, ScheduleResult};
use crate::event::EventQueue;
use crate::token::{Token, TokenStore};
use crate::trigger::Trigger;

/// Passed by the scheduler into every reaction invocation. Borrows the
/// pieces of scheduler state a reaction is allowed to touch; everything
/// else (the reaction queue, other reactors' ports) stays behind the
/// scheduler lock (§5).
pub struct Context<'a> {
    pub(crate) current_tag: Tag,
    pub(crate) physical_now: Timestamp,
    pub(crate) stop_requested: bool,
    pub(crate) stop_tag: Tag,
    pub(crate) events: &'a mut EventQueue,
    pub(crate) store: &'a TokenStore,
    pub(crate) request_stop: &'a mut bool,
}

impl<'a> Context<'a> {
    pub fn tag(&self) -> Tag {
        self.current_tag
    }

    pub fn physical_time(&self) -> Timestamp {
        self.physical_now
    }

    /// `check_deadline(self, invoke)` (§4.7): true if the reaction missed
    /// its deadline, measured from the caller-recorded `start_physical`.
    pub fn check_deadline(&self, start_physical: Timestamp, deadline_ns: i64) -> bool {
        let lag = start_physical.as_nanos() - self.current_tag.time().as_nanos();
        lag > deadline_ns
    }

    /// `request_stop()` (§4.5, §6): cooperative; takes effect on the next
    /// `ADVANCE`.
    pub fn request_stop(&mut self) {
        *self.request_stop = true;
    }

    /// `schedule(action, extra_delay)` (§6): no payload.
    pub fn schedule(&mut self, trigger_key: TriggerKey, trigger: &Trigger, extra_delay: i64) -> ScheduleResult {
        action::schedule(self.events, self.store, self.request(trigger_key, trigger, extra_delay, None))
    }

    /// `schedule_int(action, extra_delay, value)` (§6).
    pub fn schedule_int(&mut self, trigger_key: TriggerKey, trigger: &Trigger, extra_delay: i64, value: i32) -> ScheduleResult {
        action::schedule_int(self.events, self.store, self.request(trigger_key, trigger, extra_delay, None), value)
    }

    /// `schedule_token(action, extra_delay, token)` (§6): forward an
    /// already-constructed token.
    pub fn schedule_token(&mut self, trigger_key: TriggerKey, trigger: &Trigger, extra_delay: i64, token: Token) -> ScheduleResult {
        action::schedule_token(self.events, self.store, self.request(trigger_key, trigger, extra_delay, Some(token)))
    }

    /// `schedule_copy(action, offset, value, length)` (§6).
    pub fn schedule_copy<T: Send + Clone + 'static>(
        &mut self,
        trigger_key: TriggerKey,
        trigger: &Trigger,
        extra_delay: i64,
        value: &T,
        length: usize,
    ) -> ScheduleResult {
        action::schedule_copy(self.events, self.store, self.request(trigger_key, trigger, extra_delay, None), value, length)
    }

    /// `schedule_value(action, extra_delay, owned_value, length)` (§6).
    pub fn schedule_value<T: Send + 'static>(
        &mut self,
        trigger_key: TriggerKey,
        trigger: &Trigger,
        extra_delay: i64,
        value: T,
        length: usize,
    ) -> ScheduleResult {
        action::schedule_value(self.events, self.store, self.request(trigger_key, trigger, extra_delay, None), value, length)
    }

    fn request<'t>(&self, trigger_key: TriggerKey, trigger: &'t Trigger, extra_delay: i64, token: Option<Token>) -> ScheduleRequest<'t> {
        ScheduleRequest {
            trigger_key,
            trigger,
            extra_delay,
            token,
            current_logical_tag: self.current_tag,
            physical_now: self.physical_now,
            in_reaction: true,
            stop_requested: self.stop_requested,
            stop_tag: self.stop_tag,
        }
    }
}
