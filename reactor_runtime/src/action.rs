//! Action scheduling: MIT enforcement and the `schedule_*` API family
//! (§4.4).
//!
//! `schedule.h` layers five entry points (`lf_schedule`, `lf_schedule_int`,
//! `lf_schedule_token`, `lf_schedule_copy`, `lf_schedule_value`) over one
//! inner implementation (SPEC_FULL §2-FULL). [`schedule_token`] is that
//! inner implementation; the four thin wrappers below match its layering.

use reactor_core::{Tag, Timestamp, TriggerKey};

use crate::error::ScheduleError;
use crate::event::{Event, EventQueue};
use crate::token::{Token, TokenStore};
use crate::trigger::{MitPolicy, Trigger};

/// Everything [`schedule_token`] needs that isn't reachable from `trigger`
/// alone: the caller's timing context and the scheduler's stop state. Kept
/// as a plain struct (rather than borrowing a whole `Scheduler`) so this
/// module stays testable in isolation.
pub struct ScheduleRequest<'a> {
    pub trigger_key: TriggerKey,
    pub trigger: &'a Trigger,
    pub extra_delay: i64,
    pub token: Option<Token>,
    /// The current logical tag if this call originates from a reaction
    /// invocation; ignored for physical actions, which derive their base
    /// from `physical_now` instead (§4.4 step 2).
    pub current_logical_tag: Tag,
    pub physical_now: Timestamp,
    /// True only when called from within a reaction invocation of the
    /// reactor owning `trigger`. Logical actions require this (§4.4, §9
    /// redesign flag); physical actions never set it.
    pub in_reaction: bool,
    pub stop_requested: bool,
    pub stop_tag: Tag,
}

/// Handle returned to a scheduling caller: positive on acceptance, matching
/// the "positive monotonic handle" contract of §4.4. Rejections and misuse
/// are `Err`, mapped to `0`/`-1` at the API boundary via
/// [`ScheduleError::as_handle`].
pub type ScheduleResult = Result<i64, ScheduleError>;

/// The one inner implementation every `schedule_*` wrapper bottoms out in
/// (§4.4).
pub fn schedule_token(
    events: &mut EventQueue,
    store: &TokenStore,
    req: ScheduleRequest<'_>,
) -> ScheduleResult {
    if req.trigger.kind.is_logical() && !req.in_reaction {
        return Err(ScheduleError::Misuse(
            "logical actions may only be scheduled from within a reaction invocation",
        ));
    }

    // Step 1: fail-fast conditions.
    if req.stop_requested && req.extra_delay > 0 {
        release(req.token, store);
        return Err(ScheduleError::StopRequested);
    }

    // Step 2-3: compute the intended tag.
    let base = if req.trigger.kind.is_physical() {
        Tag::new(req.physical_now, 0)
    } else {
        req.current_logical_tag
    };
    let mut intended_tag = base.delay(req.trigger.offset + req.extra_delay);
    if req.trigger.kind.is_physical() {
        let time = intended_tag.time().as_nanos().max(req.physical_now.as_nanos());
        intended_tag = Tag::new(Timestamp::from_nanos(time), 0);
    }

    if intended_tag > req.stop_tag {
        release(req.token, store);
        return Err(ScheduleError::PastStopTag);
    }

    // Step 4: MIT enforcement.
    let last_tag = req.trigger.last_tag();
    if let Some(last_tag) = last_tag {
        let elapsed = intended_tag.time_since(last_tag);
        if elapsed < req.trigger.mit {
            match req.trigger.policy {
                MitPolicy::Drop => {
                    release(req.token, store);
                    return Err(ScheduleError::MitViolationDropped);
                }
                MitPolicy::Defer => {
                    intended_tag = last_tag.add_interval(req.trigger.mit);
                    if intended_tag > req.stop_tag {
                        release(req.token, store);
                        return Err(ScheduleError::PastStopTag);
                    }
                }
                MitPolicy::Replace => {
                    if let Some(handle) = events.find_pending(req.trigger_key, last_tag) {
                        let old = events.replace_token(handle, req.token);
                        release(old, store);
                        return Ok(handle.sequence() as i64 + 1);
                    }
                    release(req.token, store);
                    return Err(ScheduleError::MitViolationDropped);
                }
            }
        }
    }

    // Step 5: accept.
    req.trigger.set_last_tag(intended_tag);
    let handle = events.push(Event {
        trigger: req.trigger_key,
        tag: intended_tag,
        token: req.token,
    });
    Ok(handle.sequence() as i64 + 1)
}

fn release(token: Option<Token>, store: &TokenStore) {
    if let Some(token) = token {
        token.release(store);
    }
}

/// `lf_schedule(action, extra_delay)`: no payload.
pub fn schedule(events: &mut EventQueue, store: &TokenStore, req: ScheduleRequest<'_>) -> ScheduleResult {
    schedule_token(events, store, req)
}

/// `lf_schedule_int(action, extra_delay, value)`: schedules a freshly
/// initialized token carrying a plain `i32`.
pub fn schedule_int(
    events: &mut EventQueue,
    store: &TokenStore,
    mut req: ScheduleRequest<'_>,
    value: i32,
) -> ScheduleResult {
    let token = store.initialize_with_value(None, value, 1, std::mem::size_of::<i32>());
    req.token = Some(token);
    schedule_token(events, store, req)
}

/// `lf_schedule_copy(action, offset, value, length)`: copies `value` into a
/// freshly (or recycled) initialized token.
pub fn schedule_copy<T: Send + Clone + 'static>(
    events: &mut EventQueue,
    store: &TokenStore,
    mut req: ScheduleRequest<'_>,
    value: &T,
    length: usize,
) -> ScheduleResult {
    let token = store.initialize_with_value(None, value.clone(), length, std::mem::size_of::<T>());
    req.token = Some(token);
    schedule_token(events, store, req)
}

/// `lf_schedule_value(action, extra_delay, owned_value, length)`: hands the
/// scheduler an already-owned value to wrap in a token.
pub fn schedule_value<T: Send + 'static>(
    events: &mut EventQueue,
    store: &TokenStore,
    mut req: ScheduleRequest<'_>,
    value: T,
    length: usize,
) -> ScheduleResult {
    let token = store.initialize_with_value(None, value, length, std::mem::size_of::<T>());
    req.token = Some(token);
    schedule_token(events, store, req)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::TriggerKind;
    use reactor_core::Timestamp;

    fn mk_trigger(mit: i64, policy: MitPolicy) -> Trigger {
        Trigger::new("a", TriggerKind::LogicalAction, 0, mit, policy, vec![], 0)
    }

    fn base_req<'a>(trigger_key: TriggerKey, trigger: &'a Trigger, extra_delay: i64, tag: Tag) -> ScheduleRequest<'a> {
        ScheduleRequest {
            trigger_key,
            trigger,
            extra_delay,
            token: None,
            current_logical_tag: tag,
            physical_now: Timestamp::ZERO,
            in_reaction: true,
            stop_requested: false,
            stop_tag: Tag::FOREVER,
        }
    }

    #[test]
    fn mit_drop_rejects_too_soon_schedule() {
        let trigger = mk_trigger(10_000_000, MitPolicy::Drop);
        let mut events = EventQueue::new();
        let store = TokenStore::new();
        let key = TriggerKey::from(0);

        let r1 = schedule(&mut events, &store, base_req(key, &trigger, 0, Tag::ZERO));
        assert_eq!(r1.unwrap(), 1);

        let r2 = schedule(&mut events, &store, base_req(key, &trigger, 5_000_000, Tag::ZERO));
        assert_eq!(r2, Err(ScheduleError::MitViolationDropped));

        let r3 = schedule(&mut events, &store, base_req(key, &trigger, 12_000_000, Tag::ZERO));
        assert!(r3.unwrap() > 0);
    }

    #[test]
    fn mit_defer_pushes_tag_forward() {
        let trigger = mk_trigger(10_000_000, MitPolicy::Defer);
        let mut events = EventQueue::new();
        let store = TokenStore::new();
        let key = TriggerKey::from(0);

        schedule(&mut events, &store, base_req(key, &trigger, 0, Tag::ZERO)).unwrap();
        schedule(&mut events, &store, base_req(key, &trigger, 5_000_000, Tag::ZERO)).unwrap();
        schedule(&mut events, &store, base_req(key, &trigger, 15_000_000, Tag::ZERO)).unwrap();

        let mut tags = Vec::new();
        while let Some(e) = events.pop_min() {
            tags.push(e.tag.time().as_nanos());
        }
        assert_eq!(tags, vec![0, 10_000_000, 20_000_000]);
    }

    #[test]
    fn mit_replace_overwrites_pending_payload() {
        let trigger = mk_trigger(10_000_000, MitPolicy::Replace);
        let mut events = EventQueue::new();
        let store = TokenStore::new();
        let key = TriggerKey::from(0);

        let mut req1 = base_req(key, &trigger, 0, Tag::ZERO);
        req1.token = Some(store.initialize_with_value(None, 1u32, 1, 4));
        schedule(&mut events, &store, req1).unwrap();

        let mut req2 = base_req(key, &trigger, 5_000_000, Tag::ZERO);
        req2.token = Some(store.initialize_with_value(None, 2u32, 1, 4));
        let handle = schedule(&mut events, &store, req2).unwrap();
        assert!(handle > 0);

        assert_eq!(events.len(), 1);
        let pending = events.pop_min().unwrap();
        pending.token.unwrap().with_value::<u32, _>(|v| assert_eq!(v, Some(&2)));
    }

    #[test]
    fn logical_action_outside_reaction_is_misuse() {
        let trigger = mk_trigger(0, MitPolicy::Drop);
        let mut events = EventQueue::new();
        let store = TokenStore::new();
        let key = TriggerKey::from(0);
        let mut req = base_req(key, &trigger, 0, Tag::ZERO);
        req.in_reaction = false;
        let result = schedule(&mut events, &store, req);
        assert!(matches!(result, Err(ScheduleError::Misuse(_))));
    }

    #[test]
    fn stop_requested_rejects_nonzero_delay() {
        let trigger = mk_trigger(0, MitPolicy::Drop);
        let mut events = EventQueue::new();
        let store = TokenStore::new();
        let key = TriggerKey::from(0);
        let mut req = base_req(key, &trigger, 1, Tag::ZERO);
        req.stop_requested = true;
        let result = schedule(&mut events, &store, req);
        assert_eq!(result, Err(ScheduleError::StopRequested));
    }

    #[test]
    fn mit_defer_past_stop_tag_is_rejected() {
        let trigger = mk_trigger(10_000_000, MitPolicy::Defer);
        let mut events = EventQueue::new();
        let store = TokenStore::new();
        let key = TriggerKey::from(0);
        let stop_tag = Tag::new(Timestamp::from_nanos(12_000_000), 0);

        let mut first = base_req(key, &trigger, 0, Tag::ZERO);
        first.stop_tag = stop_tag;
        schedule(&mut events, &store, first).unwrap();

        // Deferred to last_tag + mit = 10ms, which is still within stop_tag.
        let mut second = base_req(key, &trigger, 3_000_000, Tag::ZERO);
        second.stop_tag = stop_tag;
        schedule(&mut events, &store, second).unwrap();

        // The pre-MIT intended tag (3ms) is still within stop_tag, but MIT
        // defers it to last_tag (10ms) + mit (10ms) = 20ms, which is past
        // the 12ms stop_tag: must be rejected rather than silently queued
        // beyond the run's end (§4.5, §7).
        let mut third = base_req(key, &trigger, 3_000_000, Tag::ZERO);
        third.stop_tag = stop_tag;
        let result = schedule(&mut events, &store, third);
        assert_eq!(result, Err(ScheduleError::PastStopTag));
    }
}
