//! The tagged event queue (§3, §4.3).

use reactor_core::{Tag, TriggerKey};

use crate::queue::{Handle, IndexedMinHeap};
use crate::token::Token;

/// An entry on the event queue: a trigger due to fire at `tag`, carrying an
/// optional payload (§3). The "chain for same-trigger coalescing" of §3 is
/// realized by [`EventQueue::find_pending`] rather than an explicit `next`
/// pointer: REPLACE only ever needs to find the single event still pending
/// for a trigger at its own `last_tag`, which a side index answers directly
/// without walking a list.
#[derive(Debug, Clone)]
pub struct Event {
    pub trigger: TriggerKey,
    pub tag: Tag,
    pub token: Option<Token>,
}

/// An event's position in the queue, also its "monotonic sequence id for
/// stable tie-breaking" (§3).
pub type EventHandle = Handle;

/// Min-heap of [`Event`]s keyed on `(tag, sequence_id)` (§4.3), with a side
/// index from trigger to its currently-pending handles so MIT's `REPLACE`
/// policy can locate "any pending event for this trigger at `last_tag`"
/// (§4.4) without a linear scan.
#[derive(Default)]
pub struct EventQueue {
    heap: IndexedMinHeap<Tag, Event>,
    pending_by_trigger: std::collections::HashMap<TriggerKey, Vec<EventHandle>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// `push` (§4.3).
    pub fn push(&mut self, event: Event) -> EventHandle {
        let trigger = event.trigger;
        let tag = event.tag;
        let handle = self.heap.push(tag, event);
        self.pending_by_trigger
            .entry(trigger)
            .or_default()
            .push(handle);
        handle
    }

    /// `peek_min` (§4.3).
    pub fn peek_min_tag(&mut self) -> Option<Tag> {
        self.heap.peek_min().map(|(tag, _)| *tag)
    }

    /// `pop_min` (§4.3). Drops the popped handle from the pending index.
    pub fn pop_min(&mut self) -> Option<Event> {
        let (_, event) = self.heap.pop_min()?;
        self.forget_pending(event.trigger, event.tag);
        Some(event)
    }

    /// Pop every event whose tag equals the current minimum, as `EXECUTE`
    /// does in §4.5 ("pop all events with tag equal to the head").
    pub fn pop_all_at_min_tag(&mut self) -> Vec<Event> {
        let Some(min_tag) = self.peek_min_tag() else {
            return Vec::new();
        };
        let mut batch = Vec::new();
        while self.peek_min_tag() == Some(min_tag) {
            batch.push(self.pop_min().expect("peeked tag implies a pop succeeds"));
        }
        batch
    }

    /// `remove(handle)` (§4.3): used when a scheduled action is dropped or
    /// replaced.
    pub fn remove(&mut self, handle: EventHandle) -> Option<Event> {
        let event = self.heap.remove(handle)?;
        self.forget_pending(event.trigger, event.tag);
        Some(event)
    }

    /// Locate a still-pending event for `trigger` at exactly `tag`, for the
    /// `REPLACE` MIT policy (§4.4).
    pub fn find_pending(&self, trigger: TriggerKey, tag: Tag) -> Option<EventHandle> {
        self.pending_by_trigger.get(&trigger)?.iter().copied().find(|&h| {
            self.heap
                .get(h)
                .is_some_and(|event| event.tag == tag)
        })
    }

    /// Mutate the token carried by a still-pending event in place (`REPLACE`,
    /// §4.4), returning the token that was displaced so the caller can
    /// `unref` it.
    pub fn replace_token(&mut self, handle: EventHandle, new_token: Option<Token>) -> Option<Token> {
        let event = self.heap.get_mut(handle)?;
        std::mem::replace(&mut event.token, new_token)
    }

    fn forget_pending(&mut self, trigger: TriggerKey, tag: Tag) {
        if let Some(handles) = self.pending_by_trigger.get_mut(&trigger) {
            handles.retain(|&h| self.heap.get(h).is_some_and(|e| e.tag != tag));
            if handles.is_empty() {
                self.pending_by_trigger.remove(&trigger);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reactor_core::Timestamp;

    fn tag(ns: i64) -> Tag {
        Tag::new(Timestamp::from_nanos(ns), 0)
    }

    #[test]
    fn pops_in_tag_order_across_triggers() {
        let mut q = EventQueue::new();
        let t1 = TriggerKey::from(1);
        let t2 = TriggerKey::from(2);
        q.push(Event { trigger: t2, tag: tag(20), token: None });
        q.push(Event { trigger: t1, tag: tag(10), token: None });
        assert_eq!(q.pop_min().unwrap().trigger, t1);
        assert_eq!(q.pop_min().unwrap().trigger, t2);
        assert!(q.pop_min().is_none());
    }

    #[test]
    fn pop_all_at_min_tag_batches_simultaneous_events() {
        let mut q = EventQueue::new();
        let t1 = TriggerKey::from(1);
        let t2 = TriggerKey::from(2);
        let t3 = TriggerKey::from(3);
        q.push(Event { trigger: t1, tag: tag(10), token: None });
        q.push(Event { trigger: t2, tag: tag(10), token: None });
        q.push(Event { trigger: t3, tag: tag(20), token: None });
        let batch = q.pop_all_at_min_tag();
        assert_eq!(batch.len(), 2);
        assert_eq!(q.peek_min_tag(), Some(tag(20)));
    }

    #[test]
    fn find_pending_and_replace_token() {
        let mut q = EventQueue::new();
        let trigger = TriggerKey::from(1);
        let handle = q.push(Event { trigger, tag: tag(0), token: None });
        let found = q.find_pending(trigger, tag(0));
        assert_eq!(found, Some(handle));
        assert!(q.find_pending(trigger, tag(5)).is_none());
        let displaced = q.replace_token(handle, None);
        assert!(displaced.is_none());
    }

    #[test]
    fn remove_clears_pending_index() {
        let mut q = EventQueue::new();
        let trigger = TriggerKey::from(1);
        let handle = q.push(Event { trigger, tag: tag(0), token: None });
        assert!(q.remove(handle).is_some());
        assert!(q.find_pending(trigger, tag(0)).is_none());
    }
}
