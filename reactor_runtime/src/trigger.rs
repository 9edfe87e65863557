//! Trigger descriptors (§3): timers, logical/physical actions, and ports as
//! event sources.

use reactor_core::{PortKey, ReactionKey, Tag};
use std::sync::Mutex;

/// What kind of event source a [`Trigger`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Timer { period: Option<i64> },
    LogicalAction,
    PhysicalAction,
    Port(PortKey),
}

impl TriggerKind {
    pub fn is_logical(&self) -> bool {
        matches!(self, TriggerKind::Timer { .. } | TriggerKind::LogicalAction)
    }

    pub fn is_physical(&self) -> bool {
        matches!(self, TriggerKind::PhysicalAction)
    }
}

/// Policy for handling a minimum-interarrival-time (MIT) violation (§3, §4.4,
/// glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MitPolicy {
    /// Drop the event and `unref` its token.
    #[default]
    Drop,
    /// Push the intended tag out to `last_tag + mit`.
    Defer,
    /// Replace the payload of any event still pending at `last_tag`; behaves
    /// as `Drop` if none is pending.
    Replace,
}

/// A timer, logical action, or physical action descriptor (§3).
///
/// `last_tag` is mutated only under the scheduler lock (§5), hence the
/// `Mutex` rather than a bare field.
pub struct Trigger {
    pub name: String,
    pub kind: TriggerKind,
    /// Minimum delay (`offset`).
    pub offset: i64,
    /// Minimum interarrival time.
    pub mit: i64,
    pub policy: MitPolicy,
    last_tag: Mutex<Option<Tag>>,
    /// Reactions that fire when this trigger's event is popped.
    pub dependents: Vec<ReactionKey>,
    /// Size of the token payload this trigger carries, in bytes.
    pub element_size: usize,
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("offset", &self.offset)
            .field("mit", &self.mit)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Trigger {
    pub fn new(
        name: impl Into<String>,
        kind: TriggerKind,
        offset: i64,
        mit: i64,
        policy: MitPolicy,
        dependents: Vec<ReactionKey>,
        element_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            offset,
            mit,
            policy,
            last_tag: Mutex::new(None),
            dependents,
            element_size,
        }
    }

    pub fn last_tag(&self) -> Option<Tag> {
        *self.last_tag.lock().expect("trigger lock poisoned")
    }

    pub fn set_last_tag(&self, tag: Tag) {
        *self.last_tag.lock().expect("trigger lock poisoned") = Some(tag);
    }
}
