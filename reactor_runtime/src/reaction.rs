//! Reactions and the dependency-respecting reaction priority queue (§3, §4.3,
//! §4.5, §5).

use std::panic::{RefUnwindSafe, UnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};

use reactor_core::{PortKey, ReactorKey};

use crate::context::Context;
use crate::queue::{Handle, IndexedMinHeap};

/// Topological rank (§3, §4.5): a reaction at level `L` may only start once
/// every queued/running reaction at a lower level it overlaps with has
/// finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Level(pub u16);

/// Bitmask of mutually exclusive reaction chains (§3, §5, §9 design notes).
///
/// Limited to 64 disjoint chains as the design notes call out; an
/// implementation that needs more would fall back to a boolean dependency
/// matrix, which this crate does not implement (§9: flagged as a known
/// limitation, not resolved here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainId(pub u64);

impl ChainId {
    pub const NONE: Self = Self(0);

    /// `OVERLAPPING(a, b)` (§4.5, §5): true if the two chain bitmasks share
    /// any bit, meaning the reactions may NOT run concurrently.
    pub fn overlapping(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }
}

/// Composite dispatch priority: deadline in the high 48 bits, level in the
/// low 16 (§3, §4.3). Kept as a documented bit-layout contract per the
/// design notes rather than a plain tuple, matching the source's
/// `index = (deadline << 16) | level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PriorityIndex(u64);

impl PriorityIndex {
    const LEVEL_BITS: u32 = 16;
    const DEADLINE_MASK: u64 = (1u64 << 48) - 1;

    pub fn new(deadline_ns: i64, level: Level) -> Self {
        let deadline = (deadline_ns.max(0) as u64) & Self::DEADLINE_MASK;
        Self((deadline << Self::LEVEL_BITS) | u64::from(level.0))
    }

    pub fn level(self) -> Level {
        Level((self.0 & 0xFFFF) as u16)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionStatus {
    Inactive,
    Queued,
    Running,
}

/// The body of a reaction: a code-generated callback over the reaction's
/// [`Context`] (§3, §6).
pub trait ReactionFn: Fn(&mut Context) + Send + Sync + UnwindSafe + RefUnwindSafe {}
impl<F> ReactionFn for F where F: Fn(&mut Context) + Send + Sync + UnwindSafe + RefUnwindSafe {}

/// A reaction descriptor (§3): owning reactor, handler, optional deadline
/// handler and threshold, and the scheduling attributes that feed
/// [`PriorityIndex`] and the level/chain dispatch rule of §4.5.
pub struct Reaction {
    pub name: String,
    pub reactor: ReactorKey,
    pub body: Box<dyn ReactionFn>,
    /// `deadline` in nanoseconds (§3, §4.7). `i64::MAX` means "no deadline".
    pub deadline: i64,
    pub deadline_handler: Option<Box<dyn ReactionFn>>,
    pub level: Level,
    pub chain_id: ChainId,
    /// Ports this reaction reads, used by the scheduler to decide whether to
    /// invoke it when its triggers fire.
    pub triggered_ports: Vec<PortKey>,
    status: AtomicU8,
}

impl std::fmt::Debug for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaction")
            .field("name", &self.name)
            .field("reactor", &self.reactor)
            .field("deadline", &self.deadline)
            .field("level", &self.level)
            .field("chain_id", &self.chain_id)
            .field("status", &self.status())
            .finish()
    }
}

impl Reaction {
    pub fn new(
        name: impl Into<String>,
        reactor: ReactorKey,
        body: impl ReactionFn + 'static,
        level: Level,
        chain_id: ChainId,
    ) -> Self {
        Self {
            name: name.into(),
            reactor,
            body: Box::new(body),
            deadline: i64::MAX,
            deadline_handler: None,
            level,
            chain_id,
            triggered_ports: Vec::new(),
            status: AtomicU8::new(ReactionStatus::Inactive as u8),
        }
    }

    pub fn with_deadline(mut self, deadline_ns: i64, handler: impl ReactionFn + 'static) -> Self {
        self.deadline = deadline_ns;
        self.deadline_handler = Some(Box::new(handler));
        self
    }

    pub fn priority_index(&self) -> PriorityIndex {
        PriorityIndex::new(self.deadline, self.level)
    }

    pub fn status(&self) -> ReactionStatus {
        match self.status.load(Ordering::Acquire) {
            0 => ReactionStatus::Inactive,
            1 => ReactionStatus::Queued,
            _ => ReactionStatus::Running,
        }
    }

    pub fn set_status(&self, status: ReactionStatus) {
        self.status.store(status as u8, Ordering::Release);
    }
}

/// Handle into the reaction queue, also its sequence id (§4.3).
pub type ReactionHandle = Handle;

/// Min-heap of queued reactions keyed on `(index, sequence_id)` (§4.3).
///
/// Ordering on `PriorityIndex` alone gives earliest-deadline-first with
/// level as the tiebreaker; the level/chain overlap rule of §4.5 is enforced
/// by the scheduler when it decides *which* ready reaction to pop next, not
/// by the heap itself.
#[derive(Default)]
pub struct ReactionQueue {
    heap: IndexedMinHeap<PriorityIndex, reactor_core::ReactionKey>,
}

impl ReactionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn push(&mut self, index: PriorityIndex, key: reactor_core::ReactionKey) -> ReactionHandle {
        self.heap.push(index, key)
    }

    pub fn peek_min_level(&mut self) -> Option<Level> {
        self.heap.peek_min().map(|(index, _)| index.level())
    }

    pub fn pop_min(&mut self) -> Option<(PriorityIndex, reactor_core::ReactionKey)> {
        self.heap.pop_min()
    }

    pub fn remove(&mut self, handle: ReactionHandle) -> Option<reactor_core::ReactionKey> {
        self.heap.remove(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_index_orders_by_deadline_then_level() {
        let low_deadline_high_level = PriorityIndex::new(10, Level(900));
        let high_deadline_low_level = PriorityIndex::new(20, Level(1));
        assert!(low_deadline_high_level < high_deadline_low_level);
    }

    #[test]
    fn same_deadline_orders_by_level() {
        let a = PriorityIndex::new(5, Level(1));
        let b = PriorityIndex::new(5, Level(2));
        assert!(a < b);
        assert_eq!(a.level(), Level(1));
    }

    #[test]
    fn chain_ids_overlap_iff_bits_shared() {
        assert!(!ChainId(0b0001).overlapping(ChainId(0b0010)));
        assert!(ChainId(0b0011).overlapping(ChainId(0b0010)));
        assert!(!ChainId::NONE.overlapping(ChainId(0b1111)));
    }

    #[test]
    fn reaction_queue_pops_lowest_priority_first() {
        let mut q = ReactionQueue::new();
        let a = reactor_core::ReactionKey::from(0);
        let b = reactor_core::ReactionKey::from(1);
        q.push(PriorityIndex::new(100, Level(0)), a);
        q.push(PriorityIndex::new(1, Level(0)), b);
        let (_, first) = q.pop_min().unwrap();
        assert_eq!(first, b);
        let (_, second) = q.pop_min().unwrap();
        assert_eq!(second, a);
    }
}
