//! The statically declared reactor graph (§2, §6): reactor/trigger/
//! reaction/port tables that a code generator would normally emit. Out of
//! scope is the generator itself (§1); this module is the table shape it
//! would populate, plus a small builder a test harness can drive directly.

use reactor_core::{Key, PortKey, ReactionKey, ReactorKey, TriggerKey};

use crate::error::RuntimeError;
use crate::port::BasePort;
use crate::reaction::Reaction;
use crate::reactor::ReactorSelf;
use crate::trigger::Trigger;

/// `new_reactor`/`initialize_trigger_objects` (§6) land here as table
/// construction rather than free functions over opaque pointers.
#[derive(Default)]
pub struct ReactorGraph {
    pub reactors: Vec<ReactorSelf>,
    pub triggers: Vec<Trigger>,
    pub reactions: Vec<Reaction>,
    pub ports: Vec<Box<dyn BasePort>>,
}

impl ReactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_reactor(&mut self, reactor: ReactorSelf) -> ReactorKey {
        let key = ReactorKey::from(self.reactors.len());
        self.reactors.push(reactor);
        key
    }

    pub fn add_trigger(&mut self, trigger: Trigger) -> TriggerKey {
        let key = TriggerKey::from(self.triggers.len());
        self.triggers.push(trigger);
        key
    }

    pub fn add_reaction(&mut self, reaction: Reaction) -> ReactionKey {
        let key = ReactionKey::from(self.reactions.len());
        self.reactions.push(reaction);
        key
    }

    pub fn add_port(&mut self, port: Box<dyn BasePort>) -> PortKey {
        let key = port.key();
        debug_assert_eq!(key.index(), self.ports.len(), "ports must be added in key order");
        self.ports.push(port);
        key
    }

    /// Keys are only ever handed out by `add_*` above, so a miss here means
    /// a caller built (or corrupted) a key against a different graph — a
    /// programming error (§7), not a recoverable condition.
    pub fn trigger(&self, key: TriggerKey) -> &Trigger {
        self.triggers
            .get(key.index())
            .unwrap_or_else(|| panic!("{}", RuntimeError::UnknownTrigger(key)))
    }

    pub fn reaction(&self, key: ReactionKey) -> &Reaction {
        &self.reactions[key.index()]
    }

    pub fn reactor_mut(&mut self, key: ReactorKey) -> &mut ReactorSelf {
        &mut self.reactors[key.index()]
    }

    pub fn port_mut(&mut self, key: PortKey) -> &mut Box<dyn BasePort> {
        &mut self.ports[key.index()]
    }
}
