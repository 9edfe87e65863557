//! Typed indices into the statically declared reactor graph.
//!
//! These are the Rust equivalent of the opaque pointers a C runtime would pass
//! around (`trigger_t*`, `reaction_t*`, ...): a small `Copy` newtype over a
//! `usize` index into the graph's backing `Vec`s, with no lifetime attached.
//! The graph outlives every dynamic object that references it (§9), so a bare
//! index is sufficient and avoids a borrow-checker fight a generational arena
//! would otherwise force on a statically-sized, never-shrinking table.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A typed index into one of the graph's component tables.
pub trait Key: Copy + Eq + std::hash::Hash {
    fn index(&self) -> usize;
}

macro_rules! key_type {
    ($(#[$outer:meta])* $vis:vis $name:ident) => {
        $(#[$outer])*
        #[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        #[repr(transparent)]
        $vis struct $name(usize);

        impl $crate::Key for $name {
            fn index(&self) -> usize {
                self.0
            }
        }

        impl From<usize> for $name {
            fn from(value: usize) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

key_type! {
    /// Runtime key for a Reactor self-struct.
    pub ReactorKey
}

key_type! {
    /// Runtime key for a Reaction.
    pub ReactionKey
}

key_type! {
    /// Runtime key for a Port.
    pub PortKey
}

key_type! {
    /// Runtime key for a Trigger (timer, logical action, or physical action).
    pub TriggerKey
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_roundtrips_through_index() {
        let k = ReactionKey::from(3);
        assert_eq!(k.index(), 3);
        assert_eq!(format!("{k:?}"), "ReactionKey(3)");
    }

    #[test]
    fn default_key_is_index_zero() {
        assert_eq!(TriggerKey::default().index(), 0);
    }
}
