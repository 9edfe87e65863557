//! Reactor self-structs (§3): the opaque per-instance state container a
//! code generator would otherwise emit as a plain struct plus a manual
//! teardown routine.

use std::any::Any;

use reactor_core::ReactorKey;

/// `new_reactor(size)` / `free_reactor(self)` (§6), expressed idiomatically:
/// the "opaque state block" is any `Send + Sync` value the code generator
/// produces, and the "allocation list of owned resources freed at reactor
/// teardown" (§3) is simply `Drop` on that value plus whatever it owns —
/// Rust's ordinary teardown story replaces the source runtime's explicit
/// free-list walk.
pub struct ReactorSelf {
    pub key: ReactorKey,
    pub name: String,
    state: Box<dyn Any + Send + Sync>,
}

impl ReactorSelf {
    pub fn new(key: ReactorKey, name: impl Into<String>, state: impl Any + Send + Sync) -> Self {
        Self {
            key,
            name: name.into(),
            state: Box::new(state),
        }
    }

    pub fn state<T: 'static>(&self) -> Option<&T> {
        self.state.downcast_ref::<T>()
    }

    pub fn state_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.state.downcast_mut::<T>()
    }
}

impl std::fmt::Debug for ReactorSelf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactorSelf")
            .field("key", &self.key)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_roundtrips_through_downcast() {
        let mut r = ReactorSelf::new(ReactorKey::from(0), "counter", 0i32);
        assert_eq!(r.state::<i32>(), Some(&0));
        *r.state_mut::<i32>().unwrap() += 1;
        assert_eq!(r.state::<i32>(), Some(&1));
        assert_eq!(r.state::<String>(), None);
    }
}
