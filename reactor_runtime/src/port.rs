//! Ports: the per-tag "present" value cells reactions read and write (§3,
//! §4.6).

use downcast_rs::{impl_downcast, Downcast};

use reactor_core::PortKey;

use crate::token::Token;

/// Type-erased port handle, grounded on the teacher's `BasePort` trait
/// (`boomerang_runtime/src/port/mod.rs`), which uses `downcast_rs` so the
/// scheduler can hold a homogeneous `Vec<Box<dyn BasePort>>` while reaction
/// bodies downcast to the concrete `Port<T>` they expect.
pub trait BasePort: Downcast + Send + Sync {
    fn key(&self) -> PortKey;
    fn name(&self) -> &str;
    fn is_present(&self) -> bool;
    /// End-of-step reset (§4.6): clear `is_present` and `unref` the port's
    /// token via `store`.
    fn cleanup(&mut self, store: &crate::token::TokenStore);
}
impl_downcast!(BasePort);

/// A typed value cell (§3). `is_present` is true only for the logical step
/// in which it was last written; `token` carries the reference-counted
/// payload when the port forwards one instead of copying a value.
pub struct Port<T> {
    key: PortKey,
    name: String,
    value: Option<T>,
    is_present: bool,
    token: Option<Token>,
    /// Number of downstream reactions reading this port, used to initialize
    /// a freshly-associated token's `ref_count` (§4.6).
    pub num_destinations: usize,
}

impl<T> Port<T> {
    pub fn new(key: PortKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            value: None,
            is_present: false,
            token: None,
            num_destinations: 0,
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.is_present.then_some(self.value.as_ref()).flatten()
    }

    /// `_set_present` scalar-copy variant (§9 design notes: ownership enum
    /// `copy`). Sets the value and marks the port present for this step.
    pub fn set(&mut self, value: T) {
        self.value = Some(value);
        self.is_present = true;
    }

    /// Forward-token variant (§9: ownership enum `forward`): associate an
    /// existing reference-counted [`Token`] rather than copying a value,
    /// initializing its `ref_count` to `num_destinations` (§4.6).
    pub fn set_token(&mut self, token: Token) {
        for _ in 0..self.num_destinations {
            token.retain();
        }
        self.token = Some(token);
        self.is_present = true;
    }

    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }
}

impl<T: Send + Sync + 'static> BasePort for Port<T> {
    fn key(&self) -> PortKey {
        self.key
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_present(&self) -> bool {
        self.is_present
    }

    fn cleanup(&mut self, store: &crate::token::TokenStore) {
        if let Some(token) = self.token.take() {
            token.release(store);
        }
        self.value = None;
        self.is_present = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_marks_present_and_cleanup_clears_it() {
        let mut port: Port<i32> = Port::new(PortKey::from(0), "out");
        assert_eq!(port.get(), None);
        port.set(5);
        assert_eq!(port.get(), Some(&5));
        let store = crate::token::TokenStore::new();
        port.cleanup(&store);
        assert_eq!(port.get(), None);
        assert!(!port.is_present());
    }

    #[test]
    fn token_ref_count_matches_num_destinations() {
        let store = crate::token::TokenStore::new();
        let token = store.initialize_with_value(None, 7u8, 1, 1);
        let mut port: Port<u8> = Port::new(PortKey::from(0), "out");
        port.num_destinations = 3;
        port.set_token(token.clone());
        assert_eq!(token.ref_count(), 3);
        port.cleanup(&store);
        assert_eq!(token.ref_count(), 2);
    }
}
