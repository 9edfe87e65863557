//! Reference-counted payload tokens (§3, §4.2).
//!
//! Grounded directly on `original_source/include/core/reactor.h`'s
//! `lf_token_t` (`value`, `element_size`, `length`, `ref_count`, `destructor`,
//! `copy_constructor`, `ok_to_free`) rather than on the teacher runtime,
//! which sidesteps manual token lifecycle by cloning owned `ReactorData`
//! values instead. A C `void* value` has no safe Rust equivalent, so the
//! payload is carried as a type-erased `Box<dyn Any + Send>` and the
//! recycle pool is additionally keyed by `TypeId` so a pooled shell is never
//! handed back to a caller expecting a different payload type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Ownership of the token struct vs. the value it carries (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OkToFree {
    /// Neither the token struct nor the value may be freed by the store
    /// (e.g. a token borrowed briefly and owned elsewhere).
    No,
    /// The token struct is pooled, but the value was supplied by the caller
    /// and must not be freed here.
    TokenOnly,
    /// Both the token struct and the value are owned by the store and may
    /// be recycled / dropped when `ref_count` reaches zero.
    TokenAndValue,
}

type Destructor = Box<dyn Fn(Box<dyn Any + Send>) + Send + Sync>;

struct TokenInner {
    value: Mutex<Option<Box<dyn Any + Send>>>,
    type_id: TypeId,
    element_size: usize,
    length: AtomicUsize,
    ref_count: AtomicUsize,
    ok_to_free: OkToFree,
    destructor: Option<Destructor>,
}

/// A reference-counted payload carrier attached to events and ports (§3).
///
/// Cloning a `Token` is cheap (it clones the `Arc`) and does **not** bump the
/// logical `ref_count` — call [`Token::retain`] / [`Token::release`] for
/// that, matching the source API's separate `ref`/`unref` calls from plain
/// pointer aliasing.
#[derive(Clone)]
pub struct Token(Arc<TokenInner>);

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("element_size", &self.0.element_size)
            .field("length", &self.0.length.load(Ordering::Relaxed))
            .field("ref_count", &self.0.ref_count.load(Ordering::Relaxed))
            .field("ok_to_free", &self.0.ok_to_free)
            .finish()
    }
}

impl Token {
    pub fn ref_count(&self) -> usize {
        self.0.ref_count.load(Ordering::Acquire)
    }

    pub fn length(&self) -> usize {
        self.0.length.load(Ordering::Acquire)
    }

    pub fn element_size(&self) -> usize {
        self.0.element_size
    }

    /// Read the typed payload, or `None` if it has already been freed or the
    /// type doesn't match.
    pub fn with_value<T: 'static, R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let guard = self.0.value.lock().expect("token value lock poisoned");
        f(guard.as_ref().and_then(|boxed| boxed.downcast_ref::<T>()))
    }

    /// `ref(token)` (§4.2): increment the logical reference count.
    pub fn retain(&self) {
        self.0.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    /// `unref(token)` (§4.2): decrement the logical reference count. On
    /// reaching zero, runs the destructor on the value (if owned) and
    /// offers the shell back to `store`'s recycle pool.
    ///
    /// Aborts with a diagnostic if the reference count would go negative
    /// (§7: broken invariants are programming errors).
    pub fn release(&self, store: &TokenStore) {
        loop {
            let current = self.0.ref_count.load(Ordering::Acquire);
            if current == 0 {
                panic!("{}: double-release of a token", crate::error::RuntimeError::NegativeRefCount);
            }
            if self
                .0
                .ref_count
                .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if current == 1 {
                    self.finalize(store);
                }
                return;
            }
        }
    }

    fn finalize(&self, store: &TokenStore) {
        if matches!(self.0.ok_to_free, OkToFree::No) {
            return;
        }
        let taken = self
            .0
            .value
            .lock()
            .expect("token value lock poisoned")
            .take();
        if let Some(value) = taken {
            if let Some(destructor) = &self.0.destructor {
                destructor(value);
            }
            // else: drop(value) at end of scope is the "default allocator free".
        }
        if matches!(self.0.ok_to_free, OkToFree::TokenAndValue) {
            store.recycle(self.clone());
        }
    }
}

/// Per-`(TypeId, element_size)` recycle pools and the `create`/`initialize`
/// API of §4.2.
#[derive(Default)]
pub struct TokenStore {
    pools: Mutex<HashMap<(TypeId, usize), Vec<Token>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `create(element_size) -> token` (§4.2): reuse a recycled shell of the
    /// same type and element size if one is available, else allocate fresh.
    pub fn create<T: Send + 'static>(&self, element_size: usize) -> Token {
        let key = (TypeId::of::<T>(), element_size);
        if let Some(token) = self
            .pools
            .lock()
            .expect("token pool lock poisoned")
            .get_mut(&key)
            .and_then(Vec::pop)
        {
            return token;
        }
        Token(Arc::new(TokenInner {
            value: Mutex::new(None),
            type_id: TypeId::of::<T>(),
            element_size,
            length: AtomicUsize::new(0),
            ref_count: AtomicUsize::new(0),
            ok_to_free: OkToFree::TokenAndValue,
            destructor: None,
        }))
    }

    /// `initialize_with_value(token, value, length) -> token` (§4.2): may
    /// reuse the token passed in, or allocate a new one if `token` is
    /// `None`. The returned token carries `value` and has `ref_count == 0`
    /// (callers set it per `num_destinations`, §4.6).
    pub fn initialize_with_value<T: Send + 'static>(
        &self,
        existing: Option<Token>,
        value: T,
        length: usize,
        element_size: usize,
    ) -> Token {
        let token = existing.unwrap_or_else(|| self.create::<T>(element_size));
        assert_eq!(
            token.0.type_id,
            TypeId::of::<T>(),
            "token type mismatch on initialize_with_value"
        );
        *token.0.value.lock().expect("token value lock poisoned") = Some(Box::new(value));
        token.0.length.store(length, Ordering::Release);
        token
    }

    /// Attach a destructor to be run when the token's value is freed.
    pub fn with_destructor<T: Send + 'static>(
        &self,
        value: T,
        element_size: usize,
        destructor: impl Fn(Box<dyn Any + Send>) + Send + Sync + 'static,
    ) -> Token {
        Token(Arc::new(TokenInner {
            value: Mutex::new(Some(Box::new(value))),
            type_id: TypeId::of::<T>(),
            element_size,
            length: AtomicUsize::new(1),
            ref_count: AtomicUsize::new(0),
            ok_to_free: OkToFree::TokenAndValue,
            destructor: Some(Box::new(destructor)),
        }))
    }

    fn recycle(&self, token: Token) {
        // Shells are only recycled once their value has been taken by
        // `finalize`, so nothing further to clear here.
        let key = (token.0.type_id, token.0.element_size);
        self.pools
            .lock()
            .expect("token pool lock poisoned")
            .entry(key)
            .or_default()
            .push(token);
    }

    /// Number of shells currently parked in the recycle pool for `T` at
    /// `element_size`. Exposed for tests (§8-FULL S8).
    pub fn pooled_count<T: 'static>(&self, element_size: usize) -> usize {
        let key = (TypeId::of::<T>(), element_size);
        self.pools
            .lock()
            .expect("token pool lock poisoned")
            .get(&key)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_unref_balances_and_frees_at_zero() {
        let store = TokenStore::new();
        let token = store.initialize_with_value(None, 42i32, 1, std::mem::size_of::<i32>());
        token.retain();
        token.retain();
        assert_eq!(token.ref_count(), 2);
        token.release(&store);
        assert_eq!(token.ref_count(), 1);
        token.with_value::<i32, _>(|v| assert_eq!(v, Some(&42)));
        token.release(&store);
        assert_eq!(token.ref_count(), 0);
        // Value has been finalized (dropped) and the shell recycled.
        token.with_value::<i32, _>(|v| assert_eq!(v, None));
    }

    #[test]
    #[should_panic(expected = "reference count went negative")]
    fn double_release_aborts() {
        let store = TokenStore::new();
        let token = store.initialize_with_value(None, 1u8, 1, 1);
        token.retain();
        token.release(&store);
        token.release(&store);
    }

    #[test]
    fn recycled_shell_is_reused_on_next_create() {
        let store = TokenStore::new();
        let element_size = std::mem::size_of::<u64>();
        let t1 = store.initialize_with_value(None, 7u64, 1, element_size);
        t1.retain();
        assert_eq!(store.pooled_count::<u64>(element_size), 0);
        t1.release(&store);
        assert_eq!(store.pooled_count::<u64>(element_size), 1);

        let t2 = store.create::<u64>(element_size);
        assert_eq!(store.pooled_count::<u64>(element_size), 0);
        let t2 = store.initialize_with_value(Some(t2), 9u64, 1, element_size);
        t2.with_value::<u64, _>(|v| assert_eq!(v, Some(&9)));
    }

    #[test]
    fn destructor_runs_exactly_once() {
        let store = TokenStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let token = store.with_destructor(100i32, std::mem::size_of::<i32>(), move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        token.retain();
        token.release(&store);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
