//! Deferred value references
//!
//! A `DeferredValue` is the single-value handle handed out by loaders. It is
//! either already resolved, holds an in-memory resolver that runs exactly
//! once on first dereference, or is backend-pending and may only be resolved
//! by the batch phase through `set`/`set_not_exists`.
//!
//! Resolution is memoized: value and existence flag are cached, repeat
//! dereference is O(1) and never touches the backend again. "Record does not
//! exist" (`exists() == false`) is observably distinct from "record exists
//! but has no value for this locale" (`exists() == true`, `get() == None`).
//!
//! Handles are `Rc`-shared between the caller and the loader's pending table;
//! the engine is single-threaded per loader by contract, so there is no
//! locking here.

pub mod persistence;

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{LocalizeError, LocalizeResult};

use persistence::DeferredSnapshot;

/// In-memory resolver installed by the direct (materialized record) path
pub(crate) type DirectResolver<T> = Box<dyn Fn() -> LocalizeResult<Option<T>>>;

enum State<T> {
    /// Unresolved, resolvable in memory on first `get()`
    Direct(DirectResolver<T>),
    /// Unresolved, only the batch phase may resolve it
    AwaitingBatch,
    /// Terminal: value and existence flag are cached
    Resolved { value: Option<T>, exists: bool },
}

/// A single-value handle that resolves at most once
pub struct DeferredValue<T> {
    id: i64,
    inner: Rc<RefCell<State<T>>>,
}

impl<T> Clone for DeferredValue<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for DeferredValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.inner.borrow() {
            State::Direct(_) => "direct",
            State::AwaitingBatch => "awaiting-batch",
            State::Resolved { exists: true, .. } => "resolved",
            State::Resolved { exists: false, .. } => "resolved-absent",
        };
        f.debug_struct("DeferredValue")
            .field("id", &self.id)
            .field("state", &state)
            .finish()
    }
}

impl<T: Clone> DeferredValue<T> {
    /// Reference wired to an in-memory resolver (direct path)
    pub(crate) fn direct(id: i64, resolver: DirectResolver<T>) -> Self {
        Self {
            id,
            inner: Rc::new(RefCell::new(State::Direct(resolver))),
        }
    }

    /// Reference that only the batch phase can resolve (id-only path)
    pub(crate) fn awaiting_batch(id: i64) -> Self {
        Self {
            id,
            inner: Rc::new(RefCell::new(State::AwaitingBatch)),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// Resolve if needed and return the cached value
    ///
    /// First call on a direct reference runs its resolver; the result is
    /// memoized together with the existence flag. Dereferencing a
    /// backend-pending reference before `load` ran is a protocol violation.
    /// A "not found" reference yields `None` here; use [`exists`] to tell the
    /// two apart.
    ///
    /// [`exists`]: DeferredValue::exists
    pub fn get(&self) -> LocalizeResult<Option<T>> {
        let mut state = self.inner.borrow_mut();
        match &*state {
            State::Resolved { value, .. } => Ok(value.clone()),
            State::AwaitingBatch => Err(LocalizeError::NotLoaded { id: self.id }),
            State::Direct(resolve) => {
                let value = resolve()?;
                *state = State::Resolved {
                    value: value.clone(),
                    exists: true,
                };
                Ok(value)
            }
        }
    }

    /// Resolve if needed and return the cached existence flag
    pub fn exists(&self) -> LocalizeResult<bool> {
        {
            let state = self.inner.borrow();
            if let State::Resolved { exists, .. } = &*state {
                return Ok(*exists);
            }
            if matches!(&*state, State::AwaitingBatch) {
                return Err(LocalizeError::NotLoaded { id: self.id });
            }
        }
        self.get()?;
        self.exists()
    }

    /// Whether resolution has occurred
    pub fn is_loaded(&self) -> bool {
        matches!(&*self.inner.borrow(), State::Resolved { .. })
    }

    /// Whether this reference still needs the batch phase
    pub(crate) fn needs_batch(&self) -> bool {
        matches!(&*self.inner.borrow(), State::AwaitingBatch)
    }

    /// Batch phase hands a fetched value to a pending reference
    ///
    /// Only legal on a backend-pending reference, exactly once.
    pub fn set(&self, value: Option<T>) -> LocalizeResult<()> {
        let mut state = self.inner.borrow_mut();
        match &*state {
            State::AwaitingBatch => {
                *state = State::Resolved { value, exists: true };
                Ok(())
            }
            State::Resolved { .. } => Err(LocalizeError::AlreadyResolved { id: self.id }),
            State::Direct(_) => Err(LocalizeError::NotBatchPending { id: self.id }),
        }
    }

    /// Batch phase marks a pending reference as "record does not exist"
    pub fn set_not_exists(&self) -> LocalizeResult<()> {
        let mut state = self.inner.borrow_mut();
        match &*state {
            State::AwaitingBatch => {
                *state = State::Resolved {
                    value: None,
                    exists: false,
                };
                Ok(())
            }
            State::Resolved { .. } => Err(LocalizeError::AlreadyResolved { id: self.id }),
            State::Direct(_) => Err(LocalizeError::NotBatchPending { id: self.id }),
        }
    }

    /// Snapshot the tri-state for persistence
    ///
    /// An unresolved direct reference snapshots as pending too: its resolver
    /// is a closure and does not survive serialization.
    pub fn snapshot(&self) -> DeferredSnapshot<T> {
        match &*self.inner.borrow() {
            State::Resolved { value, exists } => DeferredSnapshot::Resolved {
                value: value.clone(),
                exists: *exists,
            },
            State::Direct(_) | State::AwaitingBatch => DeferredSnapshot::Pending,
        }
    }

    /// Rebuild a reference from a snapshot
    pub fn from_snapshot(id: i64, snapshot: DeferredSnapshot<T>) -> Self {
        match snapshot {
            DeferredSnapshot::Pending => Self::awaiting_batch(id),
            DeferredSnapshot::Resolved { value, exists } => Self {
                id,
                inner: Rc::new(RefCell::new(State::Resolved { value, exists })),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::assert_error_sqlstate;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_direct_resolution_runs_exactly_once() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let deferred = DeferredValue::direct(
            1,
            Box::new(move || {
                counter.set(counter.get() + 1);
                Ok(Some("bonjour".to_string()))
            }),
        );

        assert!(!deferred.is_loaded());
        assert_eq!(deferred.get().unwrap(), Some("bonjour".to_string()));
        assert_eq!(deferred.get().unwrap(), Some("bonjour".to_string()));
        assert!(deferred.exists().unwrap());
        assert_eq!(calls.get(), 1);
        assert!(deferred.is_loaded());
    }

    #[test]
    fn test_direct_no_locale_match_exists_but_empty() {
        let deferred: DeferredValue<String> = DeferredValue::direct(2, Box::new(|| Ok(None)));

        assert_eq!(deferred.get().unwrap(), None);
        assert!(deferred.exists().unwrap());
    }

    #[test]
    fn test_pending_get_before_load_is_protocol_violation() {
        let deferred: DeferredValue<String> = DeferredValue::awaiting_batch(3);
        assert_error_sqlstate(deferred.get(), "55000");
        assert_error_sqlstate(deferred.exists(), "55000");
    }

    #[test]
    fn test_set_resolves_pending_reference() {
        let deferred: DeferredValue<String> = DeferredValue::awaiting_batch(4);
        deferred.set(Some("hola".to_string())).unwrap();

        assert_eq!(deferred.get().unwrap(), Some("hola".to_string()));
        assert!(deferred.exists().unwrap());
    }

    #[test]
    fn test_set_not_exists_is_distinct_from_empty_value() {
        let absent: DeferredValue<String> = DeferredValue::awaiting_batch(5);
        absent.set_not_exists().unwrap();
        let empty: DeferredValue<String> = DeferredValue::awaiting_batch(6);
        empty.set(None).unwrap();

        assert_eq!(absent.get().unwrap(), None);
        assert_eq!(empty.get().unwrap(), None);
        assert!(!absent.exists().unwrap());
        assert!(empty.exists().unwrap());
    }

    #[test]
    fn test_set_on_resolved_reference_fails() {
        let deferred: DeferredValue<String> = DeferredValue::awaiting_batch(7);
        deferred.set(Some("x".to_string())).unwrap();

        assert_error_sqlstate(deferred.set(Some("y".to_string())), "55000");
        assert_error_sqlstate(deferred.set_not_exists(), "55000");
        // The first resolution is untouched
        assert_eq!(deferred.get().unwrap(), Some("x".to_string()));
    }

    #[test]
    fn test_set_on_direct_reference_fails() {
        let deferred: DeferredValue<String> =
            DeferredValue::direct(8, Box::new(|| Ok(Some("direct".to_string()))));
        assert_error_sqlstate(deferred.set(Some("batch".to_string())), "55000");
    }

    #[test]
    fn test_clones_share_resolution() {
        let deferred: DeferredValue<String> = DeferredValue::awaiting_batch(9);
        let other = deferred.clone();
        deferred.set(Some("shared".to_string())).unwrap();

        assert_eq!(other.get().unwrap(), Some("shared".to_string()));
        assert!(other.is_loaded());
    }
}
