#![forbid(unsafe_code)]

//! Worklets: registered callables of fixed arity, run on the UI thread.
//!
//! A worklet may carry one completion listener. The listener is an opaque
//! closure; the bridge builds it so that calling it posts a notification onto
//! the script thread, which keeps the UI side free of script-runtime state.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use wkl_core::{Callable, Value, WorkletId};

/// Completion listener attached to a worklet.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

pub struct Worklet {
    id: WorkletId,
    body: Callable,
    arity: usize,
    listener: Option<Listener>,
}

impl fmt::Debug for Worklet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worklet")
            .field("id", &self.id)
            .field("arity", &self.arity)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

impl Worklet {
    #[must_use]
    pub fn new(id: WorkletId, body: Callable, arity: usize) -> Self {
        Self {
            id,
            body,
            arity,
            listener: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> WorkletId {
        self.id
    }

    /// Declared number of inputs (`length` on the script side).
    #[must_use]
    pub fn arity(&self) -> usize {
        self.arity
    }

    #[must_use]
    pub fn body(&self) -> &Callable {
        &self.body
    }

    #[must_use]
    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    pub fn call(&self, args: &[Value]) -> Value {
        self.body.call(args)
    }

    /// Fire the completion listener, if one is attached.
    pub fn notify_listener(&self) {
        if let Some(listener) = &self.listener {
            listener();
        }
    }
}

/// Owns every worklet by id. UI-thread only.
#[derive(Debug, Default)]
pub struct WorkletRegistry {
    worklets: AHashMap<WorkletId, Worklet>,
}

impl WorkletRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a worklet, overwriting any previous one with the same id.
    /// An overwritten worklet's listener is dropped with it.
    pub fn register(&mut self, id: WorkletId, body: Callable, arity: usize) {
        let replaced = self
            .worklets
            .insert(id, Worklet::new(id, body, arity))
            .is_some();
        tracing::debug!(%id, arity, replaced, "worklet registered");
    }

    /// Remove a worklet. Returns whether it existed.
    pub fn unregister(&mut self, id: WorkletId) -> bool {
        let removed = self.worklets.remove(&id).is_some();
        tracing::debug!(%id, removed, "worklet unregistered");
        removed
    }

    #[must_use]
    pub fn get(&self, id: WorkletId) -> Option<&Worklet> {
        self.worklets.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: WorkletId) -> bool {
        self.worklets.contains_key(&id)
    }

    /// Install, replace or (with `None`) clear the listener of a worklet.
    /// Returns `false` if no worklet has that id.
    pub fn set_listener(&mut self, id: WorkletId, listener: Option<Listener>) -> bool {
        match self.worklets.get_mut(&id) {
            Some(worklet) => {
                tracing::debug!(%id, attached = listener.is_some(), "worklet listener set");
                worklet.listener = listener;
                true
            }
            None => {
                tracing::debug!(%id, "listener for unknown worklet ignored");
                false
            }
        }
    }

    /// Live ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<WorkletId> {
        let mut ids: Vec<_> = self.worklets.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.worklets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.worklets.is_empty()
    }
}
