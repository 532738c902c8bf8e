use super::CallContext;
use crate::wire::CallId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// The live calls of one connection, keyed by call id.
///
/// Only the dispatcher inserts and removes entries. Ids are scoped to the
/// connection: two connections may use the same id independently.
#[derive(Clone, Default)]
pub struct CallRegistry {
    calls: Arc<Mutex<HashMap<CallId, CallContext>>>,
}

impl CallRegistry {
    pub fn contains(&self, id: CallId) -> bool {
        self.calls.lock().contains_key(&id)
    }

    pub fn get(&self, id: CallId) -> Option<CallContext> {
        self.calls.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    pub(crate) fn insert(&self, context: CallContext) {
        self.calls.lock().insert(context.id(), context);
    }

    /// Removes `context` if it is still the entry for its id.
    pub(crate) fn remove_call(&self, context: &CallContext) -> bool {
        let mut calls = self.calls.lock();
        match calls.get(&context.id()) {
            Some(current) if current.same_call(context) => {
                calls.remove(&context.id());
                true
            }
            _ => false,
        }
    }

    /// Cancels the call with `id`, waits for its cancellation callbacks and
    /// drops it. Returns whether such a call existed.
    pub(crate) async fn abort(&self, id: CallId) -> bool {
        let Some(context) = self.get(id) else {
            return false;
        };
        context.cancel().await;
        self.remove_call(&context);
        true
    }

    /// Empties the registry, cancelling every call that was in it.
    pub(crate) async fn close_all(&self) -> usize {
        let drained: Vec<CallContext> = {
            let mut calls = self.calls.lock();
            calls.drain().map(|(_, context)| context).collect()
        };
        for context in &drained {
            context.cancel().await;
        }
        drained.len()
    }
}

impl std::fmt::Debug for CallRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<CallId> = self.calls.lock().keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("CallRegistry").field("ids", &ids).finish()
    }
}
