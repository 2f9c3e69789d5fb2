//! Inbound frame fan-out.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::frame::Frame;

/// Callback invoked for every inbound frame.
pub type FrameHandler = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Identifies a registered handler so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<HandlerId, FrameHandler>,
}

/// Set of inbound frame handlers.
///
/// Every handler registered when a frame is dispatched sees that frame.
/// The order in which handlers run is unspecified. Membership can change at
/// any time, including from inside a handler: dispatch works on a snapshot
/// taken when the frame arrived, so a removal takes effect from the next
/// frame on.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    inner: Arc<RwLock<Registry>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler and returns its id.
    pub fn add<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        let mut registry = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = HandlerId(registry.next_id);
        registry.next_id += 1;
        registry.handlers.insert(id, Arc::new(handler));
        id
    }

    /// Removes a handler. Returns false if it was not registered.
    pub fn remove(&self, id: HandlerId) -> bool {
        let mut registry = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        registry.handlers.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        let registry = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        registry.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers a frame to every registered handler.
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, frame: &Frame) -> usize {
        let snapshot: Vec<FrameHandler> = {
            let registry = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            registry.handlers.values().cloned().collect()
        };

        for handler in &snapshot {
            handler(frame);
        }

        snapshot.len()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}
