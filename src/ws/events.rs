//! Event handler registry: event name → async handler.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use crate::ws::context::EventContext;

/// Boxed async event handler. Handlers receive an [`EventContext`] carrying
/// the connection, the hub, and the raw payload.
pub type EventHandlerFn =
    Arc<dyn Fn(EventContext) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Default)]
pub struct EventRegistry {
    handlers: RwLock<HashMap<String, EventHandlerFn>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`, replacing any previous registration.
    pub fn register<F, Fut>(&self, event: &str, handler: F)
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: EventHandlerFn = Arc::new(move |ctx| Box::pin(handler(ctx)));
        self.handlers
            .write()
            .expect("registry lock")
            .insert(event.to_string(), boxed);
    }

    pub fn get(&self, event: &str) -> Option<EventHandlerFn> {
        self.handlers
            .read()
            .expect("registry lock")
            .get(event)
            .cloned()
    }

    pub fn unregister(&self, event: &str) {
        self.handlers.write().expect("registry lock").remove(event);
    }

    pub fn clear(&self) {
        self.handlers.write().expect("registry lock").clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.read().expect("registry lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().expect("registry lock").is_empty()
    }
}
