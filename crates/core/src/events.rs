//! The event-handler subsystem (spec §1: named external interface, out of
//! scope for implementation; spec §4.7 `notify_event`).
//!
//! Event handlers are out-of-process collaborators (webhooks, message
//! queues, loggers) that subscribe to a feed of structured events tagged
//! with session/handle/opaque-id context. This crate only defines the
//! trait boundary and a broadcast helper; no handler ships here.

use parking_lot::RwLock;
use serde_json::{json, Value};

pub trait EventHandler: Send + Sync {
    /// Receive one event. Must not block the caller for long — handlers
    /// that need to do real I/O should queue internally.
    fn notify(&self, event: Value);
}

/// Broadcasts events to every registered handler (spec §4.7 `notify_event`:
/// "forwards to the event subsystem, tagged with session/handle/opaque id
/// when available").
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<Vec<std::sync::Arc<dyn EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: std::sync::Arc<dyn EventHandler>) {
        self.handlers.write().push(handler);
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Tag and broadcast an event. `module` is the reporting module's
    /// package string; `session_id`/`handle_id` are included when known.
    pub fn notify_event(
        &self,
        module: &str,
        session_id: Option<u64>,
        handle_id: Option<u64>,
        event: Value,
    ) {
        if self.is_empty() {
            return;
        }
        let mut envelope = json!({
            "emitter": module,
            "event": event,
        });
        if let Some(id) = session_id {
            envelope["session_id"] = json!(id);
        }
        if let Some(id) = handle_id {
            envelope["handle_id"] = json!(id);
        }
        for handler in self.handlers.read().iter() {
            handler.notify(envelope.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct CollectingHandler {
        seen: Mutex<Vec<Value>>,
    }

    impl EventHandler for CollectingHandler {
        fn notify(&self, event: Value) {
            self.seen.lock().push(event);
        }
    }

    #[test]
    fn broadcasts_to_all_registered_handlers() {
        let bus = EventBus::new();
        let a = Arc::new(CollectingHandler::default());
        let b = Arc::new(CollectingHandler::default());
        bus.register(a.clone());
        bus.register(b.clone());

        bus.notify_event("core.plugin.echo", Some(1), Some(2), json!({"kind": "attached"}));

        assert_eq!(a.seen.lock().len(), 1);
        assert_eq!(b.seen.lock().len(), 1);
        assert_eq!(a.seen.lock()[0]["session_id"], 1);
        assert_eq!(a.seen.lock()[0]["handle_id"], 2);
    }

    #[test]
    fn skips_assembly_when_no_handlers() {
        let bus = EventBus::new();
        bus.notify_event("core.plugin.echo", None, None, Value::Null);
        assert!(bus.is_empty());
    }
}
