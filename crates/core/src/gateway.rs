//! Top-level orchestrator wiring every subsystem together (spec §2, §5).
//!
//! Owns the registries, the dispatcher and its worker pool, the sweeper
//! thread, the auth gate, and the module/transport tables. Modeled on the
//! teacher's `server::Server`: a single struct that owns every long-lived
//! thread and exposes `start`/`stop` plus the handful of entry points
//! transports and modules actually call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::auth::{self, TokenStore};
use crate::callbacks::{Callbacks, DeferredQueue};
use crate::config::GatewayConfig;
use crate::dispatch::{Dispatcher, RequestSink, WorkerPool};
use crate::envelope;
use crate::error::CoreError;
use crate::events::EventBus;
use crate::ice::{IceAgent, MockIceAgent};
use crate::module::Module;
use crate::registry::handle::HandleRegistry;
use crate::registry::session::SessionRegistry;
use crate::registry::Sweeper;
use crate::request::Request;
use crate::transport::Transport;
use crate::verbs;

/// Static identity returned by the `info` verb (spec §4.4, §6).
pub struct GatewayDescriptor {
    pub name: &'static str,
    pub version: &'static str,
    pub author: &'static str,
}

pub const DESCRIPTOR: GatewayDescriptor = GatewayDescriptor {
    name: "janus-core",
    version: env!("CARGO_PKG_VERSION"),
    author: "core",
};

/// Registry of loaded media modules, keyed by package string (spec §4.4
/// `attach`: "names a module by package string").
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, Arc<dyn Module>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, module: Arc<dyn Module>) {
        let package = module.descriptor().package.to_string();
        module.init("");
        self.modules.write().insert(package, module);
    }

    pub fn find(&self, package: &str) -> Option<Arc<dyn Module>> {
        self.modules.read().get(package).cloned()
    }

    pub fn packages(&self) -> Vec<String> {
        self.modules.read().keys().cloned().collect()
    }
}

/// Monotonic termination counter (spec §5: "a first SIGINT/SIGTERM begins
/// graceful shutdown; a third forces exit(1)").
#[derive(Default)]
pub struct StopCounter(AtomicI32);

impl StopCounter {
    pub fn signal(&self) -> i32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> i32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// The signaling core's single orchestrator.
pub struct Gateway {
    pub config: Arc<GatewayConfig>,
    pub sessions: SessionRegistry,
    pub handles: HandleRegistry,
    pub modules: ModuleRegistry,
    pub tokens: TokenStore,
    pub events: Arc<EventBus>,
    pub callbacks: Arc<Callbacks>,
    pub stop_counter: StopCounter,
    transports: RwLock<Vec<Arc<dyn Transport>>>,
    pool: Arc<WorkerPool>,
    dispatcher: RwLock<Option<Dispatcher>>,
    sweeper: RwLock<Option<Sweeper>>,
    deferred: Arc<DeferredQueue>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Arc<Self> {
        let config = Arc::new(config);
        let handles = HandleRegistry::new();
        let events = Arc::new(EventBus::new());
        let deferred = Arc::new(DeferredQueue::new());
        let callbacks = Arc::new(Callbacks::new(
            handles.clone(),
            config.clone(),
            events.clone(),
            deferred.clone(),
        ));

        Arc::new(Self {
            config,
            sessions: SessionRegistry::new(),
            handles,
            modules: ModuleRegistry::new(),
            tokens: TokenStore::new(),
            events,
            callbacks,
            stop_counter: StopCounter::default(),
            transports: RwLock::new(Vec::new()),
            pool: Arc::new(WorkerPool::new()),
            dispatcher: RwLock::new(None),
            sweeper: RwLock::new(None),
            deferred,
        })
    }

    pub fn register_module(&self, module: Arc<dyn Module>) {
        self.modules.register(module);
    }

    pub fn register_transport(&self, transport: Arc<dyn Transport>) {
        self.transports.write().push(transport);
    }

    /// Start the sweeper thread and the dispatcher thread (spec §5).
    pub fn start(self: &Arc<Self>) {
        let sink: Arc<dyn RequestSink> = Arc::clone(self);
        *self.dispatcher.write() = Some(Dispatcher::start(sink, self.pool.clone()));
        *self.sweeper.write() = Some(Sweeper::start(
            self.sessions.clone(),
            self.config.clone(),
            self.events.clone(),
            self.deferred.clone(),
        ));
        tracing::info!("gateway started");
    }

    /// Graceful shutdown: stop accepting new work, drain the dispatcher
    /// and sweeper threads (spec §5 exit codes, signal handling).
    pub fn stop(&self) {
        if let Some(dispatcher) = self.dispatcher.write().take() {
            dispatcher.stop();
        }
        if let Some(sweeper) = self.sweeper.write().take() {
            sweeper.stop();
        }
        for module in self.modules.packages() {
            if let Some(module) = self.modules.find(&module) {
                module.destroy();
            }
        }
        tracing::info!("gateway stopped");
    }

    /// Transport-facing entry point (spec §6 "Callbacks received from
    /// transports: incoming_request, transport_gone").
    pub fn incoming_request(&self, request: Request) {
        if let Some(dispatcher) = self.dispatcher.read().as_ref() {
            dispatcher.enqueue(request);
        }
    }

    /// Transport-facing entry point: the given transport-session is gone;
    /// destroy every session bound to it (spec §3).
    pub fn transport_gone(&self, transport_session_id: u64) {
        for session in self.sessions.destroy_for_transport_session(transport_session_id) {
            for handle_id in session.handle_ids() {
                self.handles.remove(handle_id);
            }
        }
    }

    pub fn descriptor_json(&self) -> Value {
        json!({
            "name": DESCRIPTOR.name,
            "version_string": DESCRIPTOR.version,
            "author": DESCRIPTOR.author,
            "plugins": self.modules.packages(),
        })
    }

    pub fn authorize(&self, body: &Value) -> Result<(), CoreError> {
        auth::authorize(&self.config, &self.tokens, body)
    }

    pub fn authorize_admin(&self, body: &Value) -> Result<(), CoreError> {
        if !self.config.has_admin_secret() {
            return Ok(());
        }
        match body.get("admin_secret").and_then(Value::as_str) {
            Some(provided) if self.config.admin_secret_matches(provided) => Ok(()),
            _ => Err(CoreError::Unauthorized),
        }
    }
}

impl RequestSink for Gateway {
    fn dispatch_sync(&self, request: Request) {
        let reply = if request.admin {
            verbs::admin::handle(self, &request)
        } else {
            verbs::session::handle(self, &request)
        };
        if let Some(reply) = reply {
            request.reply(reply);
        }
    }

    fn dispatch_message(&self, request: Request) {
        if let Some(reply) = verbs::message::handle(self, &request) {
            request.reply(reply);
        }
    }
}

/// Build the single-error-reply envelope a verb handler falls back to on
/// failure (spec §7 "every verb handler returns through a single
/// error-reply path").
pub fn error_envelope(request: &Request, err: CoreError) -> Value {
    envelope::error_reply(request.transaction().unwrap_or(""), request.session_id(), &err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_lists_registered_modules() {
        let gateway = Gateway::new(GatewayConfig::new());
        gateway.register_module(Arc::new(crate::test_support::EchoModule::default()));
        let descriptor = gateway.descriptor_json();
        assert_eq!(descriptor["plugins"][0], "core.plugin.echo");
    }

    #[test]
    fn stop_counter_increments_monotonically() {
        let counter = StopCounter::default();
        assert_eq!(counter.signal(), 1);
        assert_eq!(counter.signal(), 2);
        assert_eq!(counter.count(), 2);
    }
}
