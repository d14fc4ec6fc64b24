//! Module-facing callback API (spec §4.7).
//!
//! A module never touches a `Session`/`Handle` directly; it calls back
//! into the core through a [`Callbacks`] handle it received at
//! `create_session` time, carrying only the handle's strongly-typed id
//! (spec §9: "replace sentinel-pointer validation with strongly-typed
//! handles"). Every entry point re-resolves the id, checks liveness, and
//! only then proceeds — matching the spec's "validate, bump refcount,
//! re-check STOP/destroyed" contract, with the refcount bump expressed as
//! simply holding the resolved `Arc<Handle>` for the call's duration.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::envelope;
use crate::error::CoreError;
use crate::events::EventBus;
use crate::negotiation;
use crate::registry::handle::HandleRegistry;

/// Queue of one-shot closures that must not run on the caller's stack
/// (spec §9 "deferred one-shot callbacks": `close_pc`/`end_session` are
/// posted here to break the module callback's lock ordering, then drained
/// by the sweeper thread on its regular tick).
#[derive(Default)]
pub struct DeferredQueue {
    pending: Mutex<VecDeque<Box<dyn FnOnce() + Send>>>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self, job: Box<dyn FnOnce() + Send>) {
        self.pending.lock().push_back(job);
    }

    /// Run every job queued so far, in order. Called from the sweeper's
    /// tick, never from within a module callback.
    pub fn drain(&self) {
        let jobs: Vec<_> = self.pending.lock().drain(..).collect();
        for job in jobs {
            job();
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The callback surface handed to every attached module.
pub struct Callbacks {
    pub handles: HandleRegistry,
    pub config: Arc<GatewayConfig>,
    pub events: Arc<EventBus>,
    pub deferred: Arc<DeferredQueue>,
}

impl Callbacks {
    pub fn new(handles: HandleRegistry, config: Arc<GatewayConfig>, events: Arc<EventBus>, deferred: Arc<DeferredQueue>) -> Self {
        Self {
            handles,
            config,
            events,
            deferred,
        }
    }

    /// `push_event(module_session, transaction, body, optional jsep)` (spec
    /// §4.7). `jsep` is the module's own `{type, sdp, trickle?}` object,
    /// routed through the module-initiated JSEP path (spec §4.5/§4.7) rather
    /// than just a type tag, so the module's SDP actually reaches the ICE
    /// agent. On success the event envelope has already been sent to the
    /// handle's transport.
    pub fn push_event(
        &self,
        handle_id: u64,
        transaction: Option<&str>,
        body: Value,
        jsep: Option<Value>,
    ) -> Result<(), CoreError> {
        let handle = self
            .handles
            .resolve(handle_id)
            .ok_or(CoreError::HandleNotFound(handle_id))?;
        if handle.is_stopped() {
            return Err(CoreError::HandleNotFound(handle_id));
        }
        let session = handle.session().ok_or(CoreError::SessionNotFound(0))?;
        if session.is_destroyed() {
            return Err(CoreError::SessionNotFound(session.id));
        }
        if !body.is_object() && !body.is_null() {
            return Err(CoreError::InvalidJsonObject(
                "push_event body must be a JSON object".to_string(),
            ));
        }

        let jsep = match jsep {
            Some(j) => Some(negotiation::process_module_jsep(&handle, &j, &self.config)?),
            None => None,
        };

        let package = handle.module.descriptor().package;
        let mut reply = envelope::event_reply(handle.id, package, body, jsep);
        if let Some(t) = transaction {
            reply["transaction"] = Value::String(t.to_string());
        }
        session.transport.send(None, reply);
        Ok(())
    }

    /// `relay_rtp` (spec §4.7): fast path, drops silently if stopped/alert.
    pub fn relay_rtp(&self, handle_id: u64, video: bool, payload: &[u8]) {
        self.relay(handle_id, video, payload, RelayKind::Rtp);
    }

    pub fn relay_rtcp(&self, handle_id: u64, video: bool, payload: &[u8]) {
        self.relay(handle_id, video, payload, RelayKind::Rtcp);
    }

    pub fn relay_data(&self, handle_id: u64, label: &str, payload: &[u8]) {
        let Some(handle) = self.handles.resolve(handle_id) else {
            return;
        };
        if handle.is_stopped() || handle.is_alert() {
            return;
        }
        let _ = (label, payload);
    }

    fn relay(&self, handle_id: u64, video: bool, payload: &[u8], kind: RelayKind) {
        let Some(handle) = self.handles.resolve(handle_id) else {
            return;
        };
        if handle.is_stopped() || handle.is_alert() {
            return;
        }
        // Forwarding to the ICE/SRTP collaborator is out of scope (spec
        // §1); the relevant send would go through `handle.ice` here.
        let _ = (video, payload, kind);
    }

    /// `close_pc(module_session)` (spec §4.7): schedule a hangup on the
    /// deferred queue rather than running it under the module's call stack.
    pub fn close_pc(&self, handle_id: u64, reason: &'static str) {
        let handles = self.handles.clone();
        self.deferred.post(Box::new(move || {
            if let Some(handle) = handles.resolve(handle_id) {
                handle.ice.lock().hangup(reason);
            }
        }));
    }

    /// `end_session(module_session)` (spec §4.7): schedule handle teardown.
    pub fn end_session(&self, handle_id: u64) {
        let handles = self.handles.clone();
        self.deferred.post(Box::new(move || {
            if let Some(handle) = handles.resolve(handle_id) {
                if let Some(session) = handle.session() {
                    session.remove_handle(handle.id);
                }
                handle.destroy("module requested end_session");
                handles.remove(handle_id);
            }
        }));
    }

    /// `notify_event(module, optional module_session, event)` (spec §4.7).
    pub fn notify_event(&self, module: &str, handle_id: Option<u64>, event: Value) {
        let (session_id, handle_id) = match handle_id.and_then(|id| self.handles.resolve(id)) {
            Some(handle) => (handle.session().map(|s| s.id), Some(handle.id)),
            None => (None, None),
        };
        self.events.notify_event(module, session_id, handle_id, event);
    }
}

enum RelayKind {
    Rtp,
    Rtcp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ice::{MockIceAgent, MockIceState};
    use crate::module::Module;
    use crate::registry::session::Session;
    use crate::test_support::EchoModule;
    use serde_json::json;

    fn make_callbacks() -> (Callbacks, u64, Arc<crate::registry::handle::Handle>) {
        let (callbacks, id, handle, _state) = make_callbacks_with_state();
        (callbacks, id, handle)
    }

    /// Like `make_callbacks`, but also hands back the handle's ICE agent
    /// state, since `handle.ice` is a `Box<dyn IceAgent>` once built.
    fn make_callbacks_with_state() -> (Callbacks, u64, Arc<crate::registry::handle::Handle>, Arc<MockIceState>) {
        let handles = HandleRegistry::new();
        let config = Arc::new(GatewayConfig::new());
        let events = Arc::new(EventBus::new());
        let deferred = Arc::new(DeferredQueue::new());
        let callbacks = Callbacks::new(handles.clone(), config, events, deferred);

        let session = Session::new(1, None);
        let module: Arc<dyn Module> = Arc::new(EchoModule::default());
        let agent = MockIceAgent::new();
        let state = agent.state();
        let handle = crate::registry::handle::Handle::new(7, &session, module, None, Box::new(agent));
        session.insert_handle(handle.clone());
        handles.insert(&handle);

        (callbacks, handle.id, handle, state)
    }

    #[test]
    fn push_event_fails_for_unknown_handle() {
        let (callbacks, _id, _handle) = make_callbacks();
        let err = callbacks.push_event(999, None, json!({}), None).unwrap_err();
        assert!(matches!(err, CoreError::HandleNotFound(999)));
    }

    #[test]
    fn push_event_sends_through_transport() {
        let (callbacks, id, _handle) = make_callbacks();
        assert!(callbacks.push_event(id, Some("t1"), json!({"result": "ok"}), None).is_ok());
    }

    #[test]
    fn push_event_threads_module_sdp_into_negotiation() {
        let (callbacks, id, handle, state) = make_callbacks_with_state();
        const OFFER: &str = "v=0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n";
        callbacks
            .push_event(id, Some("t1"), json!({}), Some(json!({"type": "offer", "sdp": OFFER})))
            .unwrap();
        assert_eq!(state.sdp_process_calls.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert_eq!(state.local_setup_calls.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert!(handle.local_sdp().is_some());
    }

    #[test]
    fn close_pc_defers_instead_of_running_inline() {
        let (callbacks, id, _handle, state) = make_callbacks_with_state();
        callbacks.close_pc(id, "test reason");
        assert!(state.hangup_reason.lock().is_none());
        callbacks.deferred.drain();
        assert_eq!(state.hangup_reason.lock().as_deref(), Some("test reason"));
    }

    #[test]
    fn end_session_removes_handle_after_drain() {
        let (callbacks, id, handle) = make_callbacks();
        callbacks.end_session(id);
        assert!(callbacks.handles.resolve(id).is_some());
        callbacks.deferred.drain();
        assert!(callbacks.handles.resolve(id).is_none());
        assert!(handle.is_destroyed());
    }
}
