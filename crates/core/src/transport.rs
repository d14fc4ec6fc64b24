//! The transport carrier interface (spec §1 external interface, §4.7,
//! §6 "Transport interface").
//!
//! A transport owns the actual socket/HTTP/websocket plumbing and is out
//! of scope for this crate (spec §1); what lives here is the trait
//! boundary the core uses to push messages back out, plus the binding a
//! `Session` carries to identify which transport-session it arrived on.

use std::sync::Arc;

use serde_json::Value;

/// The gateway's outbound view of a transport module (spec §6 "Transport
/// interface"). `session_id`/`request_id` are opaque identifiers the
/// transport itself assigned; the core never interprets them.
pub trait Transport: Send + Sync {
    /// Push a JSON envelope to the client identified by `transport_session_id`.
    /// `request_id`, when present, lets the transport correlate the reply
    /// with a specific inbound HTTP long-poll or WebSocket request.
    fn send_message(&self, transport_session_id: u64, request_id: Option<&str>, message: Value);

    /// The core has created a `Session` bound to this transport connection.
    fn session_created(&self, transport_session_id: u64, session_id: u64) {
        let _ = (transport_session_id, session_id);
    }

    /// The core has torn down a session bound to this transport connection.
    fn session_over(&self, transport_session_id: u64, session_id: u64, timeout: bool) {
        let _ = (transport_session_id, session_id, timeout);
    }

    fn is_janus_api_enabled(&self) -> bool {
        true
    }

    fn is_admin_api_enabled(&self) -> bool {
        false
    }
}

/// What a `Session` carries to identify "where it came from" (spec §3
/// "Transport binding"). Refcounted so the registry and the transport
/// module can each hold it independently.
#[derive(Clone)]
pub struct TransportBinding {
    pub transport: Option<Arc<dyn Transport>>,
    /// Opaque id the owning transport assigned to the underlying
    /// connection (socket fd, websocket handle, HTTP long-poll slot...).
    pub transport_session_id: u64,
}

impl TransportBinding {
    pub fn new(transport: Arc<dyn Transport>, transport_session_id: u64) -> Self {
        Self {
            transport: Some(transport),
            transport_session_id,
        }
    }

    pub fn send(&self, request_id: Option<&str>, message: Value) {
        if let Some(transport) = &self.transport {
            transport.send_message(self.transport_session_id, request_id, message);
        }
    }
}

impl Default for TransportBinding {
    /// A session with no transport at all (used by admin-only or
    /// in-process sessions, and by this crate's own unit tests).
    fn default() -> Self {
        Self {
            transport: None,
            transport_session_id: 0,
        }
    }
}

impl std::fmt::Debug for TransportBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBinding")
            .field("transport_session_id", &self.transport_session_id)
            .field("has_transport", &self.transport.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Value>>,
    }

    impl Transport for RecordingTransport {
        fn send_message(&self, _transport_session_id: u64, _request_id: Option<&str>, message: Value) {
            self.sent.lock().push(message);
        }
    }

    #[test]
    fn binding_forwards_to_transport() {
        let transport = Arc::new(RecordingTransport::default());
        let binding = TransportBinding::new(transport.clone(), 7);
        binding.send(None, serde_json::json!({"janus": "ack"}));
        assert_eq!(transport.sent.lock().len(), 1);
    }

    #[test]
    fn default_binding_drops_sends_silently() {
        let binding = TransportBinding::default();
        binding.send(None, Value::Null);
        assert_eq!(binding.transport_session_id, 0);
    }
}
