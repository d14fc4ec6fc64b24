//! The dispatcher's unit of work (spec §3 "Request").

use serde_json::Value;

use crate::transport::TransportBinding;

/// An immutable snapshot of one inbound message, from dispatch onward
/// (spec §3). Nothing about a `Request` changes after construction; the
/// dispatcher and worker pool only ever read it and reply through its
/// `transport` binding.
pub struct Request {
    pub transport: TransportBinding,
    pub request_id: Option<String>,
    pub admin: bool,
    pub body: Value,
}

impl Request {
    pub fn new(transport: TransportBinding, request_id: Option<String>, admin: bool, body: Value) -> Self {
        Self {
            transport,
            request_id,
            admin,
            body,
        }
    }

    pub fn janus(&self) -> Option<&str> {
        self.body.get("janus").and_then(Value::as_str)
    }

    pub fn transaction(&self) -> Option<&str> {
        self.body.get("transaction").and_then(Value::as_str)
    }

    pub fn session_id(&self) -> Option<u64> {
        self.body.get("session_id").and_then(Value::as_u64)
    }

    pub fn handle_id(&self) -> Option<u64> {
        self.body.get("handle_id").and_then(Value::as_u64)
    }

    /// Send a reply envelope back over this request's originating
    /// transport binding (spec §4.2 "Replies are written directly to the
    /// transport module via the Request's binding").
    pub fn reply(&self, envelope: Value) {
        self.transport.send(self.request_id.as_deref(), envelope);
    }
}
