//! JSON wire envelope construction (spec §6).
//!
//! Every reply the dispatcher and negotiation state machine produce funnels
//! through one of these builders, so the `{janus: ...}` shape is assembled
//! in exactly one place. Bodies are plain `serde_json::Value` rather than
//! generated structs — the wire protocol is open-ended (modules and
//! transports contribute their own fields), matching how the `oddjobs`
//! example repo's `crates/core` treats its own job payloads as opaque JSON.

use serde_json::{json, Value};

use crate::error::CoreError;

/// `{janus:"success", transaction, session_id?, data|plugindata}`.
pub fn success_reply(transaction: &str, session_id: Option<u64>, data: Value) -> Value {
    let mut envelope = json!({
        "janus": "success",
        "transaction": transaction,
    });
    if let Some(id) = session_id {
        envelope["session_id"] = json!(id);
    }
    merge_payload(&mut envelope, data);
    envelope
}

/// `{janus:"error", transaction, error:{code, reason}}`.
pub fn error_reply(transaction: &str, session_id: Option<u64>, err: &CoreError) -> Value {
    let mut envelope = json!({
        "janus": "error",
        "transaction": transaction,
        "error": {
            "code": err.code().as_u32(),
            "reason": err.reason(),
        },
    });
    if let Some(id) = session_id {
        envelope["session_id"] = json!(id);
    }
    envelope
}

/// `{janus:"ack", transaction, session_id?}` — acknowledges a verb that
/// will complete asynchronously (spec §4.2, §4.4).
pub fn ack_reply(transaction: &str, session_id: Option<u64>) -> Value {
    let mut envelope = json!({
        "janus": "ack",
        "transaction": transaction,
    });
    if let Some(id) = session_id {
        envelope["session_id"] = json!(id);
    }
    envelope
}

/// `{janus:"pong", transaction}` (spec §4.4 `ping`).
pub fn pong_reply(transaction: &str) -> Value {
    json!({
        "janus": "pong",
        "transaction": transaction,
    })
}

/// `{janus:"server_info", transaction, ...descriptor}` (spec §4.4 `info`).
pub fn server_info_reply(transaction: &str, descriptor: Value) -> Value {
    let mut envelope = json!({
        "janus": "server_info",
        "transaction": transaction,
    });
    merge_payload(&mut envelope, descriptor);
    envelope
}

/// `{janus:"event", sender, plugindata:{plugin,data}, jsep?}` (spec §4.7
/// `push_event`).
pub fn event_reply(handle_id: u64, plugin: &str, data: Value, jsep: Option<Value>) -> Value {
    let mut envelope = json!({
        "janus": "event",
        "sender": handle_id,
        "plugindata": {
            "plugin": plugin,
            "data": data,
        },
    });
    if let Some(jsep) = jsep {
        envelope["jsep"] = jsep;
    }
    envelope
}

/// `{janus:"timeout", session_id}` — emitted by the sweeper (spec §4.1).
pub fn timeout_event(session_id: u64) -> Value {
    json!({
        "janus": "timeout",
        "session_id": session_id,
    })
}

/// Fold a verb-specific payload (`data`, `plugindata`, `jsep`, ...) into an
/// envelope that already carries `janus`/`transaction`/`session_id`.
fn merge_payload(envelope: &mut Value, payload: Value) {
    if let Value::Object(fields) = payload {
        if let Value::Object(target) = envelope {
            target.extend(fields);
        }
    } else if !payload.is_null() {
        envelope["data"] = payload;
    }
}

/// Pull a required string field off a request body, mapping absence to
/// the envelope-error taxonomy (spec §7 "missing mandatory element").
pub fn require_str<'a>(body: &'a Value, field: &'static str) -> Result<&'a str, CoreError> {
    body.get(field)
        .and_then(Value::as_str)
        .ok_or(CoreError::MissingMandatoryElement(field))
}

/// Pull a required positive-integer field (`session_id`, `handle_id`).
pub fn require_u64(body: &Value, field: &'static str) -> Result<u64, CoreError> {
    body.get(field)
        .and_then(Value::as_u64)
        .ok_or(CoreError::MissingMandatoryElement(field))
}

/// Pull an optional string field, rejecting a present-but-wrong-typed one.
pub fn optional_str<'a>(body: &'a Value, field: &'static str) -> Result<Option<&'a str>, CoreError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(CoreError::InvalidElementType(field)),
    }
}

/// Pull a required boolean field (admin tuning verbs, spec §4.6).
pub fn require_bool(body: &Value, field: &'static str) -> Result<bool, CoreError> {
    body.get(field)
        .and_then(Value::as_bool)
        .ok_or(CoreError::MissingMandatoryElement(field))
}
