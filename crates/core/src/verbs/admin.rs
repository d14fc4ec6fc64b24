//! Admin-channel verb handlers (spec §4.6).
//!
//! Same envelope shape as the client channel, gated by the separate admin
//! secret (spec §4.3 "the admin channel uses a separate admin secret").
//! Every verb here runs synchronously on the dispatcher thread (spec
//! §4.6: "All admin verbs are dispatched synchronously") — `dispatch_sync`
//! in `gateway.rs` already routes every admin request here regardless of
//! its `janus` verb.

use std::sync::atomic::Ordering;

use serde_json::{json, Value};

use crate::envelope;
use crate::error::CoreError;
use crate::gateway::{error_envelope, Gateway};
use crate::negotiation::flags;
use crate::registry::handle::Handle;
use crate::request::Request;

pub fn handle(gateway: &Gateway, request: &Request) -> Option<Value> {
    if request.transaction().is_none() {
        return Some(error_envelope(request, CoreError::MissingMandatoryElement("transaction")));
    }
    let transaction = request.transaction().unwrap_or("").to_string();

    let verb = match request.janus() {
        Some(v) => v.to_string(),
        None => return Some(error_envelope(request, CoreError::MissingMandatoryElement("janus"))),
    };

    if let Err(err) = gateway.authorize_admin(&request.body) {
        return Some(error_envelope(request, err));
    }

    let result = dispatch(gateway, request, &verb, &transaction);
    Some(result.unwrap_or_else(|err| error_envelope(request, err)))
}

fn success(transaction: &str, payload: Value) -> Value {
    envelope::success_reply(transaction, None, payload)
}

fn ack(transaction: &str) -> Value {
    envelope::ack_reply(transaction, None)
}

fn dispatch(gateway: &Gateway, request: &Request, verb: &str, transaction: &str) -> Result<Value, CoreError> {
    match verb {
        "info" => Ok(envelope::server_info_reply(transaction, gateway.descriptor_json())),
        "get_status" => Ok(success(transaction, json!({ "data": status_json(gateway) }))),

        "set_session_timeout" => {
            let secs = envelope::require_u64(&request.body, "timeout")?;
            gateway.config.set_session_timeout_secs(secs);
            Ok(ack(transaction))
        }
        "set_log_level" => {
            let level = envelope::require_u64(&request.body, "level")?;
            if level > 7 {
                return Err(CoreError::InvalidElementType("level"));
            }
            gateway.config.set_log_level(level as u32);
            Ok(ack(transaction))
        }
        "set_locking_debug" => {
            let debug = envelope::require_bool(&request.body, "debug")?;
            gateway.config.locking_debug.store(debug, Ordering::Relaxed);
            Ok(ack(transaction))
        }
        "set_refcount_debug" => {
            let debug = envelope::require_bool(&request.body, "debug")?;
            gateway.config.refcount_debug.store(debug, Ordering::Relaxed);
            Ok(ack(transaction))
        }
        "set_log_timestamps" => {
            let debug = envelope::require_bool(&request.body, "debug")?;
            gateway.config.log_timestamps.store(debug, Ordering::Relaxed);
            Ok(ack(transaction))
        }
        "set_log_colors" => {
            let debug = envelope::require_bool(&request.body, "debug")?;
            gateway.config.log_colors.store(debug, Ordering::Relaxed);
            Ok(ack(transaction))
        }
        "set_libnice_debug" => {
            let debug = envelope::require_bool(&request.body, "debug")?;
            gateway.config.libnice_debug.store(debug, Ordering::Relaxed);
            Ok(ack(transaction))
        }
        "set_max_nack_queue" => {
            let value = envelope::require_u64(&request.body, "max_nack_queue")?;
            if !gateway.config.set_max_nack_queue(value) {
                return Err(CoreError::InvalidElementType("max_nack_queue"));
            }
            Ok(ack(transaction))
        }
        "set_no_media_timer" => {
            let value = envelope::require_u64(&request.body, "no_media_timer")?;
            gateway.config.no_media_timer.store(value, Ordering::Relaxed);
            Ok(ack(transaction))
        }

        "query_eventhandler" => Ok(success(transaction, json!({ "data": Value::Null }))),

        "list_sessions" => Ok(success(transaction, json!({ "sessions": gateway.sessions.session_ids() }))),

        "list_handles" => {
            let session_id = envelope::require_u64(&request.body, "session_id")?;
            let session = gateway
                .sessions
                .find_session(session_id)
                .ok_or(CoreError::SessionNotFound(session_id))?;
            Ok(success(transaction, json!({ "handles": session.handle_ids() })))
        }
        "handle_info" => {
            let session_id = envelope::require_u64(&request.body, "session_id")?;
            let handle_id = envelope::require_u64(&request.body, "handle_id")?;
            let session = gateway
                .sessions
                .find_session(session_id)
                .ok_or(CoreError::SessionNotFound(session_id))?;
            let handle = session.get_handle(handle_id).ok_or(CoreError::HandleNotFound(handle_id))?;
            Ok(success(transaction, json!({ "info": handle_info_json(&handle) })))
        }
        "start_text2pcap" | "stop_text2pcap" => {
            let session_id = envelope::require_u64(&request.body, "session_id")?;
            let handle_id = envelope::require_u64(&request.body, "handle_id")?;
            let session = gateway
                .sessions
                .find_session(session_id)
                .ok_or(CoreError::SessionNotFound(session_id))?;
            session.get_handle(handle_id).ok_or(CoreError::HandleNotFound(handle_id))?;
            // Packet capture lives in the ICE/media collaborator, out of
            // scope here (spec §1); acknowledge the toggle only.
            Ok(ack(transaction))
        }

        "list_tokens" => {
            require_token_auth(gateway)?;
            Ok(success(transaction, json!({ "data": { "tokens": gateway.tokens.list() } })))
        }
        "add_token" => {
            require_token_auth(gateway)?;
            let token = envelope::require_str(&request.body, "token")?;
            gateway.tokens.add(token);
            if let Some(plugins) = request.body.get("plugins").and_then(Value::as_array) {
                for plugin in plugins {
                    if let Some(package) = plugin.as_str() {
                        gateway.tokens.allow(token, package)?;
                    }
                }
            }
            Ok(success(transaction, json!({ "data": { "plugins": gateway.tokens.list() } })))
        }
        "allow_token" => {
            require_token_auth(gateway)?;
            let token = envelope::require_str(&request.body, "token")?;
            let plugins = request
                .body
                .get("plugins")
                .and_then(Value::as_array)
                .ok_or(CoreError::MissingMandatoryElement("plugins"))?;
            for plugin in plugins {
                let package = plugin.as_str().ok_or(CoreError::InvalidElementType("plugins"))?;
                gateway.tokens.allow(token, package)?;
            }
            Ok(ack(transaction))
        }
        "disallow_token" => {
            require_token_auth(gateway)?;
            let token = envelope::require_str(&request.body, "token")?;
            let plugins = request
                .body
                .get("plugins")
                .and_then(Value::as_array)
                .ok_or(CoreError::MissingMandatoryElement("plugins"))?;
            for plugin in plugins {
                let package = plugin.as_str().ok_or(CoreError::InvalidElementType("plugins"))?;
                gateway.tokens.disallow(token, package)?;
            }
            Ok(ack(transaction))
        }
        "remove_token" => {
            require_token_auth(gateway)?;
            let token = envelope::require_str(&request.body, "token")?;
            if !gateway.tokens.remove(token) {
                return Err(CoreError::TokenNotFound);
            }
            Ok(ack(transaction))
        }

        other => Err(CoreError::UnknownRequest(other.to_string())),
    }
}

/// Token-management verbs require token auth to be enabled (spec §4.6:
/// "all require token auth enabled").
fn require_token_auth(gateway: &Gateway) -> Result<(), CoreError> {
    if gateway.config.token_auth_enabled.load(Ordering::Relaxed) {
        Ok(())
    } else {
        Err(CoreError::Unauthorized)
    }
}

fn status_json(gateway: &Gateway) -> Value {
    let config = &gateway.config;
    json!({
        "session_timeout": config.session_timeout_secs(),
        "log_level": config.log_level(),
        "locking_debug": config.locking_debug.load(Ordering::Relaxed),
        "refcount_debug": config.refcount_debug.load(Ordering::Relaxed),
        "log_timestamps": config.log_timestamps.load(Ordering::Relaxed),
        "log_colors": config.log_colors.load(Ordering::Relaxed),
        "libnice_debug": config.libnice_debug.load(Ordering::Relaxed),
        "max_nack_queue": config.max_nack_queue(),
        "no_media_timer": config.no_media_timer.load(Ordering::Relaxed),
        "full_trickle": config.full_trickle(),
        "token_auth_enabled": config.token_auth_enabled.load(Ordering::Relaxed),
    })
}

/// Diagnostic snapshot of a handle (spec §4.6 `handle_info`). `send_thread_created`
/// is deliberately omitted (spec §9 open question 3: "opaque diagnostic, not a
/// stable contract" — and there is no thread-per-handle model here to report on).
fn handle_info_json(handle: &Handle) -> Value {
    json!({
        "session_id": handle.session().map(|s| s.id),
        "opaque_id": handle.opaque_id,
        "plugin": handle.module.descriptor().package,
        "flags": {
            "got-offer": handle.flags.is_set(flags::GOT_OFFER),
            "got-answer": handle.flags.is_set(flags::GOT_ANSWER),
            "processing-offer": handle.flags.is_set(flags::PROCESSING_OFFER),
            "ready": handle.flags.is_set(flags::READY),
            "trickle": handle.flags.is_set(flags::TRICKLE),
            "all-trickles": handle.flags.is_set(flags::ALL_TRICKLES),
            "resend-trickles": handle.flags.is_set(flags::RESEND_TRICKLES),
            "ice-restart": handle.flags.is_set(flags::ICE_RESTART),
            "cleaning": handle.flags.is_set(flags::CLEANING),
            "alert": handle.flags.is_set(flags::ALERT),
            "stop": handle.flags.is_set(flags::STOP),
            "has-audio": handle.flags.is_set(flags::HAS_AUDIO),
            "has-video": handle.flags.is_set(flags::HAS_VIDEO),
            "data-channels": handle.flags.is_set(flags::DATA_CHANNELS),
        },
        "pending-trickles": handle.pending_trickles.len(),
    })
}
