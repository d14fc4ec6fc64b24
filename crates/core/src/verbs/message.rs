//! The `message` verb (spec §4.2, §4.4, §4.5): the only verb the
//! dispatcher hands to the worker pool, since a module's `handle_message`
//! may block arbitrarily.

use serde_json::{json, Value};

use crate::envelope;
use crate::error::CoreError;
use crate::gateway::{error_envelope, Gateway};
use crate::module::ModuleResult;
use crate::negotiation::{self, flags};
use crate::request::Request;
use crate::verbs::session;

/// Entry point invoked from a pool worker thread (spec §4.2).
pub fn handle(gateway: &Gateway, request: &Request) -> Option<Value> {
    if request.transaction().is_none() {
        return Some(error_envelope(request, CoreError::MissingMandatoryElement("transaction")));
    }
    let transaction = request.transaction().unwrap_or("").to_string();

    if let Err(err) = gateway.authorize(&request.body) {
        return Some(error_envelope(request, err));
    }

    Some(process(gateway, request, &transaction).unwrap_or_else(|err| error_envelope(request, err)))
}

fn process(gateway: &Gateway, request: &Request, transaction: &str) -> Result<Value, CoreError> {
    let sess = session::require_session(gateway, request)?;
    let handle = session::require_handle(&sess, request)?;

    if handle.is_stopped() {
        return Err(CoreError::HandleNotFound(handle.id));
    }

    let body = request.body.get("body").cloned().unwrap_or(Value::Null);
    if !body.is_object() && !body.is_null() {
        return Err(CoreError::InvalidElementType("body"));
    }

    // Negotiation happens on the core side, before the module ever sees
    // the JSEP (spec §4.5 "Message path with JSEP").
    let jsep_for_module = match request.body.get("jsep") {
        Some(jsep) => {
            let outcome = negotiation::handle_client_jsep(&handle, jsep, &gateway.config)?;
            if !outcome.is_offer {
                // Initial negotiation completed on an answer (spec §4.5:
                // "READY — initial negotiation completed").
                handle.flags.set(flags::READY);
            }
            Some(outcome.jsep_for_module)
        }
        None => None,
    };

    match handle.module.handle_message(handle.id, body, jsep_for_module) {
        ModuleResult::Ok(data) => {
            if handle.is_ready() {
                handle.module.setup_media(handle.id);
            }
            let payload = json!({
                "plugindata": {
                    "plugin": handle.module.descriptor().package,
                    "data": data,
                },
            });
            Ok(envelope::success_reply(transaction, Some(sess.id), payload))
        }
        ModuleResult::OkWait(hint) => {
            let mut reply = envelope::ack_reply(transaction, Some(sess.id));
            if let Some(hint) = hint {
                reply["hint"] = json!(hint);
            }
            Ok(reply)
        }
        ModuleResult::Err(err) => Err(err),
    }
}
