//! The `trickle` verb (spec §4.5 "Trickle verb").
//!
//! Validates the envelope shape (exactly one of `candidate`/`candidates`,
//! an attached and live handle) and delegates the buffer-or-apply
//! decision to [`crate::negotiation::handle_trickle`].

use serde_json::Value;

use crate::envelope;
use crate::error::CoreError;
use crate::gateway::Gateway;
use crate::negotiation;
use crate::request::Request;
use crate::verbs::session;

pub fn handle(gateway: &Gateway, request: &Request, transaction: &str) -> Result<Value, CoreError> {
    let sess = session::require_session(gateway, request)?;
    let handle = session::require_handle(&sess, request)?;

    // "Reject if no handle attached or no module alive" (spec §4.5).
    if handle.is_stopped() {
        return Err(CoreError::HandleNotFound(handle.id));
    }

    let candidate = request.body.get("candidate");
    let candidates = request.body.get("candidates");

    // "Reject if both candidate and candidates are present" — checked
    // before any state mutation (spec invariant 9, scenario S6).
    let payload = match (candidate, candidates) {
        (Some(_), Some(_)) => {
            return Err(CoreError::InvalidJsonObject(
                "candidate and candidates are mutually exclusive".to_string(),
            ))
        }
        (Some(single), None) => single.clone(),
        (None, Some(array)) => array.clone(),
        (None, None) => return Err(CoreError::MissingMandatoryElement("candidate")),
    };

    negotiation::handle_trickle(&handle, transaction, payload)?;

    Ok(envelope::ack_reply(transaction, Some(sess.id)))
}
