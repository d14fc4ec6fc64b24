//! Session/handle control verbs (spec §4.4): `info`, `ping`, `create`,
//! `keepalive`, `attach`, `detach`, `destroy`, `hangup`, and `trickle`
//! (delegated to [`crate::verbs::trickle`]). `message` is handled
//! separately by [`crate::verbs::message`] since it is the only verb
//! routed to the worker pool.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::auth;
use crate::envelope;
use crate::error::CoreError;
use crate::gateway::{error_envelope, Gateway};
use crate::ice::{IceAgent, MockIceAgent};
use crate::registry::handle::Handle;
use crate::registry::session::Session;
use crate::request::Request;
use crate::verbs::trickle;

/// Entry point for every non-admin, non-`message` verb (spec §4.2 routing
/// rule: everything except `message` runs synchronously on the dispatcher
/// thread).
pub fn handle(gateway: &Gateway, request: &Request) -> Option<Value> {
    if request.transaction().is_none() {
        return Some(error_envelope(request, CoreError::MissingMandatoryElement("transaction")));
    }
    let transaction = request.transaction().unwrap_or("").to_string();

    let verb = match request.janus() {
        Some(v) => v.to_string(),
        None => return Some(error_envelope(request, CoreError::MissingMandatoryElement("janus"))),
    };

    // `info`/`ping` need no session and no authorization (spec §4.4: "no
    // session required").
    if verb == "info" {
        return Some(envelope::server_info_reply(&transaction, gateway.descriptor_json()));
    }
    if verb == "ping" {
        return Some(envelope::pong_reply(&transaction));
    }

    if let Err(err) = gateway.authorize(&request.body) {
        return Some(error_envelope(request, err));
    }

    let result: Result<Value, CoreError> = match verb.as_str() {
        "create" => create(gateway, request, &transaction),
        "keepalive" => keepalive(gateway, request, &transaction),
        "attach" => attach(gateway, request, &transaction),
        "detach" => detach(gateway, request, &transaction),
        "destroy" => destroy(gateway, request, &transaction),
        "hangup" => hangup(gateway, request, &transaction),
        "trickle" => trickle::handle(gateway, request, &transaction),
        other => Err(CoreError::UnknownRequest(other.to_string())),
    };

    Some(result.unwrap_or_else(|err| error_envelope(request, err)))
}

/// Resolve `session_id` off the request body, bumping `last_activity`
/// (spec invariant 3: "updated on every authorized inbound verb that
/// names the session"). Fails with `SessionNotFound` for an unknown or
/// already-destroyed session.
pub fn require_session(gateway: &Gateway, request: &Request) -> Result<Arc<Session>, CoreError> {
    let id = envelope::require_u64(&request.body, "session_id")?;
    let session = gateway
        .sessions
        .find_session(id)
        .filter(|s| !s.is_destroyed())
        .ok_or(CoreError::SessionNotFound(id))?;
    session.touch();
    Ok(session)
}

/// Resolve `handle_id` off the request body against the given session.
pub fn require_handle(session: &Session, request: &Request) -> Result<Arc<Handle>, CoreError> {
    let id = envelope::require_u64(&request.body, "handle_id")?;
    session.get_handle(id).ok_or(CoreError::HandleNotFound(id))
}

fn create(gateway: &Gateway, request: &Request, transaction: &str) -> Result<Value, CoreError> {
    let id_hint = match request.body.get("id") {
        None | Some(Value::Null) => 0,
        Some(v) => v.as_u64().ok_or(CoreError::InvalidElementType("id"))?,
    };
    let session = gateway
        .sessions
        .create_session(id_hint, Some(request.transport.clone()))?;

    if let Some(transport) = session.transport.transport.as_ref() {
        transport.session_created(session.transport.transport_session_id, session.id);
    }

    Ok(envelope::success_reply(
        transaction,
        None,
        json!({ "data": { "id": session.id } }),
    ))
}

fn keepalive(gateway: &Gateway, request: &Request, transaction: &str) -> Result<Value, CoreError> {
    let session = require_session(gateway, request)?;
    Ok(envelope::ack_reply(transaction, Some(session.id)))
}

fn attach(gateway: &Gateway, request: &Request, transaction: &str) -> Result<Value, CoreError> {
    let session = require_session(gateway, request)?;
    let package = envelope::require_str(&request.body, "plugin")?;
    let opaque_id = envelope::optional_str(&request.body, "opaque_id")?.map(str::to_string);

    let module = gateway
        .modules
        .find(package)
        .ok_or_else(|| CoreError::PluginNotFound(package.to_string()))?;

    auth::authorize_module(&gateway.config, &gateway.tokens, &request.body, package)?;

    let handle_id = session.next_handle_id();
    let ice: Box<dyn IceAgent> = Box::new(MockIceAgent::new());
    let handle = Handle::new(handle_id, &session, module.clone(), opaque_id, ice);

    module
        .create_session(handle.id)
        .map_err(|err| CoreError::PluginAttachError(err.to_string()))?;

    session.insert_handle(handle.clone());
    gateway.handles.insert(&handle);

    Ok(envelope::success_reply(
        transaction,
        Some(session.id),
        json!({ "data": { "id": handle.id } }),
    ))
}

fn detach(gateway: &Gateway, request: &Request, transaction: &str) -> Result<Value, CoreError> {
    let session = require_session(gateway, request)?;
    let handle_id = envelope::require_u64(&request.body, "handle_id")?;
    let handle = session
        .remove_handle(handle_id)
        .ok_or(CoreError::HandleNotFound(handle_id))?;
    gateway.handles.remove(handle_id);
    handle.destroy("detach");
    Ok(envelope::success_reply(transaction, Some(session.id), Value::Null))
}

fn destroy(gateway: &Gateway, request: &Request, transaction: &str) -> Result<Value, CoreError> {
    let session = require_session(gateway, request)?;
    gateway.sessions.remove(session.id);
    let handle_ids = session.handle_ids();
    session.destroy("destroy");
    for handle_id in handle_ids {
        gateway.handles.remove(handle_id);
    }
    if let Some(transport) = session.transport.transport.as_ref() {
        transport.session_over(session.transport.transport_session_id, session.id, false);
    }
    Ok(envelope::success_reply(transaction, Some(session.id), Value::Null))
}

fn hangup(gateway: &Gateway, request: &Request, transaction: &str) -> Result<Value, CoreError> {
    let session = require_session(gateway, request)?;
    let handle = require_handle(&session, request)?;
    handle.ice.lock().hangup("Janus API");
    Ok(envelope::success_reply(transaction, Some(session.id), Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::test_support::EchoModule;
    use crate::transport::TransportBinding;

    fn gateway() -> Arc<Gateway> {
        let gateway = Gateway::new(GatewayConfig::new());
        gateway.register_module(Arc::new(EchoModule::default()));
        gateway
    }

    fn req(body: Value) -> Request {
        Request::new(TransportBinding::default(), None, false, body)
    }

    #[test]
    fn create_then_attach_then_keepalive() {
        let gateway = gateway();

        let reply = handle(&gateway, &req(json!({"janus": "create", "transaction": "t1"}))).unwrap();
        assert_eq!(reply["janus"], "success");
        let session_id = reply["data"]["id"].as_u64().unwrap();
        assert!(session_id > 0);

        let reply = handle(
            &gateway,
            &req(json!({
                "janus": "attach",
                "transaction": "t2",
                "session_id": session_id,
                "plugin": "core.plugin.echo",
            })),
        )
        .unwrap();
        assert_eq!(reply["janus"], "success");
        assert!(reply["data"]["id"].as_u64().unwrap() > 0);

        let reply = handle(
            &gateway,
            &req(json!({"janus": "keepalive", "transaction": "t3", "session_id": session_id})),
        )
        .unwrap();
        assert_eq!(reply["janus"], "ack");
    }

    #[test]
    fn create_with_duplicate_id_conflicts() {
        let gateway = gateway();
        handle(&gateway, &req(json!({"janus": "create", "transaction": "t1", "id": 42}))).unwrap();
        let reply = handle(&gateway, &req(json!({"janus": "create", "transaction": "t2", "id": 42}))).unwrap();
        assert_eq!(reply["janus"], "error");
        assert_eq!(reply["error"]["code"], 450);
    }

    #[test]
    fn attach_rejects_unknown_plugin() {
        let gateway = gateway();
        let reply = handle(&gateway, &req(json!({"janus": "create", "transaction": "t1"}))).unwrap();
        let session_id = reply["data"]["id"].as_u64().unwrap();

        let reply = handle(
            &gateway,
            &req(json!({
                "janus": "attach",
                "transaction": "t2",
                "session_id": session_id,
                "plugin": "does.not.exist",
            })),
        )
        .unwrap();
        assert_eq!(reply["error"]["code"], 456);
    }

    #[test]
    fn destroy_removes_session_from_registry() {
        let gateway = gateway();
        let reply = handle(&gateway, &req(json!({"janus": "create", "transaction": "t1"}))).unwrap();
        let session_id = reply["data"]["id"].as_u64().unwrap();

        handle(
            &gateway,
            &req(json!({"janus": "destroy", "transaction": "t2", "session_id": session_id})),
        )
        .unwrap();
        assert!(gateway.sessions.find_session(session_id).is_none());
    }

    #[test]
    fn ping_and_info_need_no_session() {
        let gateway = gateway();
        let reply = handle(&gateway, &req(json!({"janus": "ping", "transaction": "t1"}))).unwrap();
        assert_eq!(reply["janus"], "pong");
        let reply = handle(&gateway, &req(json!({"janus": "info", "transaction": "t2"}))).unwrap();
        assert_eq!(reply["janus"], "server_info");
    }

    #[test]
    fn unauthorized_when_api_secret_configured() {
        let gateway = gateway();
        *gateway.config.api_secret.write() = Some("s3cr3t".to_string());
        let reply = handle(&gateway, &req(json!({"janus": "create", "transaction": "t1"}))).unwrap();
        assert_eq!(reply["error"]["code"], 403);
    }
}
