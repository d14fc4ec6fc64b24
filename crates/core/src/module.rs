//! The media-module plugin interface (spec §1 external interface, §4.7,
//! §6 "Module interface").
//!
//! A module is the thing a `Handle` is attached to: it receives the parsed
//! `message`/`jsep` bodies the dispatcher routes to it and, in turn, drives
//! the handle back through the callback API in `crate::callbacks`. Real
//! modules are out of scope (spec §1) — this crate only defines the trait
//! boundary and, under `test_support`, a trivial echo module to exercise it.

use serde_json::Value;

use crate::error::CoreError;

/// Static identity a module reports at load time (spec §6).
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    pub package: &'static str,
    pub name: &'static str,
    pub author: &'static str,
    pub version: u32,
    pub version_string: &'static str,
    pub description: &'static str,
}

/// Outcome of a module's synchronous `handle_message` call (spec §6:
/// "modules may answer synchronously or defer via `OkWait`").
#[derive(Debug, Clone)]
pub enum ModuleResult {
    /// Synchronous success; the body is folded into the response envelope's
    /// `plugindata.data`.
    Ok(Value),
    /// The module has accepted the request but will reply asynchronously
    /// via `push_event`; the dispatcher acks immediately instead of
    /// blocking a worker on it.
    OkWait(Option<String>),
    /// Synchronous failure, reported as `PLUGIN_MESSAGE_ERROR` unless the
    /// module supplies a more specific `CoreError`.
    Err(CoreError),
}

/// The plugin trait every media module implements (spec §6 "Module
/// interface"). All methods take the handle's strongly-typed id rather
/// than a raw pointer (spec §9: "sentinel-pointer validation" replaced by
/// opaque ids resolved through the registry).
pub trait Module: Send + Sync {
    fn descriptor(&self) -> &ModuleDescriptor;

    /// Called once at gateway start, before any session reaches this
    /// module (spec §6).
    fn init(&self, config_folder: &str) {
        let _ = config_folder;
    }

    /// Called at gateway shutdown.
    fn destroy(&self) {}

    /// A handle has just attached to this module (spec §4.4 `attach`).
    fn create_session(&self, handle_id: u64) -> Result<(), CoreError>;

    /// Admin/debug query surface (spec §6); not the JSEP/message path.
    fn query_session(&self, handle_id: u64) -> Value {
        let _ = handle_id;
        Value::Null
    }

    /// A handle attached to this module is going away (spec §4.4
    /// `detach`/`destroy`). Must not block and must not fail.
    fn destroy_session(&self, handle_id: u64);

    /// The core business of the module interface: handle a `message` verb
    /// body (with an optional parsed JSEP offer/answer already extracted
    /// by the negotiation state machine), returning synchronously or
    /// deferring via `OkWait` (spec §6).
    fn handle_message(&self, handle_id: u64, body: Value, jsep: Option<Value>) -> ModuleResult;

    /// WebRTC media is ready to flow for this handle (spec §4.5: invoked
    /// once negotiation completes and `READY` is set).
    fn setup_media(&self, handle_id: u64) {
        let _ = handle_id;
    }

    /// Media has stopped flowing (ICE failure, handle detach, PeerConnection
    /// closed).
    fn hangup_media(&self, handle_id: u64) {
        let _ = handle_id;
    }

    fn incoming_rtp(&self, handle_id: u64, video: bool, payload: &[u8]) {
        let _ = (handle_id, video, payload);
    }

    fn incoming_rtcp(&self, handle_id: u64, video: bool, payload: &[u8]) {
        let _ = (handle_id, video, payload);
    }

    fn incoming_data(&self, handle_id: u64, label: &str, payload: &[u8]) {
        let _ = (handle_id, label, payload);
    }
}
