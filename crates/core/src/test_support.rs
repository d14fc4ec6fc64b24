//! Test doubles shared across this crate's own unit and integration tests.
//!
//! Not compiled into the public API — gated behind `#[cfg(test)]` in
//! `lib.rs` so it never ships in a release build, matching how the
//! teacher keeps its own fixtures under `#[cfg(test)]` rather than a
//! `dev` feature.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::CoreError;
use crate::module::{Module, ModuleDescriptor, ModuleResult};

const ECHO_DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
    package: "core.plugin.echo",
    name: "Echo test module",
    author: "core",
    version: 1,
    version_string: "0.1.0",
    description: "Echoes handle_message bodies back as the reply, for exercising the dispatcher and negotiation state machine in tests",
};

/// A module that answers every `handle_message` call with the body it was
/// given, and otherwise just counts calls. Used wherever a test needs
/// *some* `Module` without caring what it does.
#[derive(Default)]
pub struct EchoModule {
    pub create_calls: AtomicU32,
    pub destroy_calls: AtomicU32,
    pub messages: Mutex<Vec<Value>>,
    pub fail_create: bool,
}

impl Module for EchoModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &ECHO_DESCRIPTOR
    }

    fn create_session(&self, _handle_id: u64) -> Result<(), CoreError> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_create {
            return Err(CoreError::PluginAttachError("echo module refused".to_string()));
        }
        Ok(())
    }

    fn destroy_session(&self, _handle_id: u64) {
        self.destroy_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn handle_message(&self, _handle_id: u64, body: Value, _jsep: Option<Value>) -> ModuleResult {
        self.messages.lock().push(body.clone());
        ModuleResult::Ok(body)
    }
}
