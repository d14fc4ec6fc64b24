//! Request authorization (spec §4.3).
//!
//! Checks the `apisecret`/`token` fields of an inbound body against the
//! configured gate. The admin channel is checked separately through
//! [`GatewayConfig::admin_secret_matches`] directly, since it never
//! consults the token store (spec §4.3: "the admin channel uses a
//! separate admin secret").

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::error::CoreError;

/// Opaque-token store: each token maps to the set of module package
/// strings it is allowed to `attach` to. An empty allow-list means "no
/// modules" rather than "all modules" — callers add entries explicitly
/// via `allow_token`.
#[derive(Default)]
pub struct TokenStore {
    tokens: RwLock<HashMap<String, HashSet<String>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, token: &str) -> bool {
        self.tokens
            .write()
            .insert(token.to_string(), HashSet::new())
            .is_none()
    }

    pub fn remove(&self, token: &str) -> bool {
        self.tokens.write().remove(token).is_some()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.read().contains_key(token)
    }

    pub fn allow(&self, token: &str, package: &str) -> Result<(), CoreError> {
        let mut guard = self.tokens.write();
        let allow_list = guard.get_mut(token).ok_or(CoreError::TokenNotFound)?;
        allow_list.insert(package.to_string());
        Ok(())
    }

    pub fn disallow(&self, token: &str, package: &str) -> Result<(), CoreError> {
        let mut guard = self.tokens.write();
        let allow_list = guard.get_mut(token).ok_or(CoreError::TokenNotFound)?;
        allow_list.remove(package);
        Ok(())
    }

    /// Whether `token` may `attach` to `package` (spec §4.3: "tokens
    /// additionally carry per-module allow-lists consulted at attach time").
    pub fn permits(&self, token: &str, package: &str) -> bool {
        self.tokens
            .read()
            .get(token)
            .map(|allowed| allowed.contains(package))
            .unwrap_or(false)
    }

    pub fn list(&self) -> Vec<String> {
        self.tokens.read().keys().cloned().collect()
    }
}

/// Authorize an inbound client-channel body against the gateway's API
/// secret and/or token auth (spec §4.3). Passes unconditionally if both
/// are disabled.
pub fn authorize(config: &GatewayConfig, tokens: &TokenStore, body: &Value) -> Result<(), CoreError> {
    let secret_enabled = config.has_api_secret();
    let token_enabled = config.token_auth_enabled.load(std::sync::atomic::Ordering::Relaxed);

    if !secret_enabled && !token_enabled {
        return Ok(());
    }

    if secret_enabled {
        if let Some(provided) = body.get("apisecret").and_then(Value::as_str) {
            if config.api_secret_matches(provided) {
                return Ok(());
            }
        }
    }

    if token_enabled {
        if let Some(provided) = body.get("token").and_then(Value::as_str) {
            if tokens.contains(provided) {
                return Ok(());
            }
        }
    }

    Err(CoreError::Unauthorized)
}

/// Authorize an `attach` verb's module choice against a token's allow-list.
/// Only meaningful when token auth is enabled; otherwise every module is
/// reachable once the base `authorize` check above has passed.
pub fn authorize_module(
    config: &GatewayConfig,
    tokens: &TokenStore,
    body: &Value,
    package: &str,
) -> Result<(), CoreError> {
    if !config.token_auth_enabled.load(std::sync::atomic::Ordering::Relaxed) {
        return Ok(());
    }
    let token = body
        .get("token")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::UnauthorizedPlugin(package.to_string()))?;
    if tokens.permits(token, package) {
        Ok(())
    } else {
        Err(CoreError::UnauthorizedPlugin(package.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn passes_when_nothing_configured() {
        let config = GatewayConfig::new();
        let tokens = TokenStore::new();
        assert!(authorize(&config, &tokens, &json!({})).is_ok());
    }

    #[test]
    fn rejects_missing_secret() {
        let config = GatewayConfig::new();
        *config.api_secret.write() = Some("s3cr3t".to_string());
        let tokens = TokenStore::new();
        assert!(authorize(&config, &tokens, &json!({})).is_err());
        assert!(authorize(&config, &tokens, &json!({"apisecret": "s3cr3t"})).is_ok());
    }

    #[test]
    fn token_allow_list_gates_attach() {
        let config = GatewayConfig::new();
        config
            .token_auth_enabled
            .store(true, std::sync::atomic::Ordering::Relaxed);
        let tokens = TokenStore::new();
        tokens.add("abc");
        tokens.allow("abc", "core.plugin.echo").unwrap();

        let body = json!({"token": "abc"});
        assert!(authorize(&config, &tokens, &body).is_ok());
        assert!(authorize_module(&config, &tokens, &body, "core.plugin.echo").is_ok());
        assert!(authorize_module(&config, &tokens, &body, "core.plugin.other").is_err());
    }
}
