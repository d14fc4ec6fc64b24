//! Error types for the signaling core.
//!
//! [`CoreError`] covers the internal failure modes of the registry,
//! dispatcher, auth gate, and negotiation state machine. [`ErrorCode`] is
//! the wire-level taxonomy from spec §7 — its numeric values are part of
//! the protocol contract and must not be renumbered.

use std::fmt;

/// Convenience alias for `Result<T, CoreError>`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Fixed numeric error codes returned in `error.code` on the wire.
///
/// Grouped by the taxonomy in spec §7: envelope, auth, lookup, negotiation,
/// module-interaction, and generic errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Unauthorized = 403,
    UnauthorizedPlugin = 405,
    SessionConflict = 450,
    SessionNotFound = 454,
    HandleNotFound = 455,
    PluginNotFound = 456,
    MissingMandatoryElement = 457,
    InvalidElementType = 458,
    WebrtcState = 459,
    PluginAttachError = 460,
    PluginMessageError = 461,
    PluginDetachError = 462,
    JsepUnknownType = 463,
    JsepInvalidSdp = 464,
    UnexpectedAnswer = 465,
    UnknownRequestPath = 466,
    InvalidRequestPath = 467,
    InvalidJson = 468,
    InvalidJsonObject = 469,
    UnknownRequest = 470,
    TokenNotFound = 471,
    Internal = 499,
}

impl ErrorCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// Errors raised by the signaling core.
///
/// Every variant maps to an [`ErrorCode`] via [`CoreError::code`] and
/// renders a human reason via [`CoreError::reason`], so the single
/// error-reply path (`envelope::error_reply`) never needs a second match
/// over the taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("unauthorized for module '{0}'")]
    UnauthorizedPlugin(String),

    #[error("session id {0} already in use")]
    SessionConflict(u64),

    #[error("session {0} not found")]
    SessionNotFound(u64),

    #[error("handle {0} not found")]
    HandleNotFound(u64),

    #[error("module '{0}' not found")]
    PluginNotFound(String),

    #[error("missing mandatory element '{0}'")]
    MissingMandatoryElement(&'static str),

    #[error("invalid type for element '{0}'")]
    InvalidElementType(&'static str),

    #[error("WebRTC state error: {0}")]
    WebrtcState(String),

    #[error("module attach failed: {0}")]
    PluginAttachError(String),

    #[error("module message failed: {0}")]
    PluginMessageError(String),

    #[error("module detach failed: {0}")]
    PluginDetachError(String),

    #[error("unknown JSEP type '{0}'")]
    JsepUnknownType(String),

    #[error("invalid JSEP SDP: {0}")]
    JsepInvalidSdp(String),

    #[error("unexpected answer (no local offer outstanding)")]
    UnexpectedAnswer,

    #[error("unknown request path")]
    UnknownRequestPath,

    #[error("invalid request path")]
    InvalidRequestPath,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("invalid JSON object: {0}")]
    InvalidJsonObject(String),

    #[error("unknown request '{0}'")]
    UnknownRequest(String),

    #[error("token not found")]
    TokenNotFound,

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The wire-level error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::Unauthorized => ErrorCode::Unauthorized,
            CoreError::UnauthorizedPlugin(_) => ErrorCode::UnauthorizedPlugin,
            CoreError::SessionConflict(_) => ErrorCode::SessionConflict,
            CoreError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            CoreError::HandleNotFound(_) => ErrorCode::HandleNotFound,
            CoreError::PluginNotFound(_) => ErrorCode::PluginNotFound,
            CoreError::MissingMandatoryElement(_) => ErrorCode::MissingMandatoryElement,
            CoreError::InvalidElementType(_) => ErrorCode::InvalidElementType,
            CoreError::WebrtcState(_) => ErrorCode::WebrtcState,
            CoreError::PluginAttachError(_) => ErrorCode::PluginAttachError,
            CoreError::PluginMessageError(_) => ErrorCode::PluginMessageError,
            CoreError::PluginDetachError(_) => ErrorCode::PluginDetachError,
            CoreError::JsepUnknownType(_) => ErrorCode::JsepUnknownType,
            CoreError::JsepInvalidSdp(_) => ErrorCode::JsepInvalidSdp,
            CoreError::UnexpectedAnswer => ErrorCode::UnexpectedAnswer,
            CoreError::UnknownRequestPath => ErrorCode::UnknownRequestPath,
            CoreError::InvalidRequestPath => ErrorCode::InvalidRequestPath,
            CoreError::InvalidJson(_) => ErrorCode::InvalidJson,
            CoreError::InvalidJsonObject(_) => ErrorCode::InvalidJsonObject,
            CoreError::UnknownRequest(_) => ErrorCode::UnknownRequest,
            CoreError::TokenNotFound => ErrorCode::TokenNotFound,
            CoreError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Human-readable reason string for `error.reason`.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_values_are_stable() {
        assert_eq!(ErrorCode::Unauthorized.as_u32(), 403);
        assert_eq!(ErrorCode::SessionNotFound.as_u32(), 454);
        assert_eq!(ErrorCode::Internal.as_u32(), 499);
    }

    #[test]
    fn error_reports_matching_code() {
        let e = CoreError::SessionNotFound(42);
        assert_eq!(e.code(), ErrorCode::SessionNotFound);
        assert!(e.reason().contains("42"));
    }
}
