//! # janus-core — signaling core of a WebRTC gateway
//!
//! Terminates a client-facing JSON control protocol on one side and a set
//! of in-process media modules on the other, bridging them around a
//! per-connection WebRTC peer-connection state machine. This crate owns
//! the lifetime of *sessions* (long-lived client contexts), *handles*
//! (per-peer-connection attachments to a module), and the signaling state
//! that governs offer/answer exchange, ICE trickle buffering,
//! renegotiation, and teardown.
//!
//! ICE/DTLS/SRTP machinery, RTP/RTCP relay, the SDP parser/rewriter
//! internals, transport carriers, and the media modules themselves are
//! external collaborators named only by trait ([`ice::IceAgent`],
//! [`transport::Transport`], [`module::Module`]) — this crate never
//! implements them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Transports (HTTP / WebSocket / ...)          │
//! ├────────────────────────────────────────────── ┤
//! │  Gateway       — orchestrator, public API      │
//! │  Dispatcher    — single ingress queue + pool   │
//! │  Verbs         — client + admin protocol       │
//! ├────────────────────────────────────────────── ┤
//! │  Registry      — sessions, handles, sweeper    │
//! │  Negotiation    — offer/answer, trickle, SDP   │
//! │  Auth          — api secret, tokens            │
//! ├────────────────────────────────────────────── ┤
//! │  Module        — media plugin trait boundary   │
//! │  Ice           — ICE/DTLS/SRTP trait boundary  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use janus_core::config::GatewayConfig;
//! use janus_core::gateway::Gateway;
//!
//! let gateway = Gateway::new(GatewayConfig::new());
//! // gateway.register_module(Arc::new(my_module));
//! // gateway.register_transport(Arc::new(my_transport));
//! gateway.start();
//! ```
//!
//! ## Crate layout
//!
//! - [`gateway`] — [`gateway::Gateway`] orchestrator wiring every subsystem together.
//! - [`registry`] — [`registry::Session`]/[`registry::Handle`] lifecycle and the idle sweeper.
//! - [`dispatch`] — the single-consumer request queue and the `message`-verb worker pool.
//! - [`verbs`] — client-channel and admin-channel verb handlers.
//! - [`negotiation`] — the per-handle WebRTC offer/answer/trickle state machine.
//! - [`auth`] — API-secret and opaque-token authorization.
//! - [`callbacks`] — the module-facing callback API (`push_event`, `relay_*`, `close_pc`, ...).
//! - [`module`] — the media-module plugin trait boundary.
//! - [`transport`] — the transport-carrier trait boundary.
//! - [`ice`] — the ICE/DTLS/SRTP collaborator trait boundary.
//! - [`events`] — the pluggable event-handler broadcast.
//! - [`envelope`] — JSON wire envelope construction.
//! - [`error`] — [`error::CoreError`] and the wire-level error taxonomy.

pub mod auth;
pub mod callbacks;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod events;
pub mod gateway;
pub mod ice;
pub mod module;
pub mod negotiation;
pub mod registry;
pub mod request;
pub mod transport;
pub mod verbs;

#[cfg(test)]
pub mod test_support;

pub use error::{CoreError, Result};
pub use gateway::Gateway;
pub use module::Module;
pub use registry::{Handle, Session};
pub use request::Request;
pub use transport::Transport;
