//! The ICE/DTLS/SRTP collaborator interface (spec §1: named external
//! interface, implementation out of scope).
//!
//! The negotiation state machine in `negotiation` drives an `IceAgent`
//! through local setup, SDP processing, candidate application, restarts,
//! and gathering — but never implements ICE itself. Production hosts
//! provide a real agent (libnice/webrtc.rs bindings, etc.); `MockIceAgent`
//! below exists only so the negotiation state machine can be exercised in
//! this crate's own tests.
//!
//! Ownership: an agent is created once per handle and owned directly by
//! the `Handle` (`Box<dyn IceAgent>`), per spec §9/§3 — no separate arena,
//! since the core always holds the handle's lock before calling into the
//! agent, so there is no callback cycle to break.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// What kind of negotiation is starting (spec §4.5: "fresh" vs.
/// "renegotiation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupKind {
    /// First offer/answer exchange for this handle.
    Fresh,
    /// `READY` handle negotiating again.
    Renegotiation,
}

/// The ICE/DTLS/SRTP collaborator a `Handle` drives.
///
/// All methods are synchronous from the state machine's point of view;
/// a real implementation may hand work to its own worker threads but must
/// honor the call/return contract described per-method here.
pub trait IceAgent: Send {
    /// Local ICE/DTLS setup for a fresh offer (spec §4.5: "invoke ICE local
    /// setup with `(audio, video, data, do_trickle)`").
    fn local_setup(&mut self, audio: bool, video: bool, data: bool, do_trickle: bool);

    /// Process a parsed remote SDP, fresh or renegotiation (spec §4.5: "Run
    /// SDP-process against the parsed SDP"). Returns `Err` on malformed
    /// ICE/DTLS material, mapped by the caller to `JSEP_INVALID_SDP`.
    fn sdp_process(&mut self, sdp: &str, kind: SetupKind, is_offer: bool) -> Result<(), String>;

    /// Apply one parsed remote candidate.
    fn add_remote_candidate(&mut self, candidate: &Value) -> Result<(), String>;

    /// Signal that no more candidates are coming for this generation
    /// (spec §4.5: "set up remote candidates immediately" path, and the
    /// answer-trickle drain's `end-of-candidates` equivalent).
    fn set_remote_candidates_complete(&mut self);

    /// Push fresh local ICE credentials ahead of a restart (spec §4.5).
    fn restart(&mut self);

    /// Local candidate-gathering completion counter (spec §4.5: "waits for
    /// ICE candidate gathering to finish (`cdone >= 1`...)").
    fn gathering_done_count(&self) -> u32;

    /// Merge WebRTC-specific lines (credentials, fingerprint, candidates
    /// when half-trickle, RTX payload types) into a module-originated SDP
    /// body, returning the final local SDP to store/send.
    fn merge_local_sdp(&mut self, sdp: &str, is_offer: bool, include_candidates: bool) -> String;

    /// Tear down the agent (spec §4.4 `hangup`, §4.7 `close_pc`).
    fn hangup(&mut self, reason: &str);

    /// Ask the DTLS collaborator to create the SCTP association backing
    /// data channels, on renegotiation where they were just negotiated for
    /// the first time (spec §4.5). No-op for agents without SCTP support.
    fn ensure_data_channel_association(&mut self) {}
}

/// Call counters and captured arguments for a [`MockIceAgent`], kept behind
/// an `Arc` so a test can hold on to them after the agent itself has been
/// boxed into a `Handle` as `Box<dyn IceAgent>` (erasing the concrete type).
#[derive(Debug, Default)]
pub struct MockIceState {
    pub local_setup_calls: AtomicU32,
    pub sdp_process_calls: AtomicU32,
    pub restart_calls: AtomicU32,
    pub gathering_done: AtomicU32,
    pub hangup_reason: Mutex<Option<String>>,
    pub remote_candidates: Mutex<Vec<Value>>,
}

/// Minimal in-memory `IceAgent` used by this crate's own tests and the
/// `cli` demo host. Never returns an error, never actually touches the
/// network — it exists to let the negotiation state machine be exercised
/// without a real ICE/DTLS stack.
#[derive(Debug)]
pub struct MockIceAgent {
    state: Arc<MockIceState>,
}

impl MockIceAgent {
    pub fn new() -> Self {
        Self::with_state(Arc::new(MockIceState::default()))
    }

    /// Build an agent backed by caller-supplied state, so the caller can
    /// keep a clone of `state` and inspect it after the agent is moved.
    pub fn with_state(state: Arc<MockIceState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> Arc<MockIceState> {
        self.state.clone()
    }
}

impl Default for MockIceAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl IceAgent for MockIceAgent {
    fn local_setup(&mut self, _audio: bool, _video: bool, _data: bool, _do_trickle: bool) {
        self.state.local_setup_calls.fetch_add(1, Ordering::Relaxed);
        self.state.gathering_done.store(1, Ordering::Relaxed);
    }

    fn sdp_process(&mut self, _sdp: &str, _kind: SetupKind, _is_offer: bool) -> Result<(), String> {
        self.state.sdp_process_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn add_remote_candidate(&mut self, candidate: &Value) -> Result<(), String> {
        self.state.remote_candidates.lock().push(candidate.clone());
        Ok(())
    }

    fn set_remote_candidates_complete(&mut self) {}

    fn restart(&mut self) {
        self.state.restart_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn gathering_done_count(&self) -> u32 {
        self.state.gathering_done.load(Ordering::Relaxed)
    }

    fn merge_local_sdp(&mut self, sdp: &str, _is_offer: bool, _include_candidates: bool) -> String {
        sdp.to_string()
    }

    fn hangup(&mut self, reason: &str) {
        *self.state.hangup_reason.lock() = Some(reason.to_string());
    }
}
