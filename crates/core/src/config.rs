//! Global mutable tunables (spec §9 "Global mutable tunables").
//!
//! Readable from any thread, writable only by the admin verbs in
//! `verbs::admin`. Modeled as atomics rather than a `RwLock<Struct>` so a
//! read never blocks a concurrent admin write and vice versa — the same
//! tradeoff the teacher makes for `SessionManager`'s port counter.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::RwLock;

/// Idle sweep interval (spec §4.1): fixed, not exposed as a knob.
pub const SWEEP_INTERVAL_SECS: u64 = 2;

/// Default per-session idle timeout in seconds (0 disables the sweep).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// Default trickle-candidate buffer expiry (spec §3, §4.5).
pub const DEFAULT_TRICKLE_EXPIRY_SECS: u64 = 45;

/// Default CLEANING-flag spin-wait deadline (spec §4.5).
pub const DEFAULT_CLEANING_WAIT_MS: u64 = 3_000;

/// Worker-pool idle retirement deadline (spec §5, §9).
pub const WORKER_IDLE_RETIRE_SECS: u64 = 120;

/// Global, live-tunable configuration for a [`crate::gateway::Gateway`].
///
/// Every field the admin protocol can change at runtime is an atomic or a
/// lock-guarded `Option<String>`; nothing here requires restarting the
/// gateway to take effect.
pub struct GatewayConfig {
    /// Seconds of inactivity before a session is swept. 0 disables sweeping.
    pub session_timeout_secs: AtomicU64,
    /// `set_log_level` admin verb target (0..=7, matching Janus's range).
    pub log_level: AtomicU32,
    pub locking_debug: AtomicBool,
    pub refcount_debug: AtomicBool,
    pub log_timestamps: AtomicBool,
    pub log_colors: AtomicBool,
    pub libnice_debug: AtomicBool,
    /// 0 (disabled) or >= 200, enforced by the admin verb handler.
    pub max_nack_queue: AtomicU64,
    pub no_media_timer: AtomicU64,
    /// Trickle-candidate buffer expiry, in seconds (spec §9 open question 2).
    pub trickle_expiry_secs: AtomicU64,
    /// CLEANING-flag spin-wait deadline, in milliseconds (open question 2).
    pub cleaning_wait_ms: AtomicU64,
    /// Full-trickle: local candidates are also trickled rather than inlined.
    pub full_trickle: AtomicBool,
    /// API secret required on the client (`janus`) channel, if any.
    pub api_secret: RwLock<Option<String>>,
    /// Admin secret required on the admin channel, if any.
    pub admin_secret: RwLock<Option<String>>,
    /// Whether opaque-token auth is enabled (spec §4.3).
    pub token_auth_enabled: AtomicBool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: AtomicU64::new(DEFAULT_SESSION_TIMEOUT_SECS),
            log_level: AtomicU32::new(4),
            locking_debug: AtomicBool::new(false),
            refcount_debug: AtomicBool::new(false),
            log_timestamps: AtomicBool::new(true),
            log_colors: AtomicBool::new(true),
            libnice_debug: AtomicBool::new(false),
            max_nack_queue: AtomicU64::new(0),
            no_media_timer: AtomicU64::new(1),
            trickle_expiry_secs: AtomicU64::new(DEFAULT_TRICKLE_EXPIRY_SECS),
            cleaning_wait_ms: AtomicU64::new(DEFAULT_CLEANING_WAIT_MS),
            full_trickle: AtomicBool::new(false),
            api_secret: RwLock::new(None),
            admin_secret: RwLock::new(None),
            token_auth_enabled: AtomicBool::new(false),
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_timeout_secs(&self) -> u64 {
        self.session_timeout_secs.load(Ordering::Relaxed)
    }

    pub fn set_session_timeout_secs(&self, secs: u64) {
        self.session_timeout_secs.store(secs, Ordering::Relaxed);
        tracing::info!(secs, "session_timeout updated");
    }

    pub fn trickle_expiry_secs(&self) -> u64 {
        self.trickle_expiry_secs.load(Ordering::Relaxed)
    }

    pub fn cleaning_wait_ms(&self) -> u64 {
        self.cleaning_wait_ms.load(Ordering::Relaxed)
    }

    pub fn full_trickle(&self) -> bool {
        self.full_trickle.load(Ordering::Relaxed)
    }

    pub fn log_level(&self) -> u32 {
        self.log_level.load(Ordering::Relaxed)
    }

    pub fn set_log_level(&self, level: u32) {
        self.log_level.store(level, Ordering::Relaxed);
    }

    pub fn max_nack_queue(&self) -> u64 {
        self.max_nack_queue.load(Ordering::Relaxed)
    }

    /// Validate and apply `max_nack_queue` (spec §4.6: "0 or >= 200").
    pub fn set_max_nack_queue(&self, value: u64) -> bool {
        if value != 0 && value < 200 {
            return false;
        }
        self.max_nack_queue.store(value, Ordering::Relaxed);
        true
    }

    pub fn api_secret_matches(&self, provided: &str) -> bool {
        match self.api_secret.read().as_deref() {
            Some(secret) => constant_time_eq(secret.as_bytes(), provided.as_bytes()),
            None => false,
        }
    }

    pub fn admin_secret_matches(&self, provided: &str) -> bool {
        match self.admin_secret.read().as_deref() {
            Some(secret) => constant_time_eq(secret.as_bytes(), provided.as_bytes()),
            None => false,
        }
    }

    pub fn has_api_secret(&self) -> bool {
        self.api_secret.read().is_some()
    }

    pub fn has_admin_secret(&self) -> bool {
        self.admin_secret.read().is_some()
    }
}

/// Constant-time byte comparison (spec §4.3).
///
/// Unequal lengths short-circuit (length is not considered secret here —
/// only the content of a matching-length secret is); equal lengths always
/// touch every byte regardless of where the first mismatch is, so timing
/// does not leak the position of a difference.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secre1"));
        assert!(!constant_time_eq(b"secret", b"short"));
    }

    #[test]
    fn max_nack_queue_validates_bounds() {
        let cfg = GatewayConfig::new();
        assert!(cfg.set_max_nack_queue(0));
        assert!(!cfg.set_max_nack_queue(199));
        assert!(cfg.set_max_nack_queue(200));
        assert_eq!(cfg.max_nack_queue(), 200);
    }

    #[test]
    fn api_secret_round_trip() {
        let cfg = GatewayConfig::new();
        assert!(!cfg.has_api_secret());
        *cfg.api_secret.write() = Some("s3cr3t".to_string());
        assert!(cfg.api_secret_matches("s3cr3t"));
        assert!(!cfg.api_secret_matches("wrong"));
    }
}
