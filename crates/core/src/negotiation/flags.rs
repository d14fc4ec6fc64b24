//! The per-handle flag set driving the negotiation state machine (spec §4.5).
//!
//! Implemented as a single `AtomicU32` bitset rather than a `bitflags`-style
//! type (no bitflags crate in the corpus) — each flag is a bit constant and
//! `HandleFlags` exposes `set`/`clear`/`is_set`, matching the atomic-scalar
//! idiom the teacher uses for `SessionManager`'s port counter and the
//! gateway's `running: Arc<AtomicBool>`.

use std::sync::atomic::{AtomicU32, Ordering};

macro_rules! flags {
    ($($name:ident = $bit:expr),+ $(,)?) => {
        $(pub const $name: u32 = 1 << $bit;)+
    };
}

flags! {
    GOT_OFFER = 0,
    GOT_ANSWER = 1,
    PROCESSING_OFFER = 2,
    READY = 3,
    TRICKLE = 4,
    ALL_TRICKLES = 5,
    RESEND_TRICKLES = 6,
    TRICKLE_SYNCED = 7,
    ICE_RESTART = 8,
    CLEANING = 9,
    ALERT = 10,
    STOP = 11,
    HAS_AUDIO = 12,
    HAS_VIDEO = 13,
    DATA_CHANNELS = 14,
    RFC4588_RTX = 15,
    START = 16,
}

/// Atomic bitset of the flags above.
#[derive(Debug, Default)]
pub struct HandleFlags(AtomicU32);

impl HandleFlags {
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn is_set(&self, bit: u32) -> bool {
        self.0.load(Ordering::Acquire) & bit != 0
    }

    pub fn set(&self, bit: u32) {
        self.0.fetch_or(bit, Ordering::AcqRel);
    }

    pub fn clear(&self, bit: u32) {
        self.0.fetch_and(!bit, Ordering::AcqRel);
    }

    pub fn set_to(&self, bit: u32, value: bool) {
        if value {
            self.set(bit);
        } else {
            self.clear(bit);
        }
    }

    /// Atomically clear `bit` and report whether it was previously set
    /// (used for the sweeper's `timeout` compare-and-set, spec §4.1).
    pub fn compare_and_set(&self, bit: u32) -> bool {
        let prev = self.0.fetch_or(bit, Ordering::AcqRel);
        prev & bit == 0
    }

    pub fn snapshot(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear() {
        let f = HandleFlags::new();
        assert!(!f.is_set(READY));
        f.set(READY);
        assert!(f.is_set(READY));
        f.clear(READY);
        assert!(!f.is_set(READY));
    }

    #[test]
    fn compare_and_set_is_idempotent() {
        let f = HandleFlags::new();
        assert!(f.compare_and_set(STOP));
        assert!(!f.compare_and_set(STOP));
    }

    #[test]
    fn flags_are_independent() {
        let f = HandleFlags::new();
        f.set(GOT_OFFER);
        f.set(HAS_VIDEO);
        assert!(f.is_set(GOT_OFFER));
        assert!(f.is_set(HAS_VIDEO));
        assert!(!f.is_set(GOT_ANSWER));
        f.clear(GOT_OFFER);
        assert!(!f.is_set(GOT_OFFER));
        assert!(f.is_set(HAS_VIDEO));
    }
}
