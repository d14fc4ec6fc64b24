//! Buffered trickle candidates (spec §3, §4.5).
//!
//! A handle accumulates candidates here whenever the offer/answer exchange
//! isn't far enough along to hand them to the ICE agent yet. Entries are
//! timestamped on arrival and dropped, unparsed, once they're older than
//! the configured expiry (default 45s, spec invariant 6).

use parking_lot::Mutex;
use serde_json::Value;

/// One buffered trickle submission: either a single candidate object or an
/// array of them, as received verbatim in the `trickle` verb.
#[derive(Debug, Clone)]
pub struct PendingTrickle {
    pub transaction: String,
    pub candidate: Value,
    /// Microseconds since `UNIX_EPOCH` at reception (spec §3).
    pub received_at_micros: u64,
}

/// FIFO buffer of trickle candidates awaiting replay.
#[derive(Default)]
pub struct TrickleBuffer {
    pending: Mutex<Vec<PendingTrickle>>,
}

impl TrickleBuffer {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, entry: PendingTrickle) {
        self.pending.lock().push(entry);
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain entries in arrival order, returning only those still within
    /// `expiry_secs` of `now_micros` (spec invariant 6: stale entries are
    /// "never parsed" — the caller receives only the fresh ones to parse).
    pub fn drain_fresh(&self, now_micros: u64, expiry_secs: u64) -> Vec<PendingTrickle> {
        let expiry_micros = expiry_secs.saturating_mul(1_000_000);
        let mut guard = self.pending.lock();
        let drained = std::mem::take(&mut *guard);
        drop(guard);

        drained
            .into_iter()
            .filter(|entry| now_micros.saturating_sub(entry.received_at_micros) < expiry_micros)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(age_micros: u64, now: u64) -> PendingTrickle {
        PendingTrickle {
            transaction: "t".to_string(),
            candidate: Value::Null,
            received_at_micros: now.saturating_sub(age_micros),
        }
    }

    #[test]
    fn drains_only_fresh_entries() {
        let buf = TrickleBuffer::new();
        let now = 100_000_000u64; // 100s
        buf.push(entry(0, now)); // fresh
        buf.push(entry(46 * 1_000_000, now)); // 46s old: stale (> 45s expiry)
        buf.push(entry(10 * 1_000_000, now)); // fresh

        let fresh = buf.drain_fresh(now, 45);
        assert_eq!(fresh.len(), 2);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_empties_the_buffer() {
        let buf = TrickleBuffer::new();
        buf.push(entry(0, 1_000_000));
        assert_eq!(buf.len(), 1);
        let _ = buf.drain_fresh(1_000_000, 45);
        assert!(buf.is_empty());
    }

    proptest::proptest! {
        /// Invariant 6: entries older than the expiry at drain time are
        /// never returned, for any mix of ages and any expiry window.
        #[test]
        fn stale_entries_never_survive_drain(
            ages_secs in proptest::collection::vec(0u64..120, 1..20),
            expiry_secs in 1u64..90,
        ) {
            let now = 10_000_000_000u64;
            let buf = TrickleBuffer::new();
            for age in &ages_secs {
                buf.push(entry(age.saturating_mul(1_000_000), now));
            }
            let fresh = buf.drain_fresh(now, expiry_secs);
            let expected = ages_secs.iter().filter(|age| **age < expiry_secs).count();
            proptest::prop_assert_eq!(fresh.len(), expected);
        }
    }
}
