//! Idle-session sweeper thread (spec §4.1, §9 "spin-wait replacement").
//!
//! Polls the registry every [`crate::config::SWEEP_INTERVAL_SECS`] and
//! destroys any session whose `last_activity` has exceeded the configured
//! timeout. Iteration is snapshot-then-remove (collect candidate ids under
//! a read lock, then destroy/remove each one individually) rather than
//! removing while holding an iterator over the map, resolving spec §9 open
//! question 1. Modeled on the teacher's `transport::tcp::accept_loop`: an
//! `Arc<AtomicBool>` running flag plus a plain `thread::sleep` poll loop,
//! no condvar or timer-fd plumbing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::callbacks::DeferredQueue;
use crate::config::{GatewayConfig, SWEEP_INTERVAL_SECS};
use crate::events::EventBus;
use crate::registry::session::{now_micros, SessionRegistry};

/// Background thread that retires idle sessions and drains deferred
/// module callbacks (spec §5: "Sweeper thread: runs the 2-second timer
/// plus any deferred one-shots").
pub struct Sweeper {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawn the sweep thread. Returns a handle the caller uses to stop it
    /// at shutdown.
    pub fn start(
        registry: SessionRegistry,
        config: Arc<GatewayConfig>,
        events: Arc<EventBus>,
        deferred: Arc<DeferredQueue>,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();

        #[allow(clippy::expect_used)]
        let handle = thread::Builder::new()
            .name("session-sweeper".to_string())
            .spawn(move || {
                while thread_running.load(Ordering::Acquire) {
                    sweep_once(&registry, &config, &events);
                    deferred.drain();
                    thread::sleep(Duration::from_secs(SWEEP_INTERVAL_SECS));
                }
            })
            .expect("failed to spawn session-sweeper thread");

        Self {
            running,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// One sweep pass: snapshot candidate ids, then destroy and unlink each
/// session that is still idle at the time it's actually touched.
fn sweep_once(registry: &SessionRegistry, config: &GatewayConfig, events: &EventBus) {
    let timeout_secs = config.session_timeout_secs();
    if timeout_secs == 0 {
        return;
    }
    let timeout_micros = timeout_secs.saturating_mul(1_000_000);
    let now = now_micros();

    let candidates: Vec<u64> = registry
        .session_ids()
        .into_iter()
        .filter(|id| {
            registry
                .find_session(*id)
                .map(|s| now.saturating_sub(s.last_activity_micros()) >= timeout_micros)
                .unwrap_or(false)
        })
        .collect();

    for id in candidates {
        let Some(session) = registry.find_session(id) else {
            continue;
        };
        if !session.mark_timed_out() {
            continue;
        }
        session.destroy("session timed out");
        registry.remove(id);
        session
            .transport
            .send(None, crate::envelope::timeout_event(id));
        if let Some(transport) = session.transport.transport.as_ref() {
            transport.session_over(session.transport.transport_session_id, id, true);
        }
        events.notify_event("core.registry", Some(id), None, crate::envelope::timeout_event(id));
        tracing::info!(session_id = id, "session swept for inactivity");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering as O;

    #[test]
    fn sweep_leaves_fresh_sessions_alone() {
        let registry = SessionRegistry::new();
        let config = Arc::new(GatewayConfig::new());
        registry.create_session(1, None).unwrap();
        let events = EventBus::new();
        sweep_once(&registry, &config, &events);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sweep_skips_when_timeout_disabled() {
        let registry = SessionRegistry::new();
        let config = Arc::new(GatewayConfig::new());
        config.session_timeout_secs.store(0, O::Relaxed);
        let session = registry.create_session(1, None).unwrap();
        session
            .last_activity_micros
            .store(0, O::Relaxed);
        let events = EventBus::new();
        sweep_once(&registry, &config, &events);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sweep_removes_idle_session() {
        let registry = SessionRegistry::new();
        let config = Arc::new(GatewayConfig::new());
        config.set_session_timeout_secs(1);
        let session = registry.create_session(1, None).unwrap();
        session.touch();
        // Force last_activity far enough in the past to trip the sweep.
        let ancient = now_micros().saturating_sub(5_000_000);
        session
            .last_activity_micros
            .store(ancient, O::Relaxed);
        let events = EventBus::new();
        sweep_once(&registry, &config, &events);
        assert!(registry.find_session(1).is_none());
        assert!(session.is_destroyed());
    }

    proptest::proptest! {
        /// Invariant 10: a session whose last activity is within the
        /// configured timeout is never reported as `timeout`, regardless of
        /// how many sweep passes race against it.
        #[test]
        fn session_within_timeout_is_never_swept(
            timeout_secs in 2u64..60,
            idle_secs in 0u64..59,
        ) {
            proptest::prop_assume!(idle_secs < timeout_secs);

            let registry = SessionRegistry::new();
            let config = Arc::new(GatewayConfig::new());
            config.set_session_timeout_secs(timeout_secs);
            let session = registry.create_session(1, None).unwrap();
            let now = now_micros();
            session
                .last_activity_micros
                .store(now.saturating_sub(idle_secs.saturating_mul(1_000_000)), O::Relaxed);

            let events = EventBus::new();
            sweep_once(&registry, &config, &events);

            proptest::prop_assert!(registry.find_session(1).is_some());
            proptest::prop_assert!(!session.is_timed_out());
        }
    }
}
