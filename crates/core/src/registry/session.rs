//! Long-lived client context (spec §3 "Session", §4.1 Registry).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use rand::Rng;

use crate::error::{CoreError, Result};
use crate::registry::handle::Handle;
use crate::transport::TransportBinding;

/// Current time in microseconds since `UNIX_EPOCH`, the unit spec §3 uses
/// for session/trickle timestamps.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// A long-lived client context (spec §3).
///
/// Reachable from the global registry iff `destroyed == false` (invariant
/// 1). `last_activity` is updated on every authorized inbound verb naming
/// this session (invariant 3); `timeout` transitions 0→1 at most once and
/// only by the sweeper (spec §4.1).
pub struct Session {
    pub id: u64,
    pub created_at_micros: u64,
    pub(crate) last_activity_micros: AtomicU64,
    destroyed: AtomicBool,
    timeout: AtomicBool,
    pub transport: TransportBinding,
    handles: RwLock<HashMap<u64, Arc<Handle>>>,
    next_handle_id: AtomicU64,
}

impl Session {
    pub fn new(id: u64, transport: Option<TransportBinding>) -> Arc<Self> {
        let now = now_micros();
        Arc::new(Self {
            id,
            created_at_micros: now,
            last_activity_micros: AtomicU64::new(now),
            destroyed: AtomicBool::new(false),
            timeout: AtomicBool::new(false),
            transport: transport.unwrap_or_default(),
            handles: RwLock::new(HashMap::new()),
            next_handle_id: AtomicU64::new(1),
        })
    }

    pub fn last_activity_micros(&self) -> u64 {
        self.last_activity_micros.load(Ordering::Acquire)
    }

    /// Bump the activity clock (spec invariant 3). Called on every
    /// authorized inbound verb that names this session.
    pub fn touch(&self) {
        self.last_activity_micros
            .store(now_micros(), Ordering::Release);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn is_timed_out(&self) -> bool {
        self.timeout.load(Ordering::Acquire)
    }

    /// Compare-and-set the `timeout` latch 0→1. Returns `true` exactly once
    /// across however many threads race to call it (spec §4.1 rationale:
    /// "prevents double-timeout when another thread is simultaneously
    /// processing a late keepalive").
    pub fn mark_timed_out(&self) -> bool {
        self.timeout
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Flip `destroyed` 0→1 (idempotent) and tear down all handles. Does
    /// **not** remove this session from the registry map — the caller does
    /// that under the map's lock so the removal is atomically observable
    /// (spec §4.1).
    pub fn destroy(&self, reason: &str) {
        if self
            .destroyed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let handles: Vec<Arc<Handle>> = self.handles.write().drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.destroy(reason);
        }
        tracing::info!(session_id = self.id, reason, "session destroyed");
    }

    pub fn insert_handle(&self, handle: Arc<Handle>) {
        self.handles.write().insert(handle.id, handle);
    }

    pub fn get_handle(&self, id: u64) -> Option<Arc<Handle>> {
        self.handles.read().get(&id).cloned()
    }

    pub fn remove_handle(&self, id: u64) -> Option<Arc<Handle>> {
        self.handles.write().remove(&id)
    }

    pub fn handle_ids(&self) -> Vec<u64> {
        self.handles.read().keys().copied().collect()
    }

    pub fn handle_count(&self) -> usize {
        self.handles.read().len()
    }

    pub fn next_handle_id(&self) -> u64 {
        self.next_handle_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Thread-safe registry of active sessions, keyed by id (spec §4.1).
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<u64, Arc<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create and register a session (spec §4.1 `create_session`).
    ///
    /// `id_hint == 0` generates a random 64-bit id, retrying on collision;
    /// otherwise fails with `SessionConflict` if the id is already taken.
    pub fn create_session(
        &self,
        id_hint: u64,
        transport: Option<TransportBinding>,
    ) -> Result<Arc<Session>> {
        let mut sessions = self.sessions.write();

        let id = if id_hint == 0 {
            loop {
                let candidate = loop {
                    let v = rand::rng().random::<u64>();
                    if v != 0 {
                        break v;
                    }
                };
                if !sessions.contains_key(&candidate) {
                    break candidate;
                }
            }
        } else {
            if sessions.contains_key(&id_hint) {
                return Err(CoreError::SessionConflict(id_hint));
            }
            id_hint
        };

        let session = Session::new(id, transport);
        sessions.insert(id, session.clone());
        tracing::debug!(session_id = id, total = sessions.len(), "session created");
        Ok(session)
    }

    /// Look up a session by id. Returns a cloned `Arc`, bumping the
    /// refcount for the duration of the caller's use (spec §4.1).
    pub fn find_session(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.read().get(&id).cloned()
    }

    /// Remove a session from the map. Call *after* `Session::destroy` so
    /// the removal is the atomically-observable "gone" signal (spec §4.1).
    pub fn remove(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn session_ids(&self) -> Vec<u64> {
        self.sessions.read().keys().copied().collect()
    }

    /// Remove every session whose transport binding is the given
    /// transport-session reference (spec §3: "if the transport reports
    /// *gone*, all Sessions whose binding points to that transport-session
    /// are marked destroyed and unlinked").
    pub fn destroy_for_transport_session(&self, transport_session_id: u64) -> Vec<Arc<Session>> {
        let ids: Vec<u64> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, s)| s.transport.transport_session_id == transport_session_id)
            .map(|(id, _)| *id)
            .collect();

        let mut removed = Vec::new();
        for id in ids {
            if let Some(session) = self.sessions.write().remove(&id) {
                session.destroy("transport gone");
                removed.push(session);
            }
        }
        removed
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_with_hint_detects_conflict() {
        let registry = SessionRegistry::new();
        registry.create_session(42, None).unwrap();
        let err = registry.create_session(42, None).unwrap_err();
        assert!(matches!(err, CoreError::SessionConflict(42)));
    }

    #[test]
    fn create_without_hint_generates_unique_ids() {
        let registry = SessionRegistry::new();
        let a = registry.create_session(0, None).unwrap();
        let b = registry.create_session(0, None).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn destroy_then_remove_observes_empty_map() {
        let registry = SessionRegistry::new();
        let session = registry.create_session(1, None).unwrap();
        session.destroy("test");
        assert!(registry.find_session(1).is_some(), "destroy alone doesn't unlink");
        registry.remove(1);
        assert!(registry.find_session(1).is_none());
    }

    #[test]
    fn destroy_is_idempotent_observable_via_handle_count() {
        let session = Session::new(1, None);
        session.destroy("first");
        session.destroy("second");
        assert_eq!(session.handle_count(), 0);
    }

    #[test]
    fn touch_advances_last_activity() {
        let session = Session::new(1, None);
        let t0 = session.last_activity_micros();
        std::thread::sleep(std::time::Duration::from_millis(2));
        session.touch();
        assert!(session.last_activity_micros() >= t0);
    }

    #[test]
    fn mark_timed_out_is_exactly_once() {
        let session = Session::new(1, None);
        assert!(session.mark_timed_out());
        assert!(!session.mark_timed_out());
    }

    proptest::proptest! {
        /// Invariant 5: ids generated for a batch of hint-less creates never
        /// collide with each other or with a live id already in the map.
        #[test]
        fn generated_ids_never_collide(count in 1usize..200) {
            let registry = SessionRegistry::new();
            let mut seen = std::collections::HashSet::new();
            for _ in 0..count {
                let session = registry.create_session(0, None).unwrap();
                proptest::prop_assert!(seen.insert(session.id), "id {} generated twice", session.id);
            }
        }

        /// Invariant 3: touching a session never moves `last_activity`
        /// backwards, for any number of successive touches.
        #[test]
        fn touch_is_monotonic(touches in 1usize..20) {
            let session = Session::new(1, None);
            let mut previous = session.last_activity_micros();
            for _ in 0..touches {
                session.touch();
                let current = session.last_activity_micros();
                proptest::prop_assert!(current >= previous);
                previous = current;
            }
        }

        /// Invariant 1: every session still reachable through the registry
        /// map has `destroyed == false`, for any interleaving of create,
        /// destroy-only, and destroy-then-remove.
        #[test]
        fn reachable_sessions_are_never_destroyed(
            ops in proptest::collection::vec(0u8..3, 1..30),
        ) {
            let registry = SessionRegistry::new();
            let mut next_id = 1u64;
            for op in ops {
                match op {
                    0 => {
                        registry.create_session(next_id, None).unwrap();
                        next_id += 1;
                    }
                    1 => {
                        if let Some(id) = registry.session_ids().first().copied() {
                            if let Some(session) = registry.find_session(id) {
                                session.destroy("property test");
                            }
                        }
                    }
                    _ => {
                        if let Some(id) = registry.session_ids().first().copied() {
                            if let Some(session) = registry.find_session(id) {
                                session.destroy("property test");
                            }
                            registry.remove(id);
                        }
                    }
                }
                for id in registry.session_ids() {
                    if let Some(session) = registry.find_session(id) {
                        proptest::prop_assert!(!session.is_destroyed());
                    }
                }
            }
        }
    }
}
