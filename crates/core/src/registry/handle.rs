//! A single peer-connection attachment to a media module (spec §3 "Handle").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::ice::IceAgent;
use crate::module::Module;
use crate::negotiation::flags::{self, HandleFlags};
use crate::negotiation::trickle::TrickleBuffer;
use crate::registry::session::Session;

/// One peer-connection attachment, owned by its `Session`'s handle map.
///
/// The back-pointer to the owning session is a `Weak` reference (spec §9:
/// "Handle holds a non-owning back-pointer") — only the session's handle
/// map and in-flight `Request`s hold strong references to a `Handle`.
pub struct Handle {
    pub id: u64,
    session: Weak<Session>,
    pub module: Arc<dyn Module>,
    pub opaque_id: Option<String>,
    pub flags: HandleFlags,
    pub pending_trickles: TrickleBuffer,
    local_sdp: Mutex<Option<String>>,
    remote_sdp: Mutex<Option<String>>,
    pub ice: Mutex<Box<dyn IceAgent>>,
    /// Transport-wide-CC RTP header extension id, recorded off an offer
    /// if advertised (spec §4.5).
    pub transport_wide_cc_ext_id: Mutex<Option<u8>>,
    destroyed: AtomicBool,
}

impl Handle {
    pub fn new(
        id: u64,
        session: &Arc<Session>,
        module: Arc<dyn Module>,
        opaque_id: Option<String>,
        ice: Box<dyn IceAgent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            session: Arc::downgrade(session),
            module,
            opaque_id,
            flags: HandleFlags::new(),
            pending_trickles: TrickleBuffer::new(),
            local_sdp: Mutex::new(None),
            remote_sdp: Mutex::new(None),
            ice: Mutex::new(ice),
            transport_wide_cc_ext_id: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Upgrade the back-pointer. Returns `None` if the owning session has
    /// already been fully destroyed and dropped.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.upgrade()
    }

    pub fn set_local_sdp(&self, sdp: String) {
        *self.local_sdp.lock() = Some(sdp);
    }

    pub fn local_sdp(&self) -> Option<String> {
        self.local_sdp.lock().clone()
    }

    pub fn set_remote_sdp(&self, sdp: String) {
        *self.remote_sdp.lock() = Some(sdp);
    }

    pub fn remote_sdp(&self) -> Option<String> {
        self.remote_sdp.lock().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.flags.is_set(flags::READY)
    }

    pub fn is_alert(&self) -> bool {
        self.flags.is_set(flags::ALERT)
    }

    pub fn is_stopped(&self) -> bool {
        self.flags.is_set(flags::STOP) || self.destroyed.load(Ordering::Acquire)
    }

    /// Tear down the handle: hang up the ICE agent, notify the module, and
    /// mark it unreachable for further callbacks (idempotent).
    pub fn destroy(&self, reason: &str) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.flags.set(flags::STOP);
        self.ice.lock().hangup(reason);
        self.module.destroy_session(self.id);
        tracing::info!(handle_id = self.id, reason, "handle destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("opaque_id", &self.opaque_id)
            .field("flags", &self.flags.snapshot())
            .field("destroyed", &self.destroyed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Global handle-id index, used to resolve the opaque id a module was
/// handed at `create_session` time back to a live `Handle` from the
/// callback API (spec §4.7, §9 "sentinel-pointer validation" — here a
/// strongly-typed id looked up through a registry instead of a raw
/// pointer compared against a threshold).
///
/// Holds only weak references: membership here never keeps a `Handle`
/// alive past its owning session's handle map dropping it.
#[derive(Clone, Default)]
pub struct HandleRegistry {
    index: Arc<parking_lot::RwLock<std::collections::HashMap<u64, Weak<Handle>>>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: &Arc<Handle>) {
        self.index.write().insert(handle.id, Arc::downgrade(handle));
    }

    pub fn remove(&self, id: u64) {
        self.index.write().remove(&id);
    }

    /// Resolve a handle id to a live handle. Returns `None` both for
    /// unknown ids and for ids whose handle has already been dropped —
    /// the caller cannot distinguish "never existed" from "gone", which
    /// is the point: both mean "do not touch it".
    pub fn resolve(&self, id: u64) -> Option<Arc<Handle>> {
        self.index.read().get(&id)?.upgrade()
    }
}
