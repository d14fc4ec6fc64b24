//! Bounded-by-demand worker pool for `message` verbs (spec §5, §9: "must
//! be unbounded-by-demand with idle retirement (120 s) to accommodate
//! modules that may hold a call for a long time; do not back-pressure the
//! dispatcher").
//!
//! No worker-pool crate appears in the corpus, so this is hand-rolled in
//! the teacher's own concurrency idiom: a shared queue behind a
//! `parking_lot::Mutex` + `Condvar`, threads spawned on demand when no
//! idle worker is available, each one retiring itself after sitting idle
//! past the deadline.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::config::WORKER_IDLE_RETIRE_SECS;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    condvar: Condvar,
    idle: AtomicUsize,
    spawned: AtomicUsize,
}

/// Pool of worker threads handling `message` verbs off the dispatcher
/// thread. Grows when a submission finds no idle worker; each worker
/// exits on its own after [`WORKER_IDLE_RETIRE_SECS`] with nothing to do.
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                condvar: Condvar::new(),
                idle: AtomicUsize::new(0),
                spawned: AtomicUsize::new(0),
            }),
        }
    }

    /// Enqueue a job, spawning a fresh worker if none are currently idle.
    /// The idle check is a benign race: under contention this may spawn
    /// one more worker than strictly necessary, never fewer than needed.
    pub fn submit(&self, job: Job) {
        let need_spawn = self.shared.idle.load(Ordering::Acquire) == 0;
        self.shared.queue.lock().push_back(job);
        self.shared.condvar.notify_one();
        if need_spawn {
            spawn_worker(self.shared.clone());
        }
    }

    pub fn active_workers(&self) -> usize {
        self.shared.spawned.load(Ordering::Acquire)
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_worker(shared: Arc<Shared>) {
    shared.spawned.fetch_add(1, Ordering::AcqRel);
    let result = thread::Builder::new()
        .name("message-worker".to_string())
        .spawn(move || worker_loop(shared));
    if result.is_err() {
        tracing::error!("failed to spawn message-worker thread");
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let mut queue = shared.queue.lock();
        shared.idle.fetch_add(1, Ordering::AcqRel);

        let job = loop {
            if let Some(job) = queue.pop_front() {
                break Some(job);
            }
            let timed_out = shared
                .condvar
                .wait_for(&mut queue, Duration::from_secs(WORKER_IDLE_RETIRE_SECS))
                .timed_out();
            if timed_out {
                break None;
            }
        };

        shared.idle.fetch_sub(1, Ordering::AcqRel);
        drop(queue);

        match job {
            Some(job) => job(),
            None => break,
        }
    }
    shared.spawned.fetch_sub(1, Ordering::AcqRel);
}
