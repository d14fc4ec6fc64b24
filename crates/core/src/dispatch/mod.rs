//! Single-consumer request dispatcher (spec §4.2).

pub mod pool;

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::request::Request;

pub use pool::WorkerPool;

/// Implemented by whatever owns verb execution (the `Gateway`). Kept as a
/// trait rather than a direct dependency so `dispatch` doesn't need to
/// know about the registry, auth gate, or negotiation state machine —
/// only about *where* a request runs.
pub trait RequestSink: Send + Sync {
    /// Run a non-`message` verb (or any admin verb) on the calling thread.
    fn dispatch_sync(&self, request: Request);

    /// Run a `message` verb; the caller is a pool worker thread, free to
    /// block on an arbitrarily slow module call.
    fn dispatch_message(&self, request: Request);
}

enum Item {
    Request(Request),
    Shutdown,
}

/// Single ingress queue plus the one dispatcher thread that drains it
/// (spec §4.2: "the dispatcher is the only consumer of the queue; workers
/// never touch the queue").
pub struct Dispatcher {
    sender: Sender<Item>,
    handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn start(sink: Arc<dyn RequestSink>, pool: Arc<WorkerPool>) -> Self {
        let (sender, receiver): (Sender<Item>, Receiver<Item>) = mpsc::channel();

        #[allow(clippy::expect_used)]
        let handle = thread::Builder::new()
            .name("dispatcher".to_string())
            .spawn(move || run(receiver, sink, pool))
            .expect("failed to spawn dispatcher thread");

        Self {
            sender,
            handle: Some(handle),
        }
    }

    /// Enqueue a request for processing (spec §4.2: transport → enqueue).
    pub fn enqueue(&self, request: Request) {
        let _ = self.sender.send(Item::Request(request));
    }

    /// Post the shutdown sentinel and join the dispatcher thread.
    pub fn stop(mut self) {
        let _ = self.sender.send(Item::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let _ = self.sender.send(Item::Shutdown);
    }
}

fn run(receiver: Receiver<Item>, sink: Arc<dyn RequestSink>, pool: Arc<WorkerPool>) {
    while let Ok(item) = receiver.recv() {
        let request = match item {
            Item::Request(request) => request,
            Item::Shutdown => break,
        };

        // Routing rule (spec §4.2): admin verbs and every client verb
        // except `message` run synchronously on the dispatcher thread;
        // `message` is handed to the worker pool since module calls may
        // block arbitrarily.
        if request.admin || request.janus() != Some("message") {
            sink.dispatch_sync(request);
        } else {
            let sink = sink.clone();
            pool.submit(Box::new(move || sink.dispatch_message(request)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportBinding;
    use serde_json::json;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    struct RecordingSink {
        sync_tx: std_mpsc::Sender<String>,
        message_tx: std_mpsc::Sender<String>,
    }

    impl RequestSink for RecordingSink {
        fn dispatch_sync(&self, request: Request) {
            let _ = self
                .sync_tx
                .send(request.janus().unwrap_or_default().to_string());
        }

        fn dispatch_message(&self, request: Request) {
            let _ = self
                .message_tx
                .send(request.janus().unwrap_or_default().to_string());
        }
    }

    #[test]
    fn routes_message_to_pool_and_others_sync() {
        let (sync_tx, sync_rx) = std_mpsc::channel();
        let (message_tx, message_rx) = std_mpsc::channel();
        let sink: Arc<dyn RequestSink> = Arc::new(RecordingSink { sync_tx, message_tx });
        let pool = Arc::new(WorkerPool::new());
        let dispatcher = Dispatcher::start(sink, pool);

        dispatcher.enqueue(Request::new(
            TransportBinding::default(),
            None,
            false,
            json!({"janus": "keepalive", "transaction": "t1"}),
        ));
        dispatcher.enqueue(Request::new(
            TransportBinding::default(),
            None,
            false,
            json!({"janus": "message", "transaction": "t2"}),
        ));

        assert_eq!(sync_rx.recv_timeout(Duration::from_secs(2)).unwrap(), "keepalive");
        assert_eq!(message_rx.recv_timeout(Duration::from_secs(2)).unwrap(), "message");

        dispatcher.stop();
    }

    #[test]
    fn admin_verbs_always_run_sync_even_if_named_message() {
        let (sync_tx, sync_rx) = std_mpsc::channel();
        let (message_tx, _message_rx) = std_mpsc::channel();
        let sink: Arc<dyn RequestSink> = Arc::new(RecordingSink { sync_tx, message_tx });
        let pool = Arc::new(WorkerPool::new());
        let dispatcher = Dispatcher::start(sink, pool);

        dispatcher.enqueue(Request::new(
            TransportBinding::default(),
            None,
            true,
            json!({"janus": "message", "transaction": "t1"}),
        ));

        assert_eq!(sync_rx.recv_timeout(Duration::from_secs(2)).unwrap(), "message");
        dispatcher.stop();
    }
}
