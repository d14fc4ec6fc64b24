//! Demo host for `janus-core`: a line-delimited JSON/TCP transport plus a
//! trivial echo module, wired up the way a real transport/module pair
//! would be (spec §6 "Transport interface", "Module interface"). One TCP
//! connection is one transport-session; each line is one request body.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use clap::Parser;
use janus_core::config::GatewayConfig;
use janus_core::error::CoreError;
use janus_core::gateway::Gateway;
use janus_core::module::{Module, ModuleDescriptor, ModuleResult};
use janus_core::request::Request;
use janus_core::transport::{Transport, TransportBinding};
use serde_json::Value;

#[derive(Parser)]
#[command(
    name = "janus-core-cli",
    about = "Demo host for janus-core: line-delimited JSON/TCP transport plus an echo module"
)]
struct Args {
    /// Bind address (host:port) for the client channel.
    #[arg(long, short, default_value = "0.0.0.0:8188")]
    bind: String,
}

const ECHO_DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
    package: "demo.echo",
    name: "Demo echo module",
    author: "core",
    version: 1,
    version_string: "0.1.0",
    description: "Echoes handle_message bodies back unchanged",
};

/// The simplest possible module: every `message` body round-trips as the
/// synchronous reply's `plugindata.data`.
#[derive(Default)]
struct EchoModule;

impl Module for EchoModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &ECHO_DESCRIPTOR
    }

    fn create_session(&self, _handle_id: u64) -> Result<(), CoreError> {
        Ok(())
    }

    fn destroy_session(&self, _handle_id: u64) {}

    fn handle_message(&self, _handle_id: u64, body: Value, _jsep: Option<Value>) -> ModuleResult {
        ModuleResult::Ok(body)
    }
}

/// Line-delimited JSON over TCP. Each accepted connection becomes one
/// transport-session; replies are written back as a single `\n`-terminated
/// JSON line on the same connection (spec §6 "Transport interface").
struct TcpTransport {
    connections: Mutex<HashMap<u64, Arc<Mutex<TcpStream>>>>,
}

impl TcpTransport {
    fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    fn register(&self, id: u64, stream: Arc<Mutex<TcpStream>>) {
        self.connections.lock().unwrap().insert(id, stream);
    }

    fn unregister(&self, id: u64) {
        self.connections.lock().unwrap().remove(&id);
    }
}

impl Transport for TcpTransport {
    fn send_message(&self, transport_session_id: u64, _request_id: Option<&str>, message: Value) {
        let Some(stream) = self.connections.lock().unwrap().get(&transport_session_id).cloned() else {
            return;
        };
        let mut line = message.to_string();
        line.push('\n');
        if let Ok(mut stream) = stream.lock() {
            let _ = stream.write_all(line.as_bytes());
        }
    }
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let gateway = Gateway::new(GatewayConfig::new());
    gateway.register_module(Arc::new(EchoModule));

    let transport = Arc::new(TcpTransport::new());
    gateway.register_transport(transport.clone());
    gateway.start();

    // First Ctrl-C begins graceful shutdown; a third forces exit(1) (spec
    // §5 "Cancellation and timeouts", §6 "Signals").
    let shutdown_gateway = gateway.clone();
    ctrlc::set_handler(move || {
        let count = shutdown_gateway.stop_counter.signal();
        if count >= 3 {
            std::process::exit(1);
        }
        if count == 1 {
            shutdown_gateway.stop();
            std::process::exit(0);
        }
    })
    .expect("failed to install signal handler");

    let listener = match TcpListener::bind(&args.bind) {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("failed to bind {}: {}", args.bind, err);
            std::process::exit(1);
        }
    };
    println!("janus-core demo listening on {}", args.bind);

    let next_connection_id = Arc::new(AtomicU64::new(1));

    for incoming in listener.incoming() {
        let Ok(stream) = incoming else { continue };
        let gateway = gateway.clone();
        let transport = transport.clone();
        let connection_id = next_connection_id.fetch_add(1, Ordering::Relaxed);
        std::thread::spawn(move || handle_connection(gateway, transport, connection_id, stream));
    }
}

/// Read newline-delimited JSON requests off one connection until it
/// closes, dispatching each to the gateway; the reply path runs
/// independently through `TcpTransport::send_message` (spec §4.2: "Replies
/// are written directly to the transport module via the Request's
/// binding").
fn handle_connection(gateway: Arc<Gateway>, transport: Arc<TcpTransport>, connection_id: u64, stream: TcpStream) {
    let Ok(writer) = stream.try_clone() else { return };
    transport.register(connection_id, Arc::new(Mutex::new(writer)));
    let binding = TransportBinding::new(transport.clone(), connection_id);

    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let Ok(body) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let admin = body.get("admin").and_then(Value::as_bool).unwrap_or(false);
        gateway.incoming_request(Request::new(binding.clone(), None, admin, body));
    }

    transport.unregister(connection_id);
    gateway.transport_gone(connection_id);
}
