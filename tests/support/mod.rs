//! In-process engine speaking the wire protocol, for integration tests
//!
//! Understands the handshake, auth, and the handful of statements the cache
//! backend issues, over a `HashMap` keyed by entry key.

#![allow(dead_code)]

use content_cache::protocol::{
    decode_auth, decode_query, read_packet, write_packet, Packet, PacketKind, HANDSHAKE_OK,
};
use content_cache::{EngineConfig, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const NOT_FOUND: u16 = 111;

#[derive(Debug, Clone)]
pub struct MockOptions {
    pub handshake_reply: &'static [u8],
    /// Delay before answering each query
    pub query_delay: Option<Duration>,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            handshake_reply: HANDSHAKE_OK,
            query_delay: None,
        }
    }
}

#[derive(Default)]
struct Shared {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    queries: Mutex<Vec<String>>,
    accepted: AtomicUsize,
    sessions: Mutex<Vec<JoinHandle<()>>>,
}

pub struct MockEngine {
    addr: SocketAddr,
    shared: Arc<Shared>,
    handle: JoinHandle<()>,
}

impl MockEngine {
    pub async fn start() -> Self {
        Self::start_with(MockOptions::default()).await
    }

    pub async fn start_with(options: MockOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared::default());

        let accept_shared = shared.clone();
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accept_shared.accepted.fetch_add(1, Ordering::SeqCst);
                let session = tokio::spawn(serve(socket, accept_shared.clone(), options.clone()));
                accept_shared.sessions.lock().push(session);
            }
        });

        Self {
            addr,
            shared,
            handle,
        }
    }

    /// Engine config pointing at this server, with short timeouts
    pub fn config(&self) -> EngineConfig {
        EngineConfig::builder()
            .host("127.0.0.1")
            .port(self.addr.port())
            .connection_timeout(Duration::from_secs(2))
            .query_timeout(Duration::from_secs(2))
            .acquire_timeout(Duration::from_secs(2))
            .build()
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.shared.entries.lock().get(key).cloned()
    }

    pub fn put_raw(&self, key: &str, value: Vec<u8>) {
        self.shared.entries.lock().insert(key.to_string(), value);
    }

    pub fn len(&self) -> usize {
        self.shared.entries.lock().len()
    }

    /// Connections accepted so far
    pub fn accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    /// Statement texts received so far, in arrival order
    pub fn queries(&self) -> Vec<String> {
        self.shared.queries.lock().clone()
    }
}

/// Stops accepting and cuts every open session
impl Drop for MockEngine {
    fn drop(&mut self) {
        self.handle.abort();
        for session in self.shared.sessions.lock().drain(..) {
            session.abort();
        }
    }
}

/// Port with nothing listening on it
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn serve(mut socket: TcpStream, shared: Arc<Shared>, options: MockOptions) {
    match read_packet(&mut socket).await {
        Ok(packet) if packet.kind == PacketKind::Handshake => {}
        _ => return,
    }
    let reply = Packet::new(PacketKind::Handshake, options.handshake_reply);
    if write_packet(&mut socket, &reply).await.is_err() || options.handshake_reply != HANDSHAKE_OK {
        return;
    }

    while let Ok(packet) = read_packet(&mut socket).await {
        let value = match packet.kind {
            PacketKind::Auth => match decode_auth(&packet.payload) {
                Ok((user, pass)) if !user.is_empty() && !pass.is_empty() => Value::ResponseCode(0),
                _ => Value::ResponseCode(1),
            },
            PacketKind::Query => {
                if let Some(delay) = options.query_delay {
                    tokio::time::sleep(delay).await;
                }
                match decode_query(&packet.payload) {
                    Ok((text, params)) => execute(&shared, &text, params),
                    Err(e) => error(2, &e.to_string()),
                }
            }
            _ => return,
        };

        let payload = match value.encode() {
            Ok(buf) => buf.freeze(),
            Err(_) => return,
        };
        if write_packet(&mut socket, &Packet::new(PacketKind::Response, payload))
            .await
            .is_err()
        {
            return;
        }
    }
}

fn error(code: u16, message: &str) -> Value {
    Value::ErrorCode {
        code,
        message: message.to_string(),
    }
}

fn execute(shared: &Shared, text: &str, params: Vec<Value>) -> Value {
    shared.queries.lock().push(text.to_string());
    let mut params = params.into_iter();
    let key = params.next().and_then(|v| v.as_str().map(str::to_string));
    let mut entries = shared.entries.lock();

    if text.starts_with("CREATE ") || text == "SYSCTL REPORT STATUS" {
        Value::ResponseCode(0)
    } else if text.starts_with("UPSERT INTO ") {
        match (key, params.next()) {
            (Some(k), Some(Value::Binary(v))) => {
                entries.insert(k, v);
                Value::ResponseCode(0)
            }
            _ => error(3, "upsert expects (string, binary)"),
        }
    } else if text.starts_with("SELECT v FROM ") {
        match key.and_then(|k| entries.get(&k).cloned()) {
            Some(v) => Value::List(vec![Value::Binary(v)]),
            None => Value::List(Vec::new()),
        }
    } else if text.starts_with("DELETE FROM ") {
        match key.and_then(|k| entries.remove(&k)) {
            Some(_) => Value::ResponseCode(0),
            None => error(NOT_FOUND, "no such key"),
        }
    } else {
        error(1, "unsupported statement")
    }
}
