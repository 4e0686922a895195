#![allow(dead_code)]

use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rtb_client::ClientConfig;

/// What the mock does with one received line.
pub enum Action {
    Reply(String),
    /// Close the connection without replying.
    Hangup,
    /// Send nothing and keep reading.
    Ignore,
}

pub fn reply(line: impl Into<String>) -> Action {
    Action::Reply(line.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub conn: usize,
    pub line: String,
}

type Handler = dyn Fn(usize, &str) -> Action + Send + Sync;

/// Line-protocol server on 127.0.0.1:0 driven by a handler closure.
///
/// Every connection is served on its own thread. The handler sees the
/// connection index (in accept order) and the received line without CRLF.
pub struct MockServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Received>>>,
    raw: Arc<Mutex<Vec<u8>>>,
    accepted: Arc<AtomicUsize>,
}

impl MockServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(usize, &str) -> Action + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handler: Arc<Handler> = Arc::new(handler);
        let received = Arc::new(Mutex::new(Vec::new()));
        let raw = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::new(AtomicUsize::new(0));

        let server = MockServer {
            addr,
            received: received.clone(),
            raw: raw.clone(),
            accepted: accepted.clone(),
        };

        thread::spawn(move || {
            for (conn, stream) in listener.incoming().enumerate() {
                let Ok(stream) = stream else { break };
                accepted.fetch_add(1, Ordering::SeqCst);
                let handler = handler.clone();
                let received = received.clone();
                let raw = raw.clone();
                thread::spawn(move || serve(conn, stream, handler, received, raw));
            }
        });

        server
    }

    /// Behaves like the real server's gate: nothing but `UNLOCK <secret>` is
    /// accepted on a connection until it has been unlocked.
    pub fn with_secret<F>(secret: &str, handler: F) -> Self
    where
        F: Fn(usize, &str) -> Action + Send + Sync + 'static,
    {
        let expected = format!("UNLOCK {}", secret);
        let unlocked = Mutex::new(HashSet::new());
        Self::start(move |conn, line| {
            if line.starts_with("UNLOCK ") {
                if line == expected {
                    unlocked.lock().unwrap().insert(conn);
                    return reply(":RES unlocked");
                }
                return reply(":ERR invalid secret");
            }
            if !unlocked.lock().unwrap().contains(&conn) {
                return reply(":ERR must authenticate with UNLOCK <secret>");
            }
            handler(conn, line)
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Client configuration pointing at this server.
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new("127.0.0.1", self.port())
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.received().into_iter().map(|r| r.line).collect()
    }

    pub fn lines_on(&self, conn: usize) -> Vec<String> {
        self.received()
            .into_iter()
            .filter(|r| r.conn == conn)
            .map(|r| r.line)
            .collect()
    }

    /// Every byte received, across all connections, in arrival order.
    pub fn raw(&self) -> Vec<u8> {
        self.raw.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

fn serve(
    conn: usize,
    stream: TcpStream,
    handler: Arc<Handler>,
    received: Arc<Mutex<Vec<Received>>>,
    raw: Arc<Mutex<Vec<u8>>>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut writer = stream.try_clone().expect("clone");
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        raw.lock().unwrap().extend_from_slice(&buf);
        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        received.lock().unwrap().push(Received {
            conn,
            line: line.clone(),
        });

        match handler(conn, &line) {
            Action::Reply(text) => {
                let framed = format!("{}\r\n", text);
                if writer.write_all(framed.as_bytes()).is_err() {
                    return;
                }
            }
            Action::Hangup => {
                let _ = writer.shutdown(Shutdown::Both);
                return;
            }
            Action::Ignore => {}
        }
    }
}

/// Answers the way a healthy server with unlimited tokens would.
pub fn grant_everything(_conn: usize, line: &str) -> Action {
    if line.starts_with("BUCKET ") {
        return reply(":RES registered");
    }
    if let Some(name) = line.strip_prefix('?') {
        return reply(format!("!{}", name));
    }
    reply(":ERR unknown command")
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr").port()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
