//! # Protocol Session
//!
//! Purpose: Hold every protocol decision once, independent of how bytes move,
//! so the blocking and async clients differ only in their I/O calls.
//!
//! ## Design Principles
//! 1. **Sans-I/O Core**: `Session` frames requests and settles replies; the
//!    front-ends only connect, write and read.
//! 2. **Explicit Link State**: `Link` is either `Unconnected` or owns a
//!    `Connected` channel. There is no nullable stream to forget to clear.
//! 3. **Checkout/Checkin**: A call moves the channel out of the link and puts
//!    it back only after a complete request/response. Failures and dropped
//!    futures therefore always leave the link `Unconnected`.
//!
//! ## State Machine
//!
//! ```text
//!                 first call                  unlock ok / no secret
//!  Unconnected ───────────────► Authenticating ─────────────────────► Connected
//!       ▲                         │  (fresh channel held by the call,     │
//!       │      :ERR on unlock,    │   not yet checked in)                 │
//!       ├─────────────────────────┘                                       │
//!       │      io error, EOF, timeout, cancellation, close()              │
//!       └─────────────────────────────────────────────────────────────────┘
//! ```

use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;

use rtb_common::{Command, LineBuffer, Reply};

use crate::config::{BlockErrorPolicy, ClientConfig};
use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, EventSink};

/// Connection state of a client handle, as seen between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; the next call connects (and unlocks).
    Unconnected,
    /// An authenticated connection is ready for reuse.
    Connected,
}

/// A stream plus the bytes received on it but not yet consumed.
pub(crate) struct Channel<S> {
    pub(crate) stream: S,
    pub(crate) lines: LineBuffer,
}

impl<S> Channel<S> {
    pub(crate) fn new(stream: S) -> Self {
        Channel {
            stream,
            lines: LineBuffer::new(),
        }
    }
}

enum Link<S> {
    Unconnected,
    Connected(Channel<S>),
}

/// A caller-level operation.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Request<'a> {
    Define { bucket: &'a str, qps: f64, burst: u64 },
    Block { bucket: &'a str },
    BlockLast,
}

impl<'a> Request<'a> {
    fn command(&self) -> Command<'a> {
        match *self {
            Request::Define { bucket, qps, burst } => Command::Bucket {
                name: bucket,
                qps,
                burst,
            },
            Request::Block { bucket } => Command::Take { name: bucket },
            Request::BlockLast => Command::TakeLast,
        }
    }
}

/// Result of a settled request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Defined,
    Admitted(bool),
}

impl Outcome {
    pub(crate) fn granted(self) -> bool {
        matches!(self, Outcome::Admitted(true))
    }
}

/// Protocol state shared by both front-ends, generic over the stream type.
pub(crate) struct Session<S> {
    config: ClientConfig,
    sink: Arc<dyn EventSink>,
    link: Link<S>,
}

impl<S> Session<S> {
    pub(crate) fn new(config: ClientConfig, sink: Arc<dyn EventSink>) -> Self {
        Session {
            config,
            sink,
            link: Link::Unconnected,
        }
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> ConnectionState {
        match self.link {
            Link::Unconnected => ConnectionState::Unconnected,
            Link::Connected(_) => ConnectionState::Connected,
        }
    }

    /// Moves the live channel out, leaving the link `Unconnected`.
    pub(crate) fn checkout(&mut self) -> Option<Channel<S>> {
        match mem::replace(&mut self.link, Link::Unconnected) {
            Link::Connected(channel) => Some(channel),
            Link::Unconnected => None,
        }
    }

    /// Returns a channel whose last exchange completed.
    pub(crate) fn checkin(&mut self, channel: Channel<S>) {
        self.link = Link::Connected(channel);
    }

    /// Frames a request. Invalid arguments fail here, before any I/O.
    pub(crate) fn frame(&self, request: &Request<'_>) -> ClientResult<Vec<u8>> {
        let mut out = Vec::with_capacity(64);
        request.command().encode(&mut out)?;
        Ok(out)
    }

    /// The handshake frame for a fresh connection, if a secret is configured.
    pub(crate) fn unlock_frame(&self) -> ClientResult<Option<Vec<u8>>> {
        let Some(secret) = self.config.secret.as_deref() else {
            return Ok(None);
        };
        let mut out = Vec::with_capacity(secret.len() + 9);
        Command::Unlock { secret }.encode(&mut out)?;
        Ok(Some(out))
    }

    pub(crate) fn connected(&self, addr: SocketAddr) {
        self.sink.record(&ClientEvent::Connected { addr });
    }

    /// Settles the unlock reply. On `:ERR` the fresh channel must be dropped.
    pub(crate) fn settle_unlock(&self, line: &str) -> ClientResult<()> {
        if Reply::classify(line).is_error() {
            self.sink.record(&ClientEvent::Disconnected {
                reason: format!("unlock rejected: {}", line),
            });
            return Err(ClientError::Authentication {
                reply: line.to_string(),
            });
        }
        self.sink.record(&ClientEvent::Unlocked);
        Ok(())
    }

    /// Interprets a command reply under the configured policy.
    pub(crate) fn settle(&self, request: &Request<'_>, line: &str) -> ClientResult<Outcome> {
        let command = request.command();
        let reply = Reply::classify(line);

        if reply.is_error() {
            self.sink.record(&ClientEvent::Rejected {
                command: command.to_string(),
                reply: line.to_string(),
            });
            let rejected = ClientError::Protocol {
                command: command.to_string(),
                reply: line.to_string(),
            };
            return match request {
                Request::Define { .. } => Err(rejected),
                Request::Block { .. } | Request::BlockLast => {
                    match self.config.block_error_policy {
                        BlockErrorPolicy::Raise => Err(rejected),
                        BlockErrorPolicy::Deny => Ok(Outcome::Admitted(false)),
                    }
                }
            };
        }

        match command.grant_reply() {
            None => Ok(Outcome::Defined),
            Some(grant) if grant == line => Ok(Outcome::Admitted(true)),
            Some(_) => {
                self.sink.record(&ClientEvent::Unrecognized {
                    command: command.to_string(),
                    reply: line.to_string(),
                });
                Ok(Outcome::Admitted(false))
            }
        }
    }

    /// Records that a channel was lost to `err`.
    pub(crate) fn dropped(&self, err: &ClientError) {
        self.sink.record(&ClientEvent::Disconnected {
            reason: err.to_string(),
        });
    }

    /// Takes the channel for shutdown, if there is one.
    pub(crate) fn close(&mut self) -> Option<Channel<S>> {
        let channel = self.checkout()?;
        self.sink.record(&ClientEvent::Disconnected {
            reason: "closed by client".to_string(),
        });
        Some(channel)
    }
}
