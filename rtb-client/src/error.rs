//! Errors surfaced by both clients.

use std::io;

use rtb_common::CodecError;
use thiserror::Error;

/// Result type for the clients.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the blocking and async clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The TCP connection could not be established (refused, unresolvable,
    /// or timed out).
    #[error("failed to connect to {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// The server rejected the `UNLOCK` handshake.
    #[error("unlock rejected: {reply}")]
    Authentication { reply: String },
    /// The server answered a command with `:ERR`. The connection stays usable.
    #[error("{command} rejected: {reply}")]
    Protocol { command: String, reply: String },
    /// Network failure while writing a command or reading its reply.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The server closed the connection before replying.
    #[error("connection closed by server")]
    Closed,
    /// Framing or argument error.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ClientError {
    /// True when the client dropped its connection because of this error.
    ///
    /// The next call will reconnect (and unlock again, if configured).
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            ClientError::Connection { .. }
            | ClientError::Authentication { .. }
            | ClientError::Io(_)
            | ClientError::Closed => true,
            ClientError::Protocol { .. } => false,
            ClientError::Codec(err) => matches!(
                err,
                CodecError::InvalidUtf8 | CodecError::LineTooLong { .. }
            ),
        }
    }

    /// Raw server reply for `Protocol` and `Authentication` errors.
    pub fn server_reply(&self) -> Option<&str> {
        match self {
            ClientError::Protocol { reply, .. } | ClientError::Authentication { reply } => {
                Some(reply)
            }
            _ => None,
        }
    }
}
