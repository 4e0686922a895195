//! # Command Vocabulary
//!
//! Purpose: Name every outbound message of the protocol and render it as a
//! single text line.
//!
//! ```text
//! UNLOCK <secret>               authenticate this connection
//! BUCKET <name> <qps> <burst>   define or redefine a bucket
//! ?<name>                       take one token from <name>
//! ?                             take one token from the last bucket used
//! ```

use std::fmt;

use crate::codec::{encode_line, CodecError};

/// One outbound protocol command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command<'a> {
    /// Shared-secret handshake, first on a connection when a secret is set.
    Unlock { secret: &'a str },
    /// Declares a bucket refilling at `qps` tokens per second, holding at
    /// most `burst` tokens.
    Bucket { name: &'a str, qps: f64, burst: u64 },
    /// Requests one token from `name`.
    Take { name: &'a str },
    /// Requests one token from the bucket last taken from on this connection.
    TakeLast,
}

impl<'a> Command<'a> {
    /// Checks that the command frames as exactly one line.
    ///
    /// Numeric ranges are left to the server.
    pub fn validate(&self) -> Result<(), CodecError> {
        match *self {
            Command::Unlock { secret } => single_line(secret),
            Command::Bucket { name, .. } | Command::Take { name } => {
                if name.is_empty() {
                    return Err(CodecError::EmptyBucketName);
                }
                single_line(name)
            }
            Command::TakeLast => Ok(()),
        }
    }

    /// Validates and appends the framed command to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        self.validate()?;
        let line = match *self {
            Command::Unlock { secret } => format!("UNLOCK {}", secret),
            Command::Bucket { name, qps, burst } => format!("BUCKET {} {} {}", name, qps, burst),
            Command::Take { name } => format!("?{}", name),
            Command::TakeLast => "?".to_string(),
        };
        encode_line(&line, out);
        Ok(())
    }

    /// The reply that grants this command a token, if it takes one.
    pub fn grant_reply(&self) -> Option<String> {
        match *self {
            Command::Take { name } => Some(format!("!{}", name)),
            Command::TakeLast => Some("!".to_string()),
            _ => None,
        }
    }
}

/// Renders the command line for diagnostics; the secret is never printed.
impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Unlock { .. } => write!(f, "UNLOCK ***"),
            Command::Bucket { name, qps, burst } => write!(f, "BUCKET {} {} {}", name, qps, burst),
            Command::Take { name } => write!(f, "?{}", name),
            Command::TakeLast => write!(f, "?"),
        }
    }
}

fn single_line(argument: &str) -> Result<(), CodecError> {
    if argument.contains(['\r', '\n']) {
        return Err(CodecError::EmbeddedTerminator {
            argument: argument.to_string(),
        });
    }
    Ok(())
}
