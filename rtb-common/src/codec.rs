//! # Line Framing
//!
//! Purpose: Frame outbound commands and split inbound bytes into response
//! lines for the CRLF-terminated text protocol.
//!
//! ## Design Principles
//! 1. **One Framing Path**: Blocking and async clients feed the same
//!    `LineBuffer`, so both see identical line boundaries.
//! 2. **Buffer Reuse**: Callers own the output buffer; the receive buffer lives
//!    as long as the connection it belongs to.
//! 3. **Strict Terminator**: A line ends at CRLF only; a bare LF is payload.
//! 4. **Fail Fast**: Oversized or non-UTF-8 lines surface as errors immediately.

use std::io::{self, Read};

use bytes::{Buf, BytesMut};
use thiserror::Error;

/// Line terminator for every message in both directions.
pub const CRLF: &[u8] = b"\r\n";

/// Upper bound on a buffered line without a terminator.
///
/// Server replies are a few dozen bytes; anything past this is a broken peer.
pub const MAX_LINE_LEN: usize = 64 * 1024;

const READ_CHUNK: usize = 1024;

/// Framing and argument errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Response bytes were not valid UTF-8.
    #[error("response is not valid utf-8")]
    InvalidUtf8,
    /// No CRLF within `limit` bytes.
    #[error("response line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
    /// An argument would split the command across two lines.
    #[error("argument {argument:?} contains a line terminator")]
    EmbeddedTerminator { argument: String },
    /// Bucket names must not be empty.
    #[error("bucket name is empty")]
    EmptyBucketName,
}

/// Appends `command` plus the CRLF terminator to `out`.
pub fn encode_line(command: &str, out: &mut Vec<u8>) {
    out.reserve(command.len() + CRLF.len());
    out.extend_from_slice(command.as_bytes());
    out.extend_from_slice(CRLF);
}

/// Decodes one raw line, dropping the terminator and surrounding whitespace.
pub fn decode_line(raw: &[u8]) -> Result<String, CodecError> {
    let text = std::str::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)?;
    Ok(text.trim().to_string())
}

/// Receive buffer that yields complete CRLF-terminated lines.
///
/// Bytes after the first terminator stay buffered for the next call, so a
/// reply split across reads (or two replies in one read) frame correctly.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    /// Creates an empty buffer sized for typical replies.
    pub fn new() -> Self {
        LineBuffer {
            buf: BytesMut::with_capacity(512),
        }
    }

    /// Pops the next complete line, if one has been received.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn next_line(&mut self) -> Result<Option<String>, CodecError> {
        if let Some(pos) = find_crlf(&self.buf) {
            let line = decode_line(&self.buf[..pos]);
            self.buf.advance(pos + CRLF.len());
            return line.map(Some);
        }
        if self.buf.len() > MAX_LINE_LEN {
            return Err(CodecError::LineTooLong {
                limit: MAX_LINE_LEN,
            });
        }
        Ok(None)
    }

    /// Reads once from a blocking reader into the buffer.
    ///
    /// Returns the number of bytes read; zero means the peer closed the stream.
    pub fn fill_from<R: Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut chunk) {
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(n);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Exposes the raw buffer for async `read_buf` style readers.
    pub fn as_mut_buf(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Number of buffered bytes not yet returned as a line.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(CRLF.len()).position(|window| window == CRLF)
}
