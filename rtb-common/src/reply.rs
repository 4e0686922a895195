//! # Reply Classification
//!
//! Purpose: Decide what a decoded server line means. The only rule the
//! clients rely on for failures is the `:ERR` prefix; everything else is
//! informational.

/// Prefix of every rejected command.
pub const ERR_MARKER: &str = ":ERR";

/// Prefix of the server's positive acknowledgements (`:RES registered`).
pub const RES_MARKER: &str = ":RES";

/// Prefix of a granted token (`!<bucket>`).
pub const GRANT_PREFIX: char = '!';

/// A decoded reply line, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply<'a> {
    /// `:ERR <reason>`; the reason is free text.
    Error { reason: &'a str },
    /// `:RES <text>`.
    Ack { text: &'a str },
    /// `!<name>`; `name` is empty for the `?` shorthand.
    Granted { name: &'a str },
    /// Anything else.
    Other(&'a str),
}

impl<'a> Reply<'a> {
    /// Classifies a decoded line. The error marker is checked first.
    pub fn classify(line: &'a str) -> Self {
        if let Some(rest) = line.strip_prefix(ERR_MARKER) {
            return Reply::Error {
                reason: rest.trim(),
            };
        }
        if let Some(rest) = line.strip_prefix(RES_MARKER) {
            return Reply::Ack { text: rest.trim() };
        }
        if let Some(name) = line.strip_prefix(GRANT_PREFIX) {
            return Reply::Granted { name };
        }
        Reply::Other(line)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error { .. })
    }
}

/// True when `line` is a protocol-level error reply.
pub fn is_error(line: &str) -> bool {
    line.starts_with(ERR_MARKER)
}
