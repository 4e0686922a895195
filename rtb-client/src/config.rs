//! Client configuration.

use std::time::Duration;

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_PORT: u16 = 1337;

/// Default bound on establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// What `block` does when the server answers `:ERR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockErrorPolicy {
    /// Fail the call with `ClientError::Protocol`, like `define`.
    #[default]
    Raise,
    /// Report the token as not granted and record a `Rejected` event.
    Deny,
}

/// Configuration shared by the blocking and async clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or IP address.
    pub host: String,
    /// Server TCP port.
    pub port: u16,
    /// Shared secret sent as `UNLOCK <secret>` on every new connection.
    pub secret: Option<String>,
    /// Bound on the TCP connect.
    pub connect_timeout: Duration,
    /// Optional bound on each reply read. `None` waits indefinitely.
    pub read_timeout: Option<Duration>,
    /// Optional bound on each command write.
    pub write_timeout: Option<Duration>,
    /// How `block` treats `:ERR` replies.
    pub block_error_policy: BlockErrorPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            secret: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: None,
            write_timeout: None,
            block_error_policy: BlockErrorPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Targets `host:port` with every other setting at its default.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ClientConfig {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn with_block_error_policy(mut self, policy: BlockErrorPolicy) -> Self {
        self.block_error_policy = policy;
        self
    }

    /// `host:port`, as used in diagnostics and address resolution.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
