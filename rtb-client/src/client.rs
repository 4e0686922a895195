//! # Blocking Client
//!
//! Purpose: Expose `define`/`block` as plain blocking calls over a single
//! lazily established `std::net::TcpStream`.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `BucketClient` hides the connection lifecycle.
//! 2. **Shared Protocol Core**: Framing and reply handling live in `Session`;
//!    this file only connects, writes and reads.
//! 3. **Exclusive Access**: `&mut self` receivers keep one command in flight.

use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::events::{EventSink, TracingSink};
use crate::session::{Channel, ConnectionState, Outcome, Request, Session};

/// Blocking Remote Token Bucket client.
///
/// Nothing touches the network until the first command. A connection is
/// then reused until `close`, or until an I/O failure drops it; the next
/// command after a drop reconnects and repeats the unlock handshake.
pub struct BucketClient {
    session: Session<TcpStream>,
}

impl BucketClient {
    /// Creates a client that reports events through `tracing`.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Creates a client with a custom event sink.
    pub fn with_sink(config: ClientConfig, sink: Arc<dyn EventSink>) -> Self {
        BucketClient {
            session: Session::new(config, sink),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        self.session.config()
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Connects and unlocks now instead of on the first command.
    ///
    /// Does nothing when already connected.
    pub fn connect(&mut self) -> ClientResult<()> {
        let channel = match self.session.checkout() {
            Some(channel) => channel,
            None => self.open()?,
        };
        self.session.checkin(channel);
        Ok(())
    }

    /// Defines (or redefines) `bucket` with a refill rate and burst capacity.
    pub fn define(&mut self, bucket: &str, qps: f64, burst: u64) -> ClientResult<()> {
        self.execute(Request::Define { bucket, qps, burst }).map(|_| ())
    }

    /// Asks for one token from `bucket`.
    ///
    /// Returns `true` only when the server replies `!<bucket>`. Any other
    /// non-error reply is reported as an `Unrecognized` event and yields
    /// `false`. `:ERR` replies follow the configured `BlockErrorPolicy`.
    pub fn block(&mut self, bucket: &str) -> ClientResult<bool> {
        self.execute(Request::Block { bucket }).map(Outcome::granted)
    }

    /// Asks for one token from the bucket last used on this connection.
    pub fn block_last(&mut self) -> ClientResult<bool> {
        self.execute(Request::BlockLast).map(Outcome::granted)
    }

    /// Closes the connection, if any. The client stays usable.
    pub fn close(&mut self) {
        if let Some(channel) = self.session.close() {
            let _ = channel.stream.shutdown(Shutdown::Both);
        }
    }

    fn execute(&mut self, request: Request<'_>) -> ClientResult<Outcome> {
        let frame = self.session.frame(&request)?;
        let mut channel = match self.session.checkout() {
            Some(channel) => channel,
            None => self.open()?,
        };

        match round_trip(&mut channel, &frame) {
            Ok(line) => {
                self.session.checkin(channel);
                self.session.settle(&request, &line)
            }
            Err(err) => {
                // The channel is dropped here; the next call reconnects.
                self.session.dropped(&err);
                Err(err)
            }
        }
    }

    fn open(&mut self) -> ClientResult<Channel<TcpStream>> {
        let unlock = self.session.unlock_frame()?;
        let (stream, addr) = connect_stream(self.session.config())?;
        self.session.connected(addr);

        let mut channel = Channel::new(stream);
        if let Some(frame) = unlock {
            let line = round_trip(&mut channel, &frame).map_err(|err| {
                self.session.dropped(&err);
                err
            })?;
            self.session.settle_unlock(&line)?;
        }
        Ok(channel)
    }
}

impl Default for BucketClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

fn connect_stream(config: &ClientConfig) -> ClientResult<(TcpStream, SocketAddr)> {
    let addr = config.addr();
    let connection_error = |source| ClientError::Connection {
        addr: addr.clone(),
        source,
    };

    let candidates = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(connection_error)?;

    // Try each resolved address until one accepts.
    let mut last_err = None;
    for candidate in candidates {
        match TcpStream::connect_timeout(&candidate, config.connect_timeout) {
            Ok(stream) => {
                stream.set_read_timeout(config.read_timeout).map_err(connection_error)?;
                stream.set_write_timeout(config.write_timeout).map_err(connection_error)?;
                // Commands are tiny; don't let Nagle hold them back.
                stream.set_nodelay(true).map_err(connection_error)?;
                return Ok((stream, candidate));
            }
            Err(err) => last_err = Some(err),
        }
    }

    Err(connection_error(last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
    })))
}

fn round_trip(channel: &mut Channel<TcpStream>, frame: &[u8]) -> ClientResult<String> {
    channel.stream.write_all(frame)?;
    channel.stream.flush()?;
    read_line(channel)
}

fn read_line(channel: &mut Channel<TcpStream>) -> ClientResult<String> {
    loop {
        if let Some(line) = channel.lines.next_line()? {
            return Ok(line);
        }
        if channel.lines.fill_from(&mut channel.stream)? == 0 {
            return Err(ClientError::Closed);
        }
    }
}
