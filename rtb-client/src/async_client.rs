//! # Async Client
//!
//! Purpose: The same command API as `BucketClient`, for tokio tasks.
//!
//! The task suspends only while connecting, writing a command and reading a
//! reply. Dropping a call's future at any of those points drops the
//! connection with it, so the next call starts from a fresh connect (and
//! unlock) instead of reading a reply meant for the abandoned command.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::events::{EventSink, TracingSink};
use crate::session::{Channel, ConnectionState, Outcome, Request, Session};

/// Async Remote Token Bucket client.
///
/// Produces the same bytes on the wire as `BucketClient` for the same calls.
pub struct AsyncBucketClient {
    session: Session<TcpStream>,
}

impl AsyncBucketClient {
    /// Creates a client that reports events through `tracing`.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Creates a client with a custom event sink.
    pub fn with_sink(config: ClientConfig, sink: Arc<dyn EventSink>) -> Self {
        AsyncBucketClient {
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
    pub async fn connect(&mut self) -> ClientResult<()> {
        let channel = match self.session.checkout() {
            Some(channel) => channel,
            None => self.open().await?,
        };
        self.session.checkin(channel);
        Ok(())
    }

    /// Defines (or redefines) `bucket` with a refill rate and burst capacity.
    pub async fn define(&mut self, bucket: &str, qps: f64, burst: u64) -> ClientResult<()> {
        self.execute(Request::Define { bucket, qps, burst })
            .await
            .map(|_| ())
    }

    /// Asks for one token from `bucket`. See `BucketClient::block`.
    pub async fn block(&mut self, bucket: &str) -> ClientResult<bool> {
        self.execute(Request::Block { bucket })
            .await
            .map(Outcome::granted)
    }

    /// Asks for one token from the bucket last used on this connection.
    pub async fn block_last(&mut self) -> ClientResult<bool> {
        self.execute(Request::BlockLast).await.map(Outcome::granted)
    }

    /// Closes the connection, if any. The client stays usable.
    pub async fn close(&mut self) {
        if let Some(mut channel) = self.session.close() {
            let _ = channel.stream.shutdown().await;
        }
    }

    async fn execute(&mut self, request: Request<'_>) -> ClientResult<Outcome> {
        let frame = self.session.frame(&request)?;
        let mut channel = match self.session.checkout() {
            Some(channel) => channel,
            None => self.open().await?,
        };

        match round_trip(&mut channel, &frame, self.session.config()).await {
            Ok(line) => {
                self.session.checkin(channel);
                self.session.settle(&request, &line)
            }
            Err(err) => {
                self.session.dropped(&err);
                Err(err)
            }
        }
    }

    async fn open(&mut self) -> ClientResult<Channel<TcpStream>> {
        let unlock = self.session.unlock_frame()?;
        let (stream, addr) = connect_stream(self.session.config()).await?;
        self.session.connected(addr);

        let mut channel = Channel::new(stream);
        if let Some(frame) = unlock {
            let line = match round_trip(&mut channel, &frame, self.session.config()).await {
                Ok(line) => line,
                Err(err) => {
                    self.session.dropped(&err);
                    return Err(err);
                }
            };
            self.session.settle_unlock(&line)?;
        }
        Ok(channel)
    }
}

impl Default for AsyncBucketClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

async fn connect_stream(config: &ClientConfig) -> ClientResult<(TcpStream, SocketAddr)> {
    let connection_error = |source| ClientError::Connection {
        addr: config.addr(),
        source,
    };

    let candidates = tokio::net::lookup_host((config.host.as_str(), config.port))
        .await
        .map_err(connection_error)?;

    let mut last_err = None;
    for candidate in candidates {
        let attempt = bounded(
            Some(config.connect_timeout),
            "connect",
            TcpStream::connect(candidate),
        );
        match attempt.await {
            Ok(stream) => {
                stream.set_nodelay(true).map_err(connection_error)?;
                return Ok((stream, candidate));
            }
            Err(err) => last_err = Some(err),
        }
    }

    Err(connection_error(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")
    })))
}

async fn round_trip(
    channel: &mut Channel<TcpStream>,
    frame: &[u8],
    config: &ClientConfig,
) -> ClientResult<String> {
    let stream = &mut channel.stream;
    bounded(config.write_timeout, "write", async move {
        stream.write_all(frame).await?;
        stream.flush().await?;
        Ok::<_, io::Error>(())
    })
    .await?;
    bounded(config.read_timeout, "read", read_line(channel)).await
}

async fn read_line(channel: &mut Channel<TcpStream>) -> ClientResult<String> {
    loop {
        if let Some(line) = channel.lines.next_line()? {
            return Ok(line);
        }
        if channel.stream.read_buf(channel.lines.as_mut_buf()).await? == 0 {
            return Err(ClientError::Closed);
        }
    }
}

/// Runs `fut`, failing with `TimedOut` once `limit` elapses.
async fn bounded<T, E, F>(limit: Option<Duration>, what: &str, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<io::Error>,
{
    let Some(limit) = limit else {
        return fut.await;
    };
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{} timed out after {:?}", what, limit),
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_maps_elapsed_write_to_timed_out() {
        let stalled = std::future::pending::<Result<(), io::Error>>();
        let err = bounded(Some(Duration::from_millis(20)), "write", stalled)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(err.to_string().starts_with("write timed out"));
    }

    #[tokio::test]
    async fn bounded_converts_into_client_error() {
        let stalled = std::future::pending::<ClientResult<String>>();
        match bounded(Some(Duration::from_millis(20)), "read", stalled).await {
            Err(ClientError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::TimedOut),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bounded_without_limit_passes_result_through() {
        let done = async { Ok::<_, io::Error>(7) };
        assert_eq!(bounded(None, "write", done).await.unwrap(), 7);
    }
}
