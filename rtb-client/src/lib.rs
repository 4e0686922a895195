//! # Remote Token Bucket Client
//!
//! Purpose: Ask a Remote Token Bucket server whether a named bucket has a
//! token available, from blocking code or from tokio tasks.
//!
//! ## Design Principles
//! 1. **One Protocol Core**: `session` owns framing, the unlock handshake and
//!    reply interpretation; `BucketClient` and `AsyncBucketClient` only move
//!    bytes, so both put identical bytes on the wire.
//! 2. **Lazy Connections**: Nothing connects until the first command; a
//!    dropped connection is re-established (and re-unlocked) on the next one.
//! 3. **Injected Observability**: Warnings go to an `EventSink` chosen by the
//!    caller, `tracing` by default.
//!
//! ## Example
//!
//! ```no_run
//! use rtb_client::{BucketClient, ClientConfig};
//!
//! let mut client = BucketClient::new(ClientConfig::default().with_secret("s3cr3t"));
//! client.define("hello", 2.0, 4)?;
//! if client.block("hello")? {
//!     // admitted
//! }
//! client.close();
//! # Ok::<(), rtb_client::ClientError>(())
//! ```

mod async_client;
mod client;
mod config;
mod error;
mod events;
mod session;

pub use async_client::AsyncBucketClient;
pub use client::BucketClient;
pub use config::{
    BlockErrorPolicy, ClientConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HOST, DEFAULT_PORT,
};
pub use error::{ClientError, ClientResult};
pub use events::{
    ClientEvent, EventSink, MemorySink, NullSink, TracingSink, DEFAULT_MEMORY_CAPACITY,
};
pub use rtb_common::CodecError;
pub use session::ConnectionState;
