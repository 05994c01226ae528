//! # rfc-ws: blocking RFC 6455 WebSocket client
//!
//! A synchronous WebSocket client implementing the wire protocol of
//! [RFC 6455](https://datatracker.ietf.org/doc/html/rfc6455): HTTP upgrade
//! handshake, frame encoding/decoding with client-side masking, message
//! fragmentation and reassembly, control-frame semantics (ping/pong/close),
//! UTF-8 text validation, and close-code negotiation.
//!
//! The client is single-threaded and fully blocking: `send` and `receive`
//! perform reads and writes directly against the underlying byte stream, with
//! no internal buffering, background threads, or timeouts. Stream-level
//! deadlines (e.g. [`std::net::TcpStream::set_read_timeout`]) are the
//! embedder's tool for bounding blocking calls.
//!
//! ## Example
//!
//! ```no_run
//! use rfc_ws::{CloseReason, Connection};
//!
//! # fn main() -> rfc_ws::Result<()> {
//! let mut ws = Connection::open("ws://127.0.0.1:9001/echo", None)?;
//! ws.send(b"hello", false)?;
//! while let Some(msg) = ws.receive()? {
//!     println!("got {} bytes (binary: {})", msg.as_bytes().len(), msg.is_binary());
//!     break;
//! }
//! ws.close(CloseReason::NORMAL, None)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Observability
//!
//! The crate emits [`tracing`] events (`debug!` for handshake and close
//! milestones, `trace!` per frame) and installs no subscriber of its own, so
//! tracing is a no-op unless the embedder wires one up.

pub mod client;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod protocol;
pub mod transport;
pub mod utf8;

pub use client::Connection;
pub use error::{CloseReason, Error, HandshakeError, ProtocolError, Result};
pub use frame::{Frame, FrameCodec, FrameHeader, OpCode};
pub use mask::{FixedKeySource, KeySource, RandomKeySource};
pub use protocol::{ConnectionState, Message};
pub use transport::{Stream, Transport};

/// Maximum WebSocket frame header size (2 + 8 + 4 = 14 bytes)
pub const MAX_FRAME_HEADER_SIZE: usize = 14;

/// Largest payload that fits the 7-bit length field
pub const SMALL_MESSAGE_THRESHOLD: usize = 125;

/// Largest payload that fits the 16-bit extended length field
pub const MEDIUM_MESSAGE_THRESHOLD: usize = 65535;

/// WebSocket GUID for handshake
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Configuration for WebSocket connections
///
/// # Example
///
/// ```
/// use rfc_ws::Config;
///
/// let config = Config::builder()
///     .max_frame_size(1024 * 1024)
///     .max_message_size(4 * 1024 * 1024)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum reassembled message size (default: 64MB)
    pub max_message_size: usize,
    /// Maximum single-frame payload size (default: 16MB)
    pub max_frame_size: usize,
    /// Value of the `User-Agent` handshake header (default: "rfc-ws")
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_message_size: 64 * 1024 * 1024,
            max_frame_size: 16 * 1024 * 1024,
            user_agent: "rfc-ws".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for WebSocket configuration
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the maximum single-frame payload size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the maximum reassembled message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set the `User-Agent` handshake header
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
