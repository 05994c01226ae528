//! Error types for the WebSocket client

use std::fmt;
use std::io;

/// Result type alias for WebSocket operations
pub type Result<T> = std::result::Result<T, Error>;

/// WebSocket error types
#[derive(Debug)]
pub enum Error {
    /// I/O error from the underlying transport
    Io(io::Error),
    /// Stream ended mid-frame, or an operation was attempted on a closed connection
    ConnectionClosed,
    /// Handshake failed
    Handshake(HandshakeError),
    /// Peer violated the framing protocol
    Protocol(ProtocolError),
    /// Invalid UTF-8 in an outgoing text message (nothing was written)
    InvalidUtf8,
    /// Frame payload above the configured ceiling
    FrameTooLarge,
    /// Reassembled message above the configured ceiling
    MessageTooLarge,
}

/// Reasons connection establishment can fail
///
/// All of these are fatal: the transport is torn down before the error
/// reaches the caller, and no retry is attempted.
#[derive(Debug, PartialEq, Eq)]
pub enum HandshakeError {
    /// URL scheme other than `ws` or `wss`
    UnsupportedScheme(String),
    /// URL could not be split into host/port/path
    InvalidUrl(&'static str),
    /// Response status line was not `HTTP/1.1 101`
    BadStatus(String),
    /// Response header section could not be parsed
    MalformedHeader,
    /// A required response header was absent
    MissingHeader(&'static str),
    /// `Sec-WebSocket-Accept` did not match the expected digest
    AcceptMismatch,
    /// Response header section exceeded the size cap
    ResponseTooLarge,
}

/// Framing violations detected while receiving
///
/// Each of these aborts the connection: a Close frame is sent (1002, or 1007
/// for [`ProtocolError::InvalidUtf8`]), the transport is shut down, and the
/// error propagates to the caller.
#[derive(Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// RSV1-3 set without a negotiated extension
    ReservedBitsSet,
    /// Server frame carried a masking key
    UnexpectedMask,
    /// Opcode outside the RFC 6455 table
    UnknownOpcode(u8),
    /// Control frame with FIN clear
    FragmentedControlFrame,
    /// Control frame payload above 125 bytes
    ControlFrameTooLarge,
    /// Close frame with a 1-byte payload
    InvalidCloseLength,
    /// Continuation frame without an open fragment run
    NoContinuationToJoin,
    /// Text/Binary frame while a fragment run is open
    UnexpectedDataOpcode,
    /// Text payload is not valid UTF-8
    InvalidUtf8,
}

impl ProtocolError {
    /// Close code sent to the peer when this violation aborts the connection
    pub fn close_code(&self) -> u16 {
        match self {
            ProtocolError::InvalidUtf8 => CloseReason::INVALID_PAYLOAD,
            _ => CloseReason::PROTOCOL_ERROR,
        }
    }
}

impl Error {
    /// Close code to send before aborting, if this error warrants one
    pub(crate) fn close_code(&self) -> Option<u16> {
        match self {
            Error::Protocol(p) => Some(p.close_code()),
            Error::FrameTooLarge | Error::MessageTooLarge => Some(CloseReason::TOO_BIG),
            _ => None,
        }
    }
}

/// Close frame code and reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Close status code
    pub code: u16,
    /// Optional reason string
    pub reason: String,
}

impl CloseReason {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Going away (e.g., server shutdown)
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Unsupported data
    pub const UNSUPPORTED: u16 = 1003;
    /// Invalid frame payload
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// Policy violation
    pub const POLICY: u16 = 1008;
    /// Message too big
    pub const TOO_BIG: u16 = 1009;
    /// Mandatory extension
    pub const EXTENSION: u16 = 1010;
    /// Internal server error
    pub const INTERNAL: u16 = 1011;

    /// Create a new close reason
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::ConnectionClosed => write!(f, "connection closed"),
            Error::Handshake(e) => write!(f, "handshake failed: {}", e),
            Error::Protocol(e) => write!(f, "protocol error: {}", e),
            Error::InvalidUtf8 => write!(f, "invalid UTF-8 in outgoing text message"),
            Error::FrameTooLarge => write!(f, "frame too large"),
            Error::MessageTooLarge => write!(f, "message too large"),
        }
    }
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::UnsupportedScheme(s) => write!(f, "unsupported scheme: {}", s),
            HandshakeError::InvalidUrl(msg) => write!(f, "invalid URL: {}", msg),
            HandshakeError::BadStatus(line) => write!(f, "bad response status: {}", line),
            HandshakeError::MalformedHeader => write!(f, "malformed response header"),
            HandshakeError::MissingHeader(name) => write!(f, "missing response header: {}", name),
            HandshakeError::AcceptMismatch => write!(f, "sec-websocket-accept mismatch"),
            HandshakeError::ResponseTooLarge => write!(f, "response header section too large"),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::ReservedBitsSet => write!(f, "reserved bits must be 0"),
            ProtocolError::UnexpectedMask => write!(f, "server frames must not be masked"),
            ProtocolError::UnknownOpcode(op) => write!(f, "unknown opcode: {:#x}", op),
            ProtocolError::FragmentedControlFrame => {
                write!(f, "control frame must not be fragmented")
            }
            ProtocolError::ControlFrameTooLarge => write!(f, "control frame too large"),
            ProtocolError::InvalidCloseLength => {
                write!(f, "close frame with payload of length 1")
            }
            ProtocolError::NoContinuationToJoin => {
                write!(f, "continuation frame without a message to continue")
            }
            ProtocolError::UnexpectedDataOpcode => {
                write!(f, "expected continuation frame")
            }
            ProtocolError::InvalidUtf8 => write!(f, "invalid UTF-8 in text message"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
            io::ErrorKind::BrokenPipe => Error::ConnectionClosed,
            io::ErrorKind::ConnectionReset => Error::ConnectionClosed,
            _ => Error::Io(e),
        }
    }
}

impl From<HandshakeError> for Error {
    fn from(e: HandshakeError) -> Self {
        Error::Handshake(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}
