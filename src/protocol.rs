//! WebSocket protocol state machine
//!
//! This module handles everything between a decoded frame and the caller:
//! - Message fragmentation and reassembly
//! - Control frame handling (ping/pong/close)
//! - Close-code negotiation
//! - Connection state transitions
//!
//! The handler is pure: it consumes frames and tells the connection what to
//! do next; all I/O stays in the connection.

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::error::{CloseReason, Error, ProtocolError, Result};
use crate::frame::{Frame, OpCode};
use crate::utf8::validate_utf8;

/// A complete message, possibly assembled from fragments
///
/// Text payloads are valid UTF-8 at the point of return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Text message (UTF-8 validated)
    Text(Bytes),
    /// Binary message
    Binary(Bytes),
}

impl Message {
    /// Check if this is a text message
    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self, Message::Text(_))
    }

    /// Check if this is a binary message
    #[inline]
    pub fn is_binary(&self) -> bool {
        matches!(self, Message::Binary(_))
    }

    /// Get message as text (returns None for binary messages)
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(b) => {
                // SAFETY: Text payloads are UTF-8 validated during assembly
                Some(unsafe { std::str::from_utf8_unchecked(b) })
            }
            Message::Binary(_) => None,
        }
    }

    /// Get message payload as bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(b) => b,
            Message::Binary(b) => b,
        }
    }

    /// Convert into the payload bytes
    pub fn into_bytes(self) -> Bytes {
        match self {
            Message::Text(b) => b,
            Message::Binary(b) => b,
        }
    }
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in flight
    Connecting,
    /// Handshake complete, frames may flow
    Open,
    /// A close frame has been sent or received
    Closing,
    /// Transport shut down; terminal
    Closed,
}

/// What the connection should do after feeding a frame to the handler
#[derive(Debug)]
pub(crate) enum Event {
    /// Complete message ready for the caller
    Message(Message),
    /// Peer ping: echo this payload in a pong frame and keep reading
    Ping(Bytes),
    /// Peer pong: nothing to do, keep reading
    Pong,
    /// Peer close: reply with this code, then shut the transport down
    Close(u16),
    /// Mid-message fragment consumed: keep reading
    Incomplete,
}

/// Normalize a received close code into the code echoed back
///
/// The defined RFC codes a client may echo, the registered (3000-3999) and
/// private (4000-4999) ranges, and an absent code all map to 1000; anything
/// else is answered with 1002. Only the response is normalized; the
/// received code keeps its meaning for the caller.
pub fn echo_close_code(code: Option<u16>) -> u16 {
    match code {
        None => CloseReason::NORMAL,
        Some(1000..=1003) | Some(1007..=1011) | Some(3000..=4999) => CloseReason::NORMAL,
        Some(_) => CloseReason::PROTOCOL_ERROR,
    }
}

/// Receive-side protocol handler
///
/// Owns the fragmentation state and the connection state. Exists for the
/// lifetime of one connection; the fragment buffer is reset whenever a
/// message completes.
pub struct Protocol {
    state: ConnectionState,
    /// Fragment buffer for message reassembly
    fragment_buf: BytesMut,
    /// Opcode of the in-progress fragmented message (None when idle)
    fragment_opcode: Option<OpCode>,
    /// Maximum reassembled message size
    max_message_size: usize,
    /// Close code/reason received from the peer, verbatim
    close_reason: Option<CloseReason>,
}

impl Protocol {
    /// Create a new protocol handler
    pub fn new(max_message_size: usize) -> Self {
        Self {
            state: ConnectionState::Connecting,
            fragment_buf: BytesMut::new(),
            fragment_opcode: None,
            max_message_size,
            close_reason: None,
        }
    }

    /// Current connection state
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the connection reached its terminal state
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// The peer's close code and reason, once a close frame was processed
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    /// Mark the handshake as complete
    pub(crate) fn mark_open(&mut self) {
        self.state = ConnectionState::Open;
    }

    /// Enter the closing handshake
    pub(crate) fn mark_closing(&mut self) {
        if self.state != ConnectionState::Closed {
            self.state = ConnectionState::Closing;
        }
    }

    /// Enter the terminal state
    pub(crate) fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Feed one decoded frame through the state machine
    pub(crate) fn handle_frame(&mut self, frame: Frame) -> Result<Event> {
        match frame.header.opcode {
            OpCode::Continuation => self.handle_continuation(frame),
            OpCode::Text | OpCode::Binary => self.handle_data(frame),
            OpCode::Close => self.handle_close(frame),
            OpCode::Ping => {
                trace!(len = frame.payload.len(), "ping");
                Ok(Event::Ping(frame.payload))
            }
            OpCode::Pong => {
                trace!(len = frame.payload.len(), "pong ignored");
                Ok(Event::Pong)
            }
        }
    }

    /// Handle a text or binary frame
    fn handle_data(&mut self, frame: Frame) -> Result<Event> {
        if self.fragment_opcode.is_some() {
            // A new message cannot start before the previous one finished.
            return Err(ProtocolError::UnexpectedDataOpcode.into());
        }

        if frame.header.fin {
            let message = finish_message(frame.header.opcode, frame.payload)?;
            return Ok(Event::Message(message));
        }

        // Start of a fragmented message
        if frame.payload.len() > self.max_message_size {
            return Err(Error::MessageTooLarge);
        }
        self.fragment_opcode = Some(frame.header.opcode);
        self.fragment_buf.clear();
        self.fragment_buf.extend_from_slice(&frame.payload);
        Ok(Event::Incomplete)
    }

    /// Handle a continuation frame
    fn handle_continuation(&mut self, frame: Frame) -> Result<Event> {
        let opcode = self
            .fragment_opcode
            .ok_or(ProtocolError::NoContinuationToJoin)?;

        let new_size = self.fragment_buf.len() + frame.payload.len();
        if new_size > self.max_message_size {
            return Err(Error::MessageTooLarge);
        }
        self.fragment_buf.extend_from_slice(&frame.payload);

        if !frame.header.fin {
            return Ok(Event::Incomplete);
        }

        self.fragment_opcode = None;
        let data = self.fragment_buf.split().freeze();
        let message = finish_message(opcode, data)?;
        Ok(Event::Message(message))
    }

    /// Handle a close frame
    ///
    /// The payload, when present, is a 2-byte big-endian code followed by a
    /// UTF-8 reason. A reason that fails UTF-8 validation is answered with
    /// 1007; otherwise the normalized echo of the received code is used.
    fn handle_close(&mut self, frame: Frame) -> Result<Event> {
        let echo = if frame.payload.len() >= 2 {
            let code = u16::from_be_bytes([frame.payload[0], frame.payload[1]]);
            let reason_bytes = &frame.payload[2..];

            if validate_utf8(reason_bytes) {
                // SAFETY: just validated
                let reason = unsafe { std::str::from_utf8_unchecked(reason_bytes) };
                self.close_reason = Some(CloseReason::new(code, reason));
                echo_close_code(Some(code))
            } else {
                self.close_reason = Some(CloseReason::new(code, String::new()));
                CloseReason::INVALID_PAYLOAD
            }
        } else {
            // Empty payload: no code, no reason. Length 1 was rejected at
            // the frame layer.
            echo_close_code(None)
        };

        debug!(
            code = self.close_reason.as_ref().map(|r| r.code),
            echo, "close frame received"
        );
        self.mark_closing();
        Ok(Event::Close(echo))
    }
}

/// Finalize a complete message, validating UTF-8 for text
fn finish_message(opcode: OpCode, payload: Bytes) -> Result<Message> {
    match opcode {
        OpCode::Text => {
            if !validate_utf8(&payload) {
                return Err(ProtocolError::InvalidUtf8.into());
            }
            Ok(Message::Text(payload))
        }
        OpCode::Binary => Ok(Message::Binary(payload)),
        // Control opcodes never reach assembly; Continuation is resolved to
        // the run's opcode before this point.
        _ => unreachable!("finish_message on control opcode"),
    }
}
