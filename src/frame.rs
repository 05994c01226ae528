//! WebSocket frame encoding and decoding
//!
//! This module implements RFC 6455 frame handling for a blocking client:
//! exact-length reads off the stream on the way in, masked single-frame
//! encoding on the way out. Header validation happens before any payload
//! byte is read, so a malformed control frame never reaches the payload
//! stage.

use std::io::{self, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{Error, ProtocolError, Result};
use crate::mask::apply_mask;
use crate::{MAX_FRAME_HEADER_SIZE, MEDIUM_MESSAGE_THRESHOLD, SMALL_MESSAGE_THRESHOLD};

/// WebSocket opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Continuation frame
    Continuation = 0x0,
    /// Text frame
    Text = 0x1,
    /// Binary frame
    Binary = 0x2,
    /// Connection close
    Close = 0x8,
    /// Ping
    Ping = 0x9,
    /// Pong
    Pong = 0xA,
}

impl OpCode {
    /// Parse opcode from byte
    #[inline]
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(OpCode::Continuation),
            0x1 => Some(OpCode::Text),
            0x2 => Some(OpCode::Binary),
            0x8 => Some(OpCode::Close),
            0x9 => Some(OpCode::Ping),
            0xA => Some(OpCode::Pong),
            _ => None,
        }
    }

    /// Check if this is a control frame
    #[inline]
    pub fn is_control(&self) -> bool {
        (*self as u8) >= 0x8
    }

    /// Check if this is a data frame
    #[inline]
    pub fn is_data(&self) -> bool {
        (*self as u8) <= 0x2
    }
}

/// A decoded frame header
#[derive(Debug, Clone)]
pub struct FrameHeader {
    /// Final fragment flag
    pub fin: bool,
    /// Frame opcode
    pub opcode: OpCode,
    /// Mask flag (never set by a conforming server)
    pub masked: bool,
    /// Payload length
    pub payload_len: u64,
    /// Masking key (if masked)
    pub mask: Option<[u8; 4]>,
}

/// A complete WebSocket frame
///
/// Constructed by [`FrameCodec::read_frame`] from stream bytes, consumed
/// immediately by the protocol handler; never persisted.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame header
    pub header: FrameHeader,
    /// Frame payload (already unmasked)
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame
    pub fn new(opcode: OpCode, payload: Bytes, fin: bool) -> Self {
        Self {
            header: FrameHeader {
                fin,
                opcode,
                masked: false,
                payload_len: payload.len() as u64,
                mask: None,
            },
            payload,
        }
    }

    /// Check if this is a control frame
    #[inline]
    pub fn is_control(&self) -> bool {
        self.header.opcode.is_control()
    }

    /// Check if this is the final fragment
    #[inline]
    pub fn is_final(&self) -> bool {
        self.header.fin
    }
}

/// Build a close-frame payload: 16-bit big-endian code plus UTF-8 reason
pub fn close_payload(code: u16, reason: &str) -> Bytes {
    let mut payload = BytesMut::with_capacity(2 + reason.len());
    payload.put_u16(code);
    payload.put_slice(reason.as_bytes());
    payload.freeze()
}

/// Encode a frame into a buffer
///
/// For masked frames the payload is copied into the buffer and masked in
/// place.
pub fn encode_frame(
    buf: &mut BytesMut,
    opcode: OpCode,
    payload: &[u8],
    fin: bool,
    mask: Option<[u8; 4]>,
) {
    let payload_len = payload.len();

    let header_size =
        2 + if payload_len > MEDIUM_MESSAGE_THRESHOLD {
            8
        } else if payload_len > SMALL_MESSAGE_THRESHOLD {
            2
        } else {
            0
        } + if mask.is_some() { 4 } else { 0 };

    buf.reserve(header_size + payload_len);

    // First byte: FIN + opcode
    let mut b0 = opcode as u8;
    if fin {
        b0 |= 0x80;
    }
    buf.put_u8(b0);

    // Second byte: mask flag + length
    let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };

    if payload_len <= SMALL_MESSAGE_THRESHOLD {
        buf.put_u8(mask_bit | payload_len as u8);
    } else if payload_len <= MEDIUM_MESSAGE_THRESHOLD {
        buf.put_u8(mask_bit | 126);
        buf.put_u16(payload_len as u16);
    } else {
        buf.put_u8(mask_bit | 127);
        buf.put_u64(payload_len as u64);
    }

    if let Some(m) = mask {
        buf.put_slice(&m);

        let start = buf.len();
        buf.put_slice(payload);
        apply_mask(&mut buf[start..], m);
    } else {
        buf.put_slice(payload);
    }
}

/// Blocking frame codec
///
/// Reads one frame per call with exact-length reads, and writes whole frames
/// followed by a flush. Suspension happens only inside the stream's own
/// read/write calls.
#[derive(Debug)]
pub struct FrameCodec {
    /// Maximum accepted payload length per frame
    max_frame_size: usize,
    /// Whether frames carrying a masking key are accepted and unmasked
    ///
    /// A client connection never accepts them (a conforming server must not
    /// mask); the accepting mode exists for loopback decoding in tests.
    accept_masked: bool,
}

impl FrameCodec {
    /// Create a codec rejecting masked input frames (the client role)
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            accept_masked: false,
        }
    }

    /// Create a codec that unmasks masked input frames
    pub fn accepting_masked(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            accept_masked: true,
        }
    }

    /// Read one frame off the stream
    ///
    /// Returns:
    /// - `Ok(Some(frame))` for a complete, validated frame
    /// - `Ok(None)` if the stream ended before a new frame header (clean
    ///   peer disconnect)
    /// - `Err(_)` on a framing violation, or if the stream ended inside a
    ///   frame (truncation is corruption, not a clean close)
    pub fn read_frame<R: Read>(&self, stream: &mut R) -> Result<Option<Frame>> {
        let mut head = [0u8; 2];
        if !read_or_eof(stream, &mut head)? {
            return Ok(None);
        }

        let fin = head[0] & 0x80 != 0;
        if head[0] & 0x70 != 0 {
            return Err(ProtocolError::ReservedBitsSet.into());
        }

        let masked = head[1] & 0x80 != 0;
        if masked && !self.accept_masked {
            return Err(ProtocolError::UnexpectedMask.into());
        }

        let opcode = OpCode::from_u8(head[0] & 0x0F)
            .ok_or(ProtocolError::UnknownOpcode(head[0] & 0x0F))?;

        let len_byte = head[1] & 0x7F;
        if opcode.is_control() {
            if !fin {
                return Err(ProtocolError::FragmentedControlFrame.into());
            }
            if len_byte > 125 {
                return Err(ProtocolError::ControlFrameTooLarge.into());
            }
            if opcode == OpCode::Close && len_byte == 1 {
                return Err(ProtocolError::InvalidCloseLength.into());
            }
        }

        // From here on EOF is a truncated frame: read_exact surfaces it as
        // UnexpectedEof, which maps to the hard ConnectionClosed error.
        let payload_len = match len_byte {
            126 => {
                let mut ext = [0u8; 2];
                stream.read_exact(&mut ext)?;
                u16::from_be_bytes(ext) as u64
            }
            127 => {
                let mut ext = [0u8; 8];
                stream.read_exact(&mut ext)?;
                u64::from_be_bytes(ext)
            }
            n => n as u64,
        };

        if payload_len > self.max_frame_size as u64 {
            return Err(Error::FrameTooLarge);
        }

        let mask = if masked {
            let mut key = [0u8; 4];
            stream.read_exact(&mut key)?;
            Some(key)
        } else {
            None
        };

        let mut payload = BytesMut::zeroed(payload_len as usize);
        stream.read_exact(&mut payload)?;
        if let Some(key) = mask {
            apply_mask(&mut payload, key);
        }

        trace!(
            opcode = ?opcode,
            fin,
            len = payload_len,
            "frame read"
        );

        Ok(Some(Frame {
            header: FrameHeader {
                fin,
                opcode,
                masked,
                payload_len,
                mask,
            },
            payload: payload.freeze(),
        }))
    }

    /// Encode and write one masked frame, then flush
    ///
    /// Outgoing messages are never fragmented: FIN is always set.
    pub fn write_frame<W: Write>(
        &self,
        stream: &mut W,
        opcode: OpCode,
        payload: &[u8],
        mask: [u8; 4],
    ) -> Result<()> {
        let mut buf = BytesMut::with_capacity(MAX_FRAME_HEADER_SIZE + payload.len());
        encode_frame(&mut buf, opcode, payload, true, Some(mask));
        stream.write_all(&buf)?;
        stream.flush()?;

        trace!(opcode = ?opcode, len = payload.len(), "frame written");
        Ok(())
    }
}

/// Fill `buf` exactly, or report a clean end-of-stream
///
/// Returns `Ok(false)` if the stream ends before `buf` is full. The caller
/// uses this only for the 2-byte base header, where a half-read header is
/// treated as connection-closed rather than corruption.
fn read_or_eof<R: Read>(stream: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}
