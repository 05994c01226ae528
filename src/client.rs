//! WebSocket client connection
//!
//! [`Connection`] combines handshake, frame codec, and protocol handler into
//! the caller-facing `open` / `send` / `receive` / `close` surface. One
//! connection is owned by one logical caller: every operation blocks on the
//! underlying stream, and no concurrent use is supported.

use tracing::debug;

use crate::error::{CloseReason, Error, HandshakeError, Result};
use crate::frame::{close_payload, FrameCodec, OpCode};
use crate::handshake;
use crate::mask::{KeySource, RandomKeySource};
use crate::protocol::{ConnectionState, Event, Message, Protocol};
use crate::transport::{self, Stream, Transport};
use crate::utf8::validate_utf8;
use crate::Config;

/// Parsed `ws`/`wss` target
#[derive(Debug)]
struct Target {
    secure: bool,
    host: String,
    port: u16,
    /// `host[:port]`, the port omitted when it is the scheme default
    host_header: String,
    /// Path plus query, `/` when absent
    path: String,
}

fn parse_url(url: &str) -> Result<Target> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or(HandshakeError::InvalidUrl("missing scheme"))?;

    let (secure, default_port) = match scheme {
        "ws" => (false, 80u16),
        "wss" => (true, 443u16),
        other => return Err(HandshakeError::UnsupportedScheme(other.to_string()).into()),
    };

    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };

    let (host, port) = match authority.rfind(':') {
        Some(i) => {
            let port: u16 = authority[i + 1..]
                .parse()
                .map_err(|_| HandshakeError::InvalidUrl("invalid port"))?;
            (&authority[..i], port)
        }
        None => (authority, default_port),
    };

    if host.is_empty() {
        return Err(HandshakeError::InvalidUrl("missing host").into());
    }

    let host_header = if port == default_port {
        host.to_string()
    } else {
        format!("{}:{}", host, port)
    };

    Ok(Target {
        secure,
        host: host.to_string(),
        port,
        host_header,
        path: path.to_string(),
    })
}

/// A WebSocket client connection
///
/// Generic over the transport so tests (and embedders with their own
/// streams) can drive the protocol over anything that reads, writes, and
/// shuts down.
pub struct Connection<S: Transport = Stream> {
    stream: S,
    codec: FrameCodec,
    protocol: Protocol,
    keys: Box<dyn KeySource>,
}

impl Connection<Stream> {
    /// Connect to a `ws://` or `wss://` URL and perform the upgrade handshake
    ///
    /// `protocol`, when non-empty, is passed as `Sec-WebSocket-Protocol`.
    pub fn open(url: &str, protocol: Option<&str>) -> Result<Self> {
        Self::open_with(url, protocol, Config::default(), Box::new(RandomKeySource))
    }

    /// Connect with explicit configuration and randomness source
    pub fn open_with(
        url: &str,
        protocol: Option<&str>,
        config: Config,
        mut keys: Box<dyn KeySource>,
    ) -> Result<Self> {
        let target = parse_url(url)?;

        let tcp = transport::connect(&target.host, target.port).map_err(Error::Io)?;
        let mut stream = if target.secure {
            #[cfg(feature = "tls")]
            {
                match transport::wrap_tls(tcp, &target.host) {
                    Ok(stream) => stream,
                    Err(e) => return Err(e),
                }
            }
            #[cfg(not(feature = "tls"))]
            {
                drop(tcp);
                return Err(HandshakeError::UnsupportedScheme(
                    "wss (crate built without the tls feature)".to_string(),
                )
                .into());
            }
        } else {
            Stream::Plain(tcp)
        };

        if let Err(e) = handshake::client_handshake(
            &mut stream,
            &target.host_header,
            &target.path,
            protocol,
            &config.user_agent,
            keys.as_mut(),
        ) {
            // Never leave a half-open session behind a failed handshake.
            let _ = stream.shutdown();
            return Err(e);
        }

        Ok(Self::from_upgraded(stream, config, keys))
    }
}

impl<S: Transport> Connection<S> {
    /// Attach to a transport whose upgrade handshake already completed
    ///
    /// This is what `open` uses internally, and the seam deterministic tests
    /// drive with an in-memory stream and a fixed key source.
    pub fn from_upgraded(stream: S, config: Config, keys: Box<dyn KeySource>) -> Self {
        let mut protocol = Protocol::new(config.max_message_size);
        protocol.mark_open();
        Self {
            stream,
            codec: FrameCodec::new(config.max_frame_size),
            protocol,
            keys,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.protocol.state()
    }

    /// The peer's close code and reason, verbatim, once a close frame has
    /// been processed
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.protocol.close_reason()
    }

    /// Shared reference to the underlying transport
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Send one message as a single unfragmented masked frame
    ///
    /// Text payloads (`binary == false`) are UTF-8 validated before any byte
    /// reaches the wire; on validation failure the connection stays open.
    pub fn send(&mut self, payload: &[u8], binary: bool) -> Result<()> {
        if self.protocol.state() != ConnectionState::Open {
            return Err(Error::ConnectionClosed);
        }

        let opcode = if binary { OpCode::Binary } else { OpCode::Text };
        if !binary && !validate_utf8(payload) {
            return Err(Error::InvalidUtf8);
        }

        let mask = self.keys.masking_key();
        self.codec.write_frame(&mut self.stream, opcode, payload, mask)
    }

    /// Receive one complete message
    ///
    /// Blocks until a full message is assembled. Control frames are handled
    /// transparently: pings are answered, pongs ignored. Returns `None` once
    /// the peer closed (close frame or clean end-of-stream); the close
    /// handshake has completed and the transport is shut down by then.
    pub fn receive(&mut self) -> Result<Option<Message>> {
        if self.protocol.is_closed() {
            return Ok(None);
        }

        loop {
            let frame = match self.codec.read_frame(&mut self.stream) {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    // Peer went away between frames: a clean disconnect.
                    debug!("end of stream");
                    self.protocol.mark_closed();
                    let _ = self.stream.shutdown();
                    return Ok(None);
                }
                Err(e) => return Err(self.abort(e)),
            };

            match self.protocol.handle_frame(frame) {
                Ok(Event::Message(message)) => return Ok(Some(message)),
                Ok(Event::Incomplete) | Ok(Event::Pong) => continue,
                Ok(Event::Ping(payload)) => {
                    let mask = self.keys.masking_key();
                    self.codec
                        .write_frame(&mut self.stream, OpCode::Pong, &payload, mask)
                        .map_err(|e| self.abort(e))?;
                }
                Ok(Event::Close(echo)) => {
                    let mask = self.keys.masking_key();
                    let payload = close_payload(echo, "");
                    let _ = self
                        .codec
                        .write_frame(&mut self.stream, OpCode::Close, &payload, mask);
                    let _ = self.stream.shutdown();
                    self.protocol.mark_closed();
                    return Ok(None);
                }
                Err(e) => return Err(self.abort(e)),
            }
        }
    }

    /// Initiate the close handshake
    ///
    /// Sends a Close frame with `code` (1000 for a normal closure) and an
    /// optional reason, then shuts the transport down. A no-op once the
    /// connection is closed.
    pub fn close(&mut self, code: u16, reason: Option<&str>) -> Result<()> {
        if self.protocol.is_closed() {
            return Ok(());
        }
        self.protocol.mark_closing();

        let mask = self.keys.masking_key();
        let payload = close_payload(code, reason.unwrap_or(""));
        let write_result = self
            .codec
            .write_frame(&mut self.stream, OpCode::Close, &payload, mask);

        // The transport goes down whether or not the frame made it out.
        let _ = self.stream.shutdown();
        self.protocol.mark_closed();
        debug!(code, "close initiated");

        write_result
    }

    /// Send a close frame for a fatal error, shut down, and hand the error back
    fn abort(&mut self, e: Error) -> Error {
        if let Some(code) = e.close_code() {
            let mask = self.keys.masking_key();
            let payload = close_payload(code, "");
            let _ = self
                .codec
                .write_frame(&mut self.stream, OpCode::Close, &payload, mask);
        }
        let _ = self.stream.shutdown();
        self.protocol.mark_closed();
        debug!(error = %e, "connection aborted");
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::frame::encode_frame;
    use crate::mask::{apply_mask, FixedKeySource};
    use bytes::BytesMut;
    use std::io::{self, Cursor, Read, Write};

    /// In-memory duplex transport: scripted input, captured output
    struct MockStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
        shutdown_calls: usize,
    }

    impl MockStream {
        fn new(input: Vec<u8>) -> Self {
            Self {
                input: Cursor::new(input),
                output: Vec::new(),
                shutdown_calls: 0,
            }
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Transport for MockStream {
        fn shutdown(&mut self) -> io::Result<()> {
            self.shutdown_calls += 1;
            Ok(())
        }
    }

    const KEY: [u8; 4] = [0x11, 0x22, 0x33, 0x44];

    fn connect(input: Vec<u8>) -> Connection<MockStream> {
        Connection::from_upgraded(
            MockStream::new(input),
            Config::default(),
            Box::new(FixedKeySource::new([0; 16], vec![KEY])),
        )
    }

    /// Server-role frame: no mask
    fn server_frame(opcode: OpCode, payload: &[u8], fin: bool) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(&mut buf, opcode, payload, fin, None);
        buf.to_vec()
    }

    /// Pull the payload back out of a client frame sitting in `out`
    fn unmask_client_frame(out: &[u8]) -> (u8, Vec<u8>) {
        let opcode = out[0] & 0x0F;
        assert_eq!(out[1] & 0x80, 0x80, "client frame must be masked");
        let len = (out[1] & 0x7F) as usize;
        assert!(len <= 125, "test helper only handles short frames");
        let mask = [out[2], out[3], out[4], out[5]];
        let mut payload = out[6..6 + len].to_vec();
        apply_mask(&mut payload, mask);
        (opcode, payload)
    }

    #[test]
    fn test_send_exact_wire_bytes() {
        let mut ws = connect(Vec::new());
        ws.send(b"test", false).unwrap();

        let out = &ws.get_ref().output;
        assert_eq!(out[0], 0x81); // FIN + Text
        assert_eq!(out[1], 0x84); // Mask + length 4
        assert_eq!(&out[2..6], &KEY);
        let expected: Vec<u8> = b"test"
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ KEY[i % 4])
            .collect();
        assert_eq!(&out[6..], &expected[..]);
    }

    #[test]
    fn test_send_invalid_utf8_writes_nothing() {
        let mut ws = connect(Vec::new());
        let err = ws.send(&[0xff, 0xfe], false).unwrap_err();
        assert!(matches!(err, Error::InvalidUtf8));
        assert!(ws.get_ref().output.is_empty());
        assert_eq!(ws.state(), ConnectionState::Open);

        // The same bytes go through fine as binary.
        ws.send(&[0xff, 0xfe], true).unwrap();
        assert!(!ws.get_ref().output.is_empty());
    }

    #[test]
    fn test_receive_single_text() {
        let mut ws = connect(server_frame(OpCode::Text, b"hello", true));
        let msg = ws.receive().unwrap().unwrap();
        assert_eq!(msg.as_text(), Some("hello"));
        assert!(!msg.is_binary());
    }

    #[test]
    fn test_receive_reassembles_fragments() {
        let mut input = server_frame(OpCode::Text, b"He", false);
        input.extend(server_frame(OpCode::Continuation, b"ll", false));
        input.extend(server_frame(OpCode::Continuation, b"o", true));

        let mut ws = connect(input);
        let msg = ws.receive().unwrap().unwrap();
        assert_eq!(msg.as_text(), Some("Hello"));
    }

    #[test]
    fn test_ping_is_transparent() {
        let mut input = server_frame(OpCode::Ping, b"tick", true);
        input.extend(server_frame(OpCode::Text, b"data", true));

        let mut ws = connect(input);
        let msg = ws.receive().unwrap().unwrap();
        assert_eq!(msg.as_text(), Some("data"));

        // The pong went out before the message came back, same payload.
        let (opcode, payload) = unmask_client_frame(&ws.get_ref().output);
        assert_eq!(opcode, 0xA);
        assert_eq!(payload, b"tick");
    }

    #[test]
    fn test_consecutive_pings_are_drained_iteratively() {
        let mut input = Vec::new();
        for i in 0..50u8 {
            input.extend(server_frame(OpCode::Ping, &[i], true));
        }
        input.extend(server_frame(OpCode::Binary, b"done", true));

        let mut ws = connect(input);
        let msg = ws.receive().unwrap().unwrap();
        assert_eq!(msg.as_bytes(), b"done");
    }

    #[test]
    fn test_pong_is_ignored() {
        let mut input = server_frame(OpCode::Pong, b"late", true);
        input.extend(server_frame(OpCode::Text, b"x", true));

        let mut ws = connect(input);
        assert!(ws.receive().unwrap().is_some());
        assert!(ws.get_ref().output.is_empty());
    }

    #[test]
    fn test_peer_close_is_echoed_and_shut_down() {
        let mut payload = 1001u16.to_be_bytes().to_vec();
        payload.extend_from_slice(b"bye");
        let mut ws = connect(server_frame(OpCode::Close, &payload, true));

        assert!(ws.receive().unwrap().is_none());
        assert_eq!(ws.state(), ConnectionState::Closed);
        assert_eq!(ws.get_ref().shutdown_calls, 1);

        let reason = ws.close_reason().unwrap();
        assert_eq!(reason.code, 1001);
        assert_eq!(reason.reason, "bye");

        // 1001 normalizes to a 1000 echo.
        let (opcode, payload) = unmask_client_frame(&ws.get_ref().output);
        assert_eq!(opcode, 0x8);
        assert_eq!(payload, 1000u16.to_be_bytes());

        // Terminal: further receives report end-of-stream, sends fail.
        assert!(ws.receive().unwrap().is_none());
        assert!(matches!(
            ws.send(b"x", true).unwrap_err(),
            Error::ConnectionClosed
        ));
    }

    #[test]
    fn test_clean_eof_returns_none() {
        let mut ws = connect(Vec::new());
        assert!(ws.receive().unwrap().is_none());
        assert_eq!(ws.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_invalid_utf8_aborts_with_1007() {
        let mut ws = connect(server_frame(OpCode::Text, &[0xff, 0xfe], true));
        let err = ws.receive().unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::InvalidUtf8)));
        assert_eq!(ws.state(), ConnectionState::Closed);
        assert_eq!(ws.get_ref().shutdown_calls, 1);

        let (opcode, payload) = unmask_client_frame(&ws.get_ref().output);
        assert_eq!(opcode, 0x8);
        assert_eq!(payload, 1007u16.to_be_bytes());
    }

    #[test]
    fn test_protocol_violation_aborts_with_1002() {
        // Reserved bit set on an otherwise fine text frame.
        let mut input = server_frame(OpCode::Text, b"x", true);
        input[0] |= 0x40;

        let mut ws = connect(input);
        let err = ws.receive().unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::ReservedBitsSet)
        ));

        let (opcode, payload) = unmask_client_frame(&ws.get_ref().output);
        assert_eq!(opcode, 0x8);
        assert_eq!(payload, 1002u16.to_be_bytes());
    }

    #[test]
    fn test_truncated_frame_aborts_without_close_frame() {
        // Header promises five payload bytes, stream carries two.
        let mut ws = connect(vec![0x82, 0x05, 0x01, 0x02]);
        let err = ws.receive().unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(ws.get_ref().output.is_empty());
        assert_eq!(ws.get_ref().shutdown_calls, 1);
    }

    #[test]
    fn test_close_wire_bytes() {
        let mut ws = connect(Vec::new());
        ws.close(1000, Some("done")).unwrap();

        let (opcode, payload) = unmask_client_frame(&ws.get_ref().output);
        assert_eq!(opcode, 0x8);
        assert_eq!(&payload[..2], &1000u16.to_be_bytes());
        assert_eq!(&payload[2..], b"done");
        assert_eq!(ws.state(), ConnectionState::Closed);
        assert_eq!(ws.get_ref().shutdown_calls, 1);

        // Idempotent: a second close writes nothing further.
        let before = ws.get_ref().output.len();
        ws.close(1000, None).unwrap();
        assert_eq!(ws.get_ref().output.len(), before);
    }

    #[test]
    fn test_parse_url() {
        let t = parse_url("ws://example.com/chat?room=2").unwrap();
        assert!(!t.secure);
        assert_eq!(t.host, "example.com");
        assert_eq!(t.port, 80);
        assert_eq!(t.host_header, "example.com");
        assert_eq!(t.path, "/chat?room=2");

        let t = parse_url("wss://example.com:8443").unwrap();
        assert!(t.secure);
        assert_eq!(t.port, 8443);
        assert_eq!(t.host_header, "example.com:8443");
        assert_eq!(t.path, "/");

        // Default port stays out of the Host header even when written out.
        let t = parse_url("ws://example.com:80/x").unwrap();
        assert_eq!(t.host_header, "example.com");

        assert!(matches!(
            parse_url("http://example.com/").unwrap_err(),
            Error::Handshake(HandshakeError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            parse_url("example.com").unwrap_err(),
            Error::Handshake(HandshakeError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_url("ws://example.com:abc/").unwrap_err(),
            Error::Handshake(HandshakeError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_handshake_over_mock_stream() {
        // RFC 6455 §1.3 sample: nonce "the sample nonce" base64-encodes to
        // the sample key, whose digest is the sample accept value.
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
            \r\n";
        let mut stream = MockStream::new(response.to_vec());
        let mut keys = FixedKeySource::new(*b"the sample nonce", vec![KEY]);

        handshake::client_handshake(
            &mut stream,
            "server.example.com",
            "/chat",
            None,
            "rfc-ws",
            &mut keys,
        )
        .unwrap();

        let request = String::from_utf8(stream.output.clone()).unwrap();
        assert!(request.starts_with("GET /chat HTTP/1.1\r\n"));
        assert!(request.contains("Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n"));
    }

    #[test]
    fn test_handshake_rejects_bad_status() {
        let response = b"HTTP/1.1 404 Not Found\r\n\r\n";
        let mut stream = MockStream::new(response.to_vec());
        let mut keys = FixedKeySource::new([0; 16], vec![KEY]);

        let err = handshake::client_handshake(
            &mut stream,
            "server.example.com",
            "/",
            None,
            "rfc-ws",
            &mut keys,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Handshake(HandshakeError::BadStatus(_))
        ));
        // Nothing but the request left the client: no frames after a
        // failed handshake.
        let request = String::from_utf8(stream.output.clone()).unwrap();
        assert!(request.starts_with("GET / HTTP/1.1\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }
}
