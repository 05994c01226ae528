//! Client HTTP upgrade handshake
//!
//! Builds the RFC 6455 §1.3 upgrade request, reads the server's response off
//! the blocking stream, and verifies the `Sec-WebSocket-Accept` digest.
//!
//! The response header section is read one byte at a time up to the blank
//! line: the same stream carries frames immediately after the handshake and
//! the client keeps no read buffer between calls, so it must not consume a
//! single byte past the header terminator.

use std::io::{Read, Write};

use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::error::{HandshakeError, Result};
use crate::mask::KeySource;
use crate::WS_GUID;

/// Maximum HTTP response header size (8KB should be enough for any reasonable response)
const MAX_HEADER_SIZE: usize = 8192;

/// Generate the `Sec-WebSocket-Accept` value for a request key
///
/// This computes: Base64(SHA-1(key + GUID))
#[inline]
pub fn generate_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(hash)
}

/// Build a WebSocket upgrade request
pub fn build_request(
    host: &str,
    path: &str,
    key: &str,
    user_agent: &str,
    protocol: Option<&str>,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(512);

    buf.put_slice(b"GET ");
    buf.put_slice(path.as_bytes());
    buf.put_slice(b" HTTP/1.1\r\n");
    buf.put_slice(b"Connection: keep-alive, Upgrade\r\n");
    buf.put_slice(b"Host: ");
    buf.put_slice(host.as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"Sec-WebSocket-Key: ");
    buf.put_slice(key.as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"Sec-WebSocket-Version: 13\r\n");
    buf.put_slice(b"Upgrade: websocket\r\n");
    buf.put_slice(b"User-Agent: ");
    buf.put_slice(user_agent.as_bytes());
    buf.put_slice(b"\r\n");

    if let Some(proto) = protocol.filter(|p| !p.is_empty()) {
        buf.put_slice(b"Sec-WebSocket-Protocol: ");
        buf.put_slice(proto.as_bytes());
        buf.put_slice(b"\r\n");
    }

    buf.put_slice(b"\r\n");
    buf.freeze()
}

/// Read the response head (status line + headers) up to and including the
/// terminating blank line, without consuming any byte past it
pub fn read_response_head<R: Read>(stream: &mut R) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(512);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_HEADER_SIZE {
            return Err(HandshakeError::ResponseTooLarge.into());
        }
        stream.read_exact(&mut byte)?;
        head.push(byte[0]);
    }

    Ok(head)
}

/// Parse and validate the server's upgrade response
///
/// Requires status 101, the presence of `upgrade` and `connection` headers
/// (values unchecked beyond presence), and a `sec-websocket-accept` value
/// byte-equal to the digest of `sent_key`.
pub fn validate_response(head: &[u8], sent_key: &str) -> Result<()> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut res = httparse::Response::new(&mut headers);

    match res.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) | Err(_) => {
            return Err(HandshakeError::MalformedHeader.into());
        }
    }

    let code = res.code.unwrap_or(0);
    if code != 101 {
        let line = format!(
            "HTTP/1.{} {} {}",
            res.version.unwrap_or(1),
            code,
            res.reason.unwrap_or("")
        );
        return Err(HandshakeError::BadStatus(line).into());
    }

    let mut upgrade = false;
    let mut connection = false;
    let mut accept = None;

    for header in res.headers.iter() {
        if header.name.eq_ignore_ascii_case("upgrade") {
            upgrade = true;
        } else if header.name.eq_ignore_ascii_case("connection") {
            connection = true;
        } else if header.name.eq_ignore_ascii_case("sec-websocket-accept") {
            accept = Some(header.value);
        }
    }

    if !upgrade {
        return Err(HandshakeError::MissingHeader("upgrade").into());
    }
    if !connection {
        return Err(HandshakeError::MissingHeader("connection").into());
    }
    let accept = accept.ok_or(HandshakeError::MissingHeader("sec-websocket-accept"))?;

    let expected = generate_accept_key(sent_key);
    if accept != expected.as_bytes() {
        return Err(HandshakeError::AcceptMismatch.into());
    }

    Ok(())
}

/// Perform the client handshake on an established stream
///
/// On failure the transport is left to the caller to tear down; nothing is
/// read past the response header section on success.
pub fn client_handshake<S: Read + Write>(
    stream: &mut S,
    host: &str,
    path: &str,
    protocol: Option<&str>,
    user_agent: &str,
    keys: &mut dyn KeySource,
) -> Result<()> {
    let key = base64::engine::general_purpose::STANDARD.encode(keys.nonce());
    let request = build_request(host, path, &key, user_agent, protocol);

    stream.write_all(&request)?;
    stream.flush()?;
    debug!(host, path, "handshake request sent");

    let head = read_response_head(stream)?;
    validate_response(&head, &key)?;
    debug!(host, "handshake complete");

    Ok(())
}
