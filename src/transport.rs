//! Blocking transports: plain TCP and rustls TLS
//!
//! The protocol core consumes any [`Transport`]: an ordered, reliable,
//! blocking duplex byte stream that can be shut down. [`Stream`] is the
//! concrete transport [`Connection::open`](crate::Connection::open) builds:
//! a TCP socket, TLS-wrapped for `wss` targets.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

#[cfg(feature = "tls")]
use std::sync::Arc;

#[cfg(feature = "tls")]
use crate::error::{Error, HandshakeError, Result};

/// Blocking duplex byte stream
pub trait Transport: Read + Write {
    /// Shut the stream down in both directions
    ///
    /// Called on every exit path that abandons the connection, including
    /// error paths; must be safe to call more than once.
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn shutdown(&mut self) -> io::Result<()> {
        match TcpStream::shutdown(self, Shutdown::Both) {
            // Already gone is as shut down as it gets.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Transport built by `Connection::open`: plain TCP, or TLS over TCP
pub enum Stream {
    /// Plain TCP (`ws` scheme)
    Plain(TcpStream),
    /// TLS over TCP (`wss` scheme)
    #[cfg(feature = "tls")]
    Tls(Box<rustls::StreamOwned<rustls::ClientConnection, TcpStream>>),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.read(buf),
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.write(buf),
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(s) => s.flush(),
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.flush(),
        }
    }
}

impl Transport for Stream {
    fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(s) => Transport::shutdown(s),
            #[cfg(feature = "tls")]
            Stream::Tls(s) => {
                s.conn.send_close_notify();
                let _ = s.flush();
                Transport::shutdown(&mut s.sock)
            }
        }
    }
}

/// Open a TCP connection to `host:port`
pub fn connect(host: &str, port: u16) -> io::Result<TcpStream> {
    TcpStream::connect((host, port))
}

/// Wrap an established TCP socket in a TLS session for `host`
///
/// Certificate validation runs against the bundled webpki root set.
#[cfg(feature = "tls")]
pub fn wrap_tls(sock: TcpStream, host: &str) -> Result<Stream> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let name = rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|_| HandshakeError::InvalidUrl("host is not a valid TLS server name"))?;

    let conn = rustls::ClientConnection::new(Arc::new(config), name)
        .map_err(|e| Error::Io(io::Error::other(e)))?;

    Ok(Stream::Tls(Box::new(rustls::StreamOwned::new(conn, sock))))
}
