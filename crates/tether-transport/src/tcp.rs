//! TCP stream implementation of the framed [`Link`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use tether_wire::{HEADER_LEN, Opcode, SerialBuffer, fletcher16};

use crate::{ConnectionId, Link, LinkConfig, LinkState, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

fn encode_header(body_len: i32, checksum: u16) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(&body_len.to_be_bytes());
    header[4..].copy_from_slice(&checksum.to_be_bytes());
    header
}

fn decode_header(header: [u8; HEADER_LEN]) -> (i32, u16) {
    let body_len = i32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let checksum = u16::from_be_bytes([header[4], header[5]]);
    (body_len, checksum)
}

/// A TCP listener that hands out framed links.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Binds a listener to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::Connect)?;
        tracing::info!(addr, "transport listening");
        Ok(Self { listener })
    }

    /// The local address the listener is bound to. Useful when binding
    /// to port 0 in tests.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for and adopts the next incoming connection.
    pub async fn accept(&mut self, config: LinkConfig) -> Result<TcpLink, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Connect)?;
        let link = TcpLink::from_stream(stream, config)?;
        tracing::debug!(id = %link.id(), %addr, "accepted connection");
        Ok(link)
    }

    /// Stops accepting connections. Established links are unaffected.
    pub fn shutdown(self) {
        tracing::info!("transport shut down");
    }
}

/// One side of a framed TCP connection.
///
/// Owns the socket and both serialization buffers exclusively. Created by
/// [`TcpLink::connect`] (dialing) or [`TcpTransport::accept`] (adopting an
/// accepted handle).
pub struct TcpLink {
    id: ConnectionId,
    stream: TcpStream,
    state: LinkState,
    config: LinkConfig,
    write_buf: SerialBuffer,
    read_buf: SerialBuffer,
    /// Staging area for received body bytes before checksum verification.
    scratch: Vec<u8>,
}

impl TcpLink {
    /// Dials `addr`, bounded by the configured I/O deadline.
    pub async fn connect(addr: &str, config: LinkConfig) -> Result<Self, TransportError> {
        let id = next_id();
        tracing::debug!(%id, addr, "connecting");
        // CONNECTING covers the dial; the constructor below flips to
        // CONNECTED once the stream exists.
        let dial = timeout(config.io_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                TransportError::Connect(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "dial deadline exceeded",
                ))
            })?
            .map_err(TransportError::Connect)?;
        let mut link = Self::build(id, dial, config)?;
        link.state = LinkState::Connected;
        tracing::info!(%id, addr, "connected");
        Ok(link)
    }

    /// Adopts an already-established stream (the accept path).
    pub fn from_stream(stream: TcpStream, config: LinkConfig) -> Result<Self, TransportError> {
        let mut link = Self::build(next_id(), stream, config)?;
        link.state = LinkState::Connected;
        Ok(link)
    }

    fn build(
        id: ConnectionId,
        stream: TcpStream,
        config: LinkConfig,
    ) -> Result<Self, TransportError> {
        stream.set_nodelay(true).map_err(TransportError::Connect)?;
        let cap = config.max_body_len;
        Ok(Self {
            id,
            stream,
            state: LinkState::Connecting,
            config,
            write_buf: SerialBuffer::with_capacity(cap),
            read_buf: SerialBuffer::with_capacity(cap),
            scratch: Vec::new(),
        })
    }

    /// The peer's socket address.
    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    /// Marks the link broken and returns `err`. Every fatal I/O and
    /// protocol path funnels through here so the state machine cannot be
    /// left half-alive.
    fn broken(&mut self, err: TransportError) -> TransportError {
        self.state = LinkState::Disconnected;
        err
    }
}

impl Link for TcpLink {
    fn state(&self) -> LinkState {
        self.state
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn write_buffer(&mut self) -> &mut SerialBuffer {
        &mut self.write_buf
    }

    fn read_buffer(&mut self) -> &mut SerialBuffer {
        &mut self.read_buf
    }

    async fn send(&mut self) -> Result<(), TransportError> {
        if self.state != LinkState::Connected {
            return Err(TransportError::NotConnected);
        }

        Opcode::End.write(&mut self.write_buf)?;
        let body_len = self.write_buf.limit();
        let checksum = self.write_buf.checksum(0, body_len)?;
        let header = encode_header(body_len as i32, checksum);

        let waited = self.config.io_timeout;
        let io = async {
            self.stream.write_all(&header).await?;
            self.stream.write_all(self.write_buf.as_written()).await?;
            self.stream.flush().await
        };
        let wrote = timeout(waited, io).await;
        match wrote {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.broken(TransportError::Io(e))),
            Err(_) => return Err(self.broken(TransportError::Timeout { waited })),
        }

        tracing::trace!(id = %self.id, body_len, "packet sent");
        self.write_buf.clear();
        Ok(())
    }

    async fn receive(&mut self) -> Result<(), TransportError> {
        if self.state != LinkState::Connected {
            return Err(TransportError::NotConnected);
        }

        let waited = self.config.io_timeout;
        let deadline = tokio::time::Instant::now() + waited;

        let mut header = [0u8; HEADER_LEN];
        let got_header =
            tokio::time::timeout_at(deadline, self.stream.read_exact(&mut header)).await;
        match got_header {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(self.broken(TransportError::Io(e))),
            Err(_) => return Err(self.broken(TransportError::Timeout { waited })),
        }

        let (body_len, expected) = decode_header(header);
        // Validate the announced length before allocating or reading a
        // single body byte: a corrupt or hostile header must not be able
        // to exhaust memory.
        if body_len < 0 || body_len as usize > self.config.max_body_len {
            return Err(self.broken(TransportError::Protocol(format!(
                "announced body length {body_len} outside 0..={}",
                self.config.max_body_len
            ))));
        }
        let body_len = body_len as usize;

        self.scratch.resize(body_len, 0);
        let got_body =
            tokio::time::timeout_at(deadline, self.stream.read_exact(&mut self.scratch)).await;
        match got_body {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(self.broken(TransportError::Io(e))),
            Err(_) => return Err(self.broken(TransportError::Timeout { waited })),
        }

        let actual = fletcher16(&self.scratch);
        if actual != expected {
            return Err(self.broken(TransportError::Protocol(format!(
                "checksum mismatch: header 0x{expected:04x}, body 0x{actual:04x}"
            ))));
        }

        self.read_buf.load(&self.scratch)?;
        tracing::trace!(id = %self.id, body_len, "packet received");
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.state == LinkState::Disconnected {
            return;
        }
        self.state = LinkState::Disconnected;
        let _ = self.stream.shutdown().await;
        tracing::info!(id = %self.id, "disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let header = encode_header(1234, 0xBEEF);
        assert_eq!(decode_header(header), (1234, 0xBEEF));
    }

    #[test]
    fn test_header_is_big_endian() {
        let header = encode_header(1, 2);
        assert_eq!(header, [0, 0, 0, 1, 0, 2]);
    }

    #[test]
    fn test_negative_length_survives_decode() {
        // A corrupt peer can announce a negative length; decode must hand
        // it back for validation rather than panic.
        let header = encode_header(-1, 0);
        let (len, _) = decode_header(header);
        assert_eq!(len, -1);
    }
}
