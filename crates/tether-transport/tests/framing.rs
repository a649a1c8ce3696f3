//! Integration tests for the framed TCP transport.
//!
//! These spin up real loopback sockets: a `TcpTransport` on one end and
//! either a `TcpLink` or a raw `TcpStream` (for hostile-peer tests) on the
//! other. Binding to port 0 lets the OS pick a free port.

use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use tether_transport::{Link, LinkConfig, LinkState, TcpLink, TcpTransport, TransportError};
use tether_wire::{HEADER_LEN, StrEncoding, fletcher16};

/// Frames `body` exactly the way a well-behaved peer would.
fn frame(body: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(HEADER_LEN + body.len());
    packet.extend_from_slice(&(body.len() as i32).to_be_bytes());
    packet.extend_from_slice(&fletcher16(body).to_be_bytes());
    packet.extend_from_slice(body);
    packet
}

/// Accepts one link and dials it concurrently; returns (server, client).
async fn link_pair(config: LinkConfig) -> (TcpLink, TcpLink) {
    let mut transport = TcpTransport::bind("127.0.0.1:0").await.expect("bind");
    let addr = transport.local_addr().expect("local addr").to_string();

    let accept_cfg = config.clone();
    let server = tokio::spawn(async move { transport.accept(accept_cfg).await.expect("accept") });
    let client = TcpLink::connect(&addr, config).await.expect("connect");
    (server.await.expect("accept task"), client)
}

#[tokio::test]
async fn test_send_and_receive_round_trip() {
    let (mut server, mut client) = link_pair(LinkConfig::default()).await;
    assert_eq!(client.state(), LinkState::Connected);

    let wb = client.write_buffer();
    wb.put_u32(0xDEADBEEF).unwrap();
    wb.put_f32(1.5).unwrap();
    wb.put_str("héllo", StrEncoding::Utf8).unwrap();
    client.send().await.expect("send");

    server.receive().await.expect("receive");
    let rb = server.read_buffer();
    assert_eq!(rb.get_u32().unwrap(), 0xDEADBEEF);
    assert_eq!(rb.get_f32().unwrap(), 1.5);
    assert_eq!(rb.get_str(StrEncoding::Utf8).unwrap(), "héllo");
    // The END sentinel the transport appended is still in the body.
    assert_eq!(rb.get_u8().unwrap(), 0);
    assert_eq!(rb.remaining(), 0);
}

#[tokio::test]
async fn test_send_clears_write_buffer() {
    let (mut server, mut client) = link_pair(LinkConfig::default()).await;
    client.write_buffer().put_u64(7).unwrap();
    client.send().await.expect("send");
    assert_eq!(client.write_buffer().limit(), 0);

    // A second, empty send still frames a valid 1-byte (END only) body.
    client.send().await.expect("empty send");
    server.receive().await.expect("first");
    server.receive().await.expect("second");
    assert_eq!(server.read_buffer().remaining(), 1);
}

#[tokio::test]
async fn test_bit_flip_anywhere_fails_checksum() {
    // Hostile peer: frame a valid packet, then flip one bit in the body.
    // Every position and several payload lengths must be caught.
    for body_len in [1usize, 2, 7, 64] {
        let body: Vec<u8> = (0..body_len).map(|i| i as u8).collect();
        for flip_byte in 0..body_len {
            let mut transport = TcpTransport::bind("127.0.0.1:0").await.expect("bind");
            let addr = transport.local_addr().expect("addr").to_string();
            let server =
                tokio::spawn(
                    async move { transport.accept(LinkConfig::default()).await.expect("accept") },
                );

            let mut raw = TcpStream::connect(&addr).await.expect("raw connect");
            let mut packet = frame(&body);
            packet[HEADER_LEN + flip_byte] ^= 0x10;
            raw.write_all(&packet).await.expect("write");

            let mut link = server.await.expect("task");
            let err = link.receive().await.expect_err("corrupt body must fail");
            assert!(
                matches!(err, TransportError::Protocol(_)),
                "body_len={body_len} flip_byte={flip_byte}: got {err:?}"
            );
            assert_eq!(link.state(), LinkState::Disconnected);
        }
    }
}

#[tokio::test]
async fn test_zero_length_body_with_bad_checksum_rejected() {
    let mut transport = TcpTransport::bind("127.0.0.1:0").await.expect("bind");
    let addr = transport.local_addr().expect("addr").to_string();
    let server =
        tokio::spawn(async move { transport.accept(LinkConfig::default()).await.expect("accept") });

    let mut raw = TcpStream::connect(&addr).await.expect("raw connect");
    // Zero-length body, nonzero checksum: header-only corruption.
    let mut packet = frame(&[]);
    packet[4] = 0xFF;
    raw.write_all(&packet).await.expect("write");

    let mut link = server.await.expect("task");
    let err = link.receive().await.expect_err("must fail");
    assert!(matches!(err, TransportError::Protocol(_)));
}

#[tokio::test]
async fn test_oversized_length_rejected_before_body() {
    let mut transport = TcpTransport::bind("127.0.0.1:0").await.expect("bind");
    let addr = transport.local_addr().expect("addr").to_string();
    let server =
        tokio::spawn(async move { transport.accept(LinkConfig::default()).await.expect("accept") });

    let mut raw = TcpStream::connect(&addr).await.expect("raw connect");
    // Announce a huge body; never send it. The header alone must sink the link.
    let mut packet = Vec::new();
    packet.extend_from_slice(&(i32::MAX).to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());
    raw.write_all(&packet).await.expect("write");

    let mut link = server.await.expect("task");
    let err = link.receive().await.expect_err("must fail");
    assert!(matches!(err, TransportError::Protocol(_)));
}

#[tokio::test]
async fn test_negative_length_rejected() {
    let mut transport = TcpTransport::bind("127.0.0.1:0").await.expect("bind");
    let addr = transport.local_addr().expect("addr").to_string();
    let server =
        tokio::spawn(async move { transport.accept(LinkConfig::default()).await.expect("accept") });

    let mut raw = TcpStream::connect(&addr).await.expect("raw connect");
    let mut packet = Vec::new();
    packet.extend_from_slice(&(-1i32).to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());
    raw.write_all(&packet).await.expect("write");

    let mut link = server.await.expect("task");
    let err = link.receive().await.expect_err("must fail");
    assert!(matches!(err, TransportError::Protocol(_)));
}

#[tokio::test]
async fn test_receive_times_out_against_silent_peer() {
    let config = LinkConfig {
        io_timeout: Duration::from_millis(50),
        ..LinkConfig::default()
    };
    let (mut server, _client) = link_pair(config).await;

    let start = Instant::now();
    let err = server.receive().await.expect_err("silent peer must time out");
    let elapsed = start.elapsed();

    assert!(matches!(err, TransportError::Timeout { .. }), "got {err:?}");
    assert!(elapsed >= Duration::from_millis(50), "fired early: {elapsed:?}");
    assert!(
        elapsed < Duration::from_millis(150),
        "deadline overshot: {elapsed:?}"
    );
    assert_eq!(server.state(), LinkState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (mut server, mut client) = link_pair(LinkConfig::default()).await;
    client.disconnect().await;
    client.disconnect().await;
    assert_eq!(client.state(), LinkState::Disconnected);

    // I/O after disconnect is refused locally.
    assert!(matches!(
        client.send().await,
        Err(TransportError::NotConnected)
    ));

    // The peer sees the close as a fatal I/O error, not a hang.
    let err = server.receive().await.expect_err("peer closed");
    assert!(matches!(err, TransportError::Io(_)), "got {err:?}");
}

#[tokio::test]
async fn test_connect_refused_is_connect_error() {
    // Nothing listens on this port (bind then drop to reserve-and-release).
    let transport = TcpTransport::bind("127.0.0.1:0").await.expect("bind");
    let addr = transport.local_addr().expect("addr").to_string();
    drop(transport);

    let err = match TcpLink::connect(&addr, LinkConfig::default()).await {
        Err(e) => e,
        Ok(_) => panic!("must refuse"),
    };
    assert!(matches!(err, TransportError::Connect(_)));
}
