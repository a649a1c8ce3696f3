//! The per-connection driver: one task that exclusively owns one link.
//!
//! Each tick the driver asks the simulation loop (through its dispatcher)
//! for the outgoing body, frames and sends it, then receives one packet
//! and hands the body back for application. Transport failures are fatal
//! to the link and reported exactly once.

use tracing::{debug, info};

use tether_tick::{TickConfig, Ticker};
use tether_transport::Link;

use crate::sim::SimHandle;
use crate::TetherError;

/// Drives `link` until the connection dies or the simulation goes away.
pub(crate) async fn drive_link<L: Link>(
    mut link: L,
    sim: SimHandle,
    tick: TickConfig,
    max_body_len: usize,
) -> Result<(), TetherError> {
    let conn = link.id();
    debug!(%conn, "driver starting");

    sim.queue(move |s| s.register_peer(conn)).wait().await?;

    // Room for the END sentinel the transport appends.
    let capacity = max_body_len.saturating_sub(1);

    let result = pump(&mut link, &sim, tick, capacity).await;

    // Exactly one terminal transition and one report per connection.
    if let Err(e) = &result {
        info!(%conn, error = %e, "peer disconnected");
    }
    link.disconnect().await;
    if sim.is_alive() {
        sim.queue_detached(move |s| s.remove_peer(conn));
    }
    result
}

async fn pump<L: Link>(
    link: &mut L,
    sim: &SimHandle,
    tick: TickConfig,
    capacity: usize,
) -> Result<(), TetherError> {
    let conn = link.id();
    let mut ticker = Ticker::new(tick);
    loop {
        ticker.wait().await;

        let body = sim
            .queue(move |s| s.collect_outgoing(conn, capacity))
            .wait()
            .await??;
        link.write_buffer().put_bytes(&body)?;
        link.send().await?;

        link.receive().await?;
        let bytes = link.read_buffer().as_written().to_vec();
        sim.queue(move |s| s.apply_incoming(conn, bytes))
            .wait()
            .await??;
    }
}
