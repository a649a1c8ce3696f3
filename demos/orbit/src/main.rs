//! Orbit: the smallest complete Tether application.
//!
//! One process, two peers: a server whose single object circles the
//! origin, and a client that mirrors it. The client watches the
//! replicated position, asks the server for the orbit radius over RPC,
//! and the server announces laps as replicated events.
//!
//! Run with `RUST_LOG=info cargo run -p orbit`.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tether::prelude::*;
use tether::{EventRegistry, RpcRegistry, RpcType, TypeRegistry};

const RADIUS: f32 = 5.0;

// ---------------------------------------------------------------------------
// Shared protocol: one event, one RPC
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LapEvent {
    meta: EventMeta,
    lap: u32,
}

impl LapEvent {
    const TAG: EventTag = EventTag(1);
}

impl Event for LapEvent {
    fn tag(&self) -> EventTag {
        Self::TAG
    }

    fn meta(&self) -> &EventMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EventMeta {
        &mut self.meta
    }

    fn write(&self, buf: &mut SerialBuffer) -> Result<(), WireError> {
        buf.put_u32(self.lap)
    }

    fn read(&mut self, buf: &mut SerialBuffer) -> Result<(), WireError> {
        self.lap = buf.get_u32()?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn registries() -> Registries {
    let mut events = EventRegistry::new();
    events.register(LapEvent::TAG, || Box::new(LapEvent::default()));

    let mut rpcs = RpcRegistry::new();
    rpcs.register(
        "orbit_radius",
        Side::Server,
        vec![],
        Some(RpcType::F32),
        true,
        |_world, _ctx, _args| Ok(Some(RpcValue::F32(RADIUS))),
    );

    Registries {
        types: TypeRegistry::with_defaults(),
        rpcs,
        events,
    }
}

// ---------------------------------------------------------------------------
// Server: spin one object around the origin
// ---------------------------------------------------------------------------

struct Orbiter {
    id: Option<NetworkId>,
    angle: f32,
    laps: u32,
}

impl Orbiter {
    fn tick(&mut self, sim: &mut Sim, dt: Duration) {
        let id = match self.id {
            Some(id) => id,
            None => {
                let id = sim
                    .world
                    .attach_object(NetworkId::NONE, Box::new(Transform::at([RADIUS, 0.0, 0.0])))
                    .expect("root attach cannot fail");
                tracing::info!(%id, "orbiter spawned");
                self.id = Some(id);
                id
            }
        };

        let before = self.angle;
        self.angle += dt.as_secs_f32() * std::f32::consts::TAU / 4.0; // one lap per 4s
        if self.angle >= std::f32::consts::TAU {
            self.angle -= std::f32::consts::TAU;
            self.laps += 1;
            sim.raise_event(Box::new(LapEvent {
                meta: EventMeta::new(),
                lap: self.laps,
            }));
        }
        if self.angle != before {
            if let Some(transform) = sim.world.object_as_mut::<Transform>(id) {
                transform.position = [RADIUS * self.angle.cos(), RADIUS * self.angle.sin(), 0.0];
            }
            sim.world.mark_dirty(id, Side::Server);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), TetherError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut orbiter = Orbiter {
        id: None,
        angle: 0.0,
        laps: 0,
    };
    let server = Server::builder()
        .config(ServerConfig {
            bind_addr: "127.0.0.1:0".into(),
            tick_rate_hz: 30,
            ..ServerConfig::default()
        })
        .registries(registries())
        .on_tick(move |sim: &mut Sim, tick: TickInfo| orbiter.tick(sim, tick.dt))
        .build()
        .await?;
    let addr = server
        .local_addr()
        .map_err(|e| TetherError::Transport(tether::TransportError::Connect(e)))?
        .to_string();
    tokio::spawn(server.run());

    // ----------------------------------------------------------------------
    // Client
    // ----------------------------------------------------------------------

    let printed = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&printed);
    let client = Client::builder()
        .config(ClientConfig {
            server_addr: addr,
            tick_rate_hz: 30,
            ..ClientConfig::default()
        })
        .registries(registries())
        .on_tick(move |sim: &mut Sim, _| {
            // Print the mirrored position twice a second.
            let n = counter.fetch_add(1, Ordering::Relaxed);
            if n % 15 != 0 {
                return;
            }
            for id in sim.world.roots().to_vec() {
                if let Some(t) = sim.world.object_as::<Transform>(id) {
                    tracing::info!(%id, x = t.position[0], y = t.position[1], "mirrored");
                }
            }
        })
        .connect()
        .await?;

    let sim = client.sim();
    sim.queue(|s: &mut Sim| {
        s.events.subscribe(LapEvent::TAG, |_world, event| {
            let lap = event.as_any().downcast_ref::<LapEvent>().unwrap();
            tracing::info!(lap = lap.lap, from = ?event.meta().from(), "lap completed");
        });
    })
    .wait()
    .await?;

    // Ask the server for its orbit radius over RPC.
    let conn = client.connection_id();
    let call = sim
        .queue(move |s: &mut Sim| s.call_rpc(conn, "orbit_radius", vec![]))
        .wait()
        .await?;
    match call {
        Ok(Some(mut pending)) => match pending.wait().await {
            Ok(Some(RpcValue::F32(radius))) => tracing::info!(radius, "server reports radius"),
            Ok(other) => tracing::warn!(?other, "unexpected rpc result"),
            Err(e) => tracing::warn!(error = %e, "rpc failed"),
        },
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "call rejected"),
    }

    // Watch a couple of laps, then leave.
    tokio::time::sleep(Duration::from_secs(10)).await;
    client.shutdown();
    Ok(())
}
