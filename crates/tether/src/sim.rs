//! The simulation side: the state one loop exclusively owns, and the
//! handle everyone else reaches it through.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use tether_dispatch::{DispatchHandle, Dispatcher, PendingCall};
use tether_event::{Event, EventBus, EventRegistry, decode_event, encode_event};
use tether_replication::{
    ControlRecord, NetworkId, ReplicationError, TypeRegistry, World, apply_packet, write_control,
    write_snapshot,
};
use tether_rpc::{PendingRpc, RpcContext, RpcError, RpcOutbox, RpcRegistry, RpcValue, execute_call};
use tether_tick::TickInfo;
use tether_transport::ConnectionId;
use tether_wire::{Opcode, SerialBuffer, Side};

/// The per-tick application hook, run on the simulation loop.
pub type TickFn = Box<dyn FnMut(&mut Sim, TickInfo) + Send>;

/// Everything both peers must agree on before connecting: entity
/// constructors, procedures, event constructors. Registered identically
/// on server and client — the registries are part of the protocol.
#[derive(Default)]
pub struct Registries {
    /// Entity type tags → placeholder constructors.
    pub types: TypeRegistry,
    /// Remote procedures.
    pub rpcs: RpcRegistry,
    /// Event tags → event constructors.
    pub events: EventRegistry,
}

/// Per-connection state owned by the simulation: the RPC outbox and the
/// control records staged for that link's next packet.
struct PeerState {
    rpc: RpcOutbox,
    staged_events: Vec<Vec<u8>>,
    staged_responses: Vec<Vec<u8>>,
    /// The entity acting for this connection in RPC handlers.
    actor: NetworkId,
}

/// The simulation-owned state: world, event bus, per-peer outboxes.
///
/// Owned exclusively by the simulation loop. Connection drivers and
/// application threads reach it by queueing closures through a
/// [`SimHandle`]; the loop drains them once per tick.
pub struct Sim {
    /// The replicated entity tree.
    pub world: World,
    /// Local event listeners.
    pub events: EventBus,
    local: Side,
    registries: Arc<Registries>,
    peers: HashMap<ConnectionId, PeerState>,
}

impl Sim {
    pub(crate) fn new(local: Side, registries: Arc<Registries>) -> Self {
        Self {
            world: World::new(),
            events: EventBus::new(),
            local,
            registries,
            peers: HashMap::new(),
        }
    }

    /// Which side this simulation plays.
    pub fn side(&self) -> Side {
        self.local
    }

    /// The shared registries.
    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    /// Ids of the currently connected peers.
    pub fn peer_ids(&self) -> Vec<ConnectionId> {
        self.peers.keys().copied().collect()
    }

    /// Binds an acting entity to a connection; RPC handlers see it as
    /// [`RpcContext::actor`].
    pub fn set_peer_actor(&mut self, conn: ConnectionId, actor: NetworkId) {
        if let Some(peer) = self.peers.get_mut(&conn) {
            peer.actor = actor;
        }
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Raises an event: stamps the local origin, dispatches to local
    /// listeners, and — unless the event was cancelled or is local-only —
    /// stages it for every connected peer's next packet.
    pub fn raise_event(&mut self, mut event: Box<dyn Event>) {
        event.meta_mut().set_from(self.local);
        self.events.dispatch(&mut self.world, event.as_mut());
        if !event.meta().should_replicate() {
            return;
        }
        match encode_event(event.as_ref()) {
            Ok(payload) => {
                for peer in self.peers.values_mut() {
                    peer.staged_events.push(payload.clone());
                }
            }
            Err(e) => warn!(error = %e, "event dropped, failed to encode"),
        }
    }

    // -----------------------------------------------------------------------
    // RPC
    // -----------------------------------------------------------------------

    /// Queues a remote procedure call on `conn`'s next packet.
    ///
    /// Returns a [`PendingRpc`] when the procedure expects a response.
    pub fn call_rpc(
        &mut self,
        conn: ConnectionId,
        name: &str,
        args: Vec<RpcValue>,
    ) -> Result<Option<PendingRpc>, RpcError> {
        let registries = Arc::clone(&self.registries);
        let peer = self
            .peers
            .get_mut(&conn)
            .ok_or_else(|| RpcError::Execution(format!("no such peer {conn}")))?;
        peer.rpc.call(&registries.rpcs, name, args)
    }

    // -----------------------------------------------------------------------
    // Driver seam
    // -----------------------------------------------------------------------

    pub(crate) fn register_peer(&mut self, conn: ConnectionId) {
        self.peers.insert(
            conn,
            PeerState {
                rpc: RpcOutbox::new(self.local),
                staged_events: Vec::new(),
                staged_responses: Vec::new(),
                actor: NetworkId::NONE,
            },
        );
        debug!(%conn, "peer registered with simulation");
    }

    /// Drops a peer's state and fails its in-flight calls.
    pub(crate) fn remove_peer(&mut self, conn: ConnectionId) {
        if let Some(mut peer) = self.peers.remove(&conn) {
            peer.rpc.cancel_all();
            debug!(%conn, "peer removed from simulation");
        }
    }

    /// Builds the outgoing body for `conn`: the snapshot of everything
    /// dirty, then staged events, queued calls, and queued responses.
    ///
    /// Dirty flags are consumed here — see the crate docs on
    /// collect-since-last-send semantics.
    pub(crate) fn collect_outgoing(
        &mut self,
        conn: ConnectionId,
        capacity: usize,
    ) -> Result<Vec<u8>, ReplicationError> {
        let mut buf = SerialBuffer::with_capacity(capacity);
        write_snapshot(&mut self.world, self.local, &mut buf)?;
        if let Some(peer) = self.peers.get_mut(&conn) {
            for payload in std::mem::take(&mut peer.staged_events) {
                write_control(&mut buf, Opcode::Event, &payload)?;
            }
            for payload in peer.rpc.take_outgoing() {
                write_control(&mut buf, Opcode::RpcCall, &payload)?;
            }
            for payload in std::mem::take(&mut peer.staged_responses) {
                write_control(&mut buf, Opcode::RpcResponse, &payload)?;
            }
        }
        Ok(buf.as_written().to_vec())
    }

    /// Applies one received packet body: entity records straight onto the
    /// world, control records routed to the event and RPC layers.
    pub(crate) fn apply_incoming(
        &mut self,
        conn: ConnectionId,
        bytes: Vec<u8>,
    ) -> Result<(), ReplicationError> {
        let mut buf = SerialBuffer::with_capacity(bytes.len().max(1));
        buf.load(&bytes)?;

        // Entity records apply during the walk; control records are
        // collected and handled after it, preserving their relative
        // order (senders write all entity records first).
        let mut controls = Vec::new();
        apply_packet(
            &mut self.world,
            self.local,
            &self.registries.types,
            &mut buf,
            |c| controls.push(c),
        )?;

        let remote = self.local.opposite();
        let registries = Arc::clone(&self.registries);
        for control in controls {
            match control {
                ControlRecord::Event(payload) => {
                    match decode_event(&registries.events, &payload, remote) {
                        Ok(mut event) => {
                            self.events.dispatch(&mut self.world, event.as_mut());
                        }
                        Err(e) => debug!(%conn, error = %e, "received event dropped"),
                    }
                }
                ControlRecord::RpcCall(payload) => {
                    let actor = self
                        .peers
                        .get(&conn)
                        .map(|p| p.actor)
                        .unwrap_or(NetworkId::NONE);
                    let ctx = RpcContext {
                        from: remote,
                        actor,
                    };
                    let response = execute_call(
                        &registries.rpcs,
                        &mut self.world,
                        self.local,
                        &ctx,
                        &payload,
                    );
                    if let (Some(response), Some(peer)) = (response, self.peers.get_mut(&conn)) {
                        peer.staged_responses.push(response);
                    }
                }
                ControlRecord::RpcResponse(payload) => {
                    if let Some(peer) = self.peers.get_mut(&conn) {
                        peer.rpc.handle_response(&payload);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Cloneable handle onto the simulation loop.
///
/// Everything queued through it runs on that loop, FIFO, at most once,
/// with panics captured — the dispatcher contract.
#[derive(Clone)]
pub struct SimHandle {
    handle: DispatchHandle<Sim>,
}

impl SimHandle {
    pub(crate) fn new(handle: DispatchHandle<Sim>) -> Self {
        Self { handle }
    }

    /// Queues `f` onto the simulation loop; the result is observable
    /// through the returned [`PendingCall`] exactly once.
    pub fn queue<R, F>(&self, f: F) -> PendingCall<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Sim) -> R + Send + 'static,
    {
        self.handle.queue(f)
    }

    /// Queues `f` with no observable result.
    pub fn queue_detached<F>(&self, f: F)
    where
        F: FnOnce(&mut Sim) + Send + 'static,
    {
        self.handle.queue_detached(f)
    }

    /// Raises an event on the simulation loop. The returned handle
    /// completes when local dispatch has finished.
    pub fn raise_event(&self, event: Box<dyn Event>) -> PendingCall<()> {
        self.handle.queue(move |sim| sim.raise_event(event))
    }

    /// Fire-and-forget form of [`raise_event`](Self::raise_event).
    pub fn raise_event_async(&self, event: Box<dyn Event>) {
        self.handle.queue_detached(move |sim| sim.raise_event(event));
    }

    /// Whether the simulation loop still exists.
    pub fn is_alive(&self) -> bool {
        self.handle.is_alive()
    }
}

/// How many queued jobs the simulation loop drains per tick.
const MAX_JOBS_PER_TICK: usize = 256;

/// The simulation loop: drain queued jobs, run the application hook,
/// repeat until every handle is gone.
pub(crate) async fn run_sim(
    mut dispatcher: Dispatcher<Sim>,
    mut sim: Sim,
    mut on_tick: Option<TickFn>,
    tick: tether_tick::TickConfig,
) {
    let mut ticker = tether_tick::Ticker::new(tick);
    loop {
        let info = ticker.wait().await;
        let drained = dispatcher.run_pending(&mut sim, MAX_JOBS_PER_TICK);
        if let Some(hook) = on_tick.as_mut() {
            hook(&mut sim, info);
        }
        // Stop only once the mailbox is both closed and fully drained.
        if dispatcher.is_closed() && drained < MAX_JOBS_PER_TICK {
            debug!("all handles dropped, simulation loop ending");
            break;
        }
    }
}
