//! # Tether
//!
//! A server-authoritative world-replication core: one server owns an
//! entity tree; N clients mirror it over framed TCP. Entity state, tree
//! structure, events, and remote procedure calls all travel inside one
//! packet stream per connection.
//!
//! The concurrency model is ownership, not locking: the simulation loop
//! exclusively owns the [`Sim`] (world, event bus, RPC outboxes) and every
//! connection driver exclusively owns its link. Cross-loop access goes
//! through the simulation dispatcher — network drivers queue closures, the
//! simulation loop drains them once per tick.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tether::prelude::*;
//!
//! # async fn run() -> Result<(), TetherError> {
//! let server = Server::builder()
//!     .bind("127.0.0.1:4040")
//!     .registries(Registries::default())
//!     .on_tick(|sim: &mut Sim, _tick| {
//!         // mutate sim.world, raise events, queue RPCs
//!     })
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod client;
mod config;
mod driver;
mod error;
mod server;
mod sim;

pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, ServerConfig};
pub use error::TetherError;
pub use server::{Server, ServerBuilder};
pub use sim::{Registries, Sim, SimHandle, TickFn};

// The protocol layers, re-exported so applications depend on one crate.
pub use tether_dispatch::{DispatchError, PendingCall};
pub use tether_event::{Event, EventBus, EventError, EventMeta, EventRegistry, EventTag};
pub use tether_replication::{
    NetworkId, Replicable, ReplicationError, ReplicationFlags, Transform, TypeRegistry, TypeTag,
    World,
};
pub use tether_rpc::{PendingRpc, RpcError, RpcRegistry, RpcType, RpcValue};
pub use tether_tick::{TickConfig, TickInfo, Ticker};
pub use tether_transport::{ConnectionId, LinkState, TransportError};
pub use tether_wire::{SerialBuffer, Side, StrEncoding, WireError};

/// The usual imports for applications built on Tether.
pub mod prelude {
    pub use crate::{
        Client, ClientConfig, Event, EventMeta, EventTag, NetworkId, Registries, Replicable,
        ReplicationFlags, RpcType, RpcValue, SerialBuffer, Server, ServerConfig, Side, Sim,
        SimHandle, TetherError, TickInfo, Transform, TypeTag, WireError,
    };
}
