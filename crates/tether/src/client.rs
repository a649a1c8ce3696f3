//! `Client` builder and connection handling.
//!
//! A client mirrors the server shape at N=1: its own simulation loop,
//! one link, one driver task.

use std::sync::Arc;

use tether_dispatch::Dispatcher;
use tether_transport::{ConnectionId, Link, TcpLink};
use tether_wire::Side;

use crate::config::ClientConfig;
use crate::driver::drive_link;
use crate::sim::{Registries, Sim, SimHandle, TickFn, run_sim};
use crate::TetherError;

/// Builder for configuring and connecting a [`Client`].
pub struct ClientBuilder {
    config: ClientConfig,
    registries: Registries,
    on_tick: Option<TickFn>,
}

impl ClientBuilder {
    /// A builder with default settings and default registries.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            registries: Registries::default(),
            on_tick: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the server address to dial.
    pub fn server(mut self, addr: &str) -> Self {
        self.config.server_addr = addr.to_string();
        self
    }

    /// Installs the shared registries. Must match the server's.
    pub fn registries(mut self, registries: Registries) -> Self {
        self.registries = registries;
        self
    }

    /// Installs the per-tick application hook.
    pub fn on_tick<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut Sim, tether_tick::TickInfo) + Send + 'static,
    {
        self.on_tick = Some(Box::new(hook));
        self
    }

    /// Dials the server and starts the simulation loop and driver.
    pub async fn connect(self) -> Result<Client, TetherError> {
        let link = TcpLink::connect(&self.config.server_addr, self.config.link_config()).await?;
        let conn = link.id();

        let registries = Arc::new(self.registries);
        let sim = Sim::new(Side::Client, registries);
        let (dispatcher, handle) = Dispatcher::new();
        let handle = SimHandle::new(handle);
        tokio::spawn(run_sim(
            dispatcher,
            sim,
            self.on_tick,
            self.config.tick_config(),
        ));

        let driver_handle = handle.clone();
        let tick = self.config.tick_config();
        let max_body_len = self.config.max_body_len;
        let driver =
            tokio::spawn(
                async move { drive_link(link, driver_handle, tick, max_body_len).await },
            );

        Ok(Client {
            handle,
            driver,
            conn,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A connected Tether client.
pub struct Client {
    handle: SimHandle,
    driver: tokio::task::JoinHandle<Result<(), TetherError>>,
    conn: ConnectionId,
}

impl Client {
    /// Creates a new builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// A handle onto this client's simulation loop.
    pub fn sim(&self) -> SimHandle {
        self.handle.clone()
    }

    /// The id of the connection to the server — the key for
    /// [`Sim::call_rpc`](crate::Sim::call_rpc).
    pub fn connection_id(&self) -> ConnectionId {
        self.conn
    }

    /// Waits for the connection to end. The `Err` is the transport or
    /// protocol failure that terminated it.
    pub async fn join(self) -> Result<(), TetherError> {
        match self.driver.await {
            Ok(outcome) => outcome,
            Err(e) => Err(TetherError::Task(e.to_string())),
        }
    }

    /// Tears the connection down by abandoning the driver.
    pub fn shutdown(self) {
        self.driver.abort();
    }
}
