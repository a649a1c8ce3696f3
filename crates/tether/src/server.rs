//! `Server` builder and accept loop.
//!
//! A server owns the listening transport and the authoritative
//! simulation loop. Every accepted connection gets its own driver task;
//! all of them feed the one simulation through its dispatcher.

use std::net::SocketAddr;
use std::sync::Arc;

use tether_dispatch::Dispatcher;
use tether_transport::TcpTransport;
use tether_wire::Side;

use crate::config::ServerConfig;
use crate::driver::drive_link;
use crate::sim::{Registries, Sim, SimHandle, TickFn, run_sim};
use crate::TetherError;

/// Builder for configuring and starting a [`Server`].
pub struct ServerBuilder {
    config: ServerConfig,
    registries: Registries,
    on_tick: Option<TickFn>,
}

impl ServerBuilder {
    /// A builder with default settings and default registries.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            registries: Registries::default(),
            on_tick: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Installs the shared registries. Must match the clients'.
    pub fn registries(mut self, registries: Registries) -> Self {
        self.registries = registries;
        self
    }

    /// Installs the per-tick application hook, run on the simulation
    /// loop after queued jobs are drained.
    pub fn on_tick<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut Sim, tether_tick::TickInfo) + Send + 'static,
    {
        self.on_tick = Some(Box::new(hook));
        self
    }

    /// Binds the listener and starts the simulation loop.
    pub async fn build(self) -> Result<Server, TetherError> {
        let transport = TcpTransport::bind(&self.config.bind_addr).await?;

        let registries = Arc::new(self.registries);
        let sim = Sim::new(Side::Server, registries);
        let (dispatcher, handle) = Dispatcher::new();
        tokio::spawn(run_sim(
            dispatcher,
            sim,
            self.on_tick,
            self.config.tick_config(),
        ));

        Ok(Server {
            transport,
            handle: SimHandle::new(handle),
            config: self.config,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Tether server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct Server {
    transport: TcpTransport,
    handle: SimHandle,
    config: ServerConfig,
}

impl Server {
    /// Creates a new builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle onto the simulation loop.
    pub fn sim(&self) -> SimHandle {
        self.handle.clone()
    }

    /// Runs the accept loop: every accepted link gets a driver task.
    /// Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), TetherError> {
        tracing::info!("tether server running");
        loop {
            match self.transport.accept(self.config.link_config()).await {
                Ok(link) => {
                    let sim = self.handle.clone();
                    let tick = self.config.tick_config();
                    let max_body_len = self.config.max_body_len;
                    tokio::spawn(async move {
                        if let Err(e) = drive_link(link, sim, tick, max_body_len).await {
                            tracing::debug!(error = %e, "driver ended");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
