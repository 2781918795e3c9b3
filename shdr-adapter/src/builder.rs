//! Builder for the SHDR adapter.
//!
//! # Lifecycle
//!
//! ```text
//! ShdrAdapterBuilder::build()
//!   ├─ construct state store / client registry / event bus
//!   ├─ bind the TCP listener (errors surface here)
//!   ├─ spawn the accept loop
//!   └─ return ShdrAdapter
//! ```

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::adapter::{AdapterInner, ShdrAdapter};
use crate::config::AdapterConfig;
use crate::error::{AdapterError, AdapterResult};
use crate::event::EventBus;
use crate::registry::ClientRegistry;
use crate::server::spawn_accept_loop;
use crate::state::StateStore;

/// Builder for [`ShdrAdapter`].
///
/// # Example
///
/// ```rust,ignore
/// use shdr_adapter::ShdrAdapterBuilder;
///
/// let adapter = ShdrAdapterBuilder::new()
///     .device_key("M12346")
///     .port(7878)
///     .heartbeat_ms(10_000)
///     .build()
///     .await?;
/// ```
#[derive(Debug, Default)]
pub struct ShdrAdapterBuilder {
    config: AdapterConfig,
}

impl ShdrAdapterBuilder {
    /// Create a builder with the protocol defaults (see [`AdapterConfig`]).
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a fully populated configuration record.
    pub fn with_config(config: AdapterConfig) -> Self {
        Self { config }
    }

    /// Default device key stamped on observations submitted without one.
    pub fn device_key(mut self, key: impl Into<String>) -> Self {
        self.config.device_key = Some(key.into());
        self
    }

    /// TCP listen port (0 = ephemeral).
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Heartbeat interval advertised in `* PONG` replies.
    pub fn heartbeat_ms(mut self, ms: u64) -> Self {
        self.config.heartbeat_ms = ms;
        self
    }

    /// Per-write socket deadline.
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    /// Enable or disable duplicate filtering (default: enabled).
    pub fn filter_duplicates(mut self, enabled: bool) -> Self {
        self.config.filter_duplicates = enabled;
        self
    }

    /// Wrap asset bodies in multiline sentinels.
    pub fn multiline_assets(mut self, enabled: bool) -> Self {
        self.config.multiline_assets = enabled;
        self
    }

    /// Wrap device bodies in multiline sentinels.
    pub fn multiline_devices(mut self, enabled: bool) -> Self {
        self.config.multiline_devices = enabled;
        self
    }

    /// Per-client write queue capacity in lines.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Bind the listener and start the adapter.
    pub async fn build(self) -> AdapterResult<ShdrAdapter> {
        let config = self.config;

        let listener = TcpListener::bind(config.bind_addr())
            .await
            .map_err(|source| AdapterError::Bind {
                port: config.port,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (closed_tx, closed_rx) = watch::channel(false);

        let inner = Arc::new(AdapterInner {
            store: StateStore::new(config.filter_duplicates),
            registry: ClientRegistry::new(),
            events: EventBus::new(),
            local_addr,
            shutdown_tx,
            shutdown_rx,
            closed_rx,
            config,
        });

        spawn_accept_loop(listener, inner.clone(), closed_tx);

        Ok(ShdrAdapter::from_inner(inner))
    }
}

// ════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════
