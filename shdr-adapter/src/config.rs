//! Adapter configuration.
//!
//! [`AdapterConfig`] is a plain record: an outer layer deserializes it from
//! whatever file format it likes (the `Deserialize` derive is all the adapter
//! contributes); the adapter itself never touches the filesystem.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;

/// Configuration for a running SHDR adapter.
///
/// # Defaults
/// - no default device key (bare data item keys on the wire)
/// - port: 7878
/// - heartbeat: 10 000 ms
/// - socket read/write timeout: 5 000 ms
/// - duplicate filtering: enabled
/// - multiline asset/device bodies: disabled
/// - per-client write queue capacity: 256 lines
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Default device key stamped on every observation submitted without one.
    /// When set, keys are emitted `device_key:data_item_key`.
    pub device_key: Option<String>,

    /// TCP listen port. Port 0 binds an ephemeral port; the bound address is
    /// available from the adapter after start.
    pub port: u16,

    /// The value sent back in `* PONG <ms>` replies. Agents that miss a PONG
    /// within this interval (plus grace) drop the connection.
    #[serde(alias = "heartbeat")]
    pub heartbeat_ms: u64,

    /// Deadline applied to each socket write. Reads use
    /// `heartbeat_ms + grace` instead, so idle-but-alive agents survive.
    #[serde(alias = "timeout")]
    pub timeout_ms: u64,

    /// Drop observations whose change id matches the current entry.
    pub filter_duplicates: bool,

    /// Wrap asset bodies in `--multiline--HASH` sentinels so multi-line XML
    /// survives the line protocol.
    pub multiline_assets: bool,

    /// Same for device bodies.
    pub multiline_devices: bool,

    /// Capacity of each client's write queue, in lines. A client that falls
    /// this far behind is treated as failed and disconnected.
    pub channel_capacity: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            device_key: None,
            port: 7878,
            heartbeat_ms: 10_000,
            timeout_ms: 5_000,
            filter_duplicates: true,
            multiline_assets: false,
            multiline_devices: false,
            channel_capacity: 256,
        }
    }
}

impl AdapterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default device key.
    pub fn device_key(mut self, key: impl Into<String>) -> Self {
        self.device_key = Some(key.into());
        self
    }

    /// Sets the TCP listen port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the heartbeat interval in milliseconds.
    pub fn heartbeat_ms(mut self, ms: u64) -> Self {
        self.heartbeat_ms = ms;
        self
    }

    /// Sets the socket write deadline in milliseconds.
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Enables or disables duplicate filtering.
    pub fn filter_duplicates(mut self, enabled: bool) -> Self {
        self.filter_duplicates = enabled;
        self
    }

    /// Enables multiline framing for asset bodies.
    pub fn multiline_assets(mut self, enabled: bool) -> Self {
        self.multiline_assets = enabled;
        self
    }

    /// Enables multiline framing for device bodies.
    pub fn multiline_devices(mut self, enabled: bool) -> Self {
        self.multiline_devices = enabled;
        self
    }

    /// Sets the per-client write queue capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// The address the listener binds: `0.0.0.0:<port>`.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Read deadline: heartbeat plus a grace period of one heartbeat, so a
    /// single delayed PING does not kill the connection.
    pub fn read_deadline(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.saturating_mul(2))
    }
}

// ════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════
