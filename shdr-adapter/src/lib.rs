//! # shdr-adapter
//!
//! A long-running SHDR endpoint for MTConnect agents: a TCP server that
//! accepts simultaneous agent connections and streams the current state of a
//! manufacturing device to them as newline-delimited SHDR records.
//!
//! Producers — machine drivers, PLC bridges, synthetic sources — call the
//! in-process submission entry points; the adapter deduplicates by content
//! hash, buffers, and fans lines out to every connected agent, answering the
//! protocol's `* PING`/`* PONG` heartbeats along the way. Agents that
//! reconnect are seeded with a replay of every last-transmitted value before
//! live dispatch resumes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shdr_adapter::ShdrAdapterBuilder;
//!
//! let adapter = ShdrAdapterBuilder::new()
//!     .device_key("M12346")
//!     .port(7878)
//!     .build()
//!     .await?;
//!
//! adapter.add_data_item("Xact", 12.5, None);
//! adapter.add_message("operator", "door open", Some("D101".into()), None);
//!
//! // On driver shutdown, everything the agent holds goes stale:
//! adapter.set_unavailable(None);
//! adapter.stop().await;
//! ```
//!
//! ## Wire Protocol
//!
//! See [`protocol`] for the observation model, line layouts, and reserved
//! tokens.
//!
//! ## Events
//!
//! Connection lifecycle, heartbeats, shipped lines, and soft failures are
//! published on a non-blocking event bus — see [`AdapterEvent`].

pub mod adapter;
pub mod builder;
pub mod config;
pub mod error;
pub mod event;
pub mod registry;
pub mod state;
pub(crate) mod server;
pub(crate) mod session;

/// Re-export of the wire-level protocol crate.
pub use shdr_protocol as protocol;

// ════════════════════════════════════════════════════════════════════
// Public re-exports
// ════════════════════════════════════════════════════════════════════

pub use adapter::ShdrAdapter;
pub use builder::ShdrAdapterBuilder;
pub use config::AdapterConfig;
pub use error::{AdapterError, AdapterResult};
pub use event::{AdapterEvent, ClientId, EventBus};
pub use registry::ClientRegistry;
pub use shdr_protocol::{
    Asset, ConditionLevel, DataSetEntry, Device, FaultState, Observation, ObservationKind,
    TableRow,
};
