//! # shdr-protocol
//!
//! Observation model and line codec for the SHDR (Simple Hierarchical Data
//! Representation) protocol spoken between adapters and MTConnect agents.
//!
//! This crate is pure: no sockets, no async, no shared state. The adapter
//! crate layers concurrency on top of it, and test harnesses use it to parse
//! what an adapter emits.
//!
//! # Wire format
//!
//! SHDR is line-oriented ASCII, `LF`-terminated (`CR` tolerated), with
//! `|`-separated fields. Every outbound line starts with an ISO-8601 UTC
//! timestamp at millisecond precision:
//!
//! ```text
//! 2023-11-14T22:13:20.000Z|Xact|12.5
//! 2023-11-14T22:13:20.000Z|servo|FAULT|100|2|HIGH|over temp
//! 2023-11-14T22:13:20.000Z|@ASSET@|M8.123|CuttingTool|<CuttingTool>…</CuttingTool>
//! ```
//!
//! The only inbound message with meaning is the heartbeat request `* PING`,
//! answered with `* PONG <heartbeat_ms>`.
//!
//! # Modules
//!
//! - [`observation`] — value records for the six observation kinds plus
//!   assets and devices.
//! - [`change_id`] — content hashing used for duplicate suppression.
//! - [`codec`] — encoding observations into SHDR lines and classifying
//!   inbound text.

pub mod change_id;
pub mod codec;
pub mod observation;

pub use change_id::ChangeId;
pub use codec::{CodecError, CodecResult, InboundLine};
pub use observation::{
    Asset, ConditionLevel, DataSetEntry, Device, FaultState, Observation, ObservationKind,
    ObservationPayload, TableRow,
};

/// Returns the current milliseconds since the Unix epoch.
///
/// Used by the adapter to stamp observations submitted with `timestamp_ms = 0`.
pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
