//! Error types for the adapter.
//!
//! Only startup and shutdown can fail toward the caller. Everything that
//! happens while the adapter runs — write failures, rejected observations,
//! accept errors — stays inside: it becomes an [`crate::event::AdapterEvent`]
//! and, where a client is involved, closes that client only.

use shdr_protocol::CodecError;
use thiserror::Error;

use crate::event::ClientId;

/// Error type for adapter operations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The listener could not bind its port.
    #[error("failed to bind SHDR listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// An I/O failure outside any single client's session.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record that cannot be rendered as SHDR text.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A submission that cannot enter the state store (empty key, malformed
    /// payload). Producers see this as an `ObservationRejected` event.
    #[error("invalid observation: {reason}")]
    InvalidObservation { reason: String },

    /// An operation addressed a client no longer in the registry.
    #[error("client {client_id} is gone")]
    ClientGone { client_id: ClientId },

    /// The adapter has been stopped; no further operations are possible.
    #[error("adapter is shut down")]
    Shutdown,
}

pub type AdapterResult<T> = Result<T, AdapterError>;
