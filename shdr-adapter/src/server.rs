//! TCP listener for incoming agent connections.
//!
//! The accept loop runs in a background task. Accept failures are reported
//! via [`AdapterEvent::AgentConnectionError`] and do not stop the listener;
//! only the adapter-wide shutdown signal does. The listener socket is closed
//! when the loop exits, and the `closed` watch confirms it so `stop()` can
//! return only once the port is released.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::adapter::AdapterInner;
use crate::event::AdapterEvent;

pub(crate) fn spawn_accept_loop(
    listener: TcpListener,
    inner: Arc<AdapterInner>,
    closed_tx: watch::Sender<bool>,
) {
    tokio::spawn(async move {
        let mut shutdown = inner.shutdown_rx.clone();

        #[cfg(feature = "tracing")]
        tracing::info!(addr = %inner.local_addr, "SHDR listener accepting agents");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let _ = stream.set_nodelay(true);
                        inner.handle_client(stream, addr);
                    }
                    Err(e) => {
                        #[cfg(feature = "tracing")]
                        tracing::error!(error = %e, "accept failed; listener continues");
                        inner.events.emit(AdapterEvent::AgentConnectionError {
                            message: e.to_string(),
                        });
                    }
                },
            }
        }

        drop(listener);
        let _ = closed_tx.send(true);

        #[cfg(feature = "tracing")]
        tracing::info!("SHDR listener closed");
    });
}
