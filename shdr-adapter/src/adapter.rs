//! Adapter core: submission, deduplication, dispatch, and replay.
//!
//! [`ShdrAdapter`] is a cheap-to-clone handle over the running adapter.
//! Producers call the submission entry points from any task or thread; the
//! dispatch methods encode outside the state lock and fan lines out through
//! the [`ClientRegistry`].
//!
//! Nothing here returns an error to a producer. Malformed submissions, codec
//! failures, and client write failures all surface as [`AdapterEvent`]s, and
//! a failing client is closed without disturbing the others.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use shdr_protocol::{codec, now_ms, Asset, Device, Observation, ObservationKind};

use crate::config::AdapterConfig;
use crate::event::{AdapterEvent, ClientId, EventBus};
use crate::registry::ClientRegistry;
use crate::session::{run_session, SessionContext};
use crate::state::{Acceptance, StateStore};

// ════════════════════════════════════════════════════════════════════
// Inner state
// ════════════════════════════════════════════════════════════════════

pub(crate) struct AdapterInner {
    pub(crate) config: AdapterConfig,
    pub(crate) store: StateStore,
    pub(crate) registry: ClientRegistry,
    pub(crate) events: EventBus,
    pub(crate) local_addr: SocketAddr,
    pub(crate) shutdown_tx: watch::Sender<bool>,
    pub(crate) shutdown_rx: watch::Receiver<bool>,
    pub(crate) closed_rx: watch::Receiver<bool>,
}

impl AdapterInner {
    // ────────────────────────────────────────────────────────────────
    // Connection lifecycle (called from the accept loop)
    // ────────────────────────────────────────────────────────────────

    /// Register a newly accepted agent, seed its queue with the last-value
    /// replay, and spawn its session.
    ///
    /// The replay is queued into the client's channel *before* the client
    /// becomes visible to broadcasts, so no `send_current` racing with the
    /// connect can overtake it.
    pub(crate) fn handle_client(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let client_id = self.registry.next_client_id();

        let replay = self.replay_lines(now_ms());
        let rx = self
            .registry
            .register_seeded(client_id, addr, self.config.channel_capacity, &replay);

        for line in &replay {
            self.events.emit(AdapterEvent::LineSent {
                client_id,
                line: line.clone(),
            });
        }
        self.events.emit(AdapterEvent::AgentConnected { client_id });

        #[cfg(feature = "tracing")]
        tracing::info!(client_id, %addr, replayed = replay.len(), "agent connected");

        let ctx = SessionContext {
            registry: self.registry.clone(),
            events: self.events.clone(),
            heartbeat_ms: self.config.heartbeat_ms,
            read_deadline: self.config.read_deadline(),
            write_timeout: self.config.write_timeout(),
            shutdown: self.shutdown_rx.clone(),
        };
        tokio::spawn(run_session(stream, client_id, rx, ctx));
    }

    /// The `send_last` replay for one connecting client: every `last` entry,
    /// re-stamped to `timestamp_ms`, in deterministic order.
    fn replay_lines(&self, timestamp_ms: i64) -> Vec<String> {
        let mut snapshot = self.store.snapshot_last();
        for obs in &mut snapshot {
            obs.timestamp_ms = timestamp_ms;
        }
        sort_for_dispatch(&mut snapshot);
        self.encode_batch(&snapshot).0
    }

    // ────────────────────────────────────────────────────────────────
    // Submission
    // ────────────────────────────────────────────────────────────────

    /// Apply adapter defaults and accept into `current`. Never fails; a
    /// malformed observation becomes an `ObservationRejected` event.
    pub(crate) fn submit(&self, mut obs: Observation) {
        if obs.data_item_key.is_empty() {
            self.events.emit(AdapterEvent::ObservationRejected {
                reason: "empty data item key".to_string(),
            });
            return;
        }
        if obs.device_key.is_none() {
            obs.device_key = self.config.device_key.clone();
        }
        if obs.timestamp_ms == 0 {
            obs.timestamp_ms = now_ms();
        }

        match self.store.accept(obs) {
            Acceptance::Accepted => {}
            Acceptance::Duplicate => {
                #[cfg(feature = "tracing")]
                tracing::trace!("duplicate observation dropped");
            }
        }
    }

    // ────────────────────────────────────────────────────────────────
    // Dispatch
    // ────────────────────────────────────────────────────────────────

    /// Encode and ship every unsent `current` observation, then record the
    /// batch into `last`.
    ///
    /// `last` is updated even with no agent connected: the batch was
    /// dispatched as far as any agent existed to receive it, and reconnect
    /// replay covers the gap.
    pub(crate) fn send_current(&self) {
        let pending = self.store.take_unsent();
        if pending.is_empty() {
            return;
        }
        let (lines, encoded) = self.encode_batch(&pending);
        self.ship(&lines);
        self.store.mark_last(&encoded);
    }

    /// Re-send every `last` entry to all connected agents with rewritten
    /// timestamps.
    pub(crate) fn send_last(&self, timestamp_override: Option<i64>) {
        let lines = self.replay_lines(timestamp_override.unwrap_or_else(now_ms));
        self.ship(&lines);
    }

    /// Synthesize an UNAVAILABLE observation for every `current` key and run
    /// a dispatch. Duplicate filtering makes a second call a no-op.
    pub(crate) fn set_unavailable(&self, timestamp: Option<i64>) {
        let ts = timestamp.unwrap_or(0);
        for obs in self.store.snapshot_current() {
            self.submit(obs.to_unavailable().with_timestamp(ts));
        }
        self.send_current();
    }

    /// Encode a batch, concatenating consecutive samples that share a
    /// timestamp onto one line. Observations the codec rejects are dropped
    /// with an `ObservationRejected` event; the rest of the batch proceeds.
    fn encode_batch(&self, batch: &[Observation]) -> (Vec<String>, Vec<Observation>) {
        let mut lines = Vec::with_capacity(batch.len());
        let mut encoded = Vec::with_capacity(batch.len());
        let mut index = 0;

        while index < batch.len() {
            let obs = &batch[index];
            if obs.kind() == ObservationKind::Sample {
                let mut run = index + 1;
                while run < batch.len()
                    && batch[run].kind() == ObservationKind::Sample
                    && batch[run].timestamp_ms == obs.timestamp_ms
                {
                    run += 1;
                }
                let group: Vec<&Observation> = batch[index..run].iter().collect();
                match codec::encode_samples_batch(&group) {
                    Ok(line) => {
                        lines.push(line);
                        encoded.extend(group.into_iter().cloned());
                    }
                    Err(e) => self.reject_batch(&batch[index..run], e),
                }
                index = run;
            } else {
                match codec::encode_observation(obs) {
                    Ok(mut obs_lines) => {
                        lines.append(&mut obs_lines);
                        encoded.push(obs.clone());
                    }
                    Err(e) => self.reject_batch(std::slice::from_ref(obs), e),
                }
                index += 1;
            }
        }
        (lines, encoded)
    }

    fn reject_batch(&self, batch: &[Observation], error: shdr_protocol::CodecError) {
        for obs in batch {
            self.events.emit(AdapterEvent::ObservationRejected {
                reason: format!("{}: {}", obs.data_item_key, error),
            });
        }
        #[cfg(feature = "tracing")]
        tracing::warn!(error = %error, dropped = batch.len(), "codec rejected observations");
    }

    /// Fan lines out to every client, emitting `LineSent` per delivery and
    /// closing clients that fail.
    fn ship(&self, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        let report = self.registry.broadcast(lines);
        for client_id in report.delivered {
            for line in lines {
                self.events.emit(AdapterEvent::LineSent {
                    client_id,
                    line: line.clone(),
                });
            }
        }
        for (client_id, message) in report.failed {
            #[cfg(feature = "tracing")]
            tracing::warn!(client_id, %message, "client dropped during dispatch");
            self.events.emit(AdapterEvent::SendError { client_id, message });
        }
    }

    // ────────────────────────────────────────────────────────────────
    // Assets and devices
    // ────────────────────────────────────────────────────────────────

    pub(crate) fn send_asset(&self, mut asset: Asset) {
        if asset.timestamp_ms <= 0 {
            asset.timestamp_ms = now_ms();
        }
        if !self.store.upsert_asset(&asset) {
            #[cfg(feature = "tracing")]
            tracing::debug!(asset_id = %asset.asset_id, "asset unchanged; not re-sent");
            return;
        }
        match codec::encode_asset(&asset, self.config.multiline_assets) {
            Ok(lines) => self.ship(&lines),
            Err(e) => self.events.emit(AdapterEvent::ObservationRejected {
                reason: format!("asset {}: {}", asset.asset_id, e),
            }),
        }
    }

    pub(crate) fn send_device(&self, device: Device) {
        if !self.store.upsert_device(&device) {
            #[cfg(feature = "tracing")]
            tracing::debug!(device_uuid = %device.device_uuid, "device unchanged; not re-sent");
            return;
        }
        match codec::encode_device(&device, now_ms(), self.config.multiline_devices) {
            Ok(lines) => self.ship(&lines),
            Err(e) => self.events.emit(AdapterEvent::ObservationRejected {
                reason: format!("device {}: {}", device.device_uuid, e),
            }),
        }
    }

    /// Removal commands go straight to the wire; the stored tables are left
    /// alone because removal is the agent's authoritative action.
    pub(crate) fn ship_removal(&self, line: Result<String, shdr_protocol::CodecError>, what: &str) {
        match line {
            Ok(line) => self.ship(std::slice::from_ref(&line)),
            Err(e) => self.events.emit(AdapterEvent::ObservationRejected {
                reason: format!("{}: {}", what, e),
            }),
        }
    }
}

fn kind_rank(kind: ObservationKind) -> usize {
    ObservationKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(usize::MAX)
}

/// Deterministic replay order: kind table order, then key.
fn sort_for_dispatch(batch: &mut [Observation]) {
    batch.sort_by(|a, b| {
        kind_rank(a.kind())
            .cmp(&kind_rank(b.kind()))
            .then_with(|| a.data_item_key.cmp(&b.data_item_key))
    });
}

// ════════════════════════════════════════════════════════════════════
// Public handle
// ════════════════════════════════════════════════════════════════════

/// Handle to a running SHDR adapter.
///
/// Built by [`crate::builder::ShdrAdapterBuilder`]. Clones share the same
/// adapter; dropping the last handle does not stop it — call [`stop`].
///
/// [`stop`]: ShdrAdapter::stop
///
/// # Example
///
/// ```rust,ignore
/// let adapter = ShdrAdapterBuilder::new().port(7878).build().await?;
/// adapter.add_data_item("Xact", 12.5, None);
/// adapter.stop().await;
/// ```
#[derive(Clone)]
pub struct ShdrAdapter {
    inner: Arc<AdapterInner>,
}

impl ShdrAdapter {
    pub(crate) fn from_inner(inner: Arc<AdapterInner>) -> Self {
        Self { inner }
    }

    // ────────────────────────────────────────────────────────────────
    // Submission primitives
    // ────────────────────────────────────────────────────────────────

    /// Accept an observation into `current` without dispatching.
    ///
    /// Defaults are applied here: the adapter's device key when the
    /// observation carries none, and the current wall clock when
    /// `timestamp_ms` is zero. With duplicate filtering enabled, an
    /// observation matching the current entry's change id is dropped
    /// silently.
    pub fn submit(&self, obs: Observation) {
        self.inner.submit(obs);
    }

    /// [`submit`](Self::submit) each element in order. No transactional
    /// semantics across elements; an empty batch does nothing.
    pub fn submit_batch(&self, batch: Vec<Observation>) {
        for obs in batch {
            self.inner.submit(obs);
        }
    }

    /// Encode and ship everything accepted since the previous dispatch.
    pub fn send_current(&self) {
        self.inner.send_current();
    }

    /// Re-send every last-transmitted value to all connected agents,
    /// re-stamped to `timestamp_override` (or now).
    pub fn send_last(&self, timestamp_override: Option<i64>) {
        self.inner.send_last(timestamp_override);
    }

    /// Mark every current data item UNAVAILABLE and dispatch. Idempotent:
    /// a second call produces no further lines.
    pub fn set_unavailable(&self, timestamp: Option<i64>) {
        self.inner.set_unavailable(timestamp);
    }

    // ────────────────────────────────────────────────────────────────
    // Convenience entry points (submit + dispatch)
    // ────────────────────────────────────────────────────────────────

    /// Submit a simple data item and dispatch.
    pub fn add_data_item(
        &self,
        key: impl Into<String>,
        value: impl ToString,
        timestamp_ms: Option<i64>,
    ) {
        self.inner.submit(
            Observation::sample(key, value.to_string())
                .with_timestamp(timestamp_ms.unwrap_or(0)),
        );
        self.inner.send_current();
    }

    /// Submit a message and dispatch.
    pub fn add_message(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        native_code: Option<String>,
        timestamp_ms: Option<i64>,
    ) {
        self.inner.submit(
            Observation::message(key, value, native_code)
                .with_timestamp(timestamp_ms.unwrap_or(0)),
        );
        self.inner.send_current();
    }

    /// Submit a condition's fault states and dispatch.
    pub fn add_condition(
        &self,
        key: impl Into<String>,
        states: Vec<shdr_protocol::FaultState>,
        timestamp_ms: Option<i64>,
    ) {
        self.inner.submit(
            Observation::condition(key, states).with_timestamp(timestamp_ms.unwrap_or(0)),
        );
        self.inner.send_current();
    }

    /// Submit a time series and dispatch.
    pub fn add_time_series(
        &self,
        key: impl Into<String>,
        samples: Vec<f64>,
        rate_hz: Option<f64>,
        timestamp_ms: Option<i64>,
    ) {
        self.inner.submit(
            Observation::time_series(key, samples, rate_hz)
                .with_timestamp(timestamp_ms.unwrap_or(0)),
        );
        self.inner.send_current();
    }

    /// Submit a data set and dispatch.
    pub fn add_data_set(
        &self,
        key: impl Into<String>,
        entries: Vec<shdr_protocol::DataSetEntry>,
        timestamp_ms: Option<i64>,
    ) {
        self.inner.submit(
            Observation::data_set(key, entries).with_timestamp(timestamp_ms.unwrap_or(0)),
        );
        self.inner.send_current();
    }

    /// Submit a table and dispatch.
    pub fn add_table(
        &self,
        key: impl Into<String>,
        rows: Vec<shdr_protocol::TableRow>,
        timestamp_ms: Option<i64>,
    ) {
        self.inner
            .submit(Observation::table(key, rows).with_timestamp(timestamp_ms.unwrap_or(0)));
        self.inner.send_current();
    }

    // ────────────────────────────────────────────────────────────────
    // Assets and devices
    // ────────────────────────────────────────────────────────────────

    /// Publish an asset if its content changed. A non-positive timestamp is
    /// stamped with the current wall clock.
    pub fn send_asset(&self, asset: Asset) {
        self.inner.send_asset(asset);
    }

    /// Publish a device model if its content changed.
    pub fn send_device(&self, device: Device) {
        self.inner.send_device(device);
    }

    /// Tell agents to drop one asset. Stored tables are untouched.
    pub fn remove_asset(&self, asset_id: &str, timestamp_ms: Option<i64>) {
        let ts = timestamp_ms.unwrap_or_else(now_ms);
        self.inner
            .ship_removal(codec::encode_asset_removal(asset_id, ts), "remove_asset");
    }

    /// Tell agents to drop every asset of a type.
    pub fn remove_all_assets(&self, asset_type: &str, timestamp_ms: Option<i64>) {
        let ts = timestamp_ms.unwrap_or_else(now_ms);
        self.inner.ship_removal(
            codec::encode_all_assets_removal(asset_type, ts),
            "remove_all_assets",
        );
    }

    /// Tell agents to drop one device.
    pub fn remove_device(&self, device_uuid: &str, timestamp_ms: Option<i64>) {
        let ts = timestamp_ms.unwrap_or_else(now_ms);
        self.inner.ship_removal(
            codec::encode_device_removal(device_uuid, ts),
            "remove_device",
        );
    }

    /// Tell agents to drop every device.
    pub fn remove_all_devices(&self, timestamp_ms: Option<i64>) {
        let ts = timestamp_ms.unwrap_or_else(now_ms);
        self.inner
            .ship_removal(codec::encode_all_devices_removal(ts), "remove_all_devices");
    }

    // ────────────────────────────────────────────────────────────────
    // Introspection and lifecycle
    // ────────────────────────────────────────────────────────────────

    /// Subscribe to adapter events. `capacity` bounds the queue; a
    /// subscriber that stops draining loses events.
    pub fn events(&self, capacity: usize) -> mpsc::Receiver<AdapterEvent> {
        self.inner.events.subscribe(capacity)
    }

    /// The address the listener actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Number of currently connected agents.
    pub fn client_count(&self) -> usize {
        self.inner.registry.client_count()
    }

    /// Disconnect a single agent (used by operators and tests).
    pub fn disconnect(&self, client_id: ClientId) -> bool {
        self.inner.registry.unregister(client_id)
    }

    /// Stop the adapter: close the listener and wake every session.
    ///
    /// Idempotent. Returns once the listener socket is closed; producer
    /// tasks are not waited for.
    pub async fn stop(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        let mut closed = self.inner.closed_rx.clone();
        while !*closed.borrow() {
            if closed.changed().await.is_err() {
                break;
            }
        }
        #[cfg(feature = "tracing")]
        tracing::info!("adapter stopped");
    }
}

// ════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateStore;
    use shdr_protocol::DataSetEntry;
    use std::net::{IpAddr, Ipv4Addr};

    const T: i64 = 1_700_000_000_000;

    fn probe_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000)
    }

    /// An adapter core without a live listener; clients are probe channels
    /// registered directly.
    fn offline_adapter(config: AdapterConfig) -> ShdrAdapter {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (_closed_tx, closed_rx) = watch::channel(true);
        let inner = Arc::new(AdapterInner {
            store: StateStore::new(config.filter_duplicates),
            registry: ClientRegistry::new(),
            events: EventBus::new(),
            local_addr: probe_addr(),
            shutdown_tx,
            shutdown_rx,
            closed_rx,
            config,
        });
        ShdrAdapter::from_inner(inner)
    }

    fn probe_client(adapter: &ShdrAdapter) -> (ClientId, mpsc::Receiver<String>) {
        let id = adapter.inner.registry.next_client_id();
        let rx = adapter.inner.registry.register(id, probe_addr(), 64);
        (id, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    #[tokio::test]
    async fn single_data_item_line() {
        let adapter = offline_adapter(AdapterConfig::new());
        let (_, mut rx) = probe_client(&adapter);

        adapter.add_data_item("Xact", 12.5, Some(T));

        assert_eq!(drain(&mut rx), vec!["2023-11-14T22:13:20.000Z|Xact|12.5"]);
    }

    #[tokio::test]
    async fn duplicate_submission_emits_one_line() {
        let adapter = offline_adapter(AdapterConfig::new());
        let (_, mut rx) = probe_client(&adapter);

        adapter.add_data_item("exec", "ACTIVE", Some(T));
        adapter.add_data_item("exec", "ACTIVE", Some(T + 50));

        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn duplicates_pass_when_filtering_is_off() {
        let adapter = offline_adapter(AdapterConfig::new().filter_duplicates(false));
        let (_, mut rx) = probe_client(&adapter);

        adapter.add_data_item("exec", "ACTIVE", Some(T));
        adapter.add_data_item("exec", "ACTIVE", Some(T + 50));

        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[tokio::test]
    async fn default_device_key_prefixes_lines() {
        let adapter = offline_adapter(AdapterConfig::new().device_key("M12346"));
        let (_, mut rx) = probe_client(&adapter);

        adapter.add_data_item("Xact", "1", Some(T));

        assert_eq!(drain(&mut rx), vec!["2023-11-14T22:13:20.000Z|M12346:Xact|1"]);
    }

    #[tokio::test]
    async fn samples_sharing_a_timestamp_share_a_line() {
        let adapter = offline_adapter(AdapterConfig::new());
        let (_, mut rx) = probe_client(&adapter);

        adapter.submit(Observation::sample("Xact", "12.5").with_timestamp(T));
        adapter.submit(Observation::sample("Yact", "3.25").with_timestamp(T));
        adapter.send_current();

        assert_eq!(
            drain(&mut rx),
            vec!["2023-11-14T22:13:20.000Z|Xact|12.5|Yact|3.25"]
        );
    }

    #[tokio::test]
    async fn set_unavailable_is_idempotent() {
        let adapter = offline_adapter(AdapterConfig::new());
        let (_, mut rx) = probe_client(&adapter);

        adapter.add_data_item("Xact", 12.5, Some(T));
        adapter.add_message("operator", "door open", None, Some(T));
        adapter.add_data_set("vars", vec![DataSetEntry::new("a", "1")], Some(T));
        drain(&mut rx);

        adapter.set_unavailable(Some(T + 100));
        let lines = drain(&mut rx);
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.ends_with("|UNAVAILABLE")));

        adapter.set_unavailable(Some(T + 200));
        assert!(drain(&mut rx).is_empty(), "second call is filtered out");
    }

    #[tokio::test]
    async fn replay_covers_every_last_entry_with_override() {
        let adapter = offline_adapter(AdapterConfig::new());

        adapter.add_data_item("avail", "AVAILABLE", Some(1));
        adapter.add_data_item("load", 0.4, Some(2));

        let lines = adapter.inner.replay_lines(T);
        assert_eq!(lines.len(), 1, "re-stamped samples share one line");
        assert!(lines[0].starts_with("2023-11-14T22:13:20.000Z|"));
        assert!(lines[0].contains("|avail|AVAILABLE"));
        assert!(lines[0].contains("|load|0.4"));
    }

    #[tokio::test]
    async fn empty_key_is_rejected_with_an_event() {
        let adapter = offline_adapter(AdapterConfig::new());
        let mut events = adapter.events(16);

        adapter.submit(Observation::sample("", "1"));

        match events.try_recv() {
            Ok(AdapterEvent::ObservationRejected { reason }) => {
                assert!(reason.contains("empty data item key"));
            }
            other => panic!("expected rejection event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unencodable_observation_is_dropped_softly() {
        let adapter = offline_adapter(AdapterConfig::new());
        let (_, mut rx) = probe_client(&adapter);
        let mut events = adapter.events(16);

        adapter.submit(Observation::sample("bad", "12|5").with_timestamp(T));
        adapter.send_current();

        assert!(drain(&mut rx).is_empty());
        assert!(matches!(
            events.try_recv(),
            Ok(AdapterEvent::ObservationRejected { .. })
        ));
    }

    #[tokio::test]
    async fn submit_stamps_zero_timestamps_once() {
        let adapter = offline_adapter(AdapterConfig::new());

        let before = now_ms();
        adapter.submit(Observation::sample("Xact", "1"));
        let after = now_ms();

        let stored = adapter.inner.store.snapshot_current();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].timestamp_ms >= before && stored[0].timestamp_ms <= after);
    }

    #[tokio::test]
    async fn empty_batch_produces_no_io_and_no_events() {
        let adapter = offline_adapter(AdapterConfig::new());
        let (_, mut rx) = probe_client(&adapter);
        let mut events = adapter.events(16);

        adapter.submit_batch(Vec::new());
        adapter.send_current();

        assert!(drain(&mut rx).is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn changed_asset_is_sent_unchanged_asset_is_not() {
        let adapter = offline_adapter(AdapterConfig::new());
        let (_, mut rx) = probe_client(&adapter);

        let asset = Asset::new("M8.123", "CuttingTool", "<a/>").with_timestamp(T);
        adapter.send_asset(asset.clone());
        adapter.send_asset(asset);

        let lines = drain(&mut rx);
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0],
            "2023-11-14T22:13:20.000Z|@ASSET@|M8.123|CuttingTool|<a/>"
        );
    }

    #[tokio::test]
    async fn multiline_asset_is_framed_with_sentinels() {
        let adapter = offline_adapter(AdapterConfig::new().multiline_assets(true));
        let (_, mut rx) = probe_client(&adapter);

        let body = "<CuttingTool>\n  <Life>1</Life>\n</CuttingTool>";
        adapter.send_asset(Asset::new("M8.123", "CuttingTool", body).with_timestamp(T));

        let lines = drain(&mut rx);
        assert_eq!(lines.len(), 5);
        let marker = lines[0].rsplit('|').next().unwrap();
        assert!(marker.starts_with("--multiline--"));
        assert_eq!(lines.last().unwrap(), marker);
    }

    #[tokio::test]
    async fn changed_device_is_sent_unchanged_device_is_not() {
        let adapter = offline_adapter(AdapterConfig::new());
        let (_, mut rx) = probe_client(&adapter);

        let device = Device::new("dev-1", "<Device/>");
        adapter.send_device(device.clone());
        adapter.send_device(device);

        let lines = drain(&mut rx);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("|@DEVICE@|dev-1|<Device/>"));
    }

    #[tokio::test]
    async fn removals_do_not_touch_stored_tables() {
        let adapter = offline_adapter(AdapterConfig::new());
        let (_, mut rx) = probe_client(&adapter);

        adapter.send_asset(Asset::new("M8.123", "CuttingTool", "<a/>").with_timestamp(T));
        drain(&mut rx);

        adapter.remove_asset("M8.123", Some(T + 1));
        let lines = drain(&mut rx);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("@REMOVE_ASSET@|M8.123"));

        // The asset table still holds the asset; re-sending the same body is
        // still considered unchanged.
        assert_eq!(adapter.inner.store.asset_count(), 1);
    }
}
