//! Per-adapter observation state.
//!
//! Two table-of-tables keyed by observation kind: `current` holds the most
//! recently accepted observation per data item key (with its transient sent
//! flag), `last` holds the most recently transmitted one and feeds reconnect
//! replay. Asset and device tables sit beside them.
//!
//! One `std::sync::Mutex` guards everything. Critical sections are map
//! operations only — change ids are computed by the caller before taking the
//! lock, and all encoding and socket I/O happens after releasing it.

use std::collections::HashMap;
use std::sync::Mutex;

use shdr_protocol::{Asset, ChangeId, Device, Observation, ObservationKind};

/// Outcome of [`StateStore::accept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// The observation replaced (or created) the current entry.
    Accepted,
    /// Dropped: same change id as the current entry with duplicate
    /// filtering enabled.
    Duplicate,
}

struct Tracked {
    obs: Observation,
    change_id: ChangeId,
    sent: bool,
}

#[derive(Default)]
struct Tables {
    current: HashMap<ObservationKind, HashMap<String, Tracked>>,
    /// Keys accepted since the previous dispatch, in acceptance order. A key
    /// already pending is not re-queued when replaced; it keeps its slot.
    pending: Vec<(ObservationKind, String)>,
    last: HashMap<ObservationKind, HashMap<String, Observation>>,
    assets: HashMap<String, (Asset, ChangeId)>,
    devices: HashMap<String, (Device, ChangeId)>,
}

pub struct StateStore {
    inner: Mutex<Tables>,
    filter_duplicates: bool,
}

impl StateStore {
    pub fn new(filter_duplicates: bool) -> Self {
        Self {
            inner: Mutex::new(Tables::default()),
            filter_duplicates,
        }
    }

    /// Accept an observation into `current`, deduplicating by change id.
    ///
    /// The caller has already stamped defaults; the change id is hashed here,
    /// before the lock is taken.
    pub fn accept(&self, obs: Observation) -> Acceptance {
        let change_id = obs.change_id();
        let kind = obs.kind();
        let key = obs.data_item_key.clone();

        let mut tables = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let table = tables.current.entry(kind).or_default();

        let was_pending = match table.get(&key) {
            Some(existing) => {
                if self.filter_duplicates && existing.change_id == change_id {
                    return Acceptance::Duplicate;
                }
                !existing.sent
            }
            None => false,
        };

        table.insert(
            key.clone(),
            Tracked {
                obs,
                change_id,
                sent: false,
            },
        );
        if !was_pending {
            tables.pending.push((kind, key));
        }
        Acceptance::Accepted
    }

    /// Snapshot every unsent observation in acceptance order, flipping the
    /// sent flag in place.
    pub fn take_unsent(&self) -> Vec<Observation> {
        let mut tables = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let pending = std::mem::take(&mut tables.pending);
        let mut out = Vec::with_capacity(pending.len());
        for (kind, key) in pending {
            if let Some(tracked) = tables
                .current
                .get_mut(&kind)
                .and_then(|table| table.get_mut(&key))
            {
                if !tracked.sent {
                    tracked.sent = true;
                    out.push(tracked.obs.clone());
                }
            }
        }
        out
    }

    /// Record a dispatched batch into `last`, keeping the most recent entry
    /// per key by timestamp.
    pub fn mark_last(&self, batch: &[Observation]) {
        let mut tables = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for obs in batch {
            let table = tables.last.entry(obs.kind()).or_default();
            match table.get(&obs.data_item_key) {
                Some(existing) if existing.timestamp_ms > obs.timestamp_ms => {}
                _ => {
                    table.insert(obs.data_item_key.clone(), obs.clone());
                }
            }
        }
    }

    /// Clone every `last` entry, grouped by kind in [`ObservationKind::ALL`]
    /// order. Order within a kind is unspecified; callers sort outside the
    /// lock if they need determinism.
    pub fn snapshot_last(&self) -> Vec<Observation> {
        let tables = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::new();
        for kind in ObservationKind::ALL {
            if let Some(table) = tables.last.get(&kind) {
                out.extend(table.values().cloned());
            }
        }
        out
    }

    /// Clone every `current` entry (sent or not), grouped by kind.
    pub fn snapshot_current(&self) -> Vec<Observation> {
        let tables = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::new();
        for kind in ObservationKind::ALL {
            if let Some(table) = tables.current.get(&kind) {
                out.extend(table.values().map(|t| t.obs.clone()));
            }
        }
        out
    }

    /// Store an asset if its content differs from what is already held.
    /// Returns `true` when the asset changed and should go on the wire.
    pub fn upsert_asset(&self, asset: &Asset) -> bool {
        let change_id = asset.change_id();
        let mut tables = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match tables.assets.get(&asset.asset_id) {
            Some((_, existing)) if *existing == change_id => false,
            _ => {
                tables
                    .assets
                    .insert(asset.asset_id.clone(), (asset.clone(), change_id));
                true
            }
        }
    }

    /// Store a device if its content differs. Returns `true` on change.
    pub fn upsert_device(&self, device: &Device) -> bool {
        let change_id = device.change_id();
        let mut tables = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match tables.devices.get(&device.device_uuid) {
            Some((_, existing)) if *existing == change_id => false,
            _ => {
                tables
                    .devices
                    .insert(device.device_uuid.clone(), (device.clone(), change_id));
                true
            }
        }
    }

    pub fn asset_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).assets.len()
    }

    pub fn device_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).devices.len()
    }
}

// ════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════
