//! Value records for everything an adapter can publish.
//!
//! A single [`Observation`] struct with an [`ObservationPayload`] tagged union
//! covers the six observation kinds; [`Asset`] and [`Device`] carry opaque
//! serialized bodies published on their own command lines.
//!
//! Observations are plain values. The transient "has this been sent" flag
//! lives in the adapter's state store, not here, so records can be cloned and
//! shipped around freely.

use crate::change_id::ChangeId;

// ════════════════════════════════════════════════════════════════════
// Kinds
// ════════════════════════════════════════════════════════════════════

/// Discriminant for the six observation kinds.
///
/// The adapter keys its per-kind state tables on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationKind {
    Sample,
    Message,
    Condition,
    TimeSeries,
    DataSet,
    Table,
}

impl ObservationKind {
    /// All kinds, in the order the adapter iterates its tables.
    pub const ALL: [ObservationKind; 6] = [
        ObservationKind::Sample,
        ObservationKind::Message,
        ObservationKind::Condition,
        ObservationKind::TimeSeries,
        ObservationKind::DataSet,
        ObservationKind::Table,
    ];
}

// ════════════════════════════════════════════════════════════════════
// Condition fault states
// ════════════════════════════════════════════════════════════════════

/// Severity level of a single condition fault state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionLevel {
    Normal,
    Warning,
    Fault,
    Unavailable,
}

impl ConditionLevel {
    /// The literal emitted on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionLevel::Normal => "NORMAL",
            ConditionLevel::Warning => "WARNING",
            ConditionLevel::Fault => "FAULT",
            ConditionLevel::Unavailable => "UNAVAILABLE",
        }
    }

    /// Parse a wire literal back into a level.
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "NORMAL" => Some(ConditionLevel::Normal),
            "WARNING" => Some(ConditionLevel::Warning),
            "FAULT" => Some(ConditionLevel::Fault),
            "UNAVAILABLE" => Some(ConditionLevel::Unavailable),
            _ => None,
        }
    }
}

/// One fault state of a condition observation.
///
/// A condition carries an ordered list of these; each becomes its own line on
/// the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FaultState {
    pub level: Option<ConditionLevel>,
    pub native_code: Option<String>,
    pub native_severity: Option<String>,
    pub qualifier: Option<String>,
    pub message: Option<String>,
}

impl FaultState {
    /// A `NORMAL` state clearing every active fault for the condition.
    pub fn normal() -> Self {
        Self {
            level: Some(ConditionLevel::Normal),
            ..Self::default()
        }
    }

    /// A fault state at the given level with a message text.
    pub fn fault(level: ConditionLevel, message: impl Into<String>) -> Self {
        Self {
            level: Some(level),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_native_code(mut self, code: impl Into<String>) -> Self {
        self.native_code = Some(code.into());
        self
    }

    pub fn with_native_severity(mut self, severity: impl Into<String>) -> Self {
        self.native_severity = Some(severity.into());
        self
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }
}

// ════════════════════════════════════════════════════════════════════
// Set and table entries
// ════════════════════════════════════════════════════════════════════

/// A key-value entry of a data set, or a single cell of a table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSetEntry {
    pub key: String,
    pub value: String,
    /// Removed entries are written `key=` so the agent drops them.
    pub removed: bool,
}

impl DataSetEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            removed: false,
        }
    }

    pub fn removed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: String::new(),
            removed: true,
        }
    }
}

/// One row of a table observation: a keyed set of cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub key: String,
    pub cells: Vec<DataSetEntry>,
    pub removed: bool,
}

impl TableRow {
    pub fn new(key: impl Into<String>, cells: Vec<DataSetEntry>) -> Self {
        Self {
            key: key.into(),
            cells,
            removed: false,
        }
    }

    pub fn removed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            cells: Vec::new(),
            removed: true,
        }
    }
}

// ════════════════════════════════════════════════════════════════════
// Observation
// ════════════════════════════════════════════════════════════════════

/// Per-kind payload of an observation.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationPayload {
    /// A single scalar reading. Producers format numerics themselves.
    Sample { value: String },
    /// A message text with an optional native code.
    Message {
        value: String,
        native_code: Option<String>,
    },
    /// An ordered list of fault states.
    Condition { states: Vec<FaultState> },
    /// A waveform: sample rate in Hz (empty field when unspecified) and the
    /// sample vector. The wire count is derived from `samples.len()`.
    TimeSeries {
        rate_hz: Option<f64>,
        samples: Vec<f64>,
    },
    /// A set of key-value entries.
    DataSet { entries: Vec<DataSetEntry> },
    /// A set of rows, each a set of cells.
    Table { rows: Vec<TableRow> },
}

impl ObservationPayload {
    pub fn kind(&self) -> ObservationKind {
        match self {
            ObservationPayload::Sample { .. } => ObservationKind::Sample,
            ObservationPayload::Message { .. } => ObservationKind::Message,
            ObservationPayload::Condition { .. } => ObservationKind::Condition,
            ObservationPayload::TimeSeries { .. } => ObservationKind::TimeSeries,
            ObservationPayload::DataSet { .. } => ObservationKind::DataSet,
            ObservationPayload::Table { .. } => ObservationKind::Table,
        }
    }

    /// An empty payload of the given kind, used when synthesizing
    /// UNAVAILABLE observations.
    pub fn empty_of_kind(kind: ObservationKind) -> Self {
        match kind {
            ObservationKind::Sample => ObservationPayload::Sample {
                value: String::new(),
            },
            ObservationKind::Message => ObservationPayload::Message {
                value: String::new(),
                native_code: None,
            },
            ObservationKind::Condition => ObservationPayload::Condition { states: Vec::new() },
            ObservationKind::TimeSeries => ObservationPayload::TimeSeries {
                rate_hz: None,
                samples: Vec::new(),
            },
            ObservationKind::DataSet => ObservationPayload::DataSet {
                entries: Vec::new(),
            },
            ObservationKind::Table => ObservationPayload::Table { rows: Vec::new() },
        }
    }
}

/// A single timestamped reading of one data item.
///
/// `timestamp_ms = 0` means "stamp me on submit"; the adapter replaces it with
/// the current wall clock before the observation enters the state store.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Device scope. `None` means "the adapter's default device"; the adapter
    /// stamps its configured default on submit.
    pub device_key: Option<String>,
    /// The observation stream key, opaque to the adapter.
    pub data_item_key: String,
    /// Milliseconds since the Unix epoch; `0` = stamp on submit.
    pub timestamp_ms: i64,
    /// When set, the payload is ignored on the wire and the `UNAVAILABLE`
    /// sentinel is emitted instead.
    pub unavailable: bool,
    pub payload: ObservationPayload,
}

impl Observation {
    /// A simple scalar data item.
    pub fn sample(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            device_key: None,
            data_item_key: key.into(),
            timestamp_ms: 0,
            unavailable: false,
            payload: ObservationPayload::Sample {
                value: value.into(),
            },
        }
    }

    /// A message with an optional native code.
    pub fn message(
        key: impl Into<String>,
        value: impl Into<String>,
        native_code: Option<String>,
    ) -> Self {
        Self {
            device_key: None,
            data_item_key: key.into(),
            timestamp_ms: 0,
            unavailable: false,
            payload: ObservationPayload::Message {
                value: value.into(),
                native_code,
            },
        }
    }

    /// A condition carrying the given fault states.
    pub fn condition(key: impl Into<String>, states: Vec<FaultState>) -> Self {
        Self {
            device_key: None,
            data_item_key: key.into(),
            timestamp_ms: 0,
            unavailable: false,
            payload: ObservationPayload::Condition { states },
        }
    }

    /// A time series with the given samples and optional rate in Hz.
    pub fn time_series(key: impl Into<String>, samples: Vec<f64>, rate_hz: Option<f64>) -> Self {
        Self {
            device_key: None,
            data_item_key: key.into(),
            timestamp_ms: 0,
            unavailable: false,
            payload: ObservationPayload::TimeSeries { rate_hz, samples },
        }
    }

    /// A data set observation.
    pub fn data_set(key: impl Into<String>, entries: Vec<DataSetEntry>) -> Self {
        Self {
            device_key: None,
            data_item_key: key.into(),
            timestamp_ms: 0,
            unavailable: false,
            payload: ObservationPayload::DataSet { entries },
        }
    }

    /// A table observation.
    pub fn table(key: impl Into<String>, rows: Vec<TableRow>) -> Self {
        Self {
            device_key: None,
            data_item_key: key.into(),
            timestamp_ms: 0,
            unavailable: false,
            payload: ObservationPayload::Table { rows },
        }
    }

    /// An UNAVAILABLE observation of the given kind for `key`.
    ///
    /// The payload is empty; the unavailable marker is what reaches both the
    /// wire and the content hash.
    pub fn unavailable_of_kind(key: impl Into<String>, kind: ObservationKind) -> Self {
        Self {
            device_key: None,
            data_item_key: key.into(),
            timestamp_ms: 0,
            unavailable: true,
            payload: ObservationPayload::empty_of_kind(kind),
        }
    }

    pub fn kind(&self) -> ObservationKind {
        self.payload.kind()
    }

    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn with_device_key(mut self, device_key: impl Into<String>) -> Self {
        self.device_key = Some(device_key.into());
        self
    }

    /// Content hash of the payload (timestamp excluded).
    pub fn change_id(&self) -> ChangeId {
        ChangeId::of_observation(self)
    }

    /// The UNAVAILABLE twin of this observation: same key, same device scope,
    /// same kind, empty payload, unavailable marker set.
    pub fn to_unavailable(&self) -> Self {
        Self {
            device_key: self.device_key.clone(),
            data_item_key: self.data_item_key.clone(),
            timestamp_ms: 0,
            unavailable: true,
            payload: ObservationPayload::empty_of_kind(self.kind()),
        }
    }
}

// ════════════════════════════════════════════════════════════════════
// Assets and devices
// ════════════════════════════════════════════════════════════════════

/// An asset with an already-serialized body, opaque to the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub asset_id: String,
    pub asset_type: String,
    /// Milliseconds since the Unix epoch; `<= 0` = stamp on publish.
    pub timestamp_ms: i64,
    pub body: String,
}

impl Asset {
    pub fn new(
        asset_id: impl Into<String>,
        asset_type: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            asset_type: asset_type.into(),
            timestamp_ms: 0,
            body: body.into(),
        }
    }

    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// Content hash over type and body; the timestamp does not participate.
    pub fn change_id(&self) -> ChangeId {
        ChangeId::of_asset(self)
    }
}

/// A device model with an already-serialized body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub device_uuid: String,
    pub body: String,
}

impl Device {
    pub fn new(device_uuid: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            device_uuid: device_uuid.into(),
            body: body.into(),
        }
    }

    /// Content hash over the body.
    pub fn change_id(&self) -> ChangeId {
        ChangeId::of_device(self)
    }
}

// ════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════
