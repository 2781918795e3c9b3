//! Content hashing for duplicate suppression.
//!
//! Every observation, asset, and device carries a [`ChangeId`]: a SHA-256
//! digest of a canonical serialization of its payload. Two records with equal
//! change ids are semantically identical, so the adapter can drop the second
//! without looking at the payload again.
//!
//! Canonical form rules:
//!
//! - the timestamp never participates;
//! - fields are joined with the `0x1F` unit separator so concatenation cannot
//!   alias across field boundaries;
//! - every record starts with a kind tag, so equal payload bytes of different
//!   kinds never collide;
//! - set and table entries are sorted by key before hashing, making entry
//!   order irrelevant;
//! - an unavailable observation hashes the `UNAVAILABLE` sentinel instead of
//!   its (empty) payload, so toggling availability always changes the hash.

use core::fmt;

use sha2::{Digest, Sha256};

use crate::observation::{Asset, Device, Observation, ObservationKind, ObservationPayload};

/// Field separator in the canonical form. Never valid in SHDR text, which is
/// printable ASCII.
const US: u8 = 0x1F;

/// Opaque 32-byte content hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeId([u8; 32]);

impl ChangeId {
    /// Hash an observation's payload.
    pub fn of_observation(obs: &Observation) -> Self {
        let mut hasher = Sha256::new();
        hasher.update([kind_tag(obs.kind())]);
        if obs.unavailable {
            push(&mut hasher, "UNAVAILABLE");
            return Self(hasher.finalize().into());
        }
        match &obs.payload {
            ObservationPayload::Sample { value } => {
                push(&mut hasher, value);
            }
            ObservationPayload::Message { value, native_code } => {
                push_opt(&mut hasher, native_code.as_deref());
                push(&mut hasher, value);
            }
            ObservationPayload::Condition { states } => {
                for state in states {
                    push_opt(&mut hasher, state.level.map(|l| l.as_str()));
                    push_opt(&mut hasher, state.native_code.as_deref());
                    push_opt(&mut hasher, state.native_severity.as_deref());
                    push_opt(&mut hasher, state.qualifier.as_deref());
                    push_opt(&mut hasher, state.message.as_deref());
                }
            }
            ObservationPayload::TimeSeries { rate_hz, samples } => {
                push_opt(&mut hasher, rate_hz.map(|r| r.to_string()).as_deref());
                for sample in samples {
                    push(&mut hasher, &sample.to_string());
                }
            }
            ObservationPayload::DataSet { entries } => {
                let mut sorted: Vec<_> = entries.iter().collect();
                sorted.sort_by(|a, b| a.key.cmp(&b.key));
                for entry in sorted {
                    push(&mut hasher, &entry.key);
                    push(&mut hasher, &entry.value);
                    push(&mut hasher, if entry.removed { "1" } else { "0" });
                }
            }
            ObservationPayload::Table { rows } => {
                let mut sorted: Vec<_> = rows.iter().collect();
                sorted.sort_by(|a, b| a.key.cmp(&b.key));
                for row in sorted {
                    push(&mut hasher, &row.key);
                    push(&mut hasher, if row.removed { "1" } else { "0" });
                    let mut cells: Vec<_> = row.cells.iter().collect();
                    cells.sort_by(|a, b| a.key.cmp(&b.key));
                    for cell in cells {
                        push(&mut hasher, &cell.key);
                        push(&mut hasher, &cell.value);
                        push(&mut hasher, if cell.removed { "1" } else { "0" });
                    }
                }
            }
        }
        Self(hasher.finalize().into())
    }

    /// Hash an asset's type and body.
    pub fn of_asset(asset: &Asset) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"asset");
        push(&mut hasher, &asset.asset_type);
        push(&mut hasher, &asset.body);
        Self(hasher.finalize().into())
    }

    /// Hash a device's body.
    pub fn of_device(device: &Device) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"device");
        push(&mut hasher, &device.body);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

fn kind_tag(kind: ObservationKind) -> u8 {
    match kind {
        ObservationKind::Sample => b'S',
        ObservationKind::Message => b'M',
        ObservationKind::Condition => b'C',
        ObservationKind::TimeSeries => b'W',
        ObservationKind::DataSet => b'D',
        ObservationKind::Table => b'T',
    }
}

fn push(hasher: &mut Sha256, field: &str) {
    hasher.update([US]);
    hasher.update(field.as_bytes());
}

fn push_opt(hasher: &mut Sha256, field: Option<&str>) {
    hasher.update([US]);
    // An absent field must hash differently from an empty one.
    match field {
        Some(text) => {
            hasher.update([1u8]);
            hasher.update(text.as_bytes());
        }
        None => hasher.update([0u8]),
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight hex chars are enough to tell entries apart in logs.
        write!(f, "ChangeId({:02x}{:02x}{:02x}{:02x}…)", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

// ════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use crate::observation::{DataSetEntry, FaultState, Observation, ObservationKind, TableRow};

    #[test]
    fn timestamp_does_not_participate() {
        let a = Observation::sample("Xact", "12.5").with_timestamp(1);
        let b = Observation::sample("Xact", "12.5").with_timestamp(2);
        assert_eq!(a.change_id(), b.change_id());
    }

    #[test]
    fn value_changes_hash() {
        let a = Observation::sample("Xact", "12.5");
        let b = Observation::sample("Xact", "12.6");
        assert_ne!(a.change_id(), b.change_id());
    }

    #[test]
    fn unavailable_differs_from_any_value() {
        let value = Observation::sample("Xact", "");
        let unavailable = Observation::unavailable_of_kind("Xact", ObservationKind::Sample);
        assert_ne!(value.change_id(), unavailable.change_id());
    }

    #[test]
    fn kinds_never_collide() {
        // Empty payloads of different kinds share their byte serialization
        // except for the kind tag.
        let message = Observation::message("k", "", None);
        let sample = Observation::sample("k", "");
        assert_ne!(message.change_id(), sample.change_id());
    }

    #[test]
    fn absent_and_empty_fields_differ() {
        let absent = Observation::message("k", "v", None);
        let empty = Observation::message("k", "v", Some(String::new()));
        assert_ne!(absent.change_id(), empty.change_id());
    }

    #[test]
    fn data_set_entry_order_is_irrelevant() {
        let a = Observation::data_set(
            "set",
            vec![DataSetEntry::new("x", "1"), DataSetEntry::new("y", "2")],
        );
        let b = Observation::data_set(
            "set",
            vec![DataSetEntry::new("y", "2"), DataSetEntry::new("x", "1")],
        );
        assert_eq!(a.change_id(), b.change_id());
    }

    #[test]
    fn removed_entry_changes_hash() {
        let present = Observation::data_set("set", vec![DataSetEntry::new("x", "")]);
        let removed = Observation::data_set("set", vec![DataSetEntry::removed("x")]);
        assert_ne!(present.change_id(), removed.change_id());
    }

    #[test]
    fn table_row_order_is_irrelevant() {
        let r1 = TableRow::new("r1", vec![DataSetEntry::new("c", "1")]);
        let r2 = TableRow::new("r2", vec![DataSetEntry::new("c", "2")]);
        let a = Observation::table("t", vec![r1.clone(), r2.clone()]);
        let b = Observation::table("t", vec![r2, r1]);
        assert_eq!(a.change_id(), b.change_id());
    }

    #[test]
    fn condition_state_order_matters() {
        let warn = FaultState::fault(crate::observation::ConditionLevel::Warning, "w");
        let fault = FaultState::fault(crate::observation::ConditionLevel::Fault, "f");
        let a = Observation::condition("c", vec![warn.clone(), fault.clone()]);
        let b = Observation::condition("c", vec![fault, warn]);
        assert_ne!(a.change_id(), b.change_id());
    }

    #[test]
    fn hex_display_is_64_chars() {
        let id = Observation::sample("k", "v").change_id();
        let hex = id.to_string();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
