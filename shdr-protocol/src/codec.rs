//! SHDR line encoding and inbound classification.
//!
//! Everything here is a pure function from records to text (or back). The
//! adapter calls [`encode_observation`] / [`encode_samples_batch`] outside its
//! state lock and ships the resulting lines to every connected agent.
//!
//! # Line layouts
//!
//! | Kind | Layout |
//! |------|--------|
//! | Sample | `ts\|key\|value` |
//! | Message | `ts\|key\|native_code\|text` |
//! | Condition | `ts\|key\|LEVEL\|native_code\|severity\|qualifier\|message` (one line per fault state) |
//! | TimeSeries | `ts\|key\|count\|rate\|v1 v2 v3` |
//! | DataSet | `ts\|key\|k1=v1 k2=v2` (`k1=` removes an entry) |
//! | Table | `ts\|key\|r1={c1=v1 c2=v2} r2=` |
//! | Asset | `ts\|@ASSET@\|id\|type\|body` |
//! | Device | `ts\|@DEVICE@\|uuid\|body` |
//!
//! A key is rendered `device_key:data_item_key` when the observation carries a
//! device scope; otherwise the bare data item key. `UNAVAILABLE` replaces the
//! payload fields of any unavailable observation.
//!
//! `|` is rejected in every field except message bodies, condition message
//! texts, and asset/device bodies, where it cannot be confused with a field
//! separator because the field is the last one on the line. Non-ASCII text is
//! rejected everywhere; agents interpret the stream as ASCII.

use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::observation::{
    Asset, ConditionLevel, DataSetEntry, Device, FaultState, Observation, ObservationKind,
    ObservationPayload, TableRow,
};

// ════════════════════════════════════════════════════════════════════
// Reserved tokens
// ════════════════════════════════════════════════════════════════════

/// Heartbeat request sent by agents.
pub const PING: &str = "* PING";
/// Heartbeat reply prefix; the heartbeat interval in ms follows.
pub const PONG_PREFIX: &str = "* PONG";
/// The sentinel for a missing value.
pub const UNAVAILABLE: &str = "UNAVAILABLE";

pub const ASSET_COMMAND: &str = "@ASSET@";
pub const REMOVE_ASSET_COMMAND: &str = "@REMOVE_ASSET@";
pub const REMOVE_ALL_ASSETS_COMMAND: &str = "@REMOVE_ALL_ASSETS@";
pub const DEVICE_COMMAND: &str = "@DEVICE@";
pub const REMOVE_DEVICE_COMMAND: &str = "@REMOVE_DEVICE@";
pub const REMOVE_ALL_DEVICES_COMMAND: &str = "@REMOVE_ALL_DEVICES@";

/// Prefix of the sentinel bracketing multi-line asset and device bodies.
pub const MULTILINE_PREFIX: &str = "--multiline--";

// ════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════

/// Errors raised while encoding or decoding SHDR text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// `|` in a field that is not the last one on its line.
    #[error("field `{field}` contains an embedded '|'")]
    EmbeddedPipe { field: &'static str },

    /// Non-ASCII or control bytes in a field.
    #[error("field `{field}` contains non-ASCII or control characters")]
    InvalidText { field: &'static str },

    /// Whitespace in a field whose entries are space-separated on the wire.
    #[error("field `{field}` contains whitespace")]
    EmbeddedWhitespace { field: &'static str },

    /// A newline in an asset or device body without multiline framing.
    #[error("body contains newlines; enable multiline framing")]
    EmbeddedNewline,

    /// A timestamp chrono cannot represent.
    #[error("timestamp {timestamp_ms} ms is out of range")]
    TimestampRange { timestamp_ms: i64 },

    /// Inbound text that does not parse as the expected layout.
    #[error("malformed line: {reason}")]
    Malformed { reason: String },
}

pub type CodecResult<T> = Result<T, CodecError>;

// ════════════════════════════════════════════════════════════════════
// Timestamps
// ════════════════════════════════════════════════════════════════════

/// Format epoch milliseconds as ISO-8601 UTC with millisecond precision and a
/// trailing `Z`, e.g. `2023-11-14T22:13:20.000Z`.
pub fn format_timestamp(timestamp_ms: i64) -> CodecResult<String> {
    let dt = Utc
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .ok_or(CodecError::TimestampRange { timestamp_ms })?;
    Ok(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

/// Parse an ISO-8601 timestamp back into epoch milliseconds.
pub fn parse_timestamp(text: &str) -> CodecResult<i64> {
    let dt = DateTime::parse_from_rfc3339(text).map_err(|e| CodecError::Malformed {
        reason: format!("bad timestamp '{}': {}", text, e),
    })?;
    Ok(dt.with_timezone(&Utc).timestamp_millis())
}

// ════════════════════════════════════════════════════════════════════
// Field validation
// ════════════════════════════════════════════════════════════════════

fn check_text(field: &'static str, value: &str) -> CodecResult<()> {
    if value.chars().any(|c| !c.is_ascii() || c.is_ascii_control()) {
        return Err(CodecError::InvalidText { field });
    }
    Ok(())
}

/// An interior field: printable ASCII, no `|`.
fn check_field(field: &'static str, value: &str) -> CodecResult<()> {
    check_text(field, value)?;
    if value.contains('|') {
        return Err(CodecError::EmbeddedPipe { field });
    }
    Ok(())
}

/// A token inside a space-separated list: additionally no whitespace, and no
/// `=` or braces which would break entry parsing.
fn check_token(field: &'static str, value: &str) -> CodecResult<()> {
    check_field(field, value)?;
    if value.contains(char::is_whitespace) {
        return Err(CodecError::EmbeddedWhitespace { field });
    }
    Ok(())
}

fn check_entry_key(field: &'static str, value: &str) -> CodecResult<()> {
    check_token(field, value)?;
    if value.contains(['=', '{', '}']) {
        return Err(CodecError::InvalidText { field });
    }
    Ok(())
}

// ════════════════════════════════════════════════════════════════════
// Observation encoding
// ════════════════════════════════════════════════════════════════════

fn wire_key(obs: &Observation) -> CodecResult<String> {
    check_field("data_item_key", &obs.data_item_key)?;
    match &obs.device_key {
        Some(device) => {
            check_field("device_key", device)?;
            Ok(format!("{}:{}", device, obs.data_item_key))
        }
        None => Ok(obs.data_item_key.clone()),
    }
}

/// Encode one observation into one or more complete SHDR lines.
///
/// Conditions produce one line per fault state; every other kind produces a
/// single line. An unavailable observation of any kind produces
/// `ts|key|UNAVAILABLE`.
pub fn encode_observation(obs: &Observation) -> CodecResult<Vec<String>> {
    let ts = format_timestamp(obs.timestamp_ms)?;
    let key = wire_key(obs)?;

    if obs.unavailable {
        return Ok(vec![format!("{}|{}|{}", ts, key, UNAVAILABLE)]);
    }

    match &obs.payload {
        ObservationPayload::Sample { value } => {
            check_field("value", value)?;
            Ok(vec![format!("{}|{}|{}", ts, key, value)])
        }
        ObservationPayload::Message { value, native_code } => {
            // The message text is the last field; embedded '|' is legal there.
            check_text("message", value)?;
            let code = native_code.as_deref().unwrap_or("");
            check_field("native_code", code)?;
            Ok(vec![format!("{}|{}|{}|{}", ts, key, code, value)])
        }
        ObservationPayload::Condition { states } => states
            .iter()
            .map(|state| encode_fault_state(&ts, &key, state))
            .collect(),
        ObservationPayload::TimeSeries { rate_hz, samples } => {
            let rate = rate_hz.map(|r| r.to_string()).unwrap_or_default();
            let rendered: Vec<String> = samples.iter().map(|s| s.to_string()).collect();
            Ok(vec![format!(
                "{}|{}|{}|{}|{}",
                ts,
                key,
                samples.len(),
                rate,
                rendered.join(" ")
            )])
        }
        ObservationPayload::DataSet { entries } => {
            let rendered: Vec<String> = entries
                .iter()
                .map(|e| encode_entry(e))
                .collect::<CodecResult<_>>()?;
            Ok(vec![format!("{}|{}|{}", ts, key, rendered.join(" "))])
        }
        ObservationPayload::Table { rows } => {
            let rendered: Vec<String> = rows
                .iter()
                .map(encode_row)
                .collect::<CodecResult<_>>()?;
            Ok(vec![format!("{}|{}|{}", ts, key, rendered.join(" "))])
        }
    }
}

fn encode_fault_state(ts: &str, key: &str, state: &FaultState) -> CodecResult<String> {
    let level = state.level.map(|l| l.as_str()).unwrap_or("");
    let code = state.native_code.as_deref().unwrap_or("");
    let severity = state.native_severity.as_deref().unwrap_or("");
    let qualifier = state.qualifier.as_deref().unwrap_or("");
    let message = state.message.as_deref().unwrap_or("");
    check_field("native_code", code)?;
    check_field("native_severity", severity)?;
    check_field("qualifier", qualifier)?;
    // The condition message is the last field and may carry '|'.
    check_text("message", message)?;
    Ok(format!(
        "{}|{}|{}|{}|{}|{}|{}",
        ts, key, level, code, severity, qualifier, message
    ))
}

fn encode_entry(entry: &DataSetEntry) -> CodecResult<String> {
    check_entry_key("data_set_key", &entry.key)?;
    if entry.removed {
        return Ok(format!("{}=", entry.key));
    }
    check_token("data_set_value", &entry.value)?;
    Ok(format!("{}={}", entry.key, entry.value))
}

fn encode_row(row: &TableRow) -> CodecResult<String> {
    check_entry_key("table_row_key", &row.key)?;
    if row.removed {
        return Ok(format!("{}=", row.key));
    }
    let cells: Vec<String> = row
        .cells
        .iter()
        .map(|c| encode_entry(c))
        .collect::<CodecResult<_>>()?;
    Ok(format!("{}={{{}}}", row.key, cells.join(" ")))
}

/// Concatenate simple samples sharing one timestamp into a single line:
/// `ts|k1|v1|k2|v2|…`.
///
/// Every observation must be of kind [`ObservationKind::Sample`] and carry the
/// same timestamp; the caller groups before encoding.
pub fn encode_samples_batch(batch: &[&Observation]) -> CodecResult<String> {
    let first = batch.first().ok_or_else(|| CodecError::Malformed {
        reason: "empty sample batch".into(),
    })?;
    debug_assert!(batch
        .iter()
        .all(|o| o.kind() == ObservationKind::Sample && o.timestamp_ms == first.timestamp_ms));

    let ts = format_timestamp(first.timestamp_ms)?;
    let mut line = ts;
    for obs in batch {
        let key = wire_key(obs)?;
        let value = match &obs.payload {
            _ if obs.unavailable => UNAVAILABLE,
            ObservationPayload::Sample { value } => {
                check_field("value", value)?;
                value.as_str()
            }
            _ => {
                return Err(CodecError::Malformed {
                    reason: "sample batch contains a non-sample observation".into(),
                })
            }
        };
        line.push('|');
        line.push_str(&key);
        line.push('|');
        line.push_str(value);
    }
    Ok(line)
}

// ════════════════════════════════════════════════════════════════════
// Asset and device commands
// ════════════════════════════════════════════════════════════════════

/// Derive the multiline sentinel for a body: `--multiline--<HASH>` where the
/// hash prefix is extended until the body cannot contain the sentinel.
fn multiline_marker(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    let mut len = 8;
    loop {
        let marker = format!("{}{}", MULTILINE_PREFIX, &hex[..len]);
        // A body containing the full hash of itself cannot be constructed.
        if !body.contains(&marker) || len == hex.len() {
            return marker;
        }
        len = (len + 8).min(hex.len());
    }
}

fn encode_body_lines(
    header: String,
    body: &str,
    multiline: bool,
) -> CodecResult<Vec<String>> {
    if !multiline {
        if body.contains('\n') || body.contains('\r') {
            return Err(CodecError::EmbeddedNewline);
        }
        return Ok(vec![format!("{}|{}", header, body)]);
    }
    let marker = multiline_marker(body);
    let mut lines = vec![format!("{}|{}", header, marker)];
    for line in body.lines() {
        lines.push(line.to_string());
    }
    lines.push(marker);
    Ok(lines)
}

/// Encode an asset publication: `ts|@ASSET@|id|type|body`, or multiline
/// framing when the body spans lines.
pub fn encode_asset(asset: &Asset, multiline: bool) -> CodecResult<Vec<String>> {
    let ts = format_timestamp(asset.timestamp_ms)?;
    check_field("asset_id", &asset.asset_id)?;
    check_field("asset_type", &asset.asset_type)?;
    encode_body_lines(
        format!("{}|{}|{}|{}", ts, ASSET_COMMAND, asset.asset_id, asset.asset_type),
        &asset.body,
        multiline,
    )
}

/// `ts|@REMOVE_ASSET@|asset_id`
pub fn encode_asset_removal(asset_id: &str, timestamp_ms: i64) -> CodecResult<String> {
    check_field("asset_id", asset_id)?;
    Ok(format!(
        "{}|{}|{}",
        format_timestamp(timestamp_ms)?,
        REMOVE_ASSET_COMMAND,
        asset_id
    ))
}

/// `ts|@REMOVE_ALL_ASSETS@|asset_type`
pub fn encode_all_assets_removal(asset_type: &str, timestamp_ms: i64) -> CodecResult<String> {
    check_field("asset_type", asset_type)?;
    Ok(format!(
        "{}|{}|{}",
        format_timestamp(timestamp_ms)?,
        REMOVE_ALL_ASSETS_COMMAND,
        asset_type
    ))
}

/// Encode a device publication: `ts|@DEVICE@|uuid|body`.
pub fn encode_device(
    device: &Device,
    timestamp_ms: i64,
    multiline: bool,
) -> CodecResult<Vec<String>> {
    let ts = format_timestamp(timestamp_ms)?;
    check_field("device_uuid", &device.device_uuid)?;
    encode_body_lines(
        format!("{}|{}|{}", ts, DEVICE_COMMAND, device.device_uuid),
        &device.body,
        multiline,
    )
}

/// `ts|@REMOVE_DEVICE@|device_uuid`
pub fn encode_device_removal(device_uuid: &str, timestamp_ms: i64) -> CodecResult<String> {
    check_field("device_uuid", device_uuid)?;
    Ok(format!(
        "{}|{}|{}",
        format_timestamp(timestamp_ms)?,
        REMOVE_DEVICE_COMMAND,
        device_uuid
    ))
}

/// `ts|@REMOVE_ALL_DEVICES@`
pub fn encode_all_devices_removal(timestamp_ms: i64) -> CodecResult<String> {
    Ok(format!(
        "{}|{}",
        format_timestamp(timestamp_ms)?,
        REMOVE_ALL_DEVICES_COMMAND
    ))
}

// ════════════════════════════════════════════════════════════════════
// Heartbeat
// ════════════════════════════════════════════════════════════════════

/// The reply to `* PING`: `* PONG <heartbeat_ms>`.
pub fn pong_line(heartbeat_ms: u64) -> String {
    format!("{} {}", PONG_PREFIX, heartbeat_ms)
}

// ════════════════════════════════════════════════════════════════════
// Inbound classification
// ════════════════════════════════════════════════════════════════════

/// A line received from an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundLine {
    /// `* PING` — answer with [`pong_line`].
    Ping,
    /// Anything else. Logged and ignored; the connection is preserved.
    Unexpected(String),
}

/// Split an inbound buffer on line endings, trim, drop empties, and classify
/// each remaining line.
pub fn decode_inbound(text: &str) -> Vec<InboundLine> {
    text.split('\n')
        .map(|line| line.trim_end_matches('\r').trim())
        .filter(|line| !line.is_empty())
        .map(|line| {
            if line == PING {
                InboundLine::Ping
            } else {
                InboundLine::Unexpected(line.to_string())
            }
        })
        .collect()
}

// ════════════════════════════════════════════════════════════════════
// Observation decoding
// ════════════════════════════════════════════════════════════════════

fn split_wire_key(text: &str) -> (Option<String>, String) {
    match text.split_once(':') {
        Some((device, key)) => (Some(device.to_string()), key.to_string()),
        None => (None, text.to_string()),
    }
}

fn opt(text: &str) -> Option<String> {
    // Empty optional fields are normalized to absent on decode.
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn decode_entry(token: &str, field: &'static str) -> CodecResult<DataSetEntry> {
    let (key, value) = token.split_once('=').ok_or_else(|| CodecError::Malformed {
        reason: format!("bad {} entry '{}'", field, token),
    })?;
    if value.is_empty() {
        Ok(DataSetEntry::removed(key))
    } else {
        Ok(DataSetEntry::new(key, value))
    }
}

/// Decode a single observation line of a known kind.
///
/// SHDR is schema-driven: the agent knows each data item's representation, so
/// the expected kind is a decode input, not something inferred from the line.
/// Conditions decode one fault state per line.
pub fn decode_observation_line(line: &str, kind: ObservationKind) -> CodecResult<Observation> {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() < 3 {
        return Err(CodecError::Malformed {
            reason: format!("expected at least 3 fields, got {}", fields.len()),
        });
    }
    let timestamp_ms = parse_timestamp(fields[0])?;
    let (device_key, data_item_key) = split_wire_key(fields[1]);

    if fields.len() == 3 && fields[2] == UNAVAILABLE {
        let mut obs = Observation::unavailable_of_kind(data_item_key, kind)
            .with_timestamp(timestamp_ms);
        obs.device_key = device_key;
        return Ok(obs);
    }

    let payload = match kind {
        ObservationKind::Sample => ObservationPayload::Sample {
            value: fields[2].to_string(),
        },
        ObservationKind::Message => {
            if fields.len() < 4 {
                return Err(CodecError::Malformed {
                    reason: "message line needs a native code field".into(),
                });
            }
            ObservationPayload::Message {
                native_code: opt(fields[2]),
                // The text is the tail of the line and may carry '|'.
                value: fields[3..].join("|"),
            }
        }
        ObservationKind::Condition => {
            if fields.len() < 7 {
                return Err(CodecError::Malformed {
                    reason: "condition line needs 7 fields".into(),
                });
            }
            let level = match fields[2] {
                "" => None,
                text => Some(ConditionLevel::parse(text).ok_or_else(|| CodecError::Malformed {
                    reason: format!("unknown condition level '{}'", text),
                })?),
            };
            ObservationPayload::Condition {
                states: vec![FaultState {
                    level,
                    native_code: opt(fields[3]),
                    native_severity: opt(fields[4]),
                    qualifier: opt(fields[5]),
                    message: opt(&fields[6..].join("|")),
                }],
            }
        }
        ObservationKind::TimeSeries => {
            if fields.len() < 5 {
                return Err(CodecError::Malformed {
                    reason: "time series line needs 5 fields".into(),
                });
            }
            let count: usize = fields[2].parse().map_err(|_| CodecError::Malformed {
                reason: format!("bad sample count '{}'", fields[2]),
            })?;
            let rate_hz = match fields[3] {
                "" => None,
                text => Some(text.parse::<f64>().map_err(|_| CodecError::Malformed {
                    reason: format!("bad sample rate '{}'", text),
                })?),
            };
            let samples: Vec<f64> = fields[4]
                .split_whitespace()
                .map(|s| {
                    s.parse::<f64>().map_err(|_| CodecError::Malformed {
                        reason: format!("bad sample '{}'", s),
                    })
                })
                .collect::<CodecResult<_>>()?;
            if samples.len() != count {
                return Err(CodecError::Malformed {
                    reason: format!("count {} but {} samples", count, samples.len()),
                });
            }
            ObservationPayload::TimeSeries { rate_hz, samples }
        }
        ObservationKind::DataSet => ObservationPayload::DataSet {
            entries: fields[2]
                .split_whitespace()
                .map(|t| decode_entry(t, "data set"))
                .collect::<CodecResult<_>>()?,
        },
        ObservationKind::Table => ObservationPayload::Table {
            rows: decode_rows(fields[2])?,
        },
    };

    Ok(Observation {
        device_key,
        data_item_key,
        timestamp_ms,
        unavailable: false,
        payload,
    })
}

fn decode_rows(text: &str) -> CodecResult<Vec<TableRow>> {
    let mut rows = Vec::new();
    let mut rest = text.trim();
    while !rest.is_empty() {
        let (key, tail) = rest.split_once('=').ok_or_else(|| CodecError::Malformed {
            reason: format!("bad table row '{}'", rest),
        })?;
        if let Some(inner) = tail.strip_prefix('{') {
            let end = inner.find('}').ok_or_else(|| CodecError::Malformed {
                reason: format!("unterminated row for '{}'", key),
            })?;
            let cells = inner[..end]
                .split_whitespace()
                .map(|t| decode_entry(t, "table cell"))
                .collect::<CodecResult<_>>()?;
            rows.push(TableRow::new(key, cells));
            rest = inner[end + 1..].trim_start();
        } else {
            // `row=` with no braces marks the row removed.
            let (_, remainder) = match tail.split_once(' ') {
                Some((head, remainder)) => (head, remainder),
                None => (tail, ""),
            };
            rows.push(TableRow::removed(key));
            rest = remainder.trim_start();
        }
    }
    Ok(rows)
}

// ════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{DataSetEntry, FaultState, Observation, TableRow};

    const T: i64 = 1_700_000_000_000;

    #[test]
    fn sample_line_layout() {
        let obs = Observation::sample("Xact", "12.5").with_timestamp(T);
        let lines = encode_observation(&obs).unwrap();
        assert_eq!(lines, vec!["2023-11-14T22:13:20.000Z|Xact|12.5"]);
    }

    #[test]
    fn device_scoped_key() {
        let obs = Observation::sample("Xact", "12.5")
            .with_device_key("M12346")
            .with_timestamp(T);
        let lines = encode_observation(&obs).unwrap();
        assert_eq!(lines, vec!["2023-11-14T22:13:20.000Z|M12346:Xact|12.5"]);
    }

    #[test]
    fn unavailable_sentinel_for_every_kind() {
        for kind in ObservationKind::ALL {
            let obs = Observation::unavailable_of_kind("k", kind).with_timestamp(T);
            let lines = encode_observation(&obs).unwrap();
            assert_eq!(lines, vec!["2023-11-14T22:13:20.000Z|k|UNAVAILABLE"]);
        }
    }

    #[test]
    fn condition_line_layout() {
        let state = FaultState::fault(ConditionLevel::Fault, "over temp")
            .with_native_code("100")
            .with_native_severity("2")
            .with_qualifier("HIGH");
        let obs = Observation::condition("servo", vec![state]).with_timestamp(T);
        let lines = encode_observation(&obs).unwrap();
        assert_eq!(
            lines,
            vec!["2023-11-14T22:13:20.000Z|servo|FAULT|100|2|HIGH|over temp"]
        );
    }

    #[test]
    fn condition_emits_one_line_per_state() {
        let obs = Observation::condition(
            "servo",
            vec![
                FaultState::fault(ConditionLevel::Warning, "warm"),
                FaultState::fault(ConditionLevel::Fault, "hot"),
            ],
        )
        .with_timestamp(T);
        let lines = encode_observation(&obs).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("|WARNING|"));
        assert!(lines[1].contains("|FAULT|"));
    }

    #[test]
    fn message_allows_pipe_in_text() {
        let obs =
            Observation::message("alarm", "temp|pressure out of band", Some("17".into()))
                .with_timestamp(T);
        let lines = encode_observation(&obs).unwrap();
        assert_eq!(
            lines,
            vec!["2023-11-14T22:13:20.000Z|alarm|17|temp|pressure out of band"]
        );
    }

    #[test]
    fn time_series_line_layout() {
        let obs =
            Observation::time_series("vib", vec![1.5, 2.0, 2.5], Some(100.0)).with_timestamp(T);
        let lines = encode_observation(&obs).unwrap();
        assert_eq!(lines, vec!["2023-11-14T22:13:20.000Z|vib|3|100|1.5 2 2.5"]);
    }

    #[test]
    fn time_series_without_rate_keeps_empty_field() {
        let obs = Observation::time_series("vib", vec![1.0], None).with_timestamp(T);
        let lines = encode_observation(&obs).unwrap();
        assert_eq!(lines, vec!["2023-11-14T22:13:20.000Z|vib|1||1"]);
    }

    #[test]
    fn data_set_layout_and_removal() {
        let obs = Observation::data_set(
            "vars",
            vec![DataSetEntry::new("a", "1"), DataSetEntry::removed("b")],
        )
        .with_timestamp(T);
        let lines = encode_observation(&obs).unwrap();
        assert_eq!(lines, vec!["2023-11-14T22:13:20.000Z|vars|a=1 b="]);
    }

    #[test]
    fn table_layout_and_removed_row() {
        let obs = Observation::table(
            "tools",
            vec![
                TableRow::new(
                    "T1",
                    vec![DataSetEntry::new("len", "120"), DataSetEntry::new("dia", "6")],
                ),
                TableRow::removed("T2"),
            ],
        )
        .with_timestamp(T);
        let lines = encode_observation(&obs).unwrap();
        assert_eq!(
            lines,
            vec!["2023-11-14T22:13:20.000Z|tools|T1={len=120 dia=6} T2="]
        );
    }

    #[test]
    fn samples_batch_concatenates() {
        let a = Observation::sample("Xact", "12.5").with_timestamp(T);
        let b = Observation::sample("Yact", "3.25").with_timestamp(T);
        let line = encode_samples_batch(&[&a, &b]).unwrap();
        assert_eq!(line, "2023-11-14T22:13:20.000Z|Xact|12.5|Yact|3.25");
    }

    #[test]
    fn pipe_is_rejected_outside_message_bodies() {
        let obs = Observation::sample("bad", "12|5").with_timestamp(T);
        assert_eq!(
            encode_observation(&obs),
            Err(CodecError::EmbeddedPipe { field: "value" })
        );
        let obs = Observation::sample("ba|d", "1").with_timestamp(T);
        assert_eq!(
            encode_observation(&obs),
            Err(CodecError::EmbeddedPipe { field: "data_item_key" })
        );
    }

    #[test]
    fn non_ascii_is_rejected() {
        let obs = Observation::sample("temp", "21°C").with_timestamp(T);
        assert_eq!(
            encode_observation(&obs),
            Err(CodecError::InvalidText { field: "value" })
        );
    }

    #[test]
    fn asset_single_line() {
        let asset = Asset::new("M8.123", "CuttingTool", "<CuttingTool/>").with_timestamp(T);
        let lines = encode_asset(&asset, false).unwrap();
        assert_eq!(
            lines,
            vec!["2023-11-14T22:13:20.000Z|@ASSET@|M8.123|CuttingTool|<CuttingTool/>"]
        );
    }

    #[test]
    fn asset_multiline_framing() {
        let body = "<CuttingTool>\n  <Life>1</Life>\n</CuttingTool>";
        let asset = Asset::new("M8.123", "CuttingTool", body).with_timestamp(T);
        let lines = encode_asset(&asset, true).unwrap();
        assert_eq!(lines.len(), 5);
        let marker = lines[0].rsplit('|').next().unwrap().to_string();
        assert!(marker.starts_with(MULTILINE_PREFIX));
        assert_eq!(lines.last().unwrap(), &marker);
        assert!(!body.contains(&marker));
        assert_eq!(lines[1], "<CuttingTool>");
        assert_eq!(lines[2], "  <Life>1</Life>");
        assert_eq!(lines[3], "</CuttingTool>");
    }

    #[test]
    fn newline_in_body_requires_multiline() {
        let asset = Asset::new("a", "T", "line1\nline2").with_timestamp(T);
        assert_eq!(encode_asset(&asset, false), Err(CodecError::EmbeddedNewline));
    }

    #[test]
    fn removal_lines() {
        assert_eq!(
            encode_asset_removal("M8.123", T).unwrap(),
            "2023-11-14T22:13:20.000Z|@REMOVE_ASSET@|M8.123"
        );
        assert_eq!(
            encode_all_assets_removal("CuttingTool", T).unwrap(),
            "2023-11-14T22:13:20.000Z|@REMOVE_ALL_ASSETS@|CuttingTool"
        );
        assert_eq!(
            encode_device_removal("dev-1", T).unwrap(),
            "2023-11-14T22:13:20.000Z|@REMOVE_DEVICE@|dev-1"
        );
        assert_eq!(
            encode_all_devices_removal(T).unwrap(),
            "2023-11-14T22:13:20.000Z|@REMOVE_ALL_DEVICES@"
        );
    }

    #[test]
    fn ping_classification() {
        let inbound = decode_inbound("* PING\r\n\r\n  \nstatus?\r\n");
        assert_eq!(
            inbound,
            vec![
                InboundLine::Ping,
                InboundLine::Unexpected("status?".to_string())
            ]
        );
    }

    #[test]
    fn pong_carries_heartbeat() {
        assert_eq!(pong_line(10_000), "* PONG 10000");
    }

    // Round trips: decoding a line the codec produced yields a record with an
    // identical change id.

    fn round_trip(obs: Observation) {
        let lines = encode_observation(&obs).unwrap();
        assert_eq!(lines.len(), 1, "round-trip helper expects one line");
        let decoded = decode_observation_line(&lines[0], obs.kind()).unwrap();
        assert_eq!(decoded.change_id(), obs.change_id());
        assert_eq!(decoded.timestamp_ms, obs.timestamp_ms);
        assert_eq!(decoded.data_item_key, obs.data_item_key);
    }

    #[test]
    fn round_trip_every_kind() {
        round_trip(Observation::sample("Xact", "12.5").with_timestamp(T));
        round_trip(
            Observation::message("alarm", "temp|high", Some("17".into())).with_timestamp(T),
        );
        round_trip(
            Observation::condition(
                "servo",
                vec![FaultState::fault(ConditionLevel::Fault, "over temp")
                    .with_native_code("100")
                    .with_native_severity("2")
                    .with_qualifier("HIGH")],
            )
            .with_timestamp(T),
        );
        round_trip(
            Observation::time_series("vib", vec![1.5, 2.0], Some(100.0)).with_timestamp(T),
        );
        round_trip(
            Observation::data_set(
                "vars",
                vec![DataSetEntry::new("a", "1"), DataSetEntry::removed("b")],
            )
            .with_timestamp(T),
        );
        round_trip(
            Observation::table(
                "tools",
                vec![
                    TableRow::new("T1", vec![DataSetEntry::new("len", "120")]),
                    TableRow::removed("T2"),
                ],
            )
            .with_timestamp(T),
        );
        round_trip(
            Observation::unavailable_of_kind("gone", ObservationKind::TimeSeries)
                .with_timestamp(T),
        );
    }

    #[test]
    fn round_trip_device_scoped() {
        let obs = Observation::sample("Xact", "1")
            .with_device_key("M1")
            .with_timestamp(T);
        let lines = encode_observation(&obs).unwrap();
        let decoded = decode_observation_line(&lines[0], ObservationKind::Sample).unwrap();
        assert_eq!(decoded.device_key.as_deref(), Some("M1"));
        assert_eq!(decoded.data_item_key, "Xact");
    }

    #[test]
    fn time_series_count_mismatch_is_malformed() {
        let err =
            decode_observation_line("2023-11-14T22:13:20.000Z|vib|3|100|1 2", ObservationKind::TimeSeries)
                .unwrap_err();
        assert!(matches!(err, CodecError::Malformed { .. }));
    }

    #[test]
    fn timestamp_round_trip() {
        assert_eq!(format_timestamp(T).unwrap(), "2023-11-14T22:13:20.000Z");
        assert_eq!(parse_timestamp("2023-11-14T22:13:20.000Z").unwrap(), T);
    }
}
