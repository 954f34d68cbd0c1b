//! Turns fetched entries into [`ResultRecord`]s.
//!
//! Parsing is deliberately asymmetric: an entry missing `TS`, `Data`, `SRC`
//! or `Tag` (or carrying an unparseable timestamp) is skipped, while a
//! present but corrupt `Data` payload fails the whole batch.

use std::collections::HashMap;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::errors::{ClientError, Result};

/// One matched entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultRecord {
    /// Entry timestamp.
    pub timestamp: DateTime<Utc>,
    /// Source address the entry was ingested from.
    pub source: String,
    /// Numeric tag identifier.
    pub tag: u32,
    /// Raw entry payload.
    pub data: Vec<u8>,
    /// Values extracted by the service's parsing layer, keyed by name.
    pub enumerated: HashMap<String, String>,
}

/// Standard alphabet, padded, tolerant of nonzero trailing bits.
const PAYLOAD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireCanonical),
);

#[derive(Deserialize)]
struct RawEntry {
    #[serde(rename = "TS")]
    ts: Option<String>,
    #[serde(rename = "Data")]
    data: Option<String>,
    #[serde(rename = "SRC")]
    src: Option<String>,
    #[serde(rename = "Tag")]
    tag: Option<f64>,
    #[serde(rename = "Enumerated")]
    enumerated: Option<Vec<RawEnumerated>>,
}

#[derive(Deserialize)]
struct RawEnumerated {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "ValueStr")]
    value: Option<String>,
}

/// Decode a batch of raw entries, keeping server order.
pub fn decode_entries(entries: Vec<Value>) -> Result<Vec<ResultRecord>> {
    let total = entries.len();
    let mut records = Vec::with_capacity(total);

    for (index, entry) in entries.into_iter().enumerate() {
        let raw: RawEntry = serde_json::from_value(entry)
            .map_err(|e| ClientError::Protocol(format!("entry {index}: {e}")))?;
        if let Some(record) = decode_entry(index, raw)? {
            records.push(record);
        }
    }

    if records.len() < total {
        tracing::debug!(
            total,
            skipped = total - records.len(),
            "skipped incomplete entries"
        );
    }
    Ok(records)
}

fn decode_entry(index: usize, raw: RawEntry) -> Result<Option<ResultRecord>> {
    let (Some(ts), Some(data), Some(src), Some(tag)) = (raw.ts, raw.data, raw.src, raw.tag) else {
        return Ok(None);
    };

    let timestamp = match DateTime::parse_from_rfc3339(&ts) {
        Ok(t) => t.with_timezone(&Utc),
        Err(e) => {
            tracing::debug!(index, ts = %ts, error = %e, "skipping entry with bad timestamp");
            return Ok(None);
        }
    };

    let data = decode_payload(&data).map_err(|source| ClientError::Decode { index, source })?;

    let tag = tag_id(tag)
        .ok_or_else(|| ClientError::Protocol(format!("entry {index}: invalid tag {tag}")))?;

    let enumerated = raw
        .enumerated
        .unwrap_or_default()
        .into_iter()
        .filter_map(|e| Some((e.name?, e.value?)))
        .collect();

    Ok(Some(ResultRecord {
        timestamp,
        source: src,
        tag,
        data,
        enumerated,
    }))
}

/// Line breaks inside the payload are ignored.
fn decode_payload(data: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    if data.contains(['\r', '\n']) {
        let joined: String = data.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();
        PAYLOAD.decode(joined)
    } else {
        PAYLOAD.decode(data)
    }
}

/// Tags arrive as JSON numbers; only whole values in `u32` range are ids.
#[allow(
    clippy::float_cmp,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn tag_id(tag: f64) -> Option<u32> {
    let whole = tag.trunc();
    (tag.is_finite() && whole == tag && (0.0..=f64::from(u32::MAX)).contains(&whole))
        .then_some(whole as u32)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
