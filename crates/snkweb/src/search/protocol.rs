//! Wire format of the search socket.
//!
//! Every frame is a text frame holding `{"type": <topic or handle>, "data": {...}}`.
//! Handle-addressed commands select the operation with an `ID` opcode.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ClientError, Result};

/// Terminate a search.
pub const OP_CLOSE: u32 = 1;
/// Query entry count and completion.
pub const OP_ENTRY_COUNT: u32 = 3;
/// Fetch a range of entries.
pub const OP_ENTRY_FETCH: u32 = 16;

/// Format of outgoing search bounds (UTC, millisecond precision).
pub const SEARCH_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Topic of the heartbeat acknowledgment sent after subscribing.
pub const HEARTBEAT_TOPIC: &str = "PONG";

#[derive(Serialize)]
struct Envelope<'a, T> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: T,
}

#[derive(Serialize)]
struct Subscribe<'a> {
    #[serde(rename = "Subs")]
    subs: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ParseRequest<'a> {
    search_string: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SearchRequest<'a> {
    search_string: &'a str,
    search_start: String,
    search_end: String,
    background: bool,
}

#[derive(Serialize)]
struct SearchAck<'a> {
    #[serde(rename = "OK")]
    ok: bool,
    #[serde(rename = "OutputSearchSubproto")]
    handle: &'a str,
}

#[derive(Serialize)]
struct OpRequest {
    #[serde(rename = "ID")]
    id: u32,
    #[serde(rename = "EntryRange", skip_serializing_if = "Option::is_none")]
    range: Option<EntryRange>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct EntryRange {
    first: u64,
    last: u64,
}

fn encode<T: Serialize>(kind: &str, data: T) -> Result<String> {
    serde_json::to_string(&Envelope { kind, data })
        .map_err(|e| ClientError::Protocol(format!("encoding {kind} frame: {e}")))
}

/// `{"Subs":[...]}`: the only frame without a `type`.
pub fn subscribe_frame(topics: &[String]) -> Result<String> {
    serde_json::to_string(&Subscribe { subs: topics })
        .map_err(|e| ClientError::Protocol(format!("encoding subscribe frame: {e}")))
}

/// `{"type":"PONG","data":{}}`.
pub fn heartbeat_frame() -> Result<String> {
    encode(HEARTBEAT_TOPIC, serde_json::Map::new())
}

/// Ask the service to parse a query without running it.
pub fn parse_frame(query: &str) -> Result<String> {
    encode(
        "parse",
        ParseRequest {
            search_string: query,
        },
    )
}

/// Start a foreground search over `[start, end]`.
pub fn search_frame(query: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<String> {
    encode(
        "search",
        SearchRequest {
            search_string: query,
            search_start: format_search_time(start),
            search_end: format_search_time(end),
            background: false,
        },
    )
}

/// Acknowledge a freshly issued handle; required before the search streams.
pub fn ack_frame(handle: &str) -> Result<String> {
    encode(handle, SearchAck { ok: true, handle })
}

/// Entry-count poll for `handle`.
pub fn entry_count_frame(handle: &str) -> Result<String> {
    encode(
        handle,
        OpRequest {
            id: OP_ENTRY_COUNT,
            range: None,
        },
    )
}

/// Fetch entries `first..last` for `handle`. Bounds go out exactly as given;
/// how the server treats `Last` is its own convention.
pub fn fetch_frame(handle: &str, first: u64, last: u64) -> Result<String> {
    encode(
        handle,
        OpRequest {
            id: OP_ENTRY_FETCH,
            range: Some(EntryRange { first, last }),
        },
    )
}

/// Close the search behind `handle`.
pub fn close_frame(handle: &str) -> Result<String> {
    encode(
        handle,
        OpRequest {
            id: OP_CLOSE,
            range: None,
        },
    )
}

/// Format a search bound as `2006-01-02T15:04:05.000Z`.
pub fn format_search_time(t: DateTime<Utc>) -> String {
    t.format(SEARCH_TIME_FORMAT).to_string()
}

// ── Replies ─────────────────────────────────────────────────────────────────

/// Any reply: only `data` matters to the client.
#[derive(Debug, Deserialize)]
pub(crate) struct Reply<T> {
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchReply {
    #[serde(rename = "OutputSearchSubproto")]
    pub handle: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatsReply {
    #[serde(rename = "Finished")]
    pub finished: Option<bool>,
    #[serde(rename = "EntryCount")]
    pub entry_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FetchReply {
    #[serde(rename = "Entries")]
    pub entries: Option<Vec<Value>>,
}

/// Decode a reply body and return its `data` object.
///
/// Invalid JSON, wrong-typed fields and a missing `data` are all
/// [`ClientError::Protocol`].
pub(crate) fn reply_data<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    let reply: Reply<T> = serde_json::from_str(body)
        .map_err(|e| ClientError::Protocol(format!("{what} reply: {e}: {}", excerpt(body))))?;
    reply
        .data
        .ok_or_else(|| ClientError::Protocol(format!("{what} reply has no data: {}", excerpt(body))))
}

/// First 200 chars of a body, for error messages.
fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
