//! Search over the WebSocket channel.
//!
//! [`SearchChannel`] owns the socket; the lifecycle methods (`submit`,
//! `poll`, `fetch`, `close_search`) drive one search through it, and
//! [`decoder`] turns fetched entries into [`ResultRecord`]s.

pub mod channel;
pub mod decoder;
mod lifecycle;
pub mod protocol;

use std::fmt;

pub use channel::SearchChannel;
pub use decoder::{ResultRecord, decode_entries};

/// Server-assigned identifier of a running search.
///
/// Obtained from [`SearchChannel::submit`] and consumed by
/// [`SearchChannel::close_search`], so a closed search cannot be polled again.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SearchHandle(String);

impl SearchHandle {
    pub(crate) fn new(handle: String) -> Self {
        Self(handle)
    }

    /// The handle string, used as the `type` of every frame addressed to it.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SearchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Progress of a running search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// The search has completed; no more entries will appear.
    pub finished: bool,
    /// Entries found so far.
    pub entry_count: u64,
}
