//! One search, start to finish: submit, acknowledge, poll, fetch, close.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::decoder::{ResultRecord, decode_entries};
use super::protocol::{self, FetchReply, SearchReply, StatsReply, reply_data};
use super::{SearchChannel, SearchHandle, SearchStats};
use crate::errors::{ClientError, Result};

impl SearchChannel {
    /// Ask the service to parse `query` and return the reply's `data` object.
    #[tracing::instrument(skip(self))]
    pub async fn parse(&self, query: &str) -> Result<Value> {
        let body = self.request(protocol::parse_frame(query)?).await?;
        reply_data(&body, "parse")
    }

    /// Start a search over `[start, end]` and acknowledge its handle.
    ///
    /// The search does not stream until the acknowledgment is written, so a
    /// failed acknowledgment fails the whole submit.
    #[tracing::instrument(skip(self, start, end), fields(start = %start, end = %end))]
    pub async fn submit(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SearchHandle> {
        let body = self
            .request(protocol::search_frame(query, start, end)?)
            .await?;
        let reply: SearchReply = reply_data(&body, "search")?;
        let handle = reply.handle.filter(|h| !h.is_empty()).ok_or_else(|| {
            ClientError::Protocol("search reply missing data.OutputSearchSubproto".into())
        })?;

        self.send(protocol::ack_frame(&handle)?).await?;
        tracing::debug!(handle = %handle, "search started");
        Ok(SearchHandle::new(handle))
    }

    /// Query progress. Callers sleep between polls and stop on `finished`.
    pub async fn poll(&self, handle: &SearchHandle) -> Result<SearchStats> {
        let body = self
            .request(protocol::entry_count_frame(handle.as_str())?)
            .await?;
        let reply: StatsReply = reply_data(&body, "stats")?;
        let finished = reply
            .finished
            .ok_or_else(|| ClientError::Protocol("stats reply missing data.Finished".into()))?;
        let stats = SearchStats {
            finished,
            entry_count: reply.entry_count.unwrap_or(0),
        };
        tracing::trace!(handle = %handle, ?stats, "polled");
        Ok(stats)
    }

    /// Fetch and decode entries `first..last`. May be repeated with any range.
    #[tracing::instrument(skip(self, handle), fields(handle = %handle))]
    pub async fn fetch(&self, handle: &SearchHandle, first: u64, last: u64) -> Result<Vec<ResultRecord>> {
        let body = self
            .request(protocol::fetch_frame(handle.as_str(), first, last)?)
            .await?;
        let reply: FetchReply = reply_data(&body, "fetch")?;
        let entries = reply
            .entries
            .ok_or_else(|| ClientError::Protocol("fetch reply missing data.Entries".into()))?;
        decode_entries(entries)
    }

    /// Close the search. Only socket failures are reported; the reply is
    /// read but not inspected.
    #[tracing::instrument(skip_all, fields(handle = %handle))]
    pub async fn close_search(&self, handle: SearchHandle) -> Result<()> {
        let _ = self
            .request(protocol::close_frame(handle.as_str())?)
            .await?;
        tracing::debug!("search closed");
        Ok(())
    }
}
