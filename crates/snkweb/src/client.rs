//! The facade: one object holding the session, its settings, and the search
//! socket.

use std::time::Duration;

use chrono::{DateTime, Utc};
use snkweb_settings::{LoginCredentials, SnkSettings};

use crate::errors::{ClientError, Result};
use crate::resources::ResourceClient;
use crate::search::{ResultRecord, SearchChannel, SearchHandle, SearchStats};
use crate::session::Session;

/// Search service client.
///
/// ```no_run
/// # async fn demo() -> snkweb::Result<()> {
/// use chrono::{Duration, Utc};
///
/// let mut client = snkweb::Client::new();
/// client.login("https://logs.example.com", "admin", "changeme").await?;
/// client.connect_search().await?;
/// let end = Utc::now();
/// let records = client.search("tag=syslog", end - Duration::minutes(5), end).await?;
/// println!("{} records", records.len());
/// client.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Client {
    settings: SnkSettings,
    session: Session,
    channel: Option<SearchChannel>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Client with default settings.
    pub fn new() -> Self {
        Self::from_settings(&SnkSettings::default())
    }

    /// Client using the given timeouts, user agent and search settings.
    pub fn from_settings(settings: &SnkSettings) -> Self {
        Self {
            session: Session::new(settings.http.clone()),
            settings: settings.clone(),
            channel: None,
        }
    }

    /// Settings this client was built with.
    pub fn settings(&self) -> &SnkSettings {
        &self.settings
    }

    /// The underlying HTTP session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Log in against `endpoint`.
    pub async fn login(&mut self, endpoint: &str, user: &str, password: &str) -> Result<()> {
        self.session.login(endpoint, user, password).await
    }

    /// Log in against the configured endpoint.
    pub async fn login_with(&mut self, credentials: &LoginCredentials) -> Result<()> {
        let endpoint = self
            .settings
            .endpoint
            .clone()
            .ok_or_else(|| ClientError::InvalidArgument("no endpoint configured".into()))?;
        self.session
            .login(&endpoint, &credentials.user, credentials.password())
            .await
    }

    /// Adopt a token issued elsewhere. Any open search socket is closed.
    pub async fn resume(&mut self, endpoint: &str, token: impl Into<String>) -> Result<()> {
        let session = Session::resume(self.settings.http.clone(), endpoint, token)?;
        self.close_search_channel().await;
        self.session = session;
        Ok(())
    }

    /// Log out. The search socket is closed once the server has accepted.
    pub async fn logout(&mut self) -> Result<()> {
        self.session.logout().await?;
        self.close_search_channel().await;
        Ok(())
    }

    /// Resource operations bound to the current session.
    pub fn resources(&self) -> ResourceClient<'_> {
        ResourceClient::new(&self.session)
    }

    /// Open the search socket, replacing any socket already open.
    pub async fn connect_search(&mut self) -> Result<&SearchChannel> {
        self.close_search_channel().await;
        let channel = SearchChannel::connect(&self.session, &self.settings.search).await?;
        Ok(&*self.channel.insert(channel))
    }

    /// The open search socket.
    pub fn search_channel(&self) -> Result<&SearchChannel> {
        self.channel
            .as_ref()
            .ok_or_else(|| ClientError::ConnectionLost("search socket is not open".into()))
    }

    /// Close the search socket, if any. Never fails.
    pub async fn close_search_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.disconnect().await;
        }
    }

    /// Poll `handle` every `interval` until the search finishes.
    pub async fn wait_for_completion(
        &self,
        handle: &SearchHandle,
        interval: Duration,
    ) -> Result<SearchStats> {
        if interval.is_zero() {
            return Err(ClientError::InvalidArgument(
                "poll interval must be non-zero".into(),
            ));
        }
        let channel = self.search_channel()?;
        loop {
            let stats = channel.poll(handle).await?;
            if stats.finished {
                return Ok(stats);
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Run a search to completion and return every record.
    ///
    /// The search is closed even when waiting or fetching fails; the first
    /// error wins.
    #[tracing::instrument(skip(self, start, end))]
    pub async fn search(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ResultRecord>> {
        let channel = self.search_channel()?;
        let handle = channel.submit(query, start, end).await?;

        let records = self.collect(channel, &handle).await;
        let closed = channel.close_search(handle).await;
        let records = records?;
        closed?;

        tracing::info!(count = records.len(), "search complete");
        Ok(records)
    }

    async fn collect(
        &self,
        channel: &SearchChannel,
        handle: &SearchHandle,
    ) -> Result<Vec<ResultRecord>> {
        let interval = Duration::from_millis(self.settings.search.poll_interval_ms);
        let stats = self.wait_for_completion(handle, interval).await?;
        if stats.entry_count == 0 {
            return Ok(Vec::new());
        }
        channel.fetch(handle, 0, stats.entry_count).await
    }

    /// Close the search socket and drop the session. Never fails; calling it
    /// again is a no-op.
    pub async fn close(&mut self) {
        self.close_search_channel().await;
        self.session.close();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
