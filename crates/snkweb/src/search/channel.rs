//! The search WebSocket.
//!
//! A spawned task owns the socket and runs commands from a queue one at a
//! time, so there is never more than one request on the wire. Cancelling
//! the channel's token is the only way to interrupt it: the task stops,
//! any pending read fails with [`ClientError::ConnectionLost`], and every
//! later call fails the same way.

use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use secrecy::ExposeSecret;
use snkweb_settings::SearchSettings;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::protocol;
use crate::errors::{ClientError, Result};
use crate::session::Session;

/// How long the task waits for the close handshake before dropping the socket.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

const COMMAND_QUEUE: usize = 32;

enum Command {
    Send {
        frame: String,
        done: oneshot::Sender<Result<()>>,
    },
    Request {
        frame: String,
        reply: oneshot::Sender<Result<String>>,
    },
}

/// An open search socket.
pub struct SearchChannel {
    cmd_tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
    url: Url,
    handler: Mutex<Option<JoinHandle<()>>>,
}

impl SearchChannel {
    /// Open the search socket for `session` and subscribe to
    /// `settings.subscriptions`.
    ///
    /// The session's bearer token is the only `Sec-WebSocket-Protocol`
    /// value. Dial, TLS, upgrade, and subscription failures all come back
    /// as [`ClientError::Handshake`]; without a login this is
    /// [`ClientError::NoSession`].
    #[tracing::instrument(skip_all)]
    pub async fn connect(session: &Session, settings: &SearchSettings) -> Result<Self> {
        let url = session.ws_url(&settings.ws_path)?;
        let token = session.token()?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::Handshake(format!("building upgrade request: {e}")))?;
        let protocol = HeaderValue::from_str(token.expose_secret())
            .map_err(|_| ClientError::Handshake("token is not a valid header value".into()))?;
        let _ = request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);

        let (ws, _) = connect_async(request).await.map_err(|e| handshake_error(&e))?;
        tracing::info!(url = %url, "search socket open");

        let (ws_tx, ws_rx) = ws.split();
        let channel = Self::start(ws_tx, ws_rx, url);
        channel.handshake(&settings.subscriptions).await?;
        Ok(channel)
    }

    /// Spawn the socket task over an already upgraded connection.
    fn start<Tx, Rx>(ws_tx: Tx, ws_rx: Rx, url: Url) -> Self
    where
        Tx: Sink<Message, Error = WsError> + Unpin + Send + 'static,
        Rx: Stream<Item = std::result::Result<Message, WsError>> + Unpin + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let cancel = CancellationToken::new();
        let handler = tokio::spawn(channel_loop(ws_tx, ws_rx, cmd_rx, cancel.clone()));
        Self {
            cmd_tx,
            cancel,
            url,
            handler: Mutex::new(Some(handler)),
        }
    }

    /// Subscribe to `topics`; on failure the channel is torn down.
    async fn handshake(&self, topics: &[String]) -> Result<()> {
        if let Err(e) = self.subscribe(topics).await {
            self.disconnect().await;
            return Err(ClientError::Handshake(format!("subscribing: {e}")));
        }
        Ok(())
    }

    async fn subscribe(&self, topics: &[String]) -> Result<()> {
        self.send(protocol::subscribe_frame(topics)?).await?;
        self.send(protocol::heartbeat_frame()?).await
    }

    /// URL the socket was opened against.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Write one text frame without waiting for a reply.
    pub async fn send(&self, frame: impl Into<String>) -> Result<()> {
        let frame = frame.into();
        self.dispatch(|done| Command::Send { frame, done }).await
    }

    /// Write one text frame and return the body of the next text frame.
    ///
    /// There is no timeout; [`disconnect`](Self::disconnect) unblocks a
    /// pending call with [`ClientError::ConnectionLost`].
    pub async fn request(&self, frame: impl Into<String>) -> Result<String> {
        let frame = frame.into();
        self.dispatch(|reply| Command::Request { frame, reply }).await
    }

    async fn dispatch<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        if self.cancel.is_cancelled() {
            return Err(closed());
        }
        let (tx, rx) = oneshot::channel();
        self.cmd_tx.send(command(tx)).await.map_err(|_| closed())?;
        rx.await.map_err(|_| closed())?
    }

    /// Whether the socket is gone, closed locally, by the peer, or by error.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.cmd_tx.is_closed()
    }

    /// Close the socket. Never fails; calling it again is a no-op.
    pub async fn disconnect(&self) {
        self.cancel.cancel();
        let handler = self.handler.lock().await.take();
        if let Some(handler) = handler {
            if let Err(e) = handler.await {
                tracing::warn!(error = %e, "search socket task failed");
            }
            tracing::debug!(url = %self.url, "search socket closed");
        }
    }
}

impl Drop for SearchChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for SearchChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchChannel")
            .field("url", &self.url.as_str())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn closed() -> ClientError {
    ClientError::ConnectionLost("search socket is closed".into())
}

fn handshake_error(err: &WsError) -> ClientError {
    match err {
        WsError::Http(resp) => {
            ClientError::Handshake(format!("upgrade rejected with HTTP {}", resp.status()))
        }
        other => ClientError::Handshake(other.to_string()),
    }
}

// ─── Socket task ─────────────────────────────────────────────────────────────

async fn channel_loop<Tx, Rx>(
    mut ws_tx: Tx,
    mut ws_rx: Rx,
    mut cmd_rx: mpsc::Receiver<Command>,
    cancel: CancellationToken,
) where
    Tx: Sink<Message, Error = WsError> + Unpin,
    Rx: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    loop {
        let cmd = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                cmd
            }
        };

        match cmd {
            Command::Send { frame, done } => {
                let result = write_text(&mut ws_tx, frame, &cancel).await;
                let lost = result.is_err();
                if lost {
                    cancel.cancel();
                }
                let _ = done.send(result);
                if lost {
                    break;
                }
            }
            Command::Request { frame, reply } => {
                let result = match write_text(&mut ws_tx, frame, &cancel).await {
                    Ok(()) => read_text(&mut ws_rx, &cancel).await,
                    Err(e) => Err(e),
                };
                let lost = matches!(result, Err(ClientError::ConnectionLost(_)));
                // Mark the channel closed before the caller sees the error.
                if lost {
                    cancel.cancel();
                }
                let _ = reply.send(result);
                if lost {
                    break;
                }
            }
        }
    }

    cancel.cancel();
    cmd_rx.close();
    if tokio::time::timeout(CLOSE_GRACE, ws_tx.close()).await.is_err() {
        tracing::debug!("close handshake timed out");
    }
}

async fn write_text<Tx>(ws_tx: &mut Tx, frame: String, cancel: &CancellationToken) -> Result<()>
where
    Tx: Sink<Message, Error = WsError> + Unpin,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(closed()),
        sent = ws_tx.send(Message::Text(frame.into())) => {
            sent.map_err(|e| ClientError::ConnectionLost(format!("write failed: {e}")))
        }
    }
}

/// Read until a data frame arrives. Control frames are skipped; a binary
/// frame is reported but leaves the socket usable.
async fn read_text<Rx>(ws_rx: &mut Rx, cancel: &CancellationToken) -> Result<String>
where
    Rx: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    loop {
        let msg = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(closed()),
            msg = ws_rx.next() => msg,
        };
        match msg {
            Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
            Some(Ok(Message::Binary(data))) => {
                return Err(ClientError::UnexpectedFrameType(format!(
                    "binary frame of {} bytes",
                    data.len()
                )));
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                let reason = frame.map_or_else(
                    || "closed by peer".to_string(),
                    |f| format!("closed by peer ({}): {}", u16::from(f.code), f.reason),
                );
                return Err(ClientError::ConnectionLost(reason));
            }
            Some(Err(e)) => return Err(ClientError::ConnectionLost(e.to_string())),
            None => return Err(ClientError::ConnectionLost("socket ended".into())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
