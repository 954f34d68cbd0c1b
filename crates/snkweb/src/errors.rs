//! Client error types.

/// Errors returned by every client operation.
///
/// Nothing is retried internally; each error goes straight to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request could not be built, sent, or read.
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("HTTP status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, or the canonical reason when empty.
        message: String,
    },

    /// Login was rejected or the login response carried no token.
    #[error("login rejected: {0}")]
    Auth(String),

    /// An authenticated operation ran before login (or after logout/close).
    #[error("not logged in")]
    NoSession,

    /// The search socket could not be opened or subscribed.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    /// The search socket failed or was closed while in use.
    #[error("websocket connection lost: {0}")]
    ConnectionLost(String),

    /// A non-text data frame arrived where a text reply was expected.
    #[error("unexpected websocket frame: {0}")]
    UnexpectedFrameType(String),

    /// A reply was not valid JSON or lacked a required field.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An entry payload was not valid standard base64.
    #[error("entry {index}: invalid base64 payload: {source}")]
    Decode {
        /// Position of the entry in the fetched batch.
        index: usize,
        /// Underlying decode failure.
        #[source]
        source: base64::DecodeError,
    },

    /// The caller passed an argument that cannot work (e.g. zero poll interval).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ClientError {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether this is an HTTP transport-class failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { .. })
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
