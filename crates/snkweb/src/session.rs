//! Authenticated HTTP session.
//!
//! A [`Session`] owns the HTTP connection pool and, once logged in, the
//! bearer token and the endpoint every request is built against.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use snkweb_settings::HttpSettings;
use url::Url;

use crate::errors::{ClientError, Result};

/// Bearer credential plus the endpoint it was issued by.
struct Credential {
    endpoint: String,
    token: SecretString,
}

/// HTTP session against one search service endpoint.
pub struct Session {
    http_settings: HttpSettings,
    http: Option<reqwest::Client>,
    credential: Option<Credential>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    #[serde(rename = "User")]
    user: &'a str,
    #[serde(rename = "Pass")]
    pass: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(rename = "LoginStatus")]
    login_status: Option<bool>,
    #[serde(rename = "JWT")]
    jwt: Option<String>,
}

impl Session {
    /// Create a logged-out session. The HTTP pool is built on first use.
    pub fn new(http_settings: HttpSettings) -> Self {
        Self {
            http_settings,
            http: None,
            credential: None,
        }
    }

    /// Create a session from a token obtained elsewhere, skipping the login
    /// round trip.
    pub fn resume(
        http_settings: HttpSettings,
        endpoint: &str,
        token: impl Into<String>,
    ) -> Result<Self> {
        let mut session = Self::new(http_settings);
        let _ = session.http_client()?;
        session.credential = Some(Credential {
            endpoint: normalize_endpoint(endpoint),
            token: SecretString::from(token.into()),
        });
        Ok(session)
    }

    /// Log in with user name and password.
    ///
    /// Succeeds only when the server reports `LoginStatus: true` together
    /// with a non-empty `JWT`. A previous credential is replaced on success
    /// and kept on failure.
    #[tracing::instrument(skip_all, fields(endpoint = %endpoint, user = %user))]
    pub async fn login(&mut self, endpoint: &str, user: &str, password: &str) -> Result<()> {
        let endpoint = normalize_endpoint(endpoint);
        let http = self.http_client()?;

        let resp = http
            .post(format!("{endpoint}/api/login"))
            .json(&LoginRequest {
                user,
                pass: password,
            })
            .send()
            .await?;
        let body = check_status(resp).await?.text().await?;

        let parsed: LoginResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::Auth(format!("malformed login response: {e}")))?;
        if parsed.login_status != Some(true) {
            return Err(ClientError::Auth("LoginStatus is not true".into()));
        }
        let token = parsed
            .jwt
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ClientError::Auth("login response has no JWT".into()))?;

        self.credential = Some(Credential {
            endpoint,
            token: SecretString::from(token),
        });
        tracing::info!("logged in");
        Ok(())
    }

    /// Invalidate the server-side session and forget the token.
    #[tracing::instrument(skip_all)]
    pub async fn logout(&mut self) -> Result<()> {
        let resp = self.authorized(Method::PUT, "/api/logout")?.send().await?;
        let _ = check_status(resp).await?;
        self.credential = None;
        tracing::info!("logged out");
        Ok(())
    }

    /// Drop the token and the HTTP connection pool. Never fails; calling it
    /// again is a no-op.
    pub fn close(&mut self) {
        if self.credential.take().is_some() {
            tracing::debug!("session credential dropped");
        }
        self.http = None;
    }

    /// Whether a credential is currently held.
    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    /// Endpoint of the current credential.
    pub fn endpoint(&self) -> Option<&str> {
        self.credential.as_ref().map(|c| c.endpoint.as_str())
    }

    /// Bearer token of the current credential.
    pub(crate) fn token(&self) -> Result<&SecretString> {
        self.credential
            .as_ref()
            .map(|c| &c.token)
            .ok_or(ClientError::NoSession)
    }

    /// Build an authenticated request for `path` (relative to the endpoint).
    pub fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let (Some(http), Some(cred)) = (&self.http, &self.credential) else {
            return Err(ClientError::NoSession);
        };
        Ok(http
            .request(method, format!("{}{path}", cred.endpoint))
            .bearer_auth(cred.token.expose_secret()))
    }

    /// WebSocket URL of the search socket for the current endpoint.
    pub fn ws_url(&self, ws_path: &str) -> Result<Url> {
        let endpoint = self.endpoint().ok_or(ClientError::NoSession)?;
        derive_ws_url(endpoint, ws_path)
    }

    fn http_client(&mut self) -> Result<&reqwest::Client> {
        if self.http.is_none() {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_millis(self.http_settings.timeout_ms))
                .connect_timeout(Duration::from_millis(self.http_settings.connect_timeout_ms))
                .user_agent(self.http_settings.user_agent.as_str())
                .build()?;
            self.http = Some(client);
        }
        self.http.as_ref().ok_or(ClientError::NoSession)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint())
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

/// Map a non-2xx response to [`ClientError::Status`].
pub(crate) async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = if text.trim().is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        text
    };
    tracing::warn!(status = status.as_u16(), "request rejected");
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

fn normalize_endpoint(endpoint: &str) -> String {
    endpoint.trim().trim_end_matches('/').to_string()
}

/// Swap the HTTP scheme for its WebSocket counterpart and append `ws_path`
/// to whatever path prefix the endpoint carries. Host and port are kept.
pub(crate) fn derive_ws_url(endpoint: &str, ws_path: &str) -> Result<Url> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| ClientError::Handshake(format!("invalid endpoint '{endpoint}': {e}")))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(ClientError::Handshake(format!(
                "unsupported endpoint scheme '{other}'"
            )));
        }
    };
    if url.host_str().is_none() {
        return Err(ClientError::Handshake(format!(
            "endpoint '{endpoint}' has no host"
        )));
    }
    url.set_scheme(scheme)
        .map_err(|()| ClientError::Handshake(format!("cannot use {scheme} for '{endpoint}'")))?;
    let path = format!("{}{ws_path}", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session() -> Session {
        Session::new(HttpSettings::default())
    }

    async fn mount_login(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .and(body_json(serde_json::json!({"User": "admin", "Pass": "secret"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn login_stores_token_and_endpoint() {
        let server = MockServer::start().await;
        mount_login(
            &server,
            serde_json::json!({"LoginStatus": true, "JWT": "tok-1"}),
        )
        .await;

        let mut s = session();
        s.login(&format!("{}/", server.uri()), "admin", "secret")
            .await
            .unwrap();
        assert!(s.is_authenticated());
        assert_eq!(s.endpoint(), Some(server.uri().as_str()));
        assert_eq!(s.token().unwrap().expose_secret(), "tok-1");
    }

    #[tokio::test]
    async fn authenticated_requests_carry_bearer_token() {
        let server = MockServer::start().await;
        mount_login(
            &server,
            serde_json::json!({"LoginStatus": true, "JWT": "tok-1"}),
        )
        .await;
        Mock::given(method("PUT"))
            .and(path("/api/logout"))
            .and(header("Authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut s = session();
        s.login(&server.uri(), "admin", "secret").await.unwrap();
        s.logout().await.unwrap();
        assert!(!s.is_authenticated());
    }

    #[tokio::test]
    async fn login_status_false_is_auth_error() {
        let server = MockServer::start().await;
        mount_login(
            &server,
            serde_json::json!({"LoginStatus": false, "JWT": "tok-1"}),
        )
        .await;

        let mut s = session();
        let err = s.login(&server.uri(), "admin", "secret").await.unwrap_err();
        assert_matches!(err, ClientError::Auth(_));
        assert!(!s.is_authenticated());
    }

    #[tokio::test]
    async fn login_without_status_or_token_is_auth_error() {
        let server = MockServer::start().await;
        mount_login(&server, serde_json::json!({"JWT": "tok-1"})).await;
        let mut s = session();
        assert_matches!(
            s.login(&server.uri(), "admin", "secret").await,
            Err(ClientError::Auth(_))
        );

        let server = MockServer::start().await;
        mount_login(&server, serde_json::json!({"LoginStatus": true})).await;
        assert_matches!(
            s.login(&server.uri(), "admin", "secret").await,
            Err(ClientError::Auth(m)) if m.contains("JWT")
        );

        let server = MockServer::start().await;
        mount_login(
            &server,
            serde_json::json!({"LoginStatus": true, "JWT": ""}),
        )
        .await;
        assert_matches!(
            s.login(&server.uri(), "admin", "secret").await,
            Err(ClientError::Auth(_))
        );
    }

    #[tokio::test]
    async fn login_http_failure_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let mut s = session();
        let err = s.login(&server.uri(), "admin", "secret").await.unwrap_err();
        assert_matches!(err, ClientError::Status { status: 500, ref message } if message == "boom");
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn login_unreachable_is_transport_error() {
        let mut s = session();
        let err = s
            .login("http://127.0.0.1:1", "admin", "secret")
            .await
            .unwrap_err();
        assert_matches!(err, ClientError::Transport(_));
    }

    #[tokio::test]
    async fn logout_without_login_is_no_session() {
        let mut s = session();
        assert_matches!(s.logout().await, Err(ClientError::NoSession));
    }

    #[tokio::test]
    async fn logout_rejected_keeps_credential() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/logout"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mut s = Session::resume(HttpSettings::default(), &server.uri(), "tok").unwrap();
        let err = s.logout().await.unwrap_err();
        assert_matches!(err, ClientError::Status { status: 401, ref message } if message == "Unauthorized");
        assert!(s.is_authenticated());
    }

    #[test]
    fn close_is_idempotent_and_drops_credential() {
        let mut s = Session::resume(HttpSettings::default(), "https://nk.example.com", "tok").unwrap();
        s.close();
        s.close();
        assert!(!s.is_authenticated());
        assert_matches!(s.authorized(Method::GET, "/api/resources"), Err(ClientError::NoSession));
    }

    #[test]
    fn debug_hides_token() {
        let s = Session::resume(HttpSettings::default(), "https://nk.example.com", "tok-secret").unwrap();
        let dbg = format!("{s:?}");
        assert!(dbg.contains("nk.example.com"));
        assert!(!dbg.contains("tok-secret"));
    }

    // ── derive_ws_url ───────────────────────────────────────────────

    #[test]
    fn ws_url_upgrades_https_and_keeps_port() {
        let url = derive_ws_url("https://nk.example.com:8443", "/api/ws/search").unwrap();
        assert_eq!(url.as_str(), "wss://nk.example.com:8443/api/ws/search");
    }

    #[test]
    fn ws_url_maps_http_to_ws() {
        let url = derive_ws_url("http://127.0.0.1:9000", "/api/ws/search").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:9000/api/ws/search");
    }

    #[test]
    fn ws_url_keeps_path_prefix() {
        let url = derive_ws_url("https://proxy.example.com/nk/", "/api/ws/search").unwrap();
        assert_eq!(url.as_str(), "wss://proxy.example.com/nk/api/ws/search");
    }

    #[test]
    fn ws_url_rejects_bad_endpoints() {
        assert_matches!(
            derive_ws_url("nk.example.com", "/api/ws/search"),
            Err(ClientError::Handshake(_))
        );
        assert_matches!(
            derive_ws_url("ftp://nk.example.com", "/api/ws/search"),
            Err(ClientError::Handshake(m)) if m.contains("ftp")
        );
    }

    #[test]
    fn ws_url_requires_session() {
        let s = session();
        assert_matches!(s.ws_url("/api/ws/search"), Err(ClientError::NoSession));
    }
}
