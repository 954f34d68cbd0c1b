//! Scripted in-process search server.
//!
//! Each test hands [`serve`] a script that plays the server side of one
//! socket; panics inside the script surface when the test awaits the
//! returned join handle.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use snkweb::Session;
use snkweb_settings::HttpSettings;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;

pub const TOKEN: &str = "eyJhbGciOiJIUzI1NiJ9.e30.c2lnbmF0dXJl";
pub const HANDLE: &str = "abc123";

const TIMEOUT: Duration = Duration::from_secs(5);

pub type ServerWs = WebSocketStream<TcpStream>;

/// What the client sent in its upgrade request.
#[derive(Debug, Default)]
pub struct Upgrade {
    pub path: String,
    pub protocol: Option<String>,
}

/// Accept one socket on a fresh port and run `script` against it.
/// Returns the HTTP endpoint to point a session at.
pub async fn serve<F, Fut>(script: F) -> (String, JoinHandle<Upgrade>)
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut upgrade = Upgrade::default();
        let ws = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
                upgrade.path = req.uri().path().to_string();
                if let Some(proto) = req.headers().get(SEC_WEBSOCKET_PROTOCOL) {
                    upgrade.protocol = proto.to_str().ok().map(String::from);
                    let _ = resp
                        .headers_mut()
                        .insert(SEC_WEBSOCKET_PROTOCOL, proto.clone());
                }
                Ok(resp)
            },
        )
        .await
        .unwrap();
        script(ws).await;
        upgrade
    });
    (endpoint, server)
}

/// Refuse every upgrade with `status`.
pub async fn serve_rejecting(status: StatusCode) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    let _ = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ = tokio_tungstenite::accept_hdr_async(
            stream,
            move |_: &Request, _: Response| -> Result<Response, ErrorResponse> {
                let mut resp = ErrorResponse::new(Some("rejected".to_string()));
                *resp.status_mut() = status;
                Err(resp)
            },
        )
        .await;
    });
    endpoint
}

pub fn session(endpoint: &str) -> Session {
    Session::resume(HttpSettings::default(), endpoint, TOKEN).unwrap()
}

/// Next text frame as JSON. Other frames are skipped.
pub async fn recv_json(ws: &mut ServerWs) -> Value {
    loop {
        let msg = tokio::time::timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket ended")
            .expect("read failed");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

pub async fn send_json(ws: &mut ServerWs, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Read until the client goes away.
pub async fn drain(ws: &mut ServerWs) {
    while let Some(Ok(_)) = ws.next().await {}
}

/// The two frames every client writes right after the upgrade.
pub async fn expect_subscription(ws: &mut ServerWs) {
    assert_eq!(
        recv_json(ws).await,
        json!({"Subs": ["PONG", "parse", "search", "attach"]})
    );
    assert_eq!(recv_json(ws).await, json!({"type": "PONG", "data": {}}));
}

/// Answer a search request with `handle` and check the acknowledgment.
/// Returns the request's `data`.
pub async fn accept_search(ws: &mut ServerWs, handle: &str) -> Value {
    let request = recv_json(ws).await;
    assert_eq!(request["type"], "search");
    send_json(
        ws,
        json!({"type": "search", "data": {"OutputSearchSubproto": handle}}),
    )
    .await;
    assert_eq!(
        recv_json(ws).await,
        json!({"type": handle, "data": {"OK": true, "OutputSearchSubproto": handle}})
    );
    request["data"].clone()
}

/// Expect an entry-count poll and answer it.
pub async fn answer_poll(ws: &mut ServerWs, finished: bool, count: u64) {
    assert_eq!(
        recv_json(ws).await,
        json!({"type": HANDLE, "data": {"ID": 3}})
    );
    send_json(
        ws,
        json!({"type": HANDLE, "data": {"Finished": finished, "EntryCount": count}}),
    )
    .await;
}

/// A well-formed entry carrying `payload`.
pub fn entry(second: u32, payload: &[u8]) -> Value {
    json!({
        "TS": format!("2024-03-01T12:00:{second:02}.000000001Z"),
        "Data": base64::engine::general_purpose::STANDARD.encode(payload),
        "SRC": "172.16.0.5",
        "Tag": 1,
        "Enumerated": [{"Name": "seq", "ValueStr": second.to_string()}]
    })
}
