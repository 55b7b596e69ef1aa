//! Shared test helpers: an axum server that holds event streams open.
//!
//! wiremock answers each request with one complete response, which cannot
//! model a stream the server keeps writing to. This server records every
//! request, keeps GET responses open as SSE, and lets the POST handler push
//! events onto them.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use celonis_mcp::prelude::*;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    fn new(method: &Method, uri: &Uri, headers: &HeaderMap, body: String) -> Self {
        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string());
        let headers = headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        Self {
            method: method.to_string(),
            path,
            headers,
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

/// Response to a POST.
pub enum PostResponse {
    Reply { status: u16, body: String },
    /// Hold the request open without ever answering.
    Stall,
}

impl PostResponse {
    pub fn accepted() -> Self {
        Self::Reply {
            status: 202,
            body: String::new(),
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self::Reply {
            status,
            body: body.to_string(),
        }
    }
}

/// `event: endpoint` announcing `path`.
pub fn endpoint_event(path: &str) -> Event {
    Event::default().event("endpoint").data(path)
}

type StreamSender = mpsc::UnboundedSender<std::result::Result<Event, Infallible>>;

/// Writes to every open event stream.
#[derive(Clone, Default)]
pub struct StreamHandle {
    streams: Arc<Mutex<Vec<StreamSender>>>,
}

impl StreamHandle {
    pub fn send(&self, event: Event) {
        for tx in self.streams.lock().unwrap().iter() {
            let _ = tx.send(Ok(event.clone()));
        }
    }

    pub fn send_message(&self, message: &Value) {
        self.send(Event::default().event("message").data(message.to_string()));
    }

    pub fn reply(&self, id: &Value, result: Value) {
        self.send_message(&json!({"jsonrpc": "2.0", "id": id, "result": result}));
    }

    /// End every open stream, as a server restart would.
    pub fn close(&self) {
        self.streams.lock().unwrap().clear();
    }

    pub fn open_streams(&self) -> usize {
        self.streams.lock().unwrap().len()
    }
}

type Handler = Arc<dyn Fn(&StreamHandle, &Value) -> PostResponse + Send + Sync>;

#[derive(Clone)]
struct ServerState {
    streams: StreamHandle,
    greeting: Arc<Vec<Event>>,
    handler: Handler,
    gets: Arc<Mutex<Vec<RecordedRequest>>>,
    posts: Arc<Mutex<Vec<RecordedRequest>>>,
}

pub struct StreamServer {
    addr: SocketAddr,
    pub streams: StreamHandle,
    gets: Arc<Mutex<Vec<RecordedRequest>>>,
    posts: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StreamServer {
    /// Start a server. Each new stream first receives the `greeting` events.
    pub async fn start<F>(greeting: Vec<Event>, handler: F) -> Self
    where
        F: Fn(&StreamHandle, &Value) -> PostResponse + Send + Sync + 'static,
    {
        let state = ServerState {
            streams: StreamHandle::default(),
            greeting: Arc::new(greeting),
            handler: Arc::new(handler),
            gets: Arc::new(Mutex::new(Vec::new())),
            posts: Arc::new(Mutex::new(Vec::new())),
        };
        let app = Router::new().fallback(serve).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            streams: state.streams,
            gets: state.gets,
            posts: state.posts,
        }
    }

    /// Stream that announces `/rpc/abc123` and answers each request on the stream.
    pub async fn echoing() -> Self {
        Self::start(vec![endpoint_event("/rpc/abc123")], |streams, body| {
            let params = body.get("params").cloned().unwrap_or(Value::Null);
            streams.reply(&body["id"], json!({"method": body["method"], "params": params}));
            PostResponse::accepted()
        })
        .await
    }

    pub fn url(&self) -> String {
        format!("http://{}/sse", self.addr)
    }

    pub fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn gets(&self) -> Vec<RecordedRequest> {
        self.gets.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<RecordedRequest> {
        self.posts.lock().unwrap().clone()
    }

    /// Build a discovered-dialect session with short deadlines.
    pub fn session(&self, timeouts: Timeouts) -> McpSession {
        let config = McpClientConfig::new(
            EndpointSource::Url(self.url()),
            Credentials::StaticToken("test-key".into()),
        )
        .with_variant(ProtocolVariant::Discovered)
        .with_timeouts(timeouts);
        McpSession::new(config).unwrap()
    }
}

pub fn short_timeouts() -> Timeouts {
    Timeouts::builder()
        .discovery(Duration::from_millis(500))
        .response(Duration::from_secs(2))
        .build()
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

async fn serve(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let request = RecordedRequest::new(&method, &uri, &headers, body);

    if method == Method::GET {
        state.gets.lock().unwrap().push(request);
        let (tx, rx) = mpsc::unbounded_channel();
        for event in state.greeting.iter() {
            let _ = tx.send(Ok(event.clone()));
        }
        state.streams.streams.lock().unwrap().push(tx);
        return Sse::new(UnboundedReceiverStream::new(rx)).into_response();
    }

    let json = request.json();
    state.posts.lock().unwrap().push(request);
    match (state.handler)(&state.streams, &json) {
        PostResponse::Reply { status, body } => {
            let status = StatusCode::from_u16(status).unwrap();
            (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response()
        }
        PostResponse::Stall => std::future::pending().await,
    }
}
