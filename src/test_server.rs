//! In-process HTTP server for exercising the clients in tests.

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::{stream, StreamExt};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is json")
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Fixed { status: u16, body: String },
    Chunked { status: u16, chunks: Vec<String> },
}

impl Reply {
    pub fn fixed(status: u16, body: &str) -> Self {
        Reply::Fixed {
            status,
            body: body.to_string(),
        }
    }

    pub fn chunked(status: u16, chunks: &[&str]) -> Self {
        Reply::Chunked {
            status,
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Clone)]
struct Shared {
    reply: Arc<Reply>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

pub struct FakeServer {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl FakeServer {
    /// Serve `reply` on every path until the test ends
    pub async fn start(reply: Reply) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let shared = Shared {
            reply: Arc::new(reply),
            requests: requests.clone(),
        };
        let app = Router::new().fallback(record).with_state(shared);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn record(State(shared): State<Shared>, method: Method, uri: Uri, body: Bytes) -> Response {
    shared.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        body: body.to_vec(),
    });

    match shared.reply.as_ref() {
        Reply::Fixed { status, body } => {
            let status = StatusCode::from_u16(*status).expect("valid status");
            (status, [(header::CONTENT_TYPE, "application/json")], body.clone()).into_response()
        }
        Reply::Chunked { status, chunks } => {
            let status = StatusCode::from_u16(*status).expect("valid status");
            // Pause between pieces so the client sees them as separate reads
            let pieces = stream::iter(chunks.clone()).then(|chunk| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, Infallible>(Bytes::from(chunk))
            });
            (
                status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                Body::from_stream(pieces),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_method_path_and_body() {
        let server = FakeServer::start(Reply::fixed(200, "{}")).await;

        let response = reqwest::Client::new()
            .post(server.url("/api/feedback"))
            .body("{\"a\":1}")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/api/feedback");
        assert_eq!(requests[0].json(), serde_json::json!({ "a": 1 }));
    }

    #[tokio::test]
    async fn test_chunked_reply_arrives_whole() {
        let server = FakeServer::start(Reply::chunked(200, &["one ", "two"])).await;

        let text = reqwest::get(server.url("/stream")).await.unwrap().text().await.unwrap();
        assert_eq!(text, "one two");
    }
}
