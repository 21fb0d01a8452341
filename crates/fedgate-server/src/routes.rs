use crate::service::ReadSplitsService;
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use fedgate_core::{
    Error, ReadSplitsEvent, ReadSplitsRequest, ReadSplitsResponse, Result, StreamError,
};
use fedgate_streaming::ResponseStream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Shared state of the HTTP surface
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReadSplitsService>,
    /// Root token; server shutdown cancels every in-flight session
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/read_splits", post(read_splits))
        .route("/api/v1/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Bridges a session onto an NDJSON channel. A send failure means the
/// response body (and with it the caller) is gone.
struct ChannelResponseStream {
    tx: mpsc::Sender<ReadSplitsEvent>,
    token: CancellationToken,
}

impl ChannelResponseStream {
    async fn emit(&self, event: ReadSplitsEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| Error::Transport("response body dropped".to_string()))
    }
}

#[async_trait]
impl ResponseStream for ChannelResponseStream {
    async fn send(&mut self, response: ReadSplitsResponse) -> Result<()> {
        self.emit(ReadSplitsEvent::Page(response)).await
    }

    async fn send_error(&mut self, error: StreamError) -> Result<()> {
        self.emit(ReadSplitsEvent::Error(error)).await
    }

    fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }
}

async fn read_splits(
    State(state): State<AppState>,
    Json(request): Json<ReadSplitsRequest>,
) -> impl IntoResponse {
    let (tx, mut rx) = mpsc::channel::<ReadSplitsEvent>(16);
    let token = state.shutdown.child_token();
    let session_done = CancellationToken::new();

    // Client disconnect drops the body receiver; propagate that into the
    // session token so a stalled backend read stops too, not just the
    // next send. The watcher exits when the session itself finishes.
    tokio::spawn({
        let tx = tx.clone();
        let token = token.clone();
        let session_done = session_done.clone();
        async move {
            tokio::select! {
                _ = tx.closed() => {
                    debug!("caller went away, cancelling session");
                    token.cancel();
                }
                _ = session_done.cancelled() => {}
            }
        }
    });

    tokio::spawn(async move {
        let mut stream = ChannelResponseStream { tx, token };
        // terminal outcome already reached the caller as an event
        let _ = state.service.read_splits(&request, &mut stream).await;
        drop(stream);
        session_done.cancel();
    });

    let body = Body::from_stream(async_stream::stream! {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => yield Ok::<String, Infallible>(format!("{}\n", line)),
                Err(e) => {
                    error!("failed to encode stream event: {}", e);
                    break;
                }
            }
        }
    });

    ([(header::CONTENT_TYPE, "application/x-ndjson")], body)
}
