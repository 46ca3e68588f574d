use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{R2rError, Result};
use crate::mcp::{process_request, RpcRequest};
use crate::model::SearchChunksRequest;
use crate::search::SearchPipeline;

static SSE_SEQ: AtomicU64 = AtomicU64::new(0);

type SessionMap = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Event>>>>;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SearchPipeline>,
    pub sessions: SessionMap,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "authenticated_mode": state.pipeline.session().is_authenticated_mode(),
    }))
}

async fn search_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SearchChunksRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(e) => {
            return ErrorResponse {
                error: format!("invalid request body: {e}"),
            }
            .into_response()
        }
    };

    // search errors are part of the body, so this is always 200
    let resp = state.pipeline.search(req).await;
    (StatusCode::OK, Json(resp)).into_response()
}

async fn sse_handler(State(state): State<AppState>) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let seq = SSE_SEQ.fetch_add(1, Ordering::Relaxed);
    let session_id = format!("{}-{seq}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0));

    // MCP clients resolve the endpoint relative to the SSE URL
    let endpoint_url = format!("/message?session_id={}", session_id);
    let _ = tx.send(Event::default().event("endpoint").data(endpoint_url));

    if let Ok(mut sessions) = state.sessions.write() {
        sessions.retain(|_, sender| !sender.is_closed());
        sessions.insert(session_id.clone(), tx);
    }

    // dropped together with the stream when the client disconnects
    let cleanup = SseSession {
        id: session_id,
        sessions: state.sessions.clone(),
    };
    let stream = UnboundedReceiverStream::new(rx).map(move |event| {
        let _session = &cleanup;
        Ok::<_, axum::Error>(event)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Removes its SSE session from the map on drop.
struct SseSession {
    id: String,
    sessions: SessionMap,
}

impl Drop for SseSession {
    fn drop(&mut self) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(&self.id);
        }
    }
}

#[derive(Deserialize)]
struct MessageQuery {
    session_id: String,
}

async fn message_handler(
    State(state): State<AppState>,
    query: std::result::Result<Query<MessageQuery>, QueryRejection>,
    payload: std::result::Result<Json<RpcRequest>, JsonRejection>,
) -> impl IntoResponse {
    let (Ok(Query(q)), Ok(Json(req))) = (query, payload) else {
        return StatusCode::BAD_REQUEST;
    };

    let sender = state
        .sessions
        .read()
        .ok()
        .and_then(|sessions| sessions.get(&q.session_id).cloned());

    let Some(sender) = sender else {
        return StatusCode::NOT_FOUND;
    };

    let pipeline = state.pipeline.clone();
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let Some(resp) = process_request(pipeline, req).await else {
            return;
        };
        if let Ok(json_str) = serde_json::to_string(&resp) {
            if sender.send(Event::default().event("message").data(json_str)).is_err() {
                warn!("SSE session {} closed, dropping it", q.session_id);
                if let Ok(mut s) = sessions.write() {
                    s.remove(&q.session_id);
                }
            }
        }
    });
    StatusCode::ACCEPTED
}

pub fn build_router(pipeline: Arc<SearchPipeline>) -> Router {
    let state = AppState {
        pipeline,
        sessions: Arc::new(RwLock::new(HashMap::new())),
    };
    Router::new()
        .route("/health", get(health_handler))
        .route("/search_chunks", post(search_handler))
        .route("/sse", get(sse_handler))
        .route("/message", post(message_handler))
        .with_state(state)
}

pub async fn serve_http(pipeline: Arc<SearchPipeline>, config: &ServerConfig) -> Result<()> {
    let router = build_router(pipeline);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| R2rError::ConfigError(format!("bind {addr} failed: {e}")))?;
    info!("HTTP server listening on http://{}", addr);
    axum::serve(listener, router).await.map_err(Into::into)
}
