//! Drives `HttpR2rClient` against an in-process axum stand-in for the R2R v3 API.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Form, Json, Router,
};
use r2r_search_mcp::client::{HttpR2rClient, R2rApi};
use r2r_search_mcp::error::R2rError;
use r2r_search_mcp::model::{SearchFilter, SearchSettings};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

#[derive(Default)]
struct Seen {
    search_bodies: Vec<Value>,
    auth_headers: Vec<Option<String>>,
    refresh_bodies: Vec<Value>,
}

type Shared = Arc<Mutex<Seen>>;

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(Form(form): Form<LoginForm>) -> impl IntoResponse {
    if form.username == "admin@example.com" && form.password == "change_me" {
        (
            StatusCode::OK,
            Json(json!({"results": {
                "access_token": {"token": "access-1", "token_type": "access"},
                "refresh_token": {"token": "refresh-1", "token_type": "refresh"}
            }})),
        )
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Incorrect email or password"})))
    }
}

async fn refresh(State(seen): State<Shared>, Json(body): Json<Value>) -> impl IntoResponse {
    seen.lock().unwrap().refresh_bodies.push(body);
    Json(json!({"results": {
        "access_token": {"token": "access-2", "token_type": "access"},
        "refresh_token": {"token": "refresh-2", "token_type": "refresh"}
    }}))
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn search(State(seen): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    let mut s = seen.lock().unwrap();
    s.auth_headers.push(bearer(&headers));
    s.search_bodies.push(body.clone());
    if body["query"] == "explode" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "search backend down").into_response();
    }
    if body["query"] == "garbled" {
        return (StatusCode::OK, "<html>").into_response();
    }
    Json(json!({"results": [
        {"id": "c1", "document_id": "d1", "owner_id": "u", "score": 0.3,
         "metadata": {"search_score": 0.91}, "text": "snippet"},
        {"id": "c/2", "document_id": "d2", "metadata": {}}
    ]}))
    .into_response()
}

async fn retrieve(State(seen): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> impl IntoResponse {
    seen.lock().unwrap().auth_headers.push(bearer(&headers));
    if id == "missing" {
        return (StatusCode::NOT_FOUND, "chunk not found").into_response();
    }
    Json(json!({"results": {"id": id, "document_id": "d1", "text": format!("full text of {id}")}})).into_response()
}

async fn spawn_fake() -> (HttpR2rClient, Shared) {
    let seen: Shared = Arc::new(Mutex::new(Seen::default()));
    let app = Router::new()
        .route("/v3/users/login", post(login))
        .route("/v3/users/refresh-token", post(refresh))
        .route("/v3/chunks/search", post(search))
        .route("/v3/chunks/:id", get(retrieve))
        .with_state(seen.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (HttpR2rClient::new(format!("http://{addr}/")).unwrap(), seen)
}

#[tokio::test]
async fn login_and_refresh_exchange_tokens() {
    let (client, seen) = spawn_fake().await;

    let tokens = client.login("admin@example.com", "change_me").await.unwrap();
    assert_eq!(tokens.access_token, "access-1");
    assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-1"));

    let renewed = client.refresh("refresh-1").await.unwrap();
    assert_eq!(renewed.access_token, "access-2");
    assert_eq!(seen.lock().unwrap().refresh_bodies, vec![json!("refresh-1")]);
}

#[tokio::test]
async fn rejected_login_is_an_api_error() {
    let (client, _) = spawn_fake().await;
    let err = client.login("admin@example.com", "wrong").await.unwrap_err();
    match err {
        R2rError::Api { status, message } => {
            assert_eq!(status, 401);
            assert!(message.contains("Incorrect"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn search_posts_settings_with_bearer() {
    let (client, seen) = spawn_fake().await;
    let ids = vec!["d1".to_string()];
    let settings = SearchSettings::hybrid(SearchFilter::from_file_ids(Some(ids.as_slice())), 5);

    let hits = client.search_chunks(Some("access-1"), "returns", &settings).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "c1");
    assert_eq!(hits[0].relevance(), 0.91);
    assert_eq!(hits[1].relevance(), 0.0);

    let s = seen.lock().unwrap();
    assert_eq!(
        s.search_bodies[0],
        json!({
            "query": "returns",
            "search_settings": {
                "use_hybrid_search": true,
                "filters": {"document_id": {"$in": ["d1"]}},
                "search_limit": 5
            }
        })
    );
    assert_eq!(s.auth_headers[0].as_deref(), Some("Bearer access-1"));
}

#[tokio::test]
async fn search_errors_are_classified() {
    let (client, seen) = spawn_fake().await;
    let settings = SearchSettings::hybrid(SearchFilter::default(), 5);

    let err = client.search_chunks(None, "explode", &settings).await.unwrap_err();
    assert!(matches!(err, R2rError::Api { status: 500, .. }));

    let err = client.search_chunks(None, "garbled", &settings).await.unwrap_err();
    assert!(matches!(err, R2rError::InvalidResponse(_)));

    assert_eq!(seen.lock().unwrap().auth_headers, vec![None, None]);
}

#[tokio::test]
async fn retrieve_encodes_chunk_id() {
    let (client, _) = spawn_fake().await;

    let chunk = client.retrieve_chunk(None, "c/2").await.unwrap();
    assert_eq!(chunk.id, "c/2");
    assert_eq!(chunk.text, "full text of c/2");

    let err = client.retrieve_chunk(None, "missing").await.unwrap_err();
    assert!(matches!(err, R2rError::Api { status: 404, .. }));
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpR2rClient::new(format!("http://{addr}")).unwrap();
    let err = client.login("a", "b").await.unwrap_err();
    assert!(matches!(err, R2rError::Http(_)));
}
