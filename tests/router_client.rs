//! [`RouterClient`] against an in-process axum mock of the router.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use ingest_files::config::RouterConfig;
use ingest_files::embedding::{EmbeddingService, RouterClient};
use ingest_files::error::{AuthError, EmbedError};
use serde_json::{json, Value};

#[derive(Clone, Copy)]
enum Mode {
    Ok,
    Unauthorized,
    NoToken,
    SlowToken,
    NoData,
    ShortData,
}

#[derive(Clone)]
struct Mock {
    mode: Mode,
    api_keys: Arc<Mutex<Vec<String>>>,
    auth_headers: Arc<Mutex<Vec<String>>>,
}

async fn handle_token(State(mock): State<Mock>, Json(body): Json<Value>) -> Response {
    let key = body["api_key"].as_str().unwrap_or_default().to_string();
    mock.api_keys.lock().unwrap().push(key);

    match mock.mode {
        Mode::Unauthorized => (StatusCode::UNAUTHORIZED, "invalid api key").into_response(),
        Mode::NoToken => Json(json!({ "token_type": "bearer" })).into_response(),
        Mode::SlowToken => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({ "access_token": "late" })).into_response()
        }
        _ => Json(json!({ "access_token": "tok-abc" })).into_response(),
    }
}

async fn handle_embeddings(
    State(mock): State<Mock>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    mock.auth_headers.lock().unwrap().push(auth);

    let inputs = body["input"].as_array().map(|a| a.len()).unwrap_or(0);
    let count = match mock.mode {
        Mode::NoData => return Json(json!({ "object": "list" })).into_response(),
        Mode::ShortData => inputs.saturating_sub(1),
        _ => inputs,
    };

    let data: Vec<Value> = (0..count)
        .map(|i| json!({ "object": "embedding", "index": i, "embedding": [i as f64, 0.5] }))
        .collect();
    Json(json!({ "object": "list", "data": data })).into_response()
}

async fn spawn_router(mode: Mode) -> (String, Mock) {
    let mock = Mock {
        mode,
        api_keys: Arc::default(),
        auth_headers: Arc::default(),
    };
    let app = Router::new()
        .route("/v1/token", post(handle_token))
        .route("/v1/embeddings", post(handle_embeddings))
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), mock)
}

fn client(base_url: &str) -> RouterClient {
    RouterClient::new(&RouterConfig {
        base_url: base_url.to_string(),
        api_key: Some("secret-key".to_string()),
        token_timeout_secs: 0.5,
        embed_timeout_secs: 5.0,
    })
    .unwrap()
}

fn inputs(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("chunk {}", i)).collect()
}

#[tokio::test]
async fn test_token_then_embeddings() {
    let (base, mock) = spawn_router(Mode::Ok).await;
    let client = client(&base);

    let token = client.authenticate().await.unwrap();
    assert_eq!(token, "tok-abc");
    assert_eq!(*mock.api_keys.lock().unwrap(), vec!["secret-key".to_string()]);

    let vectors = client.embed(&inputs(3), &token).await.unwrap();
    assert_eq!(vectors, vec![vec![0.0, 0.5], vec![1.0, 0.5], vec![2.0, 0.5]]);
    assert_eq!(
        *mock.auth_headers.lock().unwrap(),
        vec!["Bearer tok-abc".to_string()]
    );
}

#[tokio::test]
async fn test_full_embeddings_url_is_accepted() {
    let (base, _mock) = spawn_router(Mode::Ok).await;
    let client = client(&format!("{}/v1/embeddings", base));

    assert_eq!(client.token_url(), format!("{}/v1/token", base));
    let token = client.authenticate().await.unwrap();
    assert_eq!(client.embed(&inputs(1), &token).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unauthorized_status_is_auth_error() {
    let (base, _mock) = spawn_router(Mode::Unauthorized).await;

    let err = client(&base).authenticate().await.unwrap_err();
    match err {
        AuthError::Status { status, body } => {
            assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED);
            assert_eq!(body, "invalid api key");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_access_token_is_auth_error() {
    let (base, _mock) = spawn_router(Mode::NoToken).await;

    let err = client(&base).authenticate().await.unwrap_err();
    assert!(matches!(err, AuthError::MissingToken { .. }));
}

#[tokio::test]
async fn test_token_timeout_is_transport_error() {
    let (base, _mock) = spawn_router(Mode::SlowToken).await;

    let err = client(&base).authenticate().await.unwrap_err();
    match err {
        AuthError::Transport(e) => assert!(e.is_timeout()),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_data_is_malformed() {
    let (base, _mock) = spawn_router(Mode::NoData).await;

    let err = client(&base).embed(&inputs(2), "tok").await.unwrap_err();
    assert!(matches!(err, EmbedError::Malformed { .. }));
}

#[tokio::test]
async fn test_short_data_is_count_mismatch() {
    let (base, _mock) = spawn_router(Mode::ShortData).await;

    let err = client(&base).embed(&inputs(4), "tok").await.unwrap_err();
    assert!(matches!(
        err,
        EmbedError::CountMismatch {
            expected: 4,
            actual: 3
        }
    ));
}

#[tokio::test]
async fn test_unreachable_router_is_transport_error() {
    // Bind then drop to get a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = client(&base).authenticate().await.unwrap_err();
    assert!(matches!(err, AuthError::Transport(_)));
}
