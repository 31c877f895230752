//! Liveness endpoint.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/healthz` | Returns `{"status": "ok", "version": "..."}` |
//!
//! The endpoint reports process liveness only. It does not check the
//! database or the embedding router.

use std::future::Future;

use anyhow::{Context, Result};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;

/// JSON response body for `GET /healthz`.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router {
    Router::new().route("/healthz", get(handle_health))
}

/// Bind `addr`. Split from [`serve`] so bind failures surface at startup.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind health server to {}", addr))
}

/// Serve the health router until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "health server listening");

    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("health server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_healthz_reports_ok_and_version() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, async {
            let _ = rx.await;
        }));

        let response = reqwest::get(format!("http://{}/healthz", addr))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

        let missing = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_names_address() {
        let first = bind("127.0.0.1:0").await.unwrap();
        let taken = first.local_addr().unwrap().to_string();
        let err = bind(&taken).await.unwrap_err();
        assert!(err.to_string().contains(&taken));
    }
}
