//! Liveness endpoint for hosting platforms.
//!
//! `GET /` answers with a short plain-text banner and `GET /health` with
//! `{"status":"ok"}`. The server runs in its own task and stops gracefully
//! when [`HealthServer::shutdown`] is called.

use std::net::SocketAddr;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::ChannelError;

pub const BANNER: &str = "Text-to-speech bot is running";

/// Routes served by the health server.
pub fn router() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
}

async fn root() -> &'static str {
    BANNER
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// HTTP server hosting [`router`].
pub struct HealthServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HealthServer {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Bind the listener and spawn the server. Returns the bound address,
    /// which differs from the configured one when port 0 was requested.
    pub async fn start(&mut self) -> Result<SocketAddr, ChannelError> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "health".to_string(),
                reason: format!("Failed to bind to {}: {}", self.addr, e),
            })?;
        let bound = listener
            .local_addr()
            .map_err(|e| ChannelError::StartupFailed {
                name: "health".to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(addr = %bound, "Health server listening");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("Health server shutting down");
                })
                .await
            {
                tracing::error!(error = %e, "Health server error");
            }
        });

        self.handle = Some(handle);
        Ok(bound)
    }

    /// Signal graceful shutdown and wait for the server task to exit.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_root_banner() {
        let response = router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, BANNER);
    }

    #[tokio::test]
    async fn test_health_json() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut server = HealthServer::new("127.0.0.1:0".parse().unwrap());
        let addr = server.start().await.unwrap();

        let body: Value = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");

        server.shutdown().await;
        assert!(reqwest::get(format!("http://{}/health", addr)).await.is_err());
    }
}
