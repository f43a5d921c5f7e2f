//! Tablegate REST API
//!
//! HTTP API layer for Tablegate, built with Axum.
//!
//! # Endpoints
//!
//! ## Data
//! - `GET /data` - List configured endpoints
//! - `GET /data/:name` - Query an endpoint; see [`crate::query`] for parameters
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use tablegate::api::{serve, AppState};
//! use tablegate::backend::ConnectionRegistry;
//! use tablegate::config::Config;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let registry = Arc::new(ConnectionRegistry::new());
//!     let handlers = config.build_handlers(Arc::clone(&registry))?;
//!
//!     serve(AppState::new(handlers, registry), &config.server.addr()).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let data_routes = Router::new()
        .route("/", get(routes::data::list_endpoints))
        .route("/:name", get(routes::data::get_data));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .nest("/data", data_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the API server
pub async fn serve(state: AppState, addr: &str) -> Result<(), ApiError> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Tablegate listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Tablegate shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendConfig, ConnectionRegistry, DriverKind};
    use crate::handler::{DataHandler, DataSource};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use std::collections::BTreeMap;
    use tempfile::tempdir;
    use tower::util::ServiceExt;

    fn create_test_app() -> (Router, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("flags.csv"),
            "id,country,count\n1,US,10\n2,US,20\n3,FR,5\n",
        )
        .unwrap();

        let registry = Arc::new(ConnectionRegistry::new());
        let backend = BackendConfig::new(DriverKind::Array, dir.path().to_str().unwrap(), "flags");
        let source = DataSource::new("flags", backend).header("Cache-Control", "max-age=60");

        let mut handlers = BTreeMap::new();
        handlers.insert(
            "flags".to_string(),
            DataHandler::new(source, Arc::clone(&registry)),
        );

        (build_router(AppState::new(handlers, registry)), dir)
    }

    async fn send_get(app: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health_live() {
        let (app, _dir) = create_test_app();
        let (status, _, _) = send_get(app, "/health/live").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full() {
        let (app, _dir) = create_test_app();
        let (status, _, body) = send_get(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["endpoints"], 1);
    }

    #[tokio::test]
    async fn test_list_endpoints() {
        let (app, _dir) = create_test_app();
        let (status, _, body) = send_get(app, "/data").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["endpoints"][0]["driver"], "array");
    }

    #[tokio::test]
    async fn test_query_endpoint() {
        let (app, _dir) = create_test_app();
        let (status, headers, body) = send_get(
            app,
            "/data/flags?groupby=country&agg=total:sum(count)&sort=total:desc",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(headers["cache-control"], "max-age=60");
        assert_eq!(body, r#"[{"country":"US","total":30},{"country":"FR","total":5}]"#);
    }

    #[tokio::test]
    async fn test_encoded_where_and_csv() {
        let (app, _dir) = create_test_app();
        let (status, headers, body) =
            send_get(app, "/data/flags?where=count%3E9&select=id&format=csv").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-disposition"], "attachment; filename=file.csv");
        assert_eq!(body, "id\n1\n2\n");
    }

    #[tokio::test]
    async fn test_unknown_endpoint() {
        let (app, _dir) = create_test_app();
        let (status, _, _) = send_get(app, "/data/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_column_is_bad_request() {
        let (app, _dir) = create_test_app();
        let (status, _, body) = send_get(app, "/data/flags?select=colour").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"]["code"], "UNKNOWN_COLUMN");
        assert!(json["request_id"].is_string());
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let (app, _dir) = create_test_app();
        let (status, _, _) = send_get(app, "/data/flags?format=xml").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
