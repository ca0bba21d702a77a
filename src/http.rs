//! HTTP server for the Prometheus metrics and health endpoints.
//!
//! Runs on a separate tokio task and serves `/metrics` for Prometheus scraping
//! and `/health` with a JSON summary of the hosted arrays.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::state::ArrayRegistry;

/// Shared state behind the HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub server_name: String,
    pub started_at: DateTime<Utc>,
    pub registry: Arc<ArrayRegistry>,
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Handler for GET /health.
async fn health_handler(State(state): State<HttpState>) -> Json<Value> {
    Json(health_report(&state))
}

fn health_report(state: &HttpState) -> Value {
    let arrays: Vec<Value> = state
        .registry
        .arrays()
        .iter()
        .map(|host| {
            json!({
                "name": host.name(),
                "entries": host.len(),
                "array_key": host.array_key(),
                "consistent": host.check_consistency().is_ok(),
            })
        })
        .collect();

    json!({
        "status": "ok",
        "server": state.server_name,
        "started_at": state.started_at.to_rfc3339(),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
        "arrays": arrays,
    })
}

fn router(state: HttpState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP server.
///
/// Binds to `0.0.0.0:port`. This is a long-running task that should be
/// spawned in the background.
pub async fn run_http_server(port: u16, state: HttpState) {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("HTTP server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind HTTP server on {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("HTTP server error: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{HostSettings, NameTables};
    use reparray_core::{JsonPayloads, Payload, TypeTag};

    #[test]
    fn health_lists_arrays_in_name_order() {
        let registry = Arc::new(ArrayRegistry::new(
            NameTables::default(),
            Arc::new(JsonPayloads),
        ));
        let crates = registry.add_array("crates", HostSettings::default()).unwrap();
        registry.add_array("barrels", HostSettings::default()).unwrap();
        crates
            .add_object(Payload::from(r#"{"weight": 3}"#), TypeTag::new("Json"), 2)
            .unwrap();

        let report = health_report(&HttpState {
            server_name: "test".to_string(),
            started_at: Utc::now(),
            registry,
        });

        assert_eq!(report["server"], "test");
        let arrays = report["arrays"].as_array().unwrap();
        assert_eq!(arrays.len(), 2);
        assert_eq!(arrays[0]["name"], "barrels");
        assert_eq!(arrays[1]["entries"], 2);
        assert_eq!(arrays[1]["consistent"], true);
    }
}
