use std::{net::SocketAddr, sync::Arc};

use anyhow::Context as AnyhowContext;
use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, signal};

use crate::{error::Result, health::HealthAggregator};

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

#[derive(Clone)]
struct ServerState {
    aggregator: Arc<HealthAggregator>,
}

fn router(aggregator: HealthAggregator) -> Router {
    let state = ServerState {
        aggregator: Arc::new(aggregator),
    };

    Router::new()
        .route("/health", get(gateway_health))
        .route("/services/status", get(services_status))
        .fallback(not_found)
        .with_state(state)
}

/// Serves the composite service status over HTTP until ctrl-c.
pub async fn run_status_server(listen: Option<&str>, aggregator: HealthAggregator) -> Result<()> {
    let listen = listen.unwrap_or(DEFAULT_LISTEN_ADDR);
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("parsing listen address `{listen}`"))?;

    let listener = TcpListener::bind(addr)
        .await
        .context("binding status server address")?;
    tracing::info!(
        "status server listening on http://{}",
        listener.local_addr().unwrap_or(addr)
    );

    axum::serve(listener, router(aggregator))
        .with_graceful_shutdown(async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::warn!("failed to listen for shutdown signal: {err:?}");
            }
            tracing::info!("shutdown signal received; stopping status server");
        })
        .await
        .context("running status server")?;

    Ok(())
}

async fn gateway_health() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": { "status": "healthy", "service": "detection gateway" },
    }))
}

async fn services_status(State(state): State<ServerState>) -> Json<Value> {
    let status = state.aggregator.collect().await;
    Json(json!({
        "success": true,
        "data": status,
    }))
}

async fn not_found(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": format!("no route for {}", uri.path()),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ProxyFetch;
    use crate::health::{ServiceTable, MODEL_VERSION};
    use crate::session::ClientConfig;
    use std::time::Duration;

    fn state(origin: &str) -> ServerState {
        let fetch = ProxyFetch::new(&ClientConfig::new(origin)).unwrap();
        ServerState {
            aggregator: Arc::new(HealthAggregator::new(
                fetch,
                ServiceTable::default(),
                Duration::from_millis(300),
            )),
        }
    }

    #[tokio::test]
    async fn gateway_reports_itself_healthy() {
        let Json(body) = gateway_health().await;
        assert_eq!(body["data"]["status"], "healthy");
    }

    #[tokio::test]
    async fn services_status_wraps_composite_document() {
        let Json(body) = services_status(State(state("http://127.0.0.1:1"))).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["success_rate"], 0.0);
        assert_eq!(body["data"]["model_version"], MODEL_VERSION);
        assert_eq!(body["data"]["services"].as_object().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn unknown_routes_are_json_404() {
        let response = not_found(Uri::from_static("/nope")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn default_listen_address_parses() {
        assert!(DEFAULT_LISTEN_ADDR.parse::<SocketAddr>().is_ok());
    }
}
