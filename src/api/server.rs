use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    create_rule_group, delete_namespace, delete_rule_group, get_rule_group, health_check,
    list_namespace, list_rule_groups, prometheus_alerts, prometheus_rules, AppState,
};
use crate::appender::MemoryAppender;
use crate::config::ServerConfig;
use crate::manager::RuleManager;
use crate::remote::PrometheusQuerier;
use crate::store::MemoryRuleStore;

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Rule group configuration
        .route("/api/v1/rules", get(list_rule_groups))
        .route(
            "/api/v1/rules/:namespace",
            get(list_namespace)
                .post(create_rule_group)
                .delete(delete_namespace),
        )
        .route(
            "/api/v1/rules/:namespace/:group",
            get(get_rule_group).delete(delete_rule_group),
        )
        // Prometheus-compatible listing
        .route("/prometheus/api/v1/rules", get(prometheus_rules))
        .route("/prometheus/api/v1/alerts", get(prometheus_alerts))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server together with the evaluation loop
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let ruler = &config.ruler;

    let store = Arc::new(MemoryRuleStore::new());
    let querier = Arc::new(PrometheusQuerier::new(
        ruler.query_url.clone(),
        ruler.evaluation_timeout,
    )?);
    let appender = Arc::new(MemoryAppender::new());

    let manager = Arc::new(RuleManager::new(
        store.clone(),
        querier,
        appender,
        ruler.evaluation_timeout,
        ruler.store_timeout,
    ));
    let manager_handle = Arc::clone(&manager).start(ruler.poll_interval);

    if ruler.enable_federated_rules {
        tracing::info!(
            "Federated rules enabled for {} tenant(s)",
            ruler.allowed_federated_tenants.len()
        );
    }

    let state = Arc::new(AppState {
        store,
        limits: Arc::new(ruler.limits()),
        policy: ruler.federation_policy(),
        manager: Arc::clone(&manager),
        store_timeout: ruler.store_timeout,
    });

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting ruler on {} (querying {})", addr, ruler.query_url);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&manager)))
        .await?;

    if let Err(e) = manager_handle.await {
        tracing::warn!(error = %e, "Rule manager task ended abnormally");
    }

    tracing::info!("Ruler stopped");
    Ok(())
}

async fn shutdown_signal(manager: Arc<RuleManager>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    tracing::info!("Shutdown signal received, stopping rule manager...");
    manager.stop().await;
}
