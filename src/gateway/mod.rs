pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use anyhow::Context;
use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use utoipa::OpenApi;

use crate::api_auth::auth_middleware;
use crate::config::GatewayConfig;
use crate::rate_limit::{SlidingWindowLimiter, account_rate_limit_middleware, app_rate_limit_middleware};
use state::AppState;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi::ApiDoc::openapi())
}

/// Build the complete router.
///
/// Layering, outermost first:
/// - application limit: every route
/// - authentication, then account limit: token management routes
/// - token limit: inside the validation handlers
pub fn build_router(state: Arc<AppState>) -> Router {
    // ==========================================================================
    // Owner Routes (HMAC or legacy auth)
    // ==========================================================================
    let token_routes = Router::new()
        .route(
            "/tokens",
            post(handlers::create_token).get(handlers::list_tokens),
        )
        .route(
            "/tokens/{token_id}",
            get(handlers::get_token).delete(handlers::delete_token),
        )
        .route(
            "/tokens/{token_id}/status",
            put(handlers::update_token_status),
        )
        .route("/tokens/{token_id}/stats", get(handlers::token_stats))
        .route_layer(from_fn_with_state(
            state.account_limits.clone(),
            account_rate_limit_middleware,
        ))
        .route_layer(from_fn_with_state(
            state.dispatcher.clone(),
            auth_middleware,
        ));

    // ==========================================================================
    // Bearer Routes
    // ==========================================================================
    let validate_routes = Router::new()
        .route("/validate", post(handlers::validate_token))
        .route(
            "/validateu",
            post(handlers::validate_token_with_user_info),
        );

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api/v2", token_routes.merge(validate_routes))
        .with_state(state.clone())
        .layer(from_fn_with_state(
            state.limits.clone(),
            app_rate_limit_middleware,
        ))
}

/// Start periodic eviction of idle limiter keys and expired replay entries.
pub fn spawn_sweepers(state: &AppState, interval: Duration) -> Vec<JoinHandle<()>> {
    let mut handles = vec![SlidingWindowLimiter::spawn_cleanup(
        state.limits.limiter().clone(),
        interval,
    )];

    if let Some(cache) = state.replay_cache.clone() {
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.sweep(chrono::Utc::now().timestamp_millis());
                if removed > 0 {
                    tracing::debug!(removed, remaining = cache.len(), "replay cache sweep");
                }
            }
        }));
    }
    handles
}

/// Serve until Ctrl-C.
pub async fn run_server(config: &GatewayConfig, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(%addr, "gateway listening");
    tracing::info!("API docs: http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
