//! HTTP/JSON API
//!
//! Axum router over the core services. Success bodies use the
//! `{code: 0, message: "success", data}` envelope; paginated bodies add
//! `{items, total, page, size}`. Everything under `/api/v1` except login is
//! behind bearer authentication.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{ApiError, ApiResult};

use crate::notify::Notifier;
use crate::probe::ProbeRegistry;
use crate::scheduler::Scheduler;
use crate::service::auth::AuthService;
use crate::service::targets::TargetService;
use crate::silence::SilenceTable;
use crate::storage::Store;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn Store>,
    pub registry: Arc<ProbeRegistry>,
    pub scheduler: Arc<Scheduler>,
    pub targets: Arc<TargetService>,
    pub auth: Arc<AuthService>,
    pub notifier: Arc<Notifier>,
    pub silences: Arc<SilenceTable>,
}

/// Build the full router for the given state.
pub fn build_router(state: ApiState) -> Router {
    let protected = Router::new()
        .route("/api/v1/probe/types", get(routes::probe::list_types))
        .route("/api/v1/probe/schema/:kind", get(routes::probe::get_schema))
        .route("/api/v1/probe/test", post(routes::probe::test_probe))
        .route(
            "/api/v1/targets",
            get(routes::targets::list).post(routes::targets::create),
        )
        .route(
            "/api/v1/targets/:id",
            get(routes::targets::get_one)
                .put(routes::targets::update)
                .delete(routes::targets::delete),
        )
        .route("/api/v1/targets/:id/results", get(routes::targets::results))
        .route("/api/v1/targets/:id/stats", get(routes::targets::stats))
        .route("/api/v1/alerts", get(routes::alerts::list))
        .route("/api/v1/alerts/:id", get(routes::alerts::get_one))
        .route("/api/v1/alerts/:id/silence", put(routes::alerts::silence))
        .route(
            "/api/v1/notifiers",
            get(routes::notifiers::list).post(routes::notifiers::create),
        )
        .route(
            "/api/v1/notifiers/:id",
            get(routes::notifiers::get_one)
                .put(routes::notifiers::update)
                .delete(routes::notifiers::delete),
        )
        .route("/api/v1/notifiers/test", post(routes::notifiers::test))
        .route(
            "/api/v1/dashboard/summary",
            get(routes::dashboard::summary),
        )
        .route(
            "/api/v1/dashboard/metrics",
            get(routes::dashboard::metrics),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/auth/login", post(routes::auth::login))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Bind and serve in a background task; returns the bound address.
pub async fn spawn_api_server(addr: SocketAddr, state: ApiState) -> anyhow::Result<SocketAddr> {
    let app = build_router(state);

    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    info!("API server listening on {local_addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {e}");
        }
    });

    Ok(local_addr)
}
