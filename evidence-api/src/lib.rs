pub mod api_types;
pub mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use postureledger_compliance::export::ExportService;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Shared application state available to handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ExportService>,
}

impl AppState {
    pub fn new(service: ExportService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// Build the router with permissive CORS (for local dev / tests).
pub fn build_router(state: AppState) -> Router {
    build_router_inner(CorsLayer::permissive(), state)
}

/// Build the router with explicit allowed origins. Empty = permissive.
pub fn build_router_with_origins(state: AppState, origins: &[String]) -> Router {
    build_router_inner(make_cors_layer(origins), state)
}

fn make_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(parsed))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    }
}

fn build_router_inner(cors: CorsLayer, state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health).fallback(routes::not_found))
        .route(
            "/evidence",
            get(routes::list_evidence).fallback(routes::not_found),
        )
        .route("/export", post(routes::export).fallback(routes::not_found))
        .route(
            "/exports/:file",
            get(routes::fetch_manifest).fallback(routes::not_found),
        )
        .fallback(routes::not_found)
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(1024 * 1024)) // 1 MB
        .layer(TraceLayer::new_for_http())
}
