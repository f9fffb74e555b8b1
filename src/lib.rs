pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod response;
pub mod services;
pub mod store;

use axum::{
    http::{header, StatusCode},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::error::AppError;
use crate::response::ApiResponse;
use crate::services::{RetryPolicy, ReservationService, TokenService, UserService};
use crate::store::Store;

// Shared state for the whole application
#[derive(Clone)]
pub struct AppState {
    pub config: crate::config::Config,
    pub store: Arc<dyn Store>,
    pub tokens: TokenService,
    pub users: UserService,
    pub reservations: ReservationService,
}

impl AppState {
    pub fn new(config: crate::config::Config, store: Arc<dyn Store>) -> Arc<Self> {
        let tokens = TokenService::new(&config.jwt);
        let users = UserService::new(store.clone(), tokens.clone());
        let reservations = ReservationService::new(store.clone(), RetryPolicy::from_config(&config.retry));

        Arc::new(Self {
            config,
            store,
            tokens,
            users,
            reservations,
        })
    }
}

/// Full HTTP surface: `/health` plus the API under `/api/v1`.
pub fn router(state: Arc<AppState>) -> Router {
    let timeout = Duration::from_secs(state.config.app.request_timeout_secs);

    let api = Router::new()
        .route("/health", get(health))
        .nest("/api/v1", controllers::routes())
        .fallback(route_not_found)
        .with_state(state);
    with_layers(api, timeout)
}

fn with_layers(app: Router, timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    app.layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
        .layer(axum_middleware::map_response(timeout_envelope))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// The timeout layer answers with a bare 408; give it the usual envelope.
async fn timeout_envelope(res: Response) -> Response {
    if res.status() == StatusCode::REQUEST_TIMEOUT && !res.headers().contains_key(header::CONTENT_TYPE) {
        tracing::warn!("request timed out");
        return ApiResponse::<()>::message(StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response();
    }
    res
}

async fn health() -> impl IntoResponse {
    ApiResponse::ok("OK", serde_json::json!({ "status": "healthy" }))
}

async fn route_not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}
