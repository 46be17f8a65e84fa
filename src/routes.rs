// src/routes.rs

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    handlers::{response, session},
    state::AppState,
};

/// Assembles the main application router.
///
/// * Session routes (config, start, status, advance) under `/api`.
/// * Answer uploads under `/api/response`, with the configured body limit.
/// * Everything else falls back to the static test page.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let session_routes = Router::new()
        .route("/config", get(session::get_config))
        .route("/start", post(session::start_session))
        .route("/status", get(session::get_status))
        .route("/advance", post(session::advance_session));

    let response_routes = Router::new()
        .route("/response", post(response::submit_response))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes));

    let static_files = ServeDir::new(&state.config.static_dir);

    Router::new()
        .nest("/api", session_routes.merge(response_routes))
        .fallback_service(static_files)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
