//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        // Posts
        .route("/collaborations", post(handlers::create_post))
        .route("/collaborations/:post_id", get(handlers::get_post))
        .route(
            "/collaborations/:post_id/requests",
            post(handlers::request_to_join).get(handlers::list_requests),
        )
        // Decisions
        .route(
            "/collaboration-requests/:request_id",
            get(handlers::get_request),
        )
        .route(
            "/collaboration-requests/:request_id/accept",
            post(handlers::accept_request),
        )
        .route(
            "/collaboration-requests/:request_id/reject",
            post(handlers::reject_request),
        )
        // Users
        .route("/users/:user_id/profile", get(handlers::get_profile))
        .route(
            "/users/:user_id/notifications",
            get(handlers::list_notifications),
        );

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
