use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// API Routes - REST API standing in for the dashboard shell
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Saved views
            .route("/views", get(handlers::api::list_views).post(handlers::api::create_view))
            .route("/views/generate", post(handlers::api::generate_view))
            .route(
                "/views/{id}",
                get(handlers::api::get_view)
                    .put(handlers::api::update_view)
                    .delete(handlers::api::delete_view),
            )
            // Rendering
            .route("/views/{id}/render", post(handlers::api::render_view))
            .route(
                "/views/{id}/components/{index}/image",
                get(handlers::api::component_image),
            )
            .route("/render", post(handlers::api::render_preview))
            // Delivery
            .route("/export", post(handlers::api::export_views))
            // Data access
            .route("/query", post(handlers::api::execute_query))
            .route("/date-range", get(handlers::api::date_range))
            // System
            .route("/cache/clear", post(handlers::api::clear_cache))
            .route("/status", get(handlers::api::system_status)),
    )
}
