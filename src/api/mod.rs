use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::pipeline::MentionPipeline;

pub mod handlers;
pub mod models;

pub fn create_router(pipeline: Arc<MentionPipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/analyze", post(handlers::analyze_handler))
        .route("/api/pages", get(handlers::pages_handler))
        .with_state(pipeline)
        .layer(cors)
}
