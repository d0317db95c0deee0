use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::pipeline::MentionPipeline;

use super::models::{AnalyzeRequest, AnalyzeResponse, PagesQuery, PagesResponse};

pub async fn analyze_handler(
    State(pipeline): State<Arc<MentionPipeline>>,
    Json(body): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, (StatusCode, String)> {
    let start = Instant::now();

    let request = body.into_analysis();
    if let Err(e) = request.validate() {
        info!(error = %e, "rejected analyze request");
        return Err((StatusCode::BAD_REQUEST, e.to_string()));
    }

    let report = pipeline
        .run(&request)
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    Ok(Json(AnalyzeResponse {
        report,
        processing_time_ms: start.elapsed().as_millis(),
    }))
}

pub async fn pages_handler(
    State(pipeline): State<Arc<MentionPipeline>>,
    Query(query): Query<PagesQuery>,
) -> Result<Json<PagesResponse>, (StatusCode, String)> {
    let terms = query.term_list();
    let domain = query
        .domain
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());

    let pages = pipeline
        .store()
        .find_pages(&terms, domain, query.limit)
        .await
        .map_err(|e| {
            warn!("reading stored pages failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Storage error: {}", e),
            )
        })?;

    Ok(Json(PagesResponse {
        total_results: pages.len(),
        terms,
        pages,
    }))
}
