//! Request handlers.

use super::{errors::AppError, state::AppState};
use crate::pipeline::{IndexingRun, PageRange};
use crate::records::{DetectionResult, IndexRecord};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

// --- API Payloads ---

#[derive(Deserialize)]
pub struct IndexRequest {
    pub book_id: Option<String>,
    pub start_page: Option<u32>,
    pub end_page: Option<u32>,
}

#[derive(Serialize)]
pub struct IndexResponse {
    message: String,
    pages_to_process: usize,
}

/// Wire format of the detection endpoint, camelCase to match the frontend.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectRequest {
    pub image_url: Option<String>,
    #[serde(default)]
    pub page_index: usize,
    /// When present, the per-book session cache is consulted first.
    pub book_id: Option<String>,
}

#[derive(Serialize)]
pub struct BookIndexResponse {
    book_id: String,
    title: Option<String>,
    index_status: Option<String>,
    total: usize,
    records: Vec<IndexRecord>,
}

// --- Handlers ---

pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Kick off an indexing run and answer before it finishes.
///
/// The run is spawned fire-and-forget; callers observe progress by polling
/// the per-page records endpoint.
pub async fn trigger_index_handler(
    State(state): State<AppState>,
    Json(req): Json<IndexRequest>,
) -> Result<(StatusCode, Json<IndexResponse>), AppError> {
    let book_id = req
        .book_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("book_id is required".to_string()))?;

    let range = PageRange {
        start_page: req.start_page,
        end_page: req.end_page,
    };
    let run = IndexingRun::prepare(
        state.store.clone(),
        state.analyzer.clone(),
        state.config.clone(),
        &book_id,
        range,
    )
    .await?;

    let pages_to_process = run.page_count();
    run.spawn();
    info!("indexing run spawned for book {book_id} ({pages_to_process} pages)");

    Ok((
        StatusCode::ACCEPTED,
        Json(IndexResponse {
            message: "OCR indexing started".to_string(),
            pages_to_process,
        }),
    ))
}

/// Classify one page image.
///
/// With a `bookId` the per-book session cache answers repeat lookups
/// without another gateway call; without one the gateway is hit directly.
pub async fn detect_page_handler(
    State(state): State<AppState>,
    Json(req): Json<DetectRequest>,
) -> Result<Json<DetectionResult>, AppError> {
    let image_url = req
        .image_url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| AppError::BadRequest("imageUrl is required".to_string()))?;

    let result = match req.book_id {
        Some(book_id) => {
            state
                .detection_session(&book_id)
                .classify_page(&image_url, req.page_index)
                .await?
        }
        None => {
            state
                .analyzer
                .classify_page(&image_url, req.page_index)
                .await?
        }
    };

    Ok(Json(result))
}

/// Per-page record report for one book.
pub async fn book_index_handler(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Result<Json<BookIndexResponse>, AppError> {
    let book = state.store.book(&book_id).await?;
    let records = state.store.records_for_book(&book_id).await?;

    Ok(Json(BookIndexResponse {
        book_id,
        title: book.as_ref().and_then(|b| b.title.clone()),
        index_status: book.map(|b| b.index_status.as_str().to_string()),
        total: records.len(),
        records,
    }))
}
