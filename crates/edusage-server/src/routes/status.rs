//! Ingestion status route.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use edusage_core::{ExtractionMethod, Language};
use edusage_store::{UploadRecord, UploadStatus};
use serde::Serialize;
use tracing::error;

use crate::state::AppState;

const RECENT_LIMIT: usize = 10;
const FAILED_LIMIT: usize = 20;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/upload-status", get(get_upload_status))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentUpload {
    pub file_name: String,
    pub chunks: Option<i64>,
    pub uploaded_at: Option<String>,
    pub language: Option<Language>,
    pub text_length: Option<i64>,
    pub extraction_method: Option<ExtractionMethod>,
    pub quality_score: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedUpload {
    pub file_name: String,
    pub status: UploadStatus,
    pub error: Option<String>,
    pub retry_count: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatusResponse {
    pub status_counts: BTreeMap<String, i64>,
    pub total_chunks: i64,
    pub recent_uploads: Vec<RecentUpload>,
    pub failed_uploads: Vec<FailedUpload>,
    pub priority_distribution: BTreeMap<String, i64>,
    pub language_distribution: BTreeMap<String, i64>,
}

fn millis_to_rfc3339(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(|t| t.to_rfc3339())
}

impl From<UploadRecord> for RecentUpload {
    fn from(r: UploadRecord) -> Self {
        Self {
            file_name: r.file_name,
            chunks: r.chunks,
            uploaded_at: r.uploaded_at.and_then(millis_to_rfc3339),
            language: r.language,
            text_length: r.text_length,
            extraction_method: r.extraction_method,
            quality_score: r.quality_score,
        }
    }
}

impl From<UploadRecord> for FailedUpload {
    fn from(r: UploadRecord) -> Self {
        Self {
            file_name: r.file_name,
            status: r.status,
            error: r.error,
            retry_count: r.retry_count,
        }
    }
}

fn collect_status(state: &AppState) -> edusage_core::Result<UploadStatusResponse> {
    let summary = state.store.ledger_summary()?;
    let recent = state.store.recent_completions(RECENT_LIMIT)?;
    let failed = state.store.recent_failures(FAILED_LIMIT)?;

    Ok(UploadStatusResponse {
        status_counts: summary.status_counts,
        total_chunks: summary.total_chunks,
        recent_uploads: recent.into_iter().map(RecentUpload::from).collect(),
        failed_uploads: failed.into_iter().map(FailedUpload::from).collect(),
        priority_distribution: summary.priority_distribution,
        language_distribution: summary.language_distribution,
    })
}

/// GET /api/upload-status — ledger counts, recent completions and failures.
async fn get_upload_status(State(state): State<Arc<AppState>>) -> Response {
    match collect_status(&state) {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            error!("Failed to fetch upload status: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Failed to fetch status" })),
            )
                .into_response()
        }
    }
}
