//! Data types for upload records, knowledge chunks, and search results.

use std::collections::BTreeMap;

use edusage_core::{DocumentType, Error, ExtractionMethod, Language, Priority, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Ingestion state of one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    OcrProcessing,
    OcrCompleted,
    OcrFailed,
}

impl UploadStatus {
    pub const ALL: [UploadStatus; 7] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::OcrProcessing,
        Self::OcrCompleted,
        Self::OcrFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::OcrProcessing => "ocr_processing",
            Self::OcrCompleted => "ocr_completed",
            Self::OcrFailed => "ocr_failed",
        }
    }

    /// `completed` or `ocr_completed`.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed | Self::OcrCompleted)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed | Self::OcrFailed)
    }

    /// The ledger's state machine. Anything not listed here is illegal.
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, OcrProcessing)
                | (OcrProcessing, OcrCompleted)
                | (OcrProcessing, OcrFailed)
                | (OcrFailed, OcrProcessing)
        )
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UploadStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        UploadStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::Internal(format!("unknown upload status '{}'", s)))
    }
}

/// A row of the upload ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub file_name: String,
    pub file_path: String,
    pub status: UploadStatus,
    pub priority: Priority,
    pub document_type: DocumentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_method: Option<ExtractionMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A file seen for the first time.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub file_name: String,
    pub file_path: String,
    pub priority: Priority,
    pub document_type: DocumentType,
    pub content_hash: Option<String>,
}

/// Optional columns written along with a status change.
///
/// `None` leaves the stored value untouched, except `error` which is
/// cleared on every successful transition and replaced on failures.
#[derive(Debug, Clone, Default)]
pub struct TransitionFields {
    pub extraction_method: Option<ExtractionMethod>,
    pub text_length: Option<i64>,
    pub language: Option<Language>,
    pub quality_score: Option<f64>,
    pub error: Option<String>,
}

impl TransitionFields {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// A chunk about to be persisted.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub text: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub language: Option<Language>,
    pub extraction_method: ExtractionMethod,
    pub quality_score: f64,
    pub priority_boost: u8,
    pub grade_level: Option<u8>,
    pub subject_hint: Option<String>,
    pub embedding: Option<Array1<f32>>,
}

/// A persisted knowledge chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeChunk {
    pub id: i64,
    pub source: String,
    pub text: String,
    pub chunk_index: i64,
    pub total_chunks: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    pub extraction_method: ExtractionMethod,
    pub quality_score: f64,
    pub priority_boost: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_hint: Option<String>,
    pub created_at: i64,
}

/// Full-text search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk: KnowledgeChunk,
    pub score: f64,
}

/// A vector candidate from the embedding matrix.
#[derive(Debug, Clone)]
pub struct VectorCandidate {
    pub chunk_id: i64,
    /// Cosine similarity to the query.
    pub similarity: f32,
    /// Normalized embedding row.
    pub embedding: Array1<f32>,
}

/// Aggregate view of the ledger and knowledge store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    pub status_counts: BTreeMap<String, i64>,
    pub total_chunks: i64,
    pub priority_distribution: BTreeMap<String, i64>,
    pub language_distribution: BTreeMap<String, i64>,
}
