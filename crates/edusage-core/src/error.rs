//! Error types for EduSage.

use thiserror::Error;

/// Why an extraction attempt produced no usable text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionFailure {
    #[error("insufficient text: {chars} chars (need {required})")]
    InsufficientText { chars: usize, required: usize },

    #[error("no pages rasterized")]
    NoPages,

    #[error("rasterization failed: {0}")]
    Rasterize(String),

    #[error("unreadable PDF: {0}")]
    Unreadable(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionFailure),

    #[error("OCR failed on page {page}: {reason}")]
    PageOcr { page: usize, reason: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Retries exhausted for {file} after {retries} attempts")]
    RetryExhausted { file: String, retries: u32 },

    #[error("Illegal transition for {file}: {from} -> {to}")]
    IllegalTransition {
        file: String,
        from: String,
        to: String,
    },

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for the most common extraction failure.
    pub fn insufficient_text(chars: usize, required: usize) -> Self {
        Error::Extraction(ExtractionFailure::InsufficientText { chars, required })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
