use std::path::Path;

use async_trait::async_trait;

use edusage_core::{Error, ExtractionFailure, Result};

/// Reads the embedded text layer of a PDF.
#[async_trait]
pub trait PdfTextLayer: Send + Sync {
    async fn extract_text(&self, path: &Path) -> Result<String>;
}

/// Text layer via `pdf-extract`, run on the blocking pool.
pub struct PdfExtractLayer;

#[async_trait]
impl PdfTextLayer for PdfExtractLayer {
    async fn extract_text(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            // pdf-extract panics on some malformed files.
            .map_err(|e| Error::from(ExtractionFailure::Unreadable(e.to_string())))?
            .map_err(|e| ExtractionFailure::Unreadable(e.to_string()).into())
    }
}
