//! Runtime types.

use std::collections::HashMap;
use std::time::Duration;

use edusage_core::{IngestSettings, Priority};
use edusage_store::{LedgerSummary, UploadRecord};
use serde::Serialize;

/// Batch job that can be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Job {
    /// Walk a directory and ingest new PDFs.
    Ingest,
    /// OCR every `failed` file with its tier profile.
    OcrFailed,
    /// Re-run `ocr_failed` files with the enhanced profile.
    RetryOcr,
    /// Purge noise and backfill metadata.
    Curate,
}

/// Pacing and retry settings for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Pause between files during a directory run.
    pub file_delay: Duration,
    /// Pause between files in the OCR pass and retry job.
    pub ocr_delay: Duration,
    pub max_retries: u32,
    /// Tier for files whose name matches no priority rule.
    pub default_priority: Priority,
}

impl OrchestratorSettings {
    pub fn from_ingest(settings: &IngestSettings) -> Self {
        Self {
            file_delay: settings.file_delay,
            ocr_delay: Duration::from_secs(3),
            max_retries: settings.max_retries,
            default_priority: Priority::Regular,
        }
    }

    /// A curated corpus: unmatched files are `medium` instead of `regular`.
    pub fn priority_corpus(mut self) -> Self {
        self.default_priority = Priority::Medium;
        self
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_ingest(&IngestSettings::default())
    }
}

/// Files known to be completed, with their content hash at completion.
///
/// Seeded from one ledger read per batch.
#[derive(Debug, Default)]
pub struct ProcessedCache {
    files: HashMap<String, Option<String>>,
}

impl ProcessedCache {
    pub fn seed(records: &[UploadRecord]) -> Self {
        Self {
            files: records
                .iter()
                .filter(|r| r.status.is_completed())
                .map(|r| (r.file_name.clone(), r.content_hash.clone()))
                .collect(),
        }
    }

    /// The stored hash, if the file is completed. `Some(None)` means
    /// completed without a recorded hash.
    pub fn get(&self, file_name: &str) -> Option<Option<&str>> {
        self.files.get(file_name).map(|h| h.as_deref())
    }

    pub fn insert(&mut self, file_name: impl Into<String>, content_hash: Option<String>) {
        self.files.insert(file_name.into(), content_hash);
    }

    pub fn remove(&mut self, file_name: &str) {
        self.files.remove(file_name);
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Outcome of a batch job.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub summary: LedgerSummary,
}
