//! Curation types.

use serde::Serialize;

/// Pipeline stages that can be run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CurationStage {
    PurgeNoise,
    BackfillMetadata,
}

impl CurationStage {
    pub fn all() -> &'static [CurationStage] {
        &[Self::PurgeNoise, Self::BackfillMetadata]
    }
}

/// Why a chunk counts as noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseRule {
    /// Under [`MIN_CHUNK_CHARS`] after trimming.
    TooShort,
    /// No ASCII or Arabic characters at all.
    ForeignScript,
    /// Whitespace, punctuation and symbols only.
    NoContent,
    /// An error placeholder such as `undefined`.
    Placeholder,
}

/// Shortest chunk kept, in characters.
pub const MIN_CHUNK_CHARS: usize = 20;

/// Placeholder strings leaked by failed extractions.
pub const DENY_LIST: &[&str] = &["undefined", "null", "error", "failed", "loading"];

/// What one stage did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    pub stage: CurationStage,
    /// Chunks removed or updated.
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of running the curation pipeline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CurationReport {
    #[serde(rename = "removed")]
    pub removed: usize,
    #[serde(rename = "updated")]
    pub updated: usize,
    #[serde(rename = "stages")]
    pub stages: Vec<StageOutcome>,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}
