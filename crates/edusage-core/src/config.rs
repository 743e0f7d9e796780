//! Configuration and data directory management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Paths to all EduSage data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// SQLite database directory (`data/db/`).
    pub db: PathBuf,
    /// Default document tree for ingestion (`data/documents/`).
    pub documents: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            db: root.join("db"),
            documents: root.join("documents"),
            root,
        };
        std::fs::create_dir_all(&paths.db)?;
        std::fs::create_dir_all(&paths.documents)?;
        Ok(paths)
    }
}

/// Which embedding backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// OpenAI-compatible `/v1/embeddings` endpoint.
    OpenAi,
    /// Deterministic token-hashing embedder, no network.
    Hash,
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    pub kind: EmbedderKind,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
}

/// External tool and pacing settings for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    /// Pause between files.
    pub file_delay: Duration,
    /// Pause between OCR pages.
    pub page_delay: Duration,
    /// Cap on OCR retries per file.
    pub max_retries: u32,
    /// Tesseract language hints, e.g. `ara+eng`.
    pub ocr_languages: String,
    pub rasterizer_cmd: String,
    pub tesseract_cmd: String,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            file_delay: Duration::from_millis(2000),
            page_delay: Duration::from_millis(500),
            max_retries: 2,
            ocr_languages: "ara+eng".into(),
            rasterizer_cmd: "convert".into(),
            tesseract_cmd: "tesseract".into(),
        }
    }
}

/// Top-level EduSage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EduSageConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    pub embedding: EmbeddingSettings,
    pub ingest: IngestSettings,
}

impl EduSageConfig {
    /// Create configuration from environment and defaults.
    ///
    /// A missing `OPENAI_API_KEY` while the OpenAI embedder is selected is a
    /// configuration error.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Result<Self> {
        let port = env_parse("PORT").unwrap_or(3003);
        let data_paths = DataPaths::new(data_dir)?;

        let kind = match std::env::var("EDUSAGE_EMBEDDER").ok().as_deref() {
            None | Some("openai") => EmbedderKind::OpenAi,
            Some("hash") => EmbedderKind::Hash,
            Some(other) => {
                return Err(Error::Config(format!("unknown embedder '{}'", other)));
            }
        };
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        if kind == EmbedderKind::OpenAi && api_key.is_none() {
            return Err(Error::Config(
                "OPENAI_API_KEY is required for the openai embedder".into(),
            ));
        }

        let embedding = EmbeddingSettings {
            kind,
            api_key,
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".into()),
            model: std::env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".into()),
            dimension: env_parse("EMBEDDING_DIM").unwrap_or(match kind {
                EmbedderKind::OpenAi => 1536,
                EmbedderKind::Hash => 256,
            }),
        };

        let defaults = IngestSettings::default();
        let ingest = IngestSettings {
            file_delay: env_parse("INGEST_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.file_delay),
            page_delay: env_parse("OCR_PAGE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.page_delay),
            max_retries: env_parse("MAX_OCR_RETRIES").unwrap_or(defaults.max_retries),
            ocr_languages: std::env::var("OCR_LANGUAGES").unwrap_or(defaults.ocr_languages),
            rasterizer_cmd: std::env::var("RASTERIZER_CMD").unwrap_or(defaults.rasterizer_cmd),
            tesseract_cmd: std::env::var("TESSERACT_CMD").unwrap_or(defaults.tesseract_cmd),
        };

        Ok(Self {
            port,
            data_paths,
            embedding,
            ingest,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_paths_created() {
        let dir = std::env::temp_dir().join(format!("edusage-paths-{}", std::process::id()));
        let paths = DataPaths::new(&dir).unwrap();
        assert!(paths.db.is_dir());
        assert!(paths.documents.is_dir());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_ingest_defaults() {
        let settings = IngestSettings::default();
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.ocr_languages, "ara+eng");
        assert_eq!(settings.file_delay, Duration::from_secs(2));
    }
}
