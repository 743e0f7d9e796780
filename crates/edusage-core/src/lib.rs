//! EduSage Core — configuration, error taxonomy, document taxonomy.

pub mod config;
pub mod error;
pub mod taxonomy;

pub use config::{DataPaths, EduSageConfig, EmbedderKind, EmbeddingSettings, IngestSettings};
pub use error::{Error, ExtractionFailure, Result};
pub use taxonomy::{
    classify_document, ChunkProfile, DocumentType, ExtractionMethod, Language, OcrProfile,
    Priority, Subject,
};
