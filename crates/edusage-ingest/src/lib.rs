//! EduSage Ingest — PDF text extraction with OCR fallback, chunking,
//! language and grade detection, topic classification.

pub mod chunking;
pub mod extract;
pub mod file;
pub mod ingest;
pub mod language;
pub mod topics;

pub use chunking::{Chunker, TextChunk};
pub use extract::{ExtractedText, TextExtractor};
pub use ingest::build_chunks;
pub use topics::{classify, classify_with, TopicClassification};
