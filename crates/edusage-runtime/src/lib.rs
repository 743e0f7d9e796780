//! Runtime orchestrator — drives files through the upload ledger.
//!
//! Walks a document tree, extracts, chunks, embeds and stores each PDF
//! strictly one at a time, and runs the OCR pass and enhanced retry job
//! over files that failed.

pub mod orchestrator;
pub mod types;

pub use orchestrator::IngestionOrchestrator;
pub use types::*;
