//! Curation pipeline — purge noise chunks, backfill chunk metadata.
//!
//! Runs as a batch job after ingestion. Both stages are idempotent and
//! never touch a metadata value that is already present.

pub mod pipeline;
pub mod types;

pub use pipeline::{noise_reason, ContentCurator};
pub use types::*;
