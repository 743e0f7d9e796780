//! Turn extracted text into persistable chunks.

use ndarray::Array1;

use crate::chunking::TextChunk;
use crate::extract::ExtractedText;
use crate::language::{chunk_language, infer_grade_level};
use crate::topics::classify;
use edusage_core::{Error, Priority, Result, Subject};
use edusage_store::NewChunk;

/// Attach metadata and embeddings to chunks of one file.
///
/// `embeddings` must be parallel to `chunks`.
pub fn build_chunks(
    file_name: &str,
    extracted: &ExtractedText,
    priority: Priority,
    chunks: &[TextChunk],
    embeddings: Vec<Array1<f32>>,
) -> Result<Vec<NewChunk>> {
    if embeddings.len() != chunks.len() {
        return Err(Error::Persistence(format!(
            "{}: {} embeddings for {} chunks",
            file_name,
            embeddings.len(),
            chunks.len()
        )));
    }

    let grade_level = infer_grade_level(file_name);
    Ok(chunks
        .iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| {
            let subject = classify(&chunk.text).subject;
            NewChunk {
                text: chunk.text.clone(),
                chunk_index: chunk.chunk_index,
                total_chunks: chunk.total_chunks,
                language: Some(chunk_language(&chunk.text)),
                extraction_method: extracted.method,
                quality_score: extracted.quality_score,
                priority_boost: priority.boost(),
                grade_level,
                subject_hint: (subject != Subject::General).then(|| subject.as_str().to_string()),
                embedding: Some(embedding),
            }
        })
        .collect())
}
