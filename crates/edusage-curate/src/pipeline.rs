//! Curation pipeline execution.

use edusage_core::Result;
use edusage_ingest::extract::normalize::is_arabic;
use edusage_ingest::language::{chunk_language, infer_grade_level};
use edusage_store::SqliteStore;
use tracing::{info, warn};

use crate::types::*;

/// Chunks read per page while scanning the store.
const BATCH_SIZE: usize = 500;

/// Classify a chunk's text as noise, if it is.
pub fn noise_reason(text: &str) -> Option<NoiseRule> {
    let trimmed = text.trim();
    if DENY_LIST.iter().any(|t| trimmed.eq_ignore_ascii_case(t)) {
        return Some(NoiseRule::Placeholder);
    }
    if trimmed.chars().count() < MIN_CHUNK_CHARS {
        return Some(NoiseRule::TooShort);
    }
    if !trimmed
        .chars()
        .any(|c| !c.is_whitespace() && (c.is_ascii() || is_arabic(c)))
    {
        return Some(NoiseRule::ForeignScript);
    }
    if !trimmed.chars().any(char::is_alphanumeric) {
        return Some(NoiseRule::NoContent);
    }
    None
}

/// Batch maintenance over the knowledge store.
pub struct ContentCurator;

impl ContentCurator {
    /// Run every stage in order. A failing stage is logged, recorded with its
    /// error and counted as zero.
    pub fn run(store: &SqliteStore) -> CurationReport {
        let start = std::time::Instant::now();
        let mut report = CurationReport::default();

        info!("Starting content curation");

        for &stage in CurationStage::all() {
            let outcome = match Self::run_stage(store, stage) {
                Ok(count) => StageOutcome {
                    stage,
                    count,
                    error: None,
                },
                Err(e) => {
                    warn!("Curation stage {:?} failed: {}", stage, e);
                    StageOutcome {
                        stage,
                        count: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            match stage {
                CurationStage::PurgeNoise => report.removed = outcome.count,
                CurationStage::BackfillMetadata => report.updated = outcome.count,
            }
            report.stages.push(outcome);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Curation complete: removed={}, updated={}, duration={}ms",
            report.removed, report.updated, report.duration_ms
        );

        report
    }

    /// Run a single stage.
    pub fn run_stage(store: &SqliteStore, stage: CurationStage) -> Result<usize> {
        match stage {
            CurationStage::PurgeNoise => Self::purge_noise(store),
            CurationStage::BackfillMetadata => Self::backfill_metadata(store),
        }
    }

    /// Delete every noise chunk. Returns the number removed.
    pub fn purge_noise(store: &SqliteStore) -> Result<usize> {
        let mut noise = Vec::new();
        let mut examples = Vec::new();
        let mut after_id = 0;
        loop {
            let page = store.scan_chunks(after_id, BATCH_SIZE)?;
            let Some(last) = page.last() else { break };
            after_id = last.id;
            for chunk in &page {
                if let Some(rule) = noise_reason(&chunk.text) {
                    if examples.len() < 5 {
                        examples.push(format!("{:?}: {}", rule, chunk.text.chars().take(50).collect::<String>()));
                    }
                    noise.push(chunk.id);
                }
            }
        }

        if noise.is_empty() {
            return Ok(0);
        }
        let removed = store.delete_chunks(&noise)?;
        info!("Deleted {} noise chunks, e.g. {:?}", removed, examples);
        Ok(removed)
    }

    /// Fill in missing chunk language and grade level. Returns the number of
    /// chunks changed.
    pub fn backfill_metadata(store: &SqliteStore) -> Result<usize> {
        let mut updated = 0;
        let mut after_id = 0;
        loop {
            let page = store.chunks_missing_metadata(after_id, BATCH_SIZE)?;
            let Some(last) = page.last() else { break };
            after_id = last.id;
            for chunk in &page {
                let language = chunk
                    .language
                    .is_none()
                    .then(|| chunk_language(&chunk.text));
                let grade_level = if chunk.grade_level.is_none() {
                    infer_grade_level(&chunk.source)
                } else {
                    None
                };
                if (language.is_some() || grade_level.is_some())
                    && store.fill_chunk_metadata(chunk.id, language, grade_level)?
                {
                    updated += 1;
                }
            }
        }

        if updated > 0 {
            info!("Updated metadata for {} chunks", updated);
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edusage_core::{DocumentType, ExtractionMethod, Language, Priority};
    use edusage_store::{NewChunk, NewUpload, TransitionFields, UploadLedger, UploadStatus};

    fn test_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path(), 4).unwrap();
        (store, dir)
    }

    fn chunk(text: &str, index: usize, language: Option<Language>, grade: Option<u8>) -> NewChunk {
        NewChunk {
            text: text.into(),
            chunk_index: index,
            total_chunks: 0,
            language,
            extraction_method: ExtractionMethod::Ocr,
            quality_score: 70.0,
            priority_boost: 1,
            grade_level: grade,
            subject_hint: None,
            embedding: None,
        }
    }

    fn ingest(store: &SqliteStore, file: &str, chunks: &[NewChunk]) {
        let ledger = UploadLedger::new(store, 2);
        ledger
            .upsert_pending(&NewUpload {
                file_name: file.into(),
                file_path: file.into(),
                priority: Priority::Regular,
                document_type: DocumentType::Textbook,
                content_hash: None,
            })
            .unwrap();
        ledger
            .transition(file, UploadStatus::Processing, TransitionFields::default())
            .unwrap();
        ledger
            .complete(file, UploadStatus::Completed, TransitionFields::default(), chunks)
            .unwrap();
    }

    #[test]
    fn test_noise_rules() {
        assert_eq!(noise_reason("  undefined "), Some(NoiseRule::Placeholder));
        assert_eq!(noise_reason("LOADING"), Some(NoiseRule::Placeholder));
        assert_eq!(noise_reason("page 12"), Some(NoiseRule::TooShort));
        assert_eq!(noise_reason("Ελληνικά κείμενα χωρίς λατινικά"), Some(NoiseRule::ForeignScript));
        assert_eq!(noise_reason("-- ** ... ;; !! -- ** ... ;;"), Some(NoiseRule::NoContent));
        assert_eq!(noise_reason("الوحدة الأولى: الأعداد الكلية"), None);
        assert_eq!(noise_reason("Chapter 3: Forces and motion"), None);
    }

    #[test]
    fn test_pipeline_empty_db() {
        let (store, _dir) = test_store();
        let report = ContentCurator::run(&store);
        assert_eq!(report.removed, 0);
        assert_eq!(report.updated, 0);
    }

    #[test]
    fn test_purge_noise_updates_ledger_counts() {
        let (store, _dir) = test_store();
        ingest(
            &store,
            "science.pdf",
            &[
                chunk("The water cycle moves water between oceans and sky", 0, None, None),
                chunk("null", 1, None, None),
                chunk("..........................", 2, None, None),
                chunk("Evaporation turns liquid water into vapour", 3, None, None),
            ],
        );

        assert_eq!(ContentCurator::purge_noise(&store).unwrap(), 2);
        let remaining = store.get_chunks_for_source("science.pdf").unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|c| noise_reason(&c.text).is_none()));

        let record = UploadLedger::new(&store, 2).get("science.pdf").unwrap().unwrap();
        assert_eq!(record.chunks, Some(2));

        assert_eq!(ContentCurator::purge_noise(&store).unwrap(), 0);
    }

    #[test]
    fn test_backfill_never_overwrites() {
        let (store, _dir) = test_store();
        ingest(
            &store,
            "علوم ص 6.pdf",
            &[
                chunk("الماء يتبخر عند التسخين Evaporation", 0, None, None),
                chunk("Plants need sunlight to grow", 1, Some(Language::Arabic), None),
                chunk("Photosynthesis happens in leaves", 2, Some(Language::English), Some(9)),
            ],
        );

        assert_eq!(ContentCurator::backfill_metadata(&store).unwrap(), 2);
        let chunks = store.get_chunks_for_source("علوم ص 6.pdf").unwrap();
        assert_eq!(chunks[0].language, Some(Language::Mixed));
        assert_eq!(chunks[0].grade_level, Some(6));
        assert_eq!(chunks[1].language, Some(Language::Arabic));
        assert_eq!(chunks[1].grade_level, Some(6));
        assert_eq!(chunks[2].grade_level, Some(9));

        assert_eq!(ContentCurator::backfill_metadata(&store).unwrap(), 0);
    }

    #[test]
    fn test_backfill_skips_unknown_grade() {
        let (store, _dir) = test_store();
        ingest(
            &store,
            "handbook.pdf",
            &[chunk("A general handbook for teachers", 0, Some(Language::English), None)],
        );
        assert_eq!(ContentCurator::backfill_metadata(&store).unwrap(), 0);
        let chunks = store.get_chunks_for_source("handbook.pdf").unwrap();
        assert_eq!(chunks[0].grade_level, None);
    }

    #[test]
    fn test_run_reports_each_stage_in_order() {
        let (store, _dir) = test_store();
        ingest(
            &store,
            "Grade 4 Science.pdf",
            &[
                chunk("Plants make food from sunlight and water", 0, None, None),
                chunk("loading", 1, None, None),
            ],
        );

        let report = ContentCurator::run(&store);
        let stages: Vec<CurationStage> = report.stages.iter().map(|s| s.stage).collect();
        assert_eq!(stages, CurationStage::all());
        assert_eq!(report.stages[0].count, 1);
        assert_eq!(report.stages[1].count, 1);
        assert!(report.stages.iter().all(|s| s.error.is_none()));
        assert_eq!(report.removed, 1);
        assert_eq!(report.updated, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stages"][0]["stage"], "purge_noise");
        assert_eq!(json["stages"][1]["stage"], "backfill_metadata");
    }

    #[test]
    fn test_purge_removes_foreign_script_chunks() {
        let (store, _dir) = test_store();
        ingest(
            &store,
            "mixed.pdf",
            &[
                chunk("Ελληνικά κείμενα χωρίς λατινικά γράμματα", 0, None, None),
                chunk("Фотосинтез происходит в листьях растений", 1, None, None),
                chunk("Photosynthesis happens in the leaves of plants", 2, None, None),
            ],
        );

        assert_eq!(ContentCurator::run_stage(&store, CurationStage::PurgeNoise).unwrap(), 2);
        let remaining = store.get_chunks_for_source("mixed.pdf").unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].text.starts_with("Photosynthesis"));

        let record = UploadLedger::new(&store, 2).get("mixed.pdf").unwrap().unwrap();
        assert_eq!(record.chunks, Some(1));
    }
}
