//! Orchestrator — walks the document tree and drives every file through
//! extraction, chunking, embedding and storage.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use edusage_core::{ChunkProfile, Error, OcrProfile, Priority, Result};
use edusage_curate::{ContentCurator, CurationReport};
use edusage_infer::EmbedderBackend;
use edusage_ingest::file::{content_hash, discover_pdfs, SourceFile};
use edusage_ingest::language::detect_language;
use edusage_ingest::{build_chunks, Chunker, ExtractedText, TextExtractor};
use edusage_store::{
    NewUpload, SqliteStore, TransitionFields, UploadLedger, UploadRecord, UploadStatus,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::types::*;

/// Sequential ingestion driver. One file, and within OCR one page, at a time.
pub struct IngestionOrchestrator {
    store: Arc<SqliteStore>,
    extractor: TextExtractor,
    embedder: Arc<dyn EmbedderBackend>,
    settings: OrchestratorSettings,
    processed: Mutex<ProcessedCache>,
}

impl IngestionOrchestrator {
    pub fn new(
        store: Arc<SqliteStore>,
        extractor: TextExtractor,
        embedder: Arc<dyn EmbedderBackend>,
        settings: OrchestratorSettings,
    ) -> Self {
        info!(
            "Orchestrator initialized: embedder={}, max_retries={}, default_priority={}",
            embedder.name(),
            settings.max_retries,
            settings.default_priority
        );
        Self {
            store,
            extractor,
            embedder,
            settings,
            processed: Mutex::new(ProcessedCache::default()),
        }
    }

    pub fn ledger(&self) -> UploadLedger<'_> {
        UploadLedger::new(&self.store, self.settings.max_retries)
    }

    /// Ingest every PDF under `root` that is not already completed.
    pub async fn run(&self, root: &Path) -> Result<RunReport> {
        let start = Instant::now();
        let ledger = self.ledger();
        ledger.recover_interrupted()?;
        *self.processed.lock() = ProcessedCache::seed(&ledger.list_completed()?);

        let files = discover_pdfs(root, self.settings.default_priority);
        info!(
            "Found {} PDFs under {} ({} already completed)",
            files.len(),
            root.display(),
            self.processed.lock().len()
        );

        let mut report = RunReport::default();
        let total = files.len();
        for (i, file) in files.iter().enumerate() {
            match self.process_file(file).await {
                Ok(true) => report.processed += 1,
                Ok(false) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    report.failed += 1;
                    error!("{}: {}", file.file_name, e);
                    if let Err(record_err) = ledger.transition(
                        &file.file_name,
                        UploadStatus::Failed,
                        TransitionFields::error(e.to_string()),
                    ) {
                        error!(
                            "{}: could not record failure: {}",
                            file.file_name, record_err
                        );
                    }
                }
            }

            if i + 1 < total && !self.settings.file_delay.is_zero() {
                tokio::time::sleep(self.settings.file_delay).await;
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report.summary = ledger.summary()?;
        info!(
            "Run complete: processed={}, skipped={}, failed={}, chunks={}, duration={}ms",
            report.processed,
            report.skipped,
            report.failed,
            report.summary.total_chunks,
            report.duration_ms
        );
        Ok(report)
    }

    /// Returns `Ok(false)` if the file was skipped. Errors after the record
    /// entered `processing` are for the caller to record as `failed`.
    async fn process_file(&self, file: &SourceFile) -> Result<bool> {
        let hash = match content_hash(&file.path).await {
            Ok(h) => Some(h),
            Err(e) => {
                warn!("{}: could not hash: {}", file.file_name, e);
                None
            }
        };

        if self.skip_completed(&file.file_name, hash.as_deref()) {
            return Ok(false);
        }

        let ledger = self.ledger();
        ledger.upsert_pending(&NewUpload {
            file_name: file.file_name.clone(),
            file_path: file.path.to_string_lossy().into_owned(),
            priority: file.priority,
            document_type: file.document_type,
            content_hash: hash.clone(),
        })?;

        let record = ledger
            .get(&file.file_name)?
            .ok_or_else(|| Error::NotFound(format!("upload record '{}'", file.file_name)))?;
        if record.status.is_completed() {
            self.processed.lock().insert(&file.file_name, record.content_hash);
            return Ok(false);
        }
        if record.status != UploadStatus::Pending {
            debug!(
                "{}: {}, left for the OCR jobs",
                file.file_name, record.status
            );
            return Ok(false);
        }

        info!(
            "Processing {} ({}, {})",
            file.file_name, file.priority, file.document_type
        );
        ledger.transition(
            &file.file_name,
            UploadStatus::Processing,
            TransitionFields::default(),
        )?;

        let extracted = self.extractor.extract(&file.path, file.priority).await?;
        self.store_extraction(&file.file_name, file.priority, &extracted, UploadStatus::Completed)
            .await?;
        self.processed.lock().insert(&file.file_name, hash);
        Ok(true)
    }

    /// Ledger check through the cache. A completed file whose bytes changed
    /// is still skipped.
    fn skip_completed(&self, file_name: &str, hash: Option<&str>) -> bool {
        let cache = self.processed.lock();
        match cache.get(file_name) {
            Some(stored) => {
                if let (Some(stored), Some(current)) = (stored, hash) {
                    if stored != current {
                        warn!(
                            "{}: content changed since ingestion, skipping (reset to reingest)",
                            file_name
                        );
                    }
                }
                debug!("{}: already processed", file_name);
                true
            }
            None => false,
        }
    }

    /// Chunk, embed and persist `extracted`, completing the record in the
    /// same transaction.
    async fn store_extraction(
        &self,
        file_name: &str,
        priority: Priority,
        extracted: &ExtractedText,
        to: UploadStatus,
    ) -> Result<UploadRecord> {
        let chunker = Chunker::for_profile(ChunkProfile::for_priority(priority));
        let chunks = chunker.split(&extracted.text);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| Error::Persistence(format!("embedding failed: {}", e)))?;
        let new_chunks = build_chunks(file_name, extracted, priority, &chunks, embeddings)?;

        let fields = TransitionFields {
            extraction_method: Some(extracted.method),
            text_length: Some(extracted.text.chars().count() as i64),
            language: Some(detect_language(&extracted.text)),
            quality_score: Some(extracted.quality_score),
            error: None,
        };
        self.ledger().complete(file_name, to, fields, &new_chunks)
    }

    /// OCR every `failed` file with its tier profile.
    pub async fn process_failed_with_ocr(&self) -> Result<RunReport> {
        let start = Instant::now();
        let ledger = self.ledger();
        let records = ledger.list_by_status(UploadStatus::Failed)?;
        info!("OCR pass over {} failed files", records.len());

        let mut report = RunReport::default();
        for (i, record) in records.iter().enumerate() {
            let profile = OcrProfile::for_priority(record.priority);
            match self.ocr_attempt(record, &profile).await {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    report.failed += 1;
                    self.record_ocr_failure(&record.file_name, format!("OCR: {}", e));
                }
            }
            if i + 1 < records.len() && !self.settings.ocr_delay.is_zero() {
                tokio::time::sleep(self.settings.ocr_delay).await;
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report.summary = ledger.summary()?;
        info!(
            "OCR pass complete: recovered={}, failed={}",
            report.processed, report.failed
        );
        Ok(report)
    }

    /// Re-run OCR with the enhanced profile on `ocr_failed` files that still
    /// have retries left.
    pub async fn retry_failed_ocr(&self) -> Result<RunReport> {
        let start = Instant::now();
        let ledger = self.ledger();
        let records = ledger.list_by_status(UploadStatus::OcrFailed)?;
        let profile = OcrProfile::enhanced();

        let mut report = RunReport::default();
        let mut attempted = 0;
        for record in &records {
            if record.retry_count >= ledger.max_retries() {
                debug!(
                    "{}: retries exhausted ({}/{})",
                    record.file_name,
                    record.retry_count,
                    ledger.max_retries()
                );
                report.skipped += 1;
                continue;
            }
            if attempted > 0 && !self.settings.ocr_delay.is_zero() {
                tokio::time::sleep(self.settings.ocr_delay).await;
            }
            attempted += 1;

            match self.ocr_attempt(record, &profile).await {
                Ok(_) => report.processed += 1,
                Err(e @ Error::RetryExhausted { .. }) => {
                    warn!("{}", e);
                    report.skipped += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    let attempt = ledger
                        .get(&record.file_name)
                        .ok()
                        .flatten()
                        .map(|r| r.retry_count)
                        .unwrap_or(record.retry_count + 1);
                    self.record_ocr_failure(&record.file_name, format!("Retry {}: {}", attempt, e));
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report.summary = ledger.summary()?;
        info!(
            "Retry job complete: recovered={}, failed={}, exhausted={}",
            report.processed, report.failed, report.skipped
        );
        Ok(report)
    }

    /// One pass through `ocr_processing`. A rejected transition is returned
    /// before any work is done.
    async fn ocr_attempt(&self, record: &UploadRecord, profile: &OcrProfile) -> Result<UploadRecord> {
        let record = self.ledger().transition(
            &record.file_name,
            UploadStatus::OcrProcessing,
            TransitionFields::default(),
        )?;
        info!(
            "{}: OCR attempt (retry {}, {})",
            record.file_name, record.retry_count, profile.method
        );

        let extracted = self
            .extractor
            .try_ocr(&PathBuf::from(&record.file_path), profile)
            .await?;
        let completed = self
            .store_extraction(
                &record.file_name,
                record.priority,
                &extracted,
                UploadStatus::OcrCompleted,
            )
            .await?;
        self.processed
            .lock()
            .insert(&completed.file_name, completed.content_hash.clone());
        Ok(completed)
    }

    fn record_ocr_failure(&self, file_name: &str, message: String) {
        error!("{}: {}", file_name, message);
        // Only a record sitting in ocr_processing can fail; anything else
        // was rejected before work started.
        let in_flight = self
            .ledger()
            .get(file_name)
            .ok()
            .flatten()
            .is_some_and(|r| r.status == UploadStatus::OcrProcessing);
        if !in_flight {
            return;
        }
        if let Err(e) = self.ledger().transition(
            file_name,
            UploadStatus::OcrFailed,
            TransitionFields::error(message),
        ) {
            error!("{}: could not record OCR failure: {}", file_name, e);
        }
    }

    /// Move `failed` records back to `pending` and forget them.
    pub fn reset_failed(&self) -> Result<Vec<String>> {
        let names = self.ledger().reset_failed()?;
        let mut cache = self.processed.lock();
        for name in &names {
            cache.remove(name);
        }
        Ok(names)
    }

    /// Clear the whole ledger and every chunk.
    pub fn reset(&self) -> Result<usize> {
        let removed = self.ledger().reset()?;
        self.processed.lock().clear();
        warn!("Ledger reset: {} records removed", removed);
        Ok(removed)
    }

    /// Purge noise and backfill metadata over the whole store.
    pub fn curate(&self) -> CurationReport {
        ContentCurator::run(&self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use edusage_core::{ExtractionFailure, ExtractionMethod};
    use edusage_infer::HashEmbedder;
    use edusage_ingest::extract::{OcrEngine, PageText, PdfTextLayer, Rasterizer};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    const DIM: usize = 32;

    /// Text layers keyed by file name; a missing entry is an unreadable PDF.
    #[derive(Default)]
    struct FakeTextLayer {
        texts: Mutex<HashMap<String, String>>,
        calls: AtomicUsize,
    }

    impl FakeTextLayer {
        fn set(&self, file_name: &str, text: &str) {
            self.texts.lock().insert(file_name.into(), text.into());
        }
    }

    #[async_trait]
    impl PdfTextLayer for FakeTextLayer {
        async fn extract_text(&self, path: &Path) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            self.texts
                .lock()
                .get(&name)
                .cloned()
                .ok_or_else(|| ExtractionFailure::Unreadable("scanned".into()).into())
        }
    }

    struct OnePageRasterizer;

    #[async_trait]
    impl Rasterizer for OnePageRasterizer {
        async fn rasterize(
            &self,
            _pdf: &Path,
            out_dir: &Path,
            _profile: &OcrProfile,
        ) -> Result<Vec<PathBuf>> {
            let page = out_dir.join("page_0000.png");
            std::fs::write(&page, b"png")?;
            Ok(vec![page])
        }
    }

    /// Recognizes `text` when set, otherwise returns nothing useful.
    #[derive(Default)]
    struct FakeOcrEngine {
        text: Mutex<Option<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OcrEngine for FakeOcrEngine {
        async fn recognize(&self, _image: &Path, _languages: &str, _psm: u8) -> Result<PageText> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PageText {
                text: self.text.lock().clone().unwrap_or_else(|| "~ ~".into()),
                confidence: 72.0,
            })
        }
    }

    struct Harness {
        orchestrator: IngestionOrchestrator,
        store: Arc<SqliteStore>,
        layer: Arc<FakeTextLayer>,
        engine: Arc<FakeOcrEngine>,
        docs: PathBuf,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let docs = dir.path().join("documents");
        std::fs::create_dir_all(&docs).unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("db"), DIM).unwrap());
        let layer = Arc::new(FakeTextLayer::default());
        let engine = Arc::new(FakeOcrEngine::default());
        let extractor = TextExtractor::new(
            layer.clone(),
            Arc::new(OnePageRasterizer),
            engine.clone(),
            "ara+eng",
            Duration::ZERO,
        );
        let settings = OrchestratorSettings {
            file_delay: Duration::ZERO,
            ocr_delay: Duration::ZERO,
            max_retries: 2,
            default_priority: Priority::Regular,
        };
        let orchestrator = IngestionOrchestrator::new(
            store.clone(),
            extractor,
            Arc::new(HashEmbedder::new(DIM)),
            settings,
        );
        Harness {
            orchestrator,
            store,
            layer,
            engine,
            docs,
            _dir: dir,
        }
    }

    fn long_text(topic: &str) -> String {
        format!(
            "{} is covered in this unit. Students read the passage, answer the questions \
             and discuss the examples with a partner before the class review.",
            topic
        )
    }

    impl Harness {
        fn add_pdf(&self, name: &str, text: Option<&str>) {
            std::fs::write(self.docs.join(name), name.as_bytes()).unwrap();
            if let Some(text) = text {
                self.layer.set(name, text);
            }
        }

        fn record(&self, name: &str) -> UploadRecord {
            self.orchestrator.ledger().get(name).unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let h = harness();
        h.add_pdf("science.pdf", Some(&long_text("Photosynthesis")));
        h.add_pdf("MOE_Framework.pdf", Some(&long_text("The national framework")));

        let first = h.orchestrator.run(&h.docs).await.unwrap();
        assert_eq!(first.processed, 2);
        assert_eq!(first.summary.status_counts["completed"], 2);
        let chunks = h.store.count_chunks(None).unwrap();
        let calls = h.layer.calls.load(Ordering::SeqCst);

        let second = h.orchestrator.run(&h.docs).await.unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(h.layer.calls.load(Ordering::SeqCst), calls);
        assert_eq!(h.store.count_chunks(None).unwrap(), chunks);

        let framework = h.record("MOE_Framework.pdf");
        assert_eq!(framework.priority, Priority::Critical);
        assert_eq!(framework.extraction_method, Some(ExtractionMethod::Direct));
        assert_eq!(framework.chunks, Some(chunks / 2));
    }

    #[tokio::test]
    async fn test_round_trip_through_full_text_search() {
        let h = harness();
        h.add_pdf("biology.pdf", Some(&long_text("Chlorophyll absorbs sunlight")));
        h.orchestrator.run(&h.docs).await.unwrap();

        let hits = h.store.fts_search("chlorophyll", 5).unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk.source, "biology.pdf");
        assert_eq!(h.store.count_embeddings().unwrap(), hits.len() as i64);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_the_batch() {
        let h = harness();
        h.add_pdf("a_scanned.pdf", None);
        h.add_pdf("b_digital.pdf", Some(&long_text("Fractions")));

        let report = h.orchestrator.run(&h.docs).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.processed, 1);

        let failed = h.record("a_scanned.pdf");
        assert_eq!(failed.status, UploadStatus::Failed);
        assert!(failed.error.unwrap().contains("insufficient text"));
        assert_eq!(failed.chunks, None);
        assert_eq!(h.store.count_chunks(Some("a_scanned.pdf")).unwrap(), 0);
        assert_eq!(h.record("b_digital.pdf").status, UploadStatus::Completed);

        // Failed files wait for the OCR jobs or a reset.
        let again = h.orchestrator.run(&h.docs).await.unwrap();
        assert_eq!(again.skipped, 2);
    }

    #[tokio::test]
    async fn test_ocr_pass_recovers_failed_file() {
        let h = harness();
        h.add_pdf("scan.pdf", None);
        h.orchestrator.run(&h.docs).await.unwrap();

        *h.engine.text.lock() = Some(long_text("الكسور العشرية"));
        let report = h.orchestrator.process_failed_with_ocr().await.unwrap();
        assert_eq!(report.processed, 1);

        let record = h.record("scan.pdf");
        assert_eq!(record.status, UploadStatus::OcrCompleted);
        assert_eq!(record.extraction_method, Some(ExtractionMethod::Ocr));
        assert_eq!(record.quality_score, Some(72.0));
        assert_eq!(record.retry_count, 0);
        assert!(record.error.is_none());
        assert_eq!(record.chunks, Some(h.store.count_chunks(Some("scan.pdf")).unwrap()));
    }

    #[tokio::test]
    async fn test_retries_stop_at_the_cap() {
        let h = harness();
        h.add_pdf("scan.pdf", None);
        h.orchestrator.run(&h.docs).await.unwrap();

        h.orchestrator.process_failed_with_ocr().await.unwrap();
        let record = h.record("scan.pdf");
        assert_eq!(record.status, UploadStatus::OcrFailed);
        assert!(record.error.unwrap().starts_with("OCR: "));

        for attempt in 1..=2 {
            let report = h.orchestrator.retry_failed_ocr().await.unwrap();
            assert_eq!(report.failed, 1);
            let record = h.record("scan.pdf");
            assert_eq!(record.retry_count, attempt);
            assert!(record.error.unwrap().starts_with(&format!("Retry {}: ", attempt)));
        }

        let calls = h.engine.calls.load(Ordering::SeqCst);
        let report = h.orchestrator.retry_failed_ocr().await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(h.engine.calls.load(Ordering::SeqCst), calls);
        let record = h.record("scan.pdf");
        assert_eq!(record.status, UploadStatus::OcrFailed);
        assert_eq!(record.retry_count, 2);
    }

    #[tokio::test]
    async fn test_enhanced_retry_marks_method() {
        let h = harness();
        h.add_pdf("scan.pdf", None);
        h.orchestrator.run(&h.docs).await.unwrap();
        h.orchestrator.process_failed_with_ocr().await.unwrap();

        *h.engine.text.lock() = Some(long_text("Newton's first law"));
        let before = h.engine.calls.load(Ordering::SeqCst);
        h.orchestrator.retry_failed_ocr().await.unwrap();

        let record = h.record("scan.pdf");
        assert_eq!(record.status, UploadStatus::OcrCompleted);
        assert_eq!(record.extraction_method, Some(ExtractionMethod::OcrEnhanced));
        // One page, three segmentation modes.
        assert_eq!(h.engine.calls.load(Ordering::SeqCst) - before, 3);
    }

    #[tokio::test]
    async fn test_reset_failed_allows_reprocessing() {
        let h = harness();
        h.add_pdf("late.pdf", None);
        h.orchestrator.run(&h.docs).await.unwrap();

        assert_eq!(h.orchestrator.reset_failed().unwrap(), vec!["late.pdf".to_string()]);
        assert_eq!(h.record("late.pdf").status, UploadStatus::Pending);

        h.layer.set("late.pdf", &long_text("Reading comprehension"));
        let report = h.orchestrator.run(&h.docs).await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(h.record("late.pdf").status, UploadStatus::Completed);
    }

    #[tokio::test]
    async fn test_reset_clears_ledger_and_chunks() {
        let h = harness();
        h.add_pdf("a.pdf", Some(&long_text("Geometry")));
        h.orchestrator.run(&h.docs).await.unwrap();

        assert_eq!(h.orchestrator.reset().unwrap(), 1);
        assert_eq!(h.store.count_chunks(None).unwrap(), 0);

        let report = h.orchestrator.run(&h.docs).await.unwrap();
        assert_eq!(report.processed, 1);
    }
}
