//! Upload ledger: per-file ingestion state, persisted in `upload_records`.
//!
//! Legal moves:
//!
//! ```text
//! pending -> processing -> completed | failed
//! failed -> ocr_processing -> ocr_completed | ocr_failed
//! ocr_failed -> ocr_processing            (retry, capped)
//! ```
//!
//! Every transition is one transaction: the current row is read, checked
//! against the table above, and written back.

use rusqlite::{params, OptionalExtension, Transaction};
use tracing::{debug, info, warn};

use crate::sqlite::{db_err, now_millis, parse_column, parse_optional, SqliteStore};
use crate::types::*;
use edusage_core::{Error, Result};

impl SqliteStore {
    /// Insert a `pending` record unless one already exists.
    /// Returns true if a row was created.
    pub fn upsert_pending(&self, upload: &NewUpload) -> Result<bool> {
        let now = now_millis();
        let conn = self.conn.lock();
        let inserted = conn
            .execute(
                "INSERT INTO upload_records (file_name, file_path, status, priority, document_type, \
                 content_hash, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
                 ON CONFLICT(file_name) DO NOTHING",
                params![
                    upload.file_name,
                    upload.file_path,
                    UploadStatus::Pending.as_str(),
                    upload.priority.as_str(),
                    upload.document_type.as_str(),
                    upload.content_hash,
                    now,
                ],
            )
            .map_err(db_err)?;
        Ok(inserted > 0)
    }

    pub fn get_upload(&self, file_name: &str) -> Result<Option<UploadRecord>> {
        let conn = self.conn.lock();
        let result = conn.prepare_cached("SELECT * FROM upload_records WHERE file_name = ?1")
            .map_err(db_err)?
            .query_row(params![file_name], Self::row_to_upload)
            .optional()
            .map_err(db_err);
        result
    }

    pub fn list_uploads_by_status(&self, status: UploadStatus) -> Result<Vec<UploadRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM upload_records WHERE status = ?1 ORDER BY updated_at, file_name",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![status.as_str()], Self::row_to_upload)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Move one record to `to`, writing `fields` alongside.
    pub fn transition_upload(
        &self,
        file_name: &str,
        to: UploadStatus,
        fields: &TransitionFields,
        max_retries: u32,
    ) -> Result<UploadRecord> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let record = Self::apply_transition(&tx, file_name, to, fields, max_retries)?;
        tx.commit().map_err(db_err)?;
        debug!("{}: -> {}", file_name, to);
        Ok(record)
    }

    /// Persist `chunks` and move the record into a completed state in one
    /// transaction. On any error nothing is written and the record keeps
    /// its previous status.
    pub fn complete_upload(
        &self,
        file_name: &str,
        to: UploadStatus,
        fields: &TransitionFields,
        chunks: &[NewChunk],
    ) -> Result<UploadRecord> {
        if !to.is_completed() {
            return Err(Error::Internal(format!(
                "complete_upload called with non-completed status {}",
                to
            )));
        }
        let record = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction().map_err(db_err)?;
            Self::insert_chunks(&tx, file_name, chunks, self.embedding_dim()).map_err(|e| match e {
                Error::Persistence(_) => e,
                other => Error::Persistence(other.to_string()),
            })?;
            // Completion never touches the retry counter, so the cap is moot.
            let record = Self::apply_transition(&tx, file_name, to, fields, u32::MAX)?;
            tx.commit()
                .map_err(|e| Error::Persistence(e.to_string()))?;
            record
        };
        self.mark_matrix_dirty();
        info!(
            "{}: {} with {} chunks",
            file_name,
            to,
            record.chunks.unwrap_or_default()
        );
        Ok(record)
    }

    fn apply_transition(
        tx: &Transaction<'_>,
        file_name: &str,
        to: UploadStatus,
        fields: &TransitionFields,
        max_retries: u32,
    ) -> Result<UploadRecord> {
        let current = tx
            .query_row(
                "SELECT * FROM upload_records WHERE file_name = ?1",
                params![file_name],
                Self::row_to_upload,
            )
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| Error::NotFound(format!("upload record '{}'", file_name)))?;

        if !current.status.can_transition_to(to) {
            return Err(Error::IllegalTransition {
                file: file_name.to_string(),
                from: current.status.to_string(),
                to: to.to_string(),
            });
        }

        let retry_count =
            if current.status == UploadStatus::OcrFailed && to == UploadStatus::OcrProcessing {
                if current.retry_count >= max_retries {
                    return Err(Error::RetryExhausted {
                        file: file_name.to_string(),
                        retries: current.retry_count,
                    });
                }
                current.retry_count + 1
            } else {
                current.retry_count
            };

        let now = now_millis();
        let (chunks, uploaded_at) = if to.is_completed() {
            let persisted: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM knowledge_chunks WHERE source = ?1",
                    params![file_name],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            (Some(persisted), Some(now))
        } else {
            (None, current.uploaded_at)
        };
        let error = if to.is_failed() {
            fields.error.clone()
        } else {
            None
        };

        tx.execute(
            "UPDATE upload_records SET \
             status = ?2, \
             extraction_method = COALESCE(?3, extraction_method), \
             text_length = COALESCE(?4, text_length), \
             language = COALESCE(?5, language), \
             quality_score = COALESCE(?6, quality_score), \
             error = ?7, retry_count = ?8, chunks = ?9, uploaded_at = ?10, updated_at = ?11 \
             WHERE file_name = ?1",
            params![
                file_name,
                to.as_str(),
                fields.extraction_method.map(|m| m.as_str()),
                fields.text_length,
                fields.language.map(|l| l.as_str()),
                fields.quality_score,
                error,
                retry_count,
                chunks,
                uploaded_at,
                now,
            ],
        )
        .map_err(db_err)?;

        tx.query_row(
            "SELECT * FROM upload_records WHERE file_name = ?1",
            params![file_name],
            Self::row_to_upload,
        )
        .map_err(db_err)
    }

    /// Move every `failed` record back to `pending`. Returns the names reset.
    pub fn reset_failed_uploads(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let names = {
            let mut stmt = tx
                .prepare("SELECT file_name FROM upload_records WHERE status = ?1")
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![UploadStatus::Failed.as_str()], |row| row.get(0))
                .map_err(db_err)?;
            rows.collect::<rusqlite::Result<Vec<String>>>().map_err(db_err)?
        };
        tx.execute(
            "UPDATE upload_records SET status = ?1, error = NULL, updated_at = ?3 WHERE status = ?2",
            params![
                UploadStatus::Pending.as_str(),
                UploadStatus::Failed.as_str(),
                now_millis()
            ],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(names)
    }

    /// Delete every ledger row. Chunks and embeddings cascade.
    pub fn reset_uploads(&self) -> Result<usize> {
        let removed = {
            let conn = self.conn.lock();
            conn.execute("DELETE FROM upload_records", [])
                .map_err(db_err)?
        };
        self.mark_matrix_dirty();
        warn!("Ledger reset: {} records removed", removed);
        Ok(removed)
    }

    /// Fail records stranded mid-processing by a previous crash.
    pub fn recover_interrupted_uploads(&self) -> Result<usize> {
        let now = now_millis();
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let mut recovered = 0;
        for (stranded, failed) in [
            (UploadStatus::Processing, UploadStatus::Failed),
            (UploadStatus::OcrProcessing, UploadStatus::OcrFailed),
        ] {
            recovered += tx
                .execute(
                    "UPDATE upload_records SET status = ?2, error = 'interrupted', updated_at = ?3 \
                     WHERE status = ?1",
                    params![stranded.as_str(), failed.as_str(), now],
                )
                .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;
        Ok(recovered)
    }

    /// Most recently completed records, newest first.
    pub fn recent_completions(&self, limit: usize) -> Result<Vec<UploadRecord>> {
        self.query_uploads(
            "SELECT * FROM upload_records WHERE status IN ('completed', 'ocr_completed') \
             ORDER BY uploaded_at DESC LIMIT ?1",
            limit,
        )
    }

    /// Records in `failed` or `ocr_failed`, most recently touched first.
    pub fn recent_failures(&self, limit: usize) -> Result<Vec<UploadRecord>> {
        self.query_uploads(
            "SELECT * FROM upload_records WHERE status IN ('failed', 'ocr_failed') \
             ORDER BY updated_at DESC LIMIT ?1",
            limit,
        )
    }

    fn query_uploads(&self, sql: &str, limit: usize) -> Result<Vec<UploadRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![limit as i64], Self::row_to_upload)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Counts per status, total chunks, and the priority and language mix.
    pub fn ledger_summary(&self) -> Result<LedgerSummary> {
        let mut summary = LedgerSummary::default();
        for status in UploadStatus::ALL {
            summary.status_counts.insert(status.as_str().to_string(), 0);
        }

        let conn = self.conn.lock();
        let grouped = |sql: &str| -> Result<Vec<(String, i64)>> {
            let mut stmt = conn.prepare(sql).map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(db_err)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
        };

        for (status, count) in grouped("SELECT status, COUNT(*) FROM upload_records GROUP BY status")? {
            summary.status_counts.insert(status, count);
        }
        summary.priority_distribution = grouped(
            "SELECT priority, COUNT(*) FROM upload_records GROUP BY priority",
        )?
        .into_iter()
        .collect();
        summary.language_distribution = grouped(
            "SELECT COALESCE(language, 'unknown'), COUNT(*) FROM upload_records \
             WHERE status IN ('completed', 'ocr_completed') GROUP BY 1",
        )?
        .into_iter()
        .collect();
        summary.total_chunks = conn
            .query_row("SELECT COUNT(*) FROM knowledge_chunks", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(summary)
    }

    fn row_to_upload(row: &rusqlite::Row<'_>) -> rusqlite::Result<UploadRecord> {
        Ok(UploadRecord {
            file_name: row.get("file_name")?,
            file_path: row.get("file_path")?,
            status: parse_column(row, "status")?,
            priority: parse_column(row, "priority")?,
            document_type: parse_column(row, "document_type")?,
            extraction_method: parse_optional(row, "extraction_method")?,
            chunks: row.get("chunks")?,
            text_length: row.get("text_length")?,
            language: parse_optional(row, "language")?,
            quality_score: row.get("quality_score")?,
            retry_count: row.get("retry_count")?,
            error: row.get("error")?,
            content_hash: row.get("content_hash")?,
            uploaded_at: row.get("uploaded_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// The ledger view of a store, carrying the OCR retry cap.
#[derive(Clone, Copy)]
pub struct UploadLedger<'a> {
    store: &'a SqliteStore,
    max_retries: u32,
}

impl<'a> UploadLedger<'a> {
    pub fn new(store: &'a SqliteStore, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn upsert_pending(&self, upload: &NewUpload) -> Result<bool> {
        self.store.upsert_pending(upload)
    }

    pub fn get(&self, file_name: &str) -> Result<Option<UploadRecord>> {
        self.store.get_upload(file_name)
    }

    /// True if the file reached `completed` or `ocr_completed`.
    pub fn is_completed(&self, file_name: &str) -> Result<bool> {
        Ok(self
            .store
            .get_upload(file_name)?
            .is_some_and(|r| r.status.is_completed()))
    }

    pub fn list_by_status(&self, status: UploadStatus) -> Result<Vec<UploadRecord>> {
        self.store.list_uploads_by_status(status)
    }

    /// All records in a completed state.
    pub fn list_completed(&self) -> Result<Vec<UploadRecord>> {
        let mut records = self.list_by_status(UploadStatus::Completed)?;
        records.extend(self.list_by_status(UploadStatus::OcrCompleted)?);
        Ok(records)
    }

    pub fn transition(
        &self,
        file_name: &str,
        to: UploadStatus,
        fields: TransitionFields,
    ) -> Result<UploadRecord> {
        self.store
            .transition_upload(file_name, to, &fields, self.max_retries)
    }

    /// Persist chunks and complete the record atomically.
    pub fn complete(
        &self,
        file_name: &str,
        to: UploadStatus,
        fields: TransitionFields,
        chunks: &[NewChunk],
    ) -> Result<UploadRecord> {
        self.store.complete_upload(file_name, to, &fields, chunks)
    }

    pub fn reset_failed(&self) -> Result<Vec<String>> {
        let names = self.store.reset_failed_uploads()?;
        info!("Reset {} failed uploads to pending", names.len());
        Ok(names)
    }

    pub fn reset(&self) -> Result<usize> {
        self.store.reset_uploads()
    }

    pub fn recover_interrupted(&self) -> Result<usize> {
        let recovered = self.store.recover_interrupted_uploads()?;
        if recovered > 0 {
            warn!("Recovered {} interrupted uploads", recovered);
        }
        Ok(recovered)
    }

    pub fn summary(&self) -> Result<LedgerSummary> {
        self.store.ledger_summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edusage_core::{DocumentType, ExtractionMethod, Language, Priority};
    use tempfile::TempDir;

    fn test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path(), 4).unwrap();
        (store, dir)
    }

    fn upload(name: &str) -> NewUpload {
        NewUpload {
            file_name: name.into(),
            file_path: format!("/docs/{}", name),
            priority: Priority::High,
            document_type: DocumentType::Research,
            content_hash: Some("abc".into()),
        }
    }

    fn chunk(text: &str, index: usize) -> NewChunk {
        NewChunk {
            text: text.into(),
            chunk_index: index,
            total_chunks: 2,
            language: Some(Language::English),
            extraction_method: ExtractionMethod::Direct,
            quality_score: 95.0,
            priority_boost: 2,
            grade_level: None,
            subject_hint: None,
            embedding: None,
        }
    }

    #[test]
    fn test_upsert_pending_is_insert_if_absent() {
        let (store, _dir) = test_store();
        let ledger = UploadLedger::new(&store, 2);
        assert!(ledger.upsert_pending(&upload("a.pdf")).unwrap());
        ledger
            .transition("a.pdf", UploadStatus::Processing, TransitionFields::default())
            .unwrap();
        assert!(!ledger.upsert_pending(&upload("a.pdf")).unwrap());
        assert_eq!(
            ledger.get("a.pdf").unwrap().unwrap().status,
            UploadStatus::Processing
        );
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let (store, _dir) = test_store();
        let ledger = UploadLedger::new(&store, 2);
        ledger.upsert_pending(&upload("a.pdf")).unwrap();

        let err = ledger
            .transition("a.pdf", UploadStatus::Completed, TransitionFields::default())
            .unwrap_err();
        assert!(matches!(err, Error::IllegalTransition { .. }));
        assert_eq!(ledger.get("a.pdf").unwrap().unwrap().status, UploadStatus::Pending);

        let err = ledger
            .transition("missing.pdf", UploadStatus::Processing, TransitionFields::default())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_complete_sets_chunk_count() {
        let (store, _dir) = test_store();
        let ledger = UploadLedger::new(&store, 2);
        ledger.upsert_pending(&upload("a.pdf")).unwrap();
        let processing = ledger
            .transition("a.pdf", UploadStatus::Processing, TransitionFields::default())
            .unwrap();
        assert_eq!(processing.chunks, None);

        let record = ledger
            .complete(
                "a.pdf",
                UploadStatus::Completed,
                TransitionFields {
                    extraction_method: Some(ExtractionMethod::Direct),
                    text_length: Some(3000),
                    language: Some(Language::English),
                    quality_score: Some(95.0),
                    error: None,
                },
                &[chunk("first", 0), chunk("second", 1)],
            )
            .unwrap();
        assert_eq!(record.status, UploadStatus::Completed);
        assert_eq!(record.chunks, Some(2));
        assert!(record.uploaded_at.is_some());
        assert_eq!(record.extraction_method, Some(ExtractionMethod::Direct));
        assert!(ledger.is_completed("a.pdf").unwrap());
    }

    #[test]
    fn test_failed_completion_writes_nothing() {
        let (store, _dir) = test_store();
        let ledger = UploadLedger::new(&store, 2);
        ledger.upsert_pending(&upload("a.pdf")).unwrap();
        ledger
            .transition("a.pdf", UploadStatus::Processing, TransitionFields::default())
            .unwrap();

        let mut bad = chunk("first", 0);
        bad.embedding = Some(ndarray::Array1::zeros(7));
        let err = ledger
            .complete(
                "a.pdf",
                UploadStatus::Completed,
                TransitionFields::default(),
                &[chunk("zero", 1), bad],
            )
            .unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(store.count_chunks(Some("a.pdf")).unwrap(), 0);
        assert_eq!(
            ledger.get("a.pdf").unwrap().unwrap().status,
            UploadStatus::Processing
        );
    }

    #[test]
    fn test_retry_cap() {
        let (store, _dir) = test_store();
        let ledger = UploadLedger::new(&store, 2);
        ledger.upsert_pending(&upload("scan.pdf")).unwrap();
        ledger
            .transition("scan.pdf", UploadStatus::Processing, TransitionFields::default())
            .unwrap();
        ledger
            .transition("scan.pdf", UploadStatus::Failed, TransitionFields::error("too short"))
            .unwrap();

        // First OCR pass plus two retries, all failing.
        for _ in 0..3 {
            ledger
                .transition("scan.pdf", UploadStatus::OcrProcessing, TransitionFields::default())
                .unwrap();
            ledger
                .transition(
                    "scan.pdf",
                    UploadStatus::OcrFailed,
                    TransitionFields::error("OCR: insufficient text"),
                )
                .unwrap();
        }

        let record = ledger.get("scan.pdf").unwrap().unwrap();
        assert_eq!(record.status, UploadStatus::OcrFailed);
        assert_eq!(record.retry_count, 2);
        assert_eq!(record.error.as_deref(), Some("OCR: insufficient text"));

        let err = ledger
            .transition("scan.pdf", UploadStatus::OcrProcessing, TransitionFields::default())
            .unwrap_err();
        assert!(matches!(err, Error::RetryExhausted { retries: 2, .. }));
    }

    #[test]
    fn test_reset_failed_and_recover() {
        let (store, _dir) = test_store();
        let ledger = UploadLedger::new(&store, 2);
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            ledger.upsert_pending(&upload(name)).unwrap();
            ledger
                .transition(name, UploadStatus::Processing, TransitionFields::default())
                .unwrap();
        }
        ledger
            .transition("a.pdf", UploadStatus::Failed, TransitionFields::error("boom"))
            .unwrap();

        assert_eq!(ledger.recover_interrupted().unwrap(), 2);
        assert_eq!(
            ledger.get("b.pdf").unwrap().unwrap().error.as_deref(),
            Some("interrupted")
        );

        let mut names = ledger.reset_failed().unwrap();
        names.sort();
        assert_eq!(names, vec!["a.pdf", "b.pdf", "c.pdf"]);
        let a = ledger.get("a.pdf").unwrap().unwrap();
        assert_eq!(a.status, UploadStatus::Pending);
        assert_eq!(a.error, None);
    }

    #[test]
    fn test_reset_cascades_to_chunks() {
        let (store, _dir) = test_store();
        let ledger = UploadLedger::new(&store, 2);
        ledger.upsert_pending(&upload("a.pdf")).unwrap();
        ledger
            .transition("a.pdf", UploadStatus::Processing, TransitionFields::default())
            .unwrap();
        ledger
            .complete("a.pdf", UploadStatus::Completed, TransitionFields::default(), &[chunk("x", 0)])
            .unwrap();

        assert_eq!(ledger.reset().unwrap(), 1);
        assert_eq!(store.count_chunks(None).unwrap(), 0);
        assert!(store.fts_search("x", 5).unwrap().is_empty());
    }

    #[test]
    fn test_summary_and_recent_lists() {
        let (store, _dir) = test_store();
        let ledger = UploadLedger::new(&store, 2);
        ledger.upsert_pending(&upload("done.pdf")).unwrap();
        ledger.upsert_pending(&upload("bad.pdf")).unwrap();
        ledger.upsert_pending(&upload("new.pdf")).unwrap();
        for name in ["done.pdf", "bad.pdf"] {
            ledger
                .transition(name, UploadStatus::Processing, TransitionFields::default())
                .unwrap();
        }
        ledger
            .complete(
                "done.pdf",
                UploadStatus::Completed,
                TransitionFields {
                    language: Some(Language::Arabic),
                    ..Default::default()
                },
                &[chunk("a", 0), chunk("b", 1)],
            )
            .unwrap();
        ledger
            .transition("bad.pdf", UploadStatus::Failed, TransitionFields::error("boom"))
            .unwrap();

        let summary = ledger.summary().unwrap();
        assert_eq!(summary.status_counts["completed"], 1);
        assert_eq!(summary.status_counts["failed"], 1);
        assert_eq!(summary.status_counts["pending"], 1);
        assert_eq!(summary.status_counts["ocr_failed"], 0);
        assert_eq!(summary.total_chunks, 2);
        assert_eq!(summary.priority_distribution["high"], 3);
        assert_eq!(summary.language_distribution["arabic"], 1);

        let recent = store.recent_completions(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].file_name, "done.pdf");
        let failures = store.recent_failures(20).unwrap();
        assert_eq!(failures[0].error.as_deref(), Some("boom"));
    }
}
