//! SQLite knowledge store: FTS5 full-text search plus an in-memory
//! normalized embedding matrix for vector candidates.
//!
//! The same database file also holds the upload ledger (see `ledger.rs`),
//! so chunk writes and ledger transitions can share one transaction.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info, warn};

use crate::embedding::{normalized, QuantizedEmbedding};
use crate::schema::{FTS_SCHEMA_SQL, FTS_TRIGGERS_SQL, SCHEMA_SQL};
use crate::types::*;
use edusage_core::{Error, Language, Result};

/// SQLite store for the ledger and the knowledge chunks.
pub struct SqliteStore {
    pub(crate) conn: Mutex<Connection>,
    db_path: PathBuf,
    embedding_dim: usize,
    /// Normalized embeddings, reloaded lazily after writes.
    embedding_matrix: Mutex<EmbeddingMatrix>,
}

struct EmbeddingMatrix {
    /// Shape (N, dim).
    matrix: Array2<f32>,
    /// Chunk IDs corresponding to each row.
    chunk_ids: Vec<i64>,
    dirty: bool,
}

pub(crate) fn db_err(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl SqliteStore {
    /// Open or create the store. The database file is `db_dir/edusage.db`.
    pub fn open(db_dir: impl AsRef<Path>, embedding_dim: usize) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("edusage.db");

        let conn = Self::create_connection(&db_path)?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
            embedding_dim,
            embedding_matrix: Mutex::new(EmbeddingMatrix {
                matrix: Array2::zeros((0, embedding_dim)),
                chunk_ids: Vec::new(),
                dirty: true,
            }),
        };

        let chunk_count = store.count_chunks(None)?;
        info!(
            "SqliteStore opened: {} chunks, dim={}, path={}",
            chunk_count,
            embedding_dim,
            store.db_path.display()
        );

        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(db_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(db_err)?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        let full_schema = format!("{}\n{}\n{}", SCHEMA_SQL, FTS_SCHEMA_SQL, FTS_TRIGGERS_SQL);
        conn.execute_batch(&full_schema)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    // ---------------------------------------------------------------
    // Chunk writes
    // ---------------------------------------------------------------

    /// Insert chunks (and their embeddings) for `source` inside `tx`.
    ///
    /// Existing chunks of the source are replaced.
    pub(crate) fn insert_chunks(
        tx: &Transaction<'_>,
        source: &str,
        chunks: &[NewChunk],
        embedding_dim: usize,
    ) -> Result<usize> {
        let now = now_millis();
        tx.execute("DELETE FROM knowledge_chunks WHERE source = ?1", params![source])
            .map_err(db_err)?;

        let mut insert_chunk = tx
            .prepare_cached(
                "INSERT INTO knowledge_chunks (source, text, chunk_index, total_chunks, language, \
                 extraction_method, quality_score, priority_boost, grade_level, subject_hint, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )
            .map_err(db_err)?;
        let mut insert_embedding = tx
            .prepare_cached(
                "INSERT OR REPLACE INTO chunk_embeddings (chunk_id, embedding, scale, offset_val) \
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(db_err)?;

        for chunk in chunks {
            let chunk_id = insert_chunk
                .insert(params![
                    source,
                    chunk.text,
                    chunk.chunk_index as i64,
                    chunk.total_chunks as i64,
                    chunk.language.map(|l| l.as_str()),
                    chunk.extraction_method.as_str(),
                    chunk.quality_score,
                    chunk.priority_boost,
                    chunk.grade_level,
                    chunk.subject_hint,
                    now,
                ])
                .map_err(db_err)?;

            if let Some(embedding) = &chunk.embedding {
                if embedding.len() != embedding_dim {
                    return Err(Error::Persistence(format!(
                        "embedding dimension {} does not match store dimension {}",
                        embedding.len(),
                        embedding_dim
                    )));
                }
                let q = QuantizedEmbedding::from_vector(embedding);
                insert_embedding
                    .execute(params![chunk_id, q.bytes, q.scale, q.offset])
                    .map_err(db_err)?;
            }
        }
        Ok(chunks.len())
    }

    /// Delete chunks by ID and recount `chunks` on the affected ledger rows.
    pub fn delete_chunks(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let mut removed = 0;
        let mut sources = BTreeSet::new();
        {
            let mut lookup = tx
                .prepare_cached("SELECT source FROM knowledge_chunks WHERE id = ?1")
                .map_err(db_err)?;
            let mut delete = tx
                .prepare_cached("DELETE FROM knowledge_chunks WHERE id = ?1")
                .map_err(db_err)?;
            for id in ids {
                let source: Option<String> = lookup
                    .query_row(params![id], |row| row.get(0))
                    .optional()
                    .map_err(db_err)?;
                if let Some(source) = source {
                    removed += delete.execute(params![id]).map_err(db_err)?;
                    sources.insert(source);
                }
            }
        }
        let now = now_millis();
        for source in &sources {
            tx.execute(
                "UPDATE upload_records SET \
                 chunks = (SELECT COUNT(*) FROM knowledge_chunks WHERE source = ?1), \
                 updated_at = ?2 WHERE file_name = ?1",
                params![source, now],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;
        drop(conn);

        if removed > 0 {
            self.mark_matrix_dirty();
        }
        Ok(removed)
    }

    /// Fill in missing language / grade level. Present values are never
    /// overwritten. Returns true if the row changed.
    pub fn fill_chunk_metadata(
        &self,
        chunk_id: i64,
        language: Option<Language>,
        grade_level: Option<u8>,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE knowledge_chunks SET \
                 language = COALESCE(language, ?2), \
                 grade_level = COALESCE(grade_level, ?3) \
                 WHERE id = ?1 \
                 AND ((language IS NULL AND ?2 IS NOT NULL) \
                   OR (grade_level IS NULL AND ?3 IS NOT NULL))",
                params![chunk_id, language.map(|l| l.as_str()), grade_level],
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    // ---------------------------------------------------------------
    // Chunk reads
    // ---------------------------------------------------------------

    /// All chunks of one source, in reading order.
    pub fn get_chunks_for_source(&self, source: &str) -> Result<Vec<KnowledgeChunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM knowledge_chunks WHERE source = ?1 ORDER BY chunk_index")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![source], Self::row_to_chunk)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub fn get_chunk(&self, chunk_id: i64) -> Result<Option<KnowledgeChunk>> {
        let conn = self.conn.lock();
        let result = conn.prepare_cached("SELECT * FROM knowledge_chunks WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![chunk_id], Self::row_to_chunk)
            .optional()
            .map_err(db_err);
        result
    }

    /// Page through all chunks by ascending ID.
    pub fn scan_chunks(&self, after_id: i64, limit: usize) -> Result<Vec<KnowledgeChunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM knowledge_chunks WHERE id > ?1 ORDER BY id LIMIT ?2")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![after_id, limit as i64], Self::row_to_chunk)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Page through chunks lacking a language or a grade level.
    pub fn chunks_missing_metadata(
        &self,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<KnowledgeChunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM knowledge_chunks \
                 WHERE id > ?1 AND (language IS NULL OR grade_level IS NULL) \
                 ORDER BY id LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![after_id, limit as i64], Self::row_to_chunk)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Count chunks, optionally for one source.
    pub fn count_chunks(&self, source: Option<&str>) -> Result<i64> {
        let conn = self.conn.lock();
        match source {
            Some(s) => conn.query_row(
                "SELECT COUNT(*) FROM knowledge_chunks WHERE source = ?1",
                params![s],
                |row| row.get(0),
            ),
            None => conn.query_row("SELECT COUNT(*) FROM knowledge_chunks", [], |row| row.get(0)),
        }
        .map_err(db_err)
    }

    pub fn count_embeddings(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM chunk_embeddings", [], |row| row.get(0))
            .map_err(db_err)
    }

    // ---------------------------------------------------------------
    // Full-text search (FTS5)
    // ---------------------------------------------------------------

    /// BM25-ranked full-text search over chunk text.
    pub fn fts_search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let fts_query = Self::sanitize_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT c.*, knowledge_chunks_fts.rank AS bm25_score \
                 FROM knowledge_chunks_fts \
                 JOIN knowledge_chunks c ON c.id = knowledge_chunks_fts.rowid \
                 WHERE knowledge_chunks_fts MATCH ?1 \
                 ORDER BY knowledge_chunks_fts.rank \
                 LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![fts_query, top_k as i64], |row| {
                let bm25: f64 = row.get("bm25_score")?;
                Ok(SearchHit {
                    chunk: Self::row_to_chunk(row)?,
                    // FTS5 rank is negative; flip so larger is better.
                    score: -bm25,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Quote every token and join with OR so user text never hits FTS5 syntax.
    fn sanitize_fts_query(query: &str) -> String {
        query
            .split(|c: char| c.is_whitespace() || "؟?!.,،:;()\"".contains(c))
            .filter(|t| !t.is_empty())
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    // ---------------------------------------------------------------
    // Vector candidates
    // ---------------------------------------------------------------

    pub(crate) fn mark_matrix_dirty(&self) {
        self.embedding_matrix.lock().dirty = true;
    }

    fn load_embedding_matrix(&self) -> Result<()> {
        let mut chunk_ids = Vec::new();
        let mut rows_data: Vec<Array1<f32>> = Vec::new();

        {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare("SELECT chunk_id, embedding, scale, offset_val FROM chunk_embeddings ORDER BY chunk_id")
                .map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        QuantizedEmbedding {
                            bytes: row.get(1)?,
                            scale: row.get::<_, f64>(2)? as f32,
                            offset: row.get::<_, f64>(3)? as f32,
                        },
                    ))
                })
                .map_err(db_err)?;

            for row in rows {
                let (chunk_id, quantized) = row.map_err(db_err)?;
                if quantized.dimension() != self.embedding_dim {
                    warn!(
                        "Skipping embedding for chunk {}: dim {} != {}",
                        chunk_id,
                        quantized.dimension(),
                        self.embedding_dim
                    );
                    continue;
                }
                if let Some(unit) = normalized(&quantized.to_vector()) {
                    chunk_ids.push(chunk_id);
                    rows_data.push(unit);
                }
            }
        }

        let mut matrix = Array2::zeros((rows_data.len(), self.embedding_dim));
        for (i, row) in rows_data.iter().enumerate() {
            matrix.row_mut(i).assign(row);
        }

        let mut mat = self.embedding_matrix.lock();
        mat.matrix = matrix;
        mat.chunk_ids = chunk_ids;
        mat.dirty = false;
        debug!("Loaded {} embeddings into matrix", mat.chunk_ids.len());
        Ok(())
    }

    fn ensure_matrix_loaded(&self) -> Result<()> {
        if self.embedding_matrix.lock().dirty {
            self.load_embedding_matrix()?;
        }
        Ok(())
    }

    /// The `fetch_k` chunks most similar to `query`, best first.
    pub fn vector_candidates(
        &self,
        query: &Array1<f32>,
        fetch_k: usize,
    ) -> Result<Vec<VectorCandidate>> {
        if query.len() != self.embedding_dim {
            return Err(Error::Inference(format!(
                "query dimension {} does not match store dimension {}",
                query.len(),
                self.embedding_dim
            )));
        }
        self.ensure_matrix_loaded()?;

        let mat = self.embedding_matrix.lock();
        if mat.matrix.nrows() == 0 {
            return Ok(Vec::new());
        }
        let q = match normalized(query) {
            Some(q) => q,
            None => return Ok(Vec::new()),
        };

        let similarities = mat.matrix.dot(&q);
        let mut indexed: Vec<(usize, f32)> = similarities.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        indexed.truncate(fetch_k);

        Ok(indexed
            .into_iter()
            .map(|(i, similarity)| VectorCandidate {
                chunk_id: mat.chunk_ids[i],
                similarity,
                embedding: mat.matrix.row(i).to_owned(),
            })
            .collect())
    }

    // ---------------------------------------------------------------
    // Row mapping
    // ---------------------------------------------------------------

    pub(crate) fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeChunk> {
        Ok(KnowledgeChunk {
            id: row.get("id")?,
            source: row.get("source")?,
            text: row.get("text")?,
            chunk_index: row.get("chunk_index")?,
            total_chunks: row.get("total_chunks")?,
            language: parse_optional(row, "language")?,
            extraction_method: parse_column(row, "extraction_method")?,
            quality_score: row.get("quality_score")?,
            priority_boost: row.get("priority_boost")?,
            grade_level: row.get("grade_level")?,
            subject_hint: row.get("subject_hint")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Read a TEXT column into one of the taxonomy enums.
pub(crate) fn parse_column<T>(row: &rusqlite::Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = Error>,
{
    let raw: String = row.get(column)?;
    raw.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_optional<T>(row: &rusqlite::Row<'_>, column: &str) -> rusqlite::Result<Option<T>>
where
    T: std::str::FromStr<Err = Error>,
{
    let raw: Option<String> = row.get(column)?;
    raw.map(|s| {
        s.parse().map_err(|e: Error| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::UploadLedger;
    use edusage_core::{DocumentType, ExtractionMethod, Priority};
    use tempfile::TempDir;

    const DIM: usize = 8;

    fn test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path(), DIM).unwrap();
        (store, dir)
    }

    fn chunk(text: &str, index: usize, total: usize, embedding: Option<Array1<f32>>) -> NewChunk {
        NewChunk {
            text: text.into(),
            chunk_index: index,
            total_chunks: total,
            language: None,
            extraction_method: ExtractionMethod::Direct,
            quality_score: 95.0,
            priority_boost: 1,
            grade_level: None,
            subject_hint: None,
            embedding,
        }
    }

    fn axis(i: usize) -> Array1<f32> {
        let mut v = Array1::zeros(DIM);
        v[i] = 1.0;
        v
    }

    /// Push a file through the ledger to `completed` with the given chunks.
    fn ingest(store: &SqliteStore, name: &str, chunks: &[NewChunk]) {
        let ledger = UploadLedger::new(store, 2);
        ledger
            .upsert_pending(&NewUpload {
                file_name: name.into(),
                file_path: format!("/docs/{}", name),
                priority: Priority::Regular,
                document_type: DocumentType::Textbook,
                content_hash: None,
            })
            .unwrap();
        ledger
            .transition(name, UploadStatus::Processing, TransitionFields::default())
            .unwrap();
        ledger
            .complete(name, UploadStatus::Completed, TransitionFields::default(), chunks)
            .unwrap();
    }

    #[test]
    fn test_chunks_ordered_by_index() {
        let (store, _dir) = test_store();
        ingest(
            &store,
            "science.pdf",
            &[chunk("second part", 1, 2, None), chunk("first part", 0, 2, None)],
        );
        let chunks = store.get_chunks_for_source("science.pdf").unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "first part");
        assert_eq!(chunks[1].chunk_index, 1);
        assert_eq!(store.count_chunks(Some("science.pdf")).unwrap(), 2);
    }

    #[test]
    fn test_fts_search_english_and_arabic() {
        let (store, _dir) = test_store();
        ingest(
            &store,
            "bio.pdf",
            &[
                chunk("Photosynthesis converts sunlight into chemical energy", 0, 2, None),
                chunk("التمثيل الضوئي يحول ضوء الشمس إلى طاقة", 1, 2, None),
            ],
        );

        let hits = store.fts_search("sunlight", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.source, "bio.pdf");

        let hits = store.fts_search("ما هو الضوئي؟", 5).unwrap();
        assert!(hits.iter().any(|h| h.chunk.chunk_index == 1));
    }

    #[test]
    fn test_sanitize_fts_query() {
        assert_eq!(
            SqliteStore::sanitize_fts_query("what is \"gravity\"?"),
            "\"what\" OR \"is\" OR \"gravity\""
        );
        assert!(SqliteStore::sanitize_fts_query("  ؟ ").is_empty());
    }

    #[test]
    fn test_vector_candidates_rank_by_similarity() {
        let (store, _dir) = test_store();
        ingest(
            &store,
            "v.pdf",
            &[
                chunk("alpha", 0, 3, Some(axis(0))),
                chunk("beta", 1, 3, Some(axis(1))),
                chunk("gamma", 2, 3, None),
            ],
        );
        assert_eq!(store.count_embeddings().unwrap(), 2);

        let mut query = axis(1);
        query[0] = 0.2;
        let candidates = store.vector_candidates(&query, 5).unwrap();
        assert_eq!(candidates.len(), 2);
        let top = store.get_chunk(candidates[0].chunk_id).unwrap().unwrap();
        assert_eq!(top.text, "beta");
        assert!(candidates[0].similarity > candidates[1].similarity);
    }

    #[test]
    fn test_vector_candidates_rejects_wrong_dimension() {
        let (store, _dir) = test_store();
        let err = store.vector_candidates(&Array1::zeros(DIM + 1), 3).unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }

    #[test]
    fn test_delete_chunks_recounts_ledger() {
        let (store, _dir) = test_store();
        ingest(
            &store,
            "a.pdf",
            &[chunk("one", 0, 2, Some(axis(0))), chunk("two", 1, 2, Some(axis(1)))],
        );
        let first = store.get_chunks_for_source("a.pdf").unwrap()[0].id;

        assert_eq!(store.delete_chunks(&[first, 9999]).unwrap(), 1);
        let ledger = UploadLedger::new(&store, 2);
        assert_eq!(ledger.get("a.pdf").unwrap().unwrap().chunks, Some(1));
        assert_eq!(store.count_embeddings().unwrap(), 1);
        assert!(store.fts_search("one", 5).unwrap().is_empty());
    }

    #[test]
    fn test_fill_metadata_never_overwrites() {
        let (store, _dir) = test_store();
        let mut with_lang = chunk("ready", 0, 1, None);
        with_lang.language = Some(Language::English);
        ingest(&store, "m.pdf", &[with_lang]);
        let id = store.get_chunks_for_source("m.pdf").unwrap()[0].id;

        assert!(store.fill_chunk_metadata(id, Some(Language::Arabic), Some(4)).unwrap());
        let c = store.get_chunk(id).unwrap().unwrap();
        assert_eq!(c.language, Some(Language::English));
        assert_eq!(c.grade_level, Some(4));

        // Both present now: nothing to change.
        assert!(!store.fill_chunk_metadata(id, Some(Language::Mixed), Some(9)).unwrap());
        assert_eq!(store.chunks_missing_metadata(0, 10).unwrap().len(), 0);
    }
}
