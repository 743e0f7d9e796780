//! Database schema SQL.

/// Core tables: upload ledger, knowledge chunks, chunk embeddings.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS upload_records (
    file_name TEXT PRIMARY KEY,
    file_path TEXT NOT NULL,
    status TEXT NOT NULL,
    priority TEXT NOT NULL,
    document_type TEXT NOT NULL,
    extraction_method TEXT,
    chunks INTEGER,
    text_length INTEGER,
    language TEXT,
    quality_score REAL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    content_hash TEXT,
    uploaded_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_upload_records_status ON upload_records(status);

CREATE TABLE IF NOT EXISTS knowledge_chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL REFERENCES upload_records(file_name) ON DELETE CASCADE,
    text TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    total_chunks INTEGER NOT NULL,
    language TEXT,
    extraction_method TEXT NOT NULL,
    quality_score REAL NOT NULL,
    priority_boost INTEGER NOT NULL DEFAULT 1,
    grade_level INTEGER,
    subject_hint TEXT,
    created_at INTEGER NOT NULL,
    UNIQUE(source, chunk_index)
);

CREATE INDEX IF NOT EXISTS idx_knowledge_chunks_source ON knowledge_chunks(source);

CREATE TABLE IF NOT EXISTS chunk_embeddings (
    chunk_id INTEGER PRIMARY KEY REFERENCES knowledge_chunks(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    scale REAL NOT NULL,
    offset_val REAL NOT NULL
);
"#;

/// FTS5 virtual table over chunk text.
pub const FTS_SCHEMA_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS knowledge_chunks_fts USING fts5(
    text,
    content='knowledge_chunks', content_rowid='id',
    tokenize='porter unicode61'
);
"#;

/// Triggers keeping the FTS index in sync with `knowledge_chunks`.
pub const FTS_TRIGGERS_SQL: &str = r#"
CREATE TRIGGER IF NOT EXISTS knowledge_chunks_ai AFTER INSERT ON knowledge_chunks BEGIN
    INSERT INTO knowledge_chunks_fts(rowid, text) VALUES (new.id, new.text);
END;

CREATE TRIGGER IF NOT EXISTS knowledge_chunks_ad AFTER DELETE ON knowledge_chunks BEGIN
    INSERT INTO knowledge_chunks_fts(knowledge_chunks_fts, rowid, text)
    VALUES ('delete', old.id, old.text);
END;

CREATE TRIGGER IF NOT EXISTS knowledge_chunks_au AFTER UPDATE OF text ON knowledge_chunks BEGIN
    INSERT INTO knowledge_chunks_fts(knowledge_chunks_fts, rowid, text)
    VALUES ('delete', old.id, old.text);
    INSERT INTO knowledge_chunks_fts(rowid, text) VALUES (new.id, new.text);
END;
"#;
