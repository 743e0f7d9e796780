//! EduSage Store — upload ledger, knowledge chunks, FTS5 + uint8 vector search.

pub mod embedding;
pub mod ledger;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use ledger::UploadLedger;
pub use sqlite::SqliteStore;
pub use types::*;
