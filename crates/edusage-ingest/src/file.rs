//! Source file discovery and hashing.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::warn;
use walkdir::WalkDir;

use edusage_core::{classify_document, DocumentType, Priority, Result};

/// A PDF found under the ingestion root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Ledger key: the bare file name.
    pub file_name: String,
    pub priority: Priority,
    pub document_type: DocumentType,
}

/// Whether `path` has a `.pdf` extension, in any case.
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Walk `root` recursively and collect PDFs, most important first, then by path.
///
/// Unreadable directory entries are logged and skipped.
pub fn discover_pdfs(root: &Path, default_priority: Priority) -> Vec<SourceFile> {
    let mut files: Vec<SourceFile> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), err);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_pdf(e.path()))
        .filter_map(|e| {
            let file_name = e.file_name().to_str()?.to_string();
            let (priority, document_type) = classify_document(&file_name, default_priority);
            Some(SourceFile {
                path: e.into_path(),
                file_name,
                priority,
                document_type,
            })
        })
        .collect();

    files.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.path.cmp(&b.path)));
    files
}

/// SHA-256 of the file bytes, hex encoded.
pub async fn content_hash(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_discover_sorted_by_priority_then_path() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("grade5");
        std::fs::create_dir_all(&nested).unwrap();
        for name in ["b_science.pdf", "a_math.PDF", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::write(nested.join("MOE_Framework.pdf"), b"x").unwrap();

        let files = discover_pdfs(dir.path(), Priority::Regular);
        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["MOE_Framework.pdf", "a_math.PDF", "b_science.pdf"]);
        assert_eq!(files[0].priority, Priority::Critical);
        assert_eq!(files[1].document_type, DocumentType::Textbook);
    }

    #[tokio::test]
    async fn test_content_hash() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            content_hash(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
