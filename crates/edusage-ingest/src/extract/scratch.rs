use std::future::Future;
use std::path::PathBuf;

use tracing::warn;

use edusage_core::Result;

/// Run `f` with a fresh temporary directory, removed on every exit path.
///
/// Normal returns (success or error) remove it explicitly so a failed
/// removal is logged; panics and cancellation fall back to `TempDir`'s drop.
pub async fn with_scratch_dir<F, Fut, T>(prefix: &str, f: F) -> Result<T>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
    let result = f(dir.path().to_path_buf()).await;
    let path = dir.path().to_path_buf();
    if let Err(e) = dir.close() {
        warn!("Failed to remove scratch dir {}: {}", path.display(), e);
    }
    result
}
