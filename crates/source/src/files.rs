use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use tokio::fs;

/// The files a file-backed source reads: `path` itself, or every file with
/// the given extension directly inside it, in name order.
pub(crate) async fn listing(path: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let io = || ErrorKind::Io(path.to_path_buf());
    let metadata = fs::metadata(path).await.or_raise(io)?;
    if !metadata.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    let mut entries = fs::read_dir(path).await.or_raise(io)?;
    while let Some(entry) = entries.next_entry().await.or_raise(io)? {
        let file = entry.path();
        if file.extension().is_some_and(|ext| ext == extension) {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}
