//! Document intake: upload placement and inbox listing
//!
//! Each client owns `<base>/<client>/entrada/` as its inbox; the external
//! programs move processed documents out of it themselves. The gateway
//! only places files and lists what is still waiting.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Client inbox subdirectory name, shared with the external programs.
pub const INBOX_DIR: &str = "entrada";

/// Reject names that could escape the client's inbox.
pub fn sanitize_filename(filename: &str) -> Result<&str> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
    {
        return Err(Error::BadRequest(format!("invalid filename '{filename}'")));
    }
    Ok(filename)
}

/// Write an uploaded document into the client's inbox.
pub async fn place_upload(
    base: &Path,
    client: &str,
    filename: &str,
    bytes: &[u8],
) -> Result<PathBuf> {
    let filename = sanitize_filename(filename)?;
    let inbox = base.join(client).join(INBOX_DIR);
    tokio::fs::create_dir_all(&inbox).await?;
    let path = inbox.join(filename);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

/// PDFs waiting in the client's inbox, sorted for deterministic dispatch
/// order. A missing inbox is simply empty.
pub fn pending_documents(base: &Path, client: &str) -> Vec<PathBuf> {
    let inbox = base.join(client).join(INBOX_DIR);
    let mut files: Vec<PathBuf> = WalkDir::new(&inbox)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    files.sort();
    files
}
