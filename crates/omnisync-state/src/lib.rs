//! Omnisync State - JSON-backed persistence adapters
//!
//! Implements the store ports over one JSON file per record:
//! - [`JsonSnapshotStore`](snapshot::JsonSnapshotStore) -
//!   `<state_dir>/<task>.snapshot.json`
//! - [`JsonConflictStore`](conflicts::JsonConflictStore) -
//!   `<state_dir>/<task>.conflicts.json`
//! - [`JsonReportStore`](reports::JsonReportStore) -
//!   `<state_dir>/<task>.report.json`
//!
//! Every commit writes a temporary file in the same directory and renames
//! it over the target, so a concurrent reader sees either the old record
//! or the new one, never a partial write.

pub mod conflicts;
pub mod reports;
pub mod snapshot;

pub use conflicts::JsonConflictStore;
pub use reports::JsonReportStore;
pub use snapshot::JsonSnapshotStore;

use std::path::Path;

/// Writes `content` to `path` atomically (temp file + rename). Parent
/// directories are created as needed. Shared by the stores here and the
/// task registry.
pub async fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // Same directory so the rename stays on one filesystem.
    let tmp_path = {
        let mut p = path.as_os_str().to_owned();
        p.push(".tmp");
        std::path::PathBuf::from(p)
    };

    let mut file = tokio::fs::File::create(&tmp_path).await?;
    tokio::io::AsyncWriteExt::write_all(&mut file, content).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}
