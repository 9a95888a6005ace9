//! JSON file store implementation

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{LedgerSnapshot, Store, StoreResult};

/// Ledger stored as a single pretty-printed JSON document.
///
/// Every save replaces the whole file through a temp file in the same
/// directory, so a crash mid-save leaves the previous ledger intact.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Use the ledger file at `path`. The parent directory is created on the
    /// first save if it does not exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl Store for JsonFileStore {
    fn load_snapshot(&self) -> StoreResult<Option<LedgerSnapshot>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No ledger file yet");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: LedgerSnapshot = serde_json::from_str(&content)?;
        debug!(
            path = %self.path.display(),
            users = snapshot.user_count(),
            "Ledger loaded"
        );
        Ok(Some(snapshot))
    }

    fn save_snapshot(&self, snapshot: &LedgerSnapshot) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(snapshot)?;

        let parent = self.parent_dir();
        fs::create_dir_all(parent)?;

        let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(&self.path).map_err(|e| e.error)?;

        debug!(
            path = %self.path.display(),
            users = snapshot.user_count(),
            "Ledger saved"
        );
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        // A missing data dir is created on save; a file in its place is fatal
        let parent = self.parent_dir();
        !parent.exists() || parent.is_dir()
    }
}
