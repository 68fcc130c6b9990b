//! File-backed snapshot storage.
//!
//! One JSON file per source-list id inside a dedicated directory. Keys are
//! sanitized so a list id can never escape the directory.

use std::path::{Path, PathBuf};

use super::{PersistError, SnapshotBackend};

/// Stores each snapshot as `<dir>/<sanitized-key>.json`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{sanitized}.json"))
    }

    async fn ensure_dir(&self) -> std::io::Result<()> {
        if !Path::new(&self.dir).exists() {
            tokio::fs::create_dir_all(&self.dir).await?;
        }
        Ok(())
    }
}

impl SnapshotBackend for FileBackend {
    async fn put(&self, key: &str, value: String) -> Result<(), PersistError> {
        self.ensure_dir().await?;
        tokio::fs::write(self.path_for(key), value).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), PersistError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
