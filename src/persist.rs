use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::ingest::types::{encode_batch, LogBatch};
use crate::sink::{PersistError, Persister};

/// Resolves a relative log path against the current working directory.
pub fn resolve_log_path(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Appends to an existing file; the file is never created here.
pub struct FilePersister {
    path: PathBuf,
    append: Mutex<()>,
}

impl FilePersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Persister for FilePersister {
    async fn persist(&self, batch: &LogBatch) -> Result<(), PersistError> {
        let out = encode_batch(batch)?;

        let _guard = self.append.lock().await;
        let path = self.path.clone();
        let bytes = out.len();
        tokio::task::spawn_blocking(move || append_once(&path, &out))
            .await
            .map_err(|e| PersistError::Write {
                path: self.path.clone(),
                source: io::Error::other(e),
            })??;

        debug!(path = %self.path.display(), bytes, records = batch.len(), "appended batch");
        Ok(())
    }
}

// One write(2) per batch so large batches land in a single append.
fn append_once(path: &Path, out: &[u8]) -> Result<(), PersistError> {
    let mut f = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|source| PersistError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    f.write_all(out).map_err(|source| PersistError::Write {
        path: path.to_path_buf(),
        source,
    })
}
