use std::path::PathBuf;

use async_trait::async_trait;

use crate::ingest::types::LogBatch;

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("{0}")]
    Transport(String),
    #[error("stream submission failed for {failed} records:\n{}", .messages.join("\n"))]
    Partial { failed: usize, messages: Vec<String> },
}

#[derive(thiserror::Error, Debug)]
pub enum PersistError {
    #[error("open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, batch: &LogBatch) -> Result<(), PublishError>;
}

#[async_trait]
pub trait Persister: Send + Sync {
    async fn persist(&self, batch: &LogBatch) -> Result<(), PersistError>;
}
