pub mod nats;
pub mod partition_key;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::ingest::types::LogBatch;
use crate::sink::{PublishError, Publisher};

#[derive(Debug, Clone, PartialEq)]
pub struct PutRecordsEntry {
    pub partition_key: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordResult {
    pub sequence_number: Option<u64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl RecordResult {
    pub fn ok(sequence_number: u64) -> Self {
        Self {
            sequence_number: Some(sequence_number),
            ..Default::default()
        }
    }

    pub fn failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sequence_number: None,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error_code.is_some()
    }
}

/// Response of a put-batch call. `records` follows submission order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PutRecordsOutput {
    pub failed_record_count: usize,
    pub records: Vec<RecordResult>,
}

impl PutRecordsOutput {
    pub fn from_records(records: Vec<RecordResult>) -> Self {
        let failed_record_count = records.iter().filter(|r| r.is_failed()).count();
        Self {
            failed_record_count,
            records,
        }
    }
}

/// An `Err` means the whole call failed; per-record rejections live in the output.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamBackend: Send + Sync {
    async fn put_records(
        &self,
        stream: &str,
        entries: Vec<PutRecordsEntry>,
    ) -> anyhow::Result<PutRecordsOutput>;
}

pub struct BatchPublisher {
    backend: Arc<dyn StreamBackend>,
    stream: String,
    partition_key_len: usize,
}

impl BatchPublisher {
    pub fn new(backend: Arc<dyn StreamBackend>, stream: String, partition_key_len: usize) -> Self {
        info!(stream = %stream, partition_key_len, "created batch publisher");
        Self {
            backend,
            stream,
            partition_key_len,
        }
    }

    fn entries(&self, batch: &LogBatch) -> Vec<PutRecordsEntry> {
        batch
            .iter()
            .map(|record| PutRecordsEntry {
                partition_key: partition_key::random_key(self.partition_key_len),
                data: Bytes::copy_from_slice(record.get().as_bytes()),
            })
            .collect()
    }
}

#[async_trait]
impl Publisher for BatchPublisher {
    async fn publish(&self, batch: &LogBatch) -> Result<(), PublishError> {
        if batch.is_empty() {
            debug!(stream = %self.stream, "empty batch, nothing to publish");
            return Ok(());
        }

        let entries = self.entries(batch);
        debug!(stream = %self.stream, records = entries.len(), "submitting batch");

        let out = self
            .backend
            .put_records(&self.stream, entries)
            .await
            .map_err(|e| PublishError::Transport(format!("{e:#}")))?;

        if out.failed_record_count == 0 {
            return Ok(());
        }

        let messages: Vec<String> = out
            .records
            .iter()
            .filter(|r| r.is_failed())
            .map(|r| r.error_message.clone().unwrap_or_default())
            .collect();
        warn!(
            stream = %self.stream,
            failed = out.failed_record_count,
            total = batch.len(),
            "stream rejected records"
        );
        Err(PublishError::Partial {
            failed: out.failed_record_count,
            messages,
        })
    }
}
