use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use async_nats::connection::State;
use async_nats::jetstream::{self, stream::Config as StreamConfig};
use async_nats::HeaderMap;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, instrument, warn};

use super::{PutRecordsEntry, PutRecordsOutput, RecordResult, StreamBackend};
use crate::config::StreamCfg;

pub const PARTITION_KEY_HEADER: &str = "Partition-Key";

/// Returns immediately; the client keeps retrying the server in the background.
pub async fn connect(cfg: &StreamCfg) -> Result<async_nats::Client> {
    let timeout = Duration::from_millis(cfg.connect_timeout_ms);
    info!(url = %cfg.url, ?timeout, "connecting to NATS");

    let client = async_nats::ConnectOptions::new()
        .connection_timeout(timeout)
        .retry_on_initial_connect()
        .connect(cfg.url.as_str())
        .await
        .context("Failed to connect to NATS")?;
    Ok(client)
}

/// Wildcard the stream binds to; one token per partition key below `subject`.
pub fn stream_subjects(subject: &str) -> String {
    format!("{subject}.>")
}

pub async fn ensure_stream(context: &jetstream::Context, cfg: &StreamCfg) -> Result<()> {
    match context.get_stream(&cfg.name).await {
        Ok(_) => {
            info!(stream = %cfg.name, "stream already exists");
        }
        Err(_) => {
            context
                .create_stream(StreamConfig {
                    name: cfg.name.clone(),
                    subjects: vec![stream_subjects(&cfg.subject)],
                    description: Some("Relayed log records".to_string()),
                    ..Default::default()
                })
                .await
                .context("Failed to create stream")?;
            info!(stream = %cfg.name, subject = %cfg.subject, "created stream");
        }
    }
    Ok(())
}

pub async fn retry_until_ok<F, Fut>(what: &str, interval: Duration, mut op: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(()) => return,
            Err(e) => {
                warn!(error = %format!("{e:#}"), attempt, "{what} failed, retrying");
                attempt += 1;
                tokio::time::sleep(interval).await;
            }
        }
    }
}

pub fn spawn_ensure_stream(context: jetstream::Context, cfg: StreamCfg, interval: Duration) {
    tokio::spawn(async move {
        retry_until_ok("ensure stream", interval, || ensure_stream(&context, &cfg)).await;
    });
}

/// Put-batch over JetStream. Each entry goes to `<subject>.<partition key>`
/// (the key is also sent as a header); all publishes are sent before any ack
/// is awaited.
///
/// JetStream keeps one ordered log per stream, so the key only tags the
/// record: consumers can filter on it, placement is unaffected.
pub struct NatsStreamBackend {
    client: async_nats::Client,
    context: jetstream::Context,
    subject: String,
}

impl NatsStreamBackend {
    pub fn new(client: async_nats::Client, subject: String) -> Self {
        let context = jetstream::new(client.clone());
        Self {
            client,
            context,
            subject,
        }
    }

    pub fn context(&self) -> &jetstream::Context {
        &self.context
    }
}

#[async_trait]
impl StreamBackend for NatsStreamBackend {
    #[instrument(skip_all, fields(stream = %stream, records = entries.len()))]
    async fn put_records(
        &self,
        stream: &str,
        entries: Vec<PutRecordsEntry>,
    ) -> Result<PutRecordsOutput> {
        if !matches!(self.client.connection_state(), State::Connected) {
            anyhow::bail!("stream backend is not connected");
        }

        let mut pending = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut headers = HeaderMap::new();
            headers.insert(PARTITION_KEY_HEADER, entry.partition_key.as_str());
            let subject = format!("{}.{}", self.subject, entry.partition_key);
            pending.push(
                self.context
                    .publish_with_headers(subject, headers, entry.data)
                    .await,
            );
        }

        let records = join_all(pending.into_iter().map(|sent| async move {
            let ack = match sent {
                Ok(ack) => ack,
                Err(e) => return RecordResult::failed("PublishFailed", e.to_string()),
            };
            match ack.await {
                Ok(ack) if ack.stream == stream => RecordResult::ok(ack.sequence),
                Ok(ack) => RecordResult::failed(
                    "WrongStream",
                    format!("record stored in stream {} instead of {stream}", ack.stream),
                ),
                Err(e) => RecordResult::failed("AckFailed", e.to_string()),
            }
        }))
        .await;

        let out = PutRecordsOutput::from_records(records);
        if out.failed_record_count > 0 {
            warn!(failed = out.failed_record_count, "JetStream rejected records");
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_keeps_going_until_success() {
        let calls = AtomicU32::new(0);

        retry_until_ok("flaky op", Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    anyhow::bail!("attempt {n} timed out");
                }
                Ok(())
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn stream_binds_every_key_below_subject() {
        assert_eq!(stream_subjects("logs.ingest"), "logs.ingest.>");
    }

    #[tokio::test]
    async fn put_records_fails_whole_call_while_disconnected() {
        let cfg = StreamCfg {
            url: "nats://127.0.0.1:1".into(),
            connect_timeout_ms: 100,
            ..StreamCfg::default()
        };
        let client = connect(&cfg).await.unwrap();
        let backend = NatsStreamBackend::new(client, cfg.subject.clone());

        let err = backend
            .put_records(
                "my-stream",
                vec![PutRecordsEntry {
                    partition_key: "abc".into(),
                    data: Bytes::from_static(b"1"),
                }],
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "stream backend is not connected");
    }
}
