#![cfg(feature = "integration-tests")]

use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, Image};

use log_relay::config::StreamCfg;
use log_relay::publisher::nats::{self, NatsStreamBackend, PARTITION_KEY_HEADER};
use log_relay::publisher::{PutRecordsEntry, StreamBackend};

#[derive(Debug, Clone)]
struct NatsWithJetStream {
    ports: Vec<ContainerPort>,
}

impl Default for NatsWithJetStream {
    fn default() -> Self {
        Self {
            ports: vec![ContainerPort::Tcp(4222)],
        }
    }
}

impl Image for NatsWithJetStream {
    fn name(&self) -> &str {
        "nats"
    }

    fn tag(&self) -> &str {
        "latest"
    }

    fn ready_conditions(&self) -> Vec<WaitFor> {
        vec![WaitFor::seconds(3)]
    }

    fn cmd(&self) -> impl IntoIterator<Item = impl Into<std::borrow::Cow<'_, str>>> {
        vec!["--js"]
    }

    fn expose_ports(&self) -> &[ContainerPort] {
        &self.ports
    }
}

async fn start_nats() -> Result<(ContainerAsync<NatsWithJetStream>, StreamCfg)> {
    let nats = NatsWithJetStream::default().start().await?;
    let host = nats.get_host().await?;
    let port = nats.get_host_port_ipv4(4222).await?;

    let cfg = StreamCfg {
        url: format!("nats://{host}:{port}"),
        ..StreamCfg::default()
    };
    Ok((nats, cfg))
}

async fn connected_backend(cfg: &StreamCfg, subject: &str) -> Result<NatsStreamBackend> {
    let client = nats::connect(cfg).await?;
    let backend = NatsStreamBackend::new(client, subject.to_string());
    nats::retry_until_ok("ensure stream", Duration::from_millis(200), || {
        nats::ensure_stream(backend.context(), cfg)
    })
    .await;
    Ok(backend)
}

fn entry(key: &str, data: &'static [u8]) -> PutRecordsEntry {
    PutRecordsEntry {
        partition_key: key.to_string(),
        data: Bytes::from_static(data),
    }
}

#[tokio::test]
async fn put_batch_stores_records_in_order_with_their_keys() -> Result<()> {
    let (_nats, cfg) = start_nats().await?;
    let backend = connected_backend(&cfg, &cfg.subject).await?;

    let out = backend
        .put_records(
            &cfg.name,
            vec![entry("keyA", br#"{"msg":"a"}"#), entry("keyB", br#"{"msg":"b"}"#)],
        )
        .await?;

    assert_eq!(out.failed_record_count, 0);
    assert_eq!(out.records.len(), 2);
    let first = out.records[0].sequence_number.expect("first sequence");
    let second = out.records[1].sequence_number.expect("second sequence");
    assert!(first < second, "{first} should precede {second}");

    let stream = backend.context().get_stream(&cfg.name).await?;
    let stored = stream.get_raw_message(first).await?;
    assert_eq!(stored.subject.as_str(), format!("{}.keyA", cfg.subject));
    assert_eq!(stored.payload, Bytes::from_static(br#"{"msg":"a"}"#));
    let key = stored
        .headers
        .get(PARTITION_KEY_HEADER)
        .expect("partition key header");
    assert_eq!(key.as_str(), "keyA");

    Ok(())
}

#[tokio::test]
async fn subject_without_stream_fails_every_record() -> Result<()> {
    let (_nats, cfg) = start_nats().await?;
    let backend = connected_backend(&cfg, "unbound.logs").await?;

    let out = backend
        .put_records(&cfg.name, vec![entry("k1", b"1"), entry("k2", b"2")])
        .await?;

    assert_eq!(out.failed_record_count, 2);
    assert!(out
        .records
        .iter()
        .all(|r| r.error_code.as_deref() == Some("AckFailed") && r.sequence_number.is_none()));

    Ok(())
}

#[tokio::test]
async fn record_landing_in_another_stream_is_failed() -> Result<()> {
    let (_nats, cfg) = start_nats().await?;
    let backend = connected_backend(&cfg, &cfg.subject).await?;

    let out = backend
        .put_records("audit-stream", vec![entry("k1", b"1")])
        .await?;

    assert_eq!(out.failed_record_count, 1);
    assert_eq!(out.records[0].error_code.as_deref(), Some("WrongStream"));
    assert_eq!(
        out.records[0].error_message.as_deref(),
        Some(format!("record stored in stream {} instead of audit-stream", cfg.name).as_str())
    );

    Ok(())
}
