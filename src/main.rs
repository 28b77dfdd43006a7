use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use log_relay::app::AppState;
use log_relay::config::RelayCfg;
use log_relay::persist::{resolve_log_path, FilePersister};
use log_relay::publisher::nats::{self, NatsStreamBackend};
use log_relay::publisher::BatchPublisher;
use log_relay::{http, readiness, telemetry};

#[derive(Parser, Debug)]
#[command(name = "log-relay", version, about = "Relays JSON log batches to a stream and a local file")]
struct Cli {
    /// Extra config file layered over `log-relay.*` in the working directory.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<String>,
    #[arg(long)]
    http_bind: Option<SocketAddr>,
    #[arg(long)]
    log_path: Option<PathBuf>,
    /// Print the effective bind address and exit.
    #[arg(long)]
    print_bind: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = RelayCfg::load(cli.config)?;
    if let Some(bind) = cli.http_bind {
        cfg.http.bind = bind;
    }
    if let Some(path) = cli.log_path {
        cfg.storage.log_path = path;
    }
    cfg.validate()?;

    if cli.print_bind {
        println!("{}", cfg.http.bind);
        return Ok(());
    }

    telemetry::init_logging(&cfg.log)?;
    let cfg = Arc::new(cfg);

    let log_path = resolve_log_path(&cfg.storage.log_path)
        .context("failed to resolve storage.log_path")?;
    if !log_path.is_file() {
        tracing::warn!(path = %log_path.display(), "log file does not exist yet, appends will fail until it is created");
    }

    let client = nats::connect(&cfg.stream).await?;
    let backend = NatsStreamBackend::new(client.clone(), cfg.stream.subject.clone());
    if cfg.stream.ensure_stream {
        nats::spawn_ensure_stream(
            backend.context().clone(),
            cfg.stream.clone(),
            Duration::from_millis(cfg.health.probe_interval_ms.max(1)),
        );
    }

    let jetstream_context = backend.context().clone();
    let publisher = BatchPublisher::new(
        Arc::new(backend),
        cfg.stream.name.clone(),
        cfg.stream.partition_key_len,
    );
    let persister = FilePersister::new(log_path.clone());
    let state = AppState::new(cfg.clone(), Arc::new(publisher), Arc::new(persister))?;

    readiness::start_readiness_probes(
        cfg.clone(),
        state.ready.clone(),
        log_path,
        client,
        jetstream_context,
    );

    http::serve(state).await?;
    Ok(())
}
