use nix::sys::statvfs::statvfs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_nats::connection::State;
use async_nats::jetstream;

use crate::config::{HealthCfg, RelayCfg};

pub struct Readiness {
    pub disk_ok: AtomicBool,
    pub stream_ok: AtomicBool,
    draining: AtomicBool,
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

impl Readiness {
    pub fn new() -> Self {
        Self {
            disk_ok: AtomicBool::new(false),
            stream_ok: AtomicBool::new(false),
            draining: AtomicBool::new(false),
        }
    }

    pub fn is_ready(&self, health: &HealthCfg) -> bool {
        if self.is_draining() {
            return false;
        }
        let disk = !health.require_disk || self.disk_ok.load(Ordering::Relaxed);
        let stream = !health.require_stream || self.stream_ok.load(Ordering::Relaxed);
        disk && stream
    }

    pub fn start_draining(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }
}

pub fn start_readiness_probes(
    cfg: Arc<RelayCfg>,
    ready: Arc<Readiness>,
    log_path: PathBuf,
    stream: async_nats::Client,
    jetstream: jetstream::Context,
) {
    let min = cfg.storage.min_free_bytes;
    let interval = Duration::from_millis(cfg.health.probe_interval_ms.max(1));

    // disk probe
    {
        let ready = ready.clone();
        tokio::spawn(async move {
            loop {
                let ok = disk_ok(&log_path, min);
                ready.disk_ok.store(ok, Ordering::Relaxed);
                tokio::time::sleep(interval).await;
            }
        });
    }

    // stream probe
    {
        let ready = ready.clone();
        let stream_name = cfg.stream.name.clone();
        tokio::spawn(async move {
            loop {
                let ok = matches!(stream.connection_state(), State::Connected)
                    && jetstream.get_stream(&stream_name).await.is_ok();
                ready.stream_ok.store(ok, Ordering::Relaxed);
                tokio::time::sleep(interval).await;
            }
        });
    }
}

fn disk_ok(log_path: &Path, min_free_bytes: u64) -> bool {
    log_path.is_file()
        && free_bytes_for(log_path)
            .map(|b| b >= min_free_bytes)
            .unwrap_or(false)
}

fn free_bytes_for(path: &Path) -> anyhow::Result<u64> {
    let p = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let stats = statvfs(p)?;
    Ok((stats.blocks_available() as u64) * (stats.fragment_size() as u64))
}
