use serde::Deserialize;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RelayCfg {
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub stream: StreamCfg,
    #[serde(default)]
    pub storage: StorageCfg,
    #[serde(default)]
    pub health: HealthCfg,
    #[serde(default)]
    pub ingest: IngestCfg,
    #[serde(default)]
    pub log: LogCfg,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct HttpCfg {
    pub bind: SocketAddr,
    /// How long `/readyz` reports 503 before the listener stops.
    pub shutdown_grace_ms: u64,
}
impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            shutdown_grace_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct StreamCfg {
    pub url: String,
    pub name: String,
    pub subject: String,
    pub partition_key_len: usize,
    pub connect_timeout_ms: u64,
    /// Create the stream on startup when it does not exist yet.
    pub ensure_stream: bool,
}
impl Default for StreamCfg {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".into(),
            name: "my-stream".into(),
            subject: "logs.ingest".into(),
            partition_key_len: 128,
            connect_timeout_ms: 5000,
            ensure_stream: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct StorageCfg {
    /// Append target. Relative paths resolve against the working directory.
    pub log_path: PathBuf,
    pub min_free_bytes: u64,
}
impl Default for StorageCfg {
    fn default() -> Self {
        Self {
            log_path: "logs.json".into(),
            min_free_bytes: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HealthCfg {
    pub require_stream: bool,
    pub require_disk: bool,
    pub probe_interval_ms: u64,
}
impl Default for HealthCfg {
    fn default() -> Self {
        Self {
            require_stream: false,
            require_disk: false,
            probe_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestCfg {
    pub max_payload_bytes: usize,
    /// 0 means no limit.
    pub max_batch_records: usize,
}
impl Default for IngestCfg {
    fn default() -> Self {
        Self {
            max_payload_bytes: 5 * 1024 * 1024,
            max_batch_records: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogCfg {
    pub level: String,
    pub json: bool,
}
impl Default for LogCfg {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: true,
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080)
}

impl RelayCfg {
    pub fn load(path: Option<String>) -> anyhow::Result<Self> {
        Self::from_builder(build_config(path)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.stream.name.is_empty(), "stream.name cannot be empty");
        anyhow::ensure!(
            !self.stream.subject.is_empty(),
            "stream.subject cannot be empty"
        );
        anyhow::ensure!(
            self.stream.partition_key_len > 0,
            "stream.partition_key_len must be positive"
        );
        anyhow::ensure!(
            !self.storage.log_path.as_os_str().is_empty(),
            "storage.log_path cannot be empty"
        );
        Ok(())
    }

    fn from_builder(cfg: config::Config) -> anyhow::Result<Self> {
        Ok(cfg.try_deserialize()?)
    }
}

fn build_config(path: Option<String>) -> anyhow::Result<config::Config> {
    use config::{Config, Environment, File};
    let mut builder = Config::builder()
        .add_source(File::with_name("log-relay").required(false))
        .add_source(Environment::with_prefix("RELAY").separator("__"));
    if let Some(path) = path {
        builder = builder.add_source(File::with_name(&path));
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};
    use tempfile::tempdir;

    #[test]
    fn loads_from_config_file_in_cwd() {
        let dir = tempdir().expect("failed to create temp dir for test");
        let toml = r#"
            [http]
            bind = "127.0.0.1:9999"

            [stream]
            name = "audit"
        "#;
        fs::write(dir.path().join("log-relay.toml"), toml).unwrap();

        let old_cwd = env::current_dir().unwrap();
        env::set_current_dir(dir.path()).unwrap();

        let cfg = RelayCfg::load(None).expect("config file should load");
        env::set_current_dir(old_cwd).unwrap();

        assert_eq!(
            cfg.http.bind,
            "127.0.0.1:9999".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(cfg.stream.name, "audit");
        assert_eq!(cfg.stream.subject, "logs.ingest");
        assert_eq!(cfg.storage.log_path, PathBuf::from("logs.json"));
    }

    #[test]
    fn explicit_file_fills_nested_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        fs::write(
            &path,
            r#"
            [storage]
            log_path = "/var/log/relay/logs.json"

            [ingest]
            max_batch_records = 10
            "#,
        )
        .unwrap();

        let cfg = RelayCfg::load(Some(path.to_string_lossy().into_owned())).unwrap();
        assert_eq!(
            cfg.storage.log_path,
            PathBuf::from("/var/log/relay/logs.json")
        );
        assert_eq!(cfg.ingest.max_batch_records, 10);
        assert_eq!(cfg.stream.partition_key_len, 128);
        cfg.validate().unwrap();
    }

    #[test]
    fn batch_limit_is_off_by_default() {
        let cfg = RelayCfg::default();
        assert_eq!(cfg.ingest.max_batch_records, 0);
        cfg.validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_key_len() {
        let mut cfg = RelayCfg::default();
        cfg.stream.partition_key_len = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("partition_key_len"));
    }
}
