use std::sync::Arc;

use axum_prometheus::metrics_exporter_prometheus::PrometheusHandle;

use crate::config::RelayCfg;
use crate::metrics::AppMetrics;
use crate::readiness::Readiness;
use crate::sink::{Persister, Publisher};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<RelayCfg>,
    pub ready: Arc<Readiness>,
    pub publisher: Arc<dyn Publisher>,
    pub persister: Arc<dyn Persister>,
    pub metrics: Arc<AppMetrics>,
    pub http_metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        cfg: Arc<RelayCfg>,
        publisher: Arc<dyn Publisher>,
        persister: Arc<dyn Persister>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            cfg,
            ready: Arc::new(Readiness::new()),
            publisher,
            persister,
            metrics: Arc::new(AppMetrics::new()?),
            http_metrics: None,
        })
    }
}
