pub mod app;
pub mod config;
pub mod http;
pub mod ingest;
pub mod metrics;
pub mod persist;
pub mod publisher;
pub mod readiness;
pub mod sink;
pub mod telemetry;
