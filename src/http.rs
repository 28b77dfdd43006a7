use std::sync::Arc;
use std::time::Duration;
use tracing::Span;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{self, Response, StatusCode};
use axum::routing::{get, post};
use axum::{response::IntoResponse, Router};
use axum_prometheus::PrometheusMetricLayer;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::app::AppState;
use crate::ingest::handler::ingest;
use crate::readiness::Readiness;

pub const WELCOME: &str = "Welcome to my website!";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/logs", post(ingest).fallback(not_found))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(DefaultBodyLimit::max(state.cfg.ingest.max_payload_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &http::Request<_>| {
                    tracing::info_span!(
                      "http_request",
                      method = %req.method(),
                      path = %req.uri().path(),
                    )
                })
                .on_response(|res: &Response<_>, latency: Duration, _span: &Span| {
                    tracing::info!(
                      status = %res.status(),
                      latency_ms = %latency.as_millis(),
                      "response"
                    )
                })
                .on_failure(|_error: _, latency: Duration, _span: &Span| {
                    tracing::warn!(latency_ms = %latency.as_millis(), "request_failed");
                }),
        )
        .with_state(state)
}

pub async fn serve(mut state: AppState) -> anyhow::Result<()> {
    let (prom_layer, prom_handle) = PrometheusMetricLayer::pair();
    state.http_metrics = Some(prom_handle);

    let addr = state.cfg.http.bind;
    let grace = Duration::from_millis(state.cfg.http.shutdown_grace_ms);
    let ready = state.ready.clone();
    let app = router(state).layer(prom_layer);

    let listener: TcpListener = TcpListener::bind(addr).await?;
    println!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(ready, grace))
        .await?;
    tracing::info!("http server stopped");
    Ok(())
}

async fn shutdown_signal(ready: Arc<Readiness>, grace: Duration) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    ready.start_draining();
    tracing::info!(grace_ms = %grace.as_millis(), "shutdown requested, draining");
    tokio::time::sleep(grace).await;
}

async fn welcome() -> impl IntoResponse {
    WELCOME
}

async fn not_found() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn readyz(State(st): State<AppState>) -> impl IntoResponse {
    if st.ready.is_ready(&st.cfg.health) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics(State(st): State<AppState>) -> impl IntoResponse {
    let mut body = st
        .http_metrics
        .as_ref()
        .map(|h| h.render())
        .unwrap_or_default();
    body.push_str(&st.metrics.render());
    body
}
