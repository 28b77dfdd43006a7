use crate::app::AppState;
use crate::ingest::types::decode_batch;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::{debug, error, warn};

type Rejection = (StatusCode, String);

fn reject(st: &AppState, reason: &'static str, message: String) -> Rejection {
    warn!(reason, %message, "rejected log batch");
    st.metrics.ingest_rejected_total(reason);
    (StatusCode::BAD_REQUEST, message)
}

pub async fn ingest(State(st): State<AppState>, body: Bytes) -> Result<StatusCode, Rejection> {
    if body.is_empty() {
        return Err(reject(
            &st,
            "missing_body",
            "Request body is required".to_string(),
        ));
    }

    let batch = decode_batch(&body).map_err(|e| reject(&st, "malformed_body", e.to_string()))?;

    let max = st.cfg.ingest.max_batch_records;
    if max > 0 && batch.len() > max {
        return Err(reject(
            &st,
            "too_many_records",
            format!("batch exceeds {max} records"),
        ));
    }
    st.metrics.records_received(batch.len());

    if let Err(e) = st.publisher.publish(&batch).await {
        error!(error = %e, records = batch.len(), "publish failed, batch not persisted");
        st.metrics.publish_failed();
        return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
    }

    if let Err(e) = st.persister.persist(&batch).await {
        error!(error = %e, records = batch.len(), "persist failed after publish");
        st.metrics.persist_failed();
        return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
    }
    st.metrics.records_persisted(batch.len());

    debug!(records = batch.len(), "batch relayed");
    Ok(StatusCode::OK)
}
