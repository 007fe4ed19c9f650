use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the seed store and report whether the service is running degraded.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_seed_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "seed store health check failed");
            }
        }
        Err(_) => warn!("seed store unavailable (degraded mode)"),
    }

    let clients = state.clients().len();
    if state.is_degraded() {
        HealthResponse::degraded(clients)
    } else {
        HealthResponse::ok(clients)
    }
}
