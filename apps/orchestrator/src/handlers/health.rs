// [apps/orchestrator/src/handlers/health.rs]
/*!
 * APARATO: HEALTH PROBE HANDLER
 * RESPONSABILIDAD: Sonda de liveness con el modo operativo, las
 * conexiones vivas del Hub y los contadores del bus de eventos.
 */

use crate::state::{AppState, SystemMode};
use axum::extract::State;
use axum::Json;
use serde_json::json;

pub async fn health_probe(State(application_state): State<AppState>) -> Json<serde_json::Value> {
    let mode_label = match &*application_state
        .current_system_mode
        .read()
        .expect("mode lock poisoned")
    {
        SystemMode::Operational => "operational".to_string(),
        SystemMode::Maintenance(reason) => format!("maintenance: {}", reason),
    };

    Json(json!({
        "status": "ok",
        "mode": mode_label,
        "hub_connections": application_state.hub.connection_count(),
        "bus_counters": application_state.bus_metrics.snapshot(),
    }))
}
