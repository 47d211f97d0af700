// [apps/orchestrator/src/middleware.rs]
/*!
 * APARATO: PERIMETER GUARD MIDDLEWARE
 * RESPONSABILIDAD: Interceptación perimetral del modo operativo. En
 * mantenimiento, toda ráfaga entrante (salvo /health) se rechaza con
 * 503 y el contrato de fallo { code, message, retry_after_seconds }.
 */

use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub async fn maintenance_gate(
    State(application_state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    match application_state.is_operational() {
        Ok(()) => next.run(request).await,
        Err(rejection_reason) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "code": "unavailable",
                "message": rejection_reason,
                "retry_after_seconds": 60,
            })),
        )
            .into_response(),
    }
}
