// [apps/orchestrator/src/routes.rs]
/*!
 * APARATO: NETWORK TOPOLOGY (ROUTES)
 * RESPONSABILIDAD: El túnel de mando del Orquestador. Solo /health y
 * /ws viven aquí: los handlers de negocio HTTP son colaboradores
 * externos que consumen la librería directamente.
 */

use crate::handlers::{health, stream};
use crate::middleware::maintenance_gate;
use crate::state::AppState;
use axum::{middleware, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_relay_router(application_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_probe))
        .route("/ws", get(stream::establish_stream_link))
        .layer(middleware::from_fn_with_state(
            application_state.clone(),
            maintenance_gate,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(application_state)
}
