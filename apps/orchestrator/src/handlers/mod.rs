// [apps/orchestrator/src/handlers/mod.rs]
/*!
 * APARATO: API HANDLERS BARREL
 * RESPONSABILIDAD: Adaptadores de entrada del Orquestador. Solo el
 * enlace realtime y la salud viven aquí; los handlers de negocio HTTP
 * pertenecen a colaboradores externos que invocan la librería.
 */

/// Enlace WebSocket full-duplex contra el Hub.
pub mod stream;
/// Sonda de salud y métricas del bus.
pub mod health;
