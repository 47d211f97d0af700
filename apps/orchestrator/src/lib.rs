// [apps/orchestrator/src/lib.rs]
/*!
 * =================================================================
 * APARATO: ORCHESTRATOR LIBRARY ROOT (V5.0 - RELAY AUTHORITY)
 * CLASIFICACIÓN: CRATE ROOT (ESTRATO L3)
 * RESPONSABILIDAD: DEFINICIÓN SUPREMA DEL ÁRBOL DE MÓDULOS
 *
 * Los colaboradores de handlers HTTP consumen esta librería: AppState
 * expone los repositorios y servicios del núcleo; el binario solo
 * enciende daemons y el enlace realtime.
 * =================================================================
 */

// --- ESTRATO DE CONFIGURACIÓN Y ESTADO (L1-APP) ---
/// Captura de entorno con los defaults sellados del contrato.
pub mod config;
/// Gestor del sistema nervioso central del orquestador.
pub mod state;

// --- ESTRATO DE TRANSPORTE Y ACCIÓN ---
/// Adaptadores de entrada para la sonda de salud y el WebSocket.
pub mod handlers;
/// Núcleo de mando y control para la ignición de servicios.
pub mod kernel;
/// El túnel de mando: definición de rutas y topología de red.
pub mod routes;

// --- ESTRATO DE SEGURIDAD Y SOPORTE ---
/// Guardia perimetral del modo operativo.
pub mod middleware;
/// Daemons de fondo: bus, cola de retardo, créditos, despacho.
pub mod services;

/**
 * PRELUDIO DEL ORQUESTADOR
 *
 * Re-exportación estratégica de los componentes necesarios para la
 * ignición mínima del sistema.
 */
pub mod prelude {
    pub use crate::config::EstafetaConfig;
    pub use crate::kernel::OrchestratorKernel;
    pub use crate::state::{AppState, SystemMode};
}
