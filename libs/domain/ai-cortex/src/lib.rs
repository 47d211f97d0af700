// [libs/domain/ai-cortex/src/lib.rs]
/*!
 * =================================================================
 * APARATO: AI CORTEX ROOT (V4.0 - COGNITIVE STRATUM)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: DECISIONES PURAS DEL DESPACHO IA
 *
 * El Cortex decide (qué proveedor, si procede la llamada, si el
 * contenido pasa moderación); el transporte HTTP y la transacción de
 * cuota viven en el Orquestador y la Infraestructura.
 * =================================================================
 */

/// Rotación de proveedores por prioridad y ventana de cuota.
pub mod selection;
/// Cubetas de tokens por (usuario, proveedor, tipo de tarea).
pub mod throttle;
/// Filtro local de términos y umbral de moderación.
pub mod moderation;
/// Ensamblado de prompts por persona para cartas diferidas.
pub mod persona;

pub use moderation::{moderation_score, ModerationVerdict};
pub use selection::{order_eligible_providers, quota_window_next_boundary};
pub use throttle::TokenBucketRegistry;
