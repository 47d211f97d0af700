// [libs/domain/models/src/lib.rs]
/*!
 * =================================================================
 * APARATO: POSTAL DOMAIN MODELS ROOT (V3.0 - RELAY MASTER)
 * CLASIFICACIÓN: DOMAIN ENTITIES (ESTRATO L2)
 * RESPONSABILIDAD: DEFINICIÓN SUPREMA DE CONTRATOS DEL DOMINIO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE SOURCE OF TRUTH: Toda entidad que cruza un límite de
 *    proceso (Ledger, Outbox, WebSocket) nace en este estrato.
 * 2. TYPESHARE SYNERGY: Mapeo determinista de tipos para el
 *    Dashboard, garantizando paridad en la Tríada.
 * 3. NOMINAL PRECISION: Nomenclatura nominal absoluta en campos.
 * =================================================================
 */

/// Identidades, roles y la matriz fija de permisos.
pub mod identity;
/// Direcciones geográficas de seis caracteres (OP Codes).
pub mod opcode;
/// Cartas y su proyección de estado de entrega.
pub mod letter;
/// Barcodes físicos y su diario de escaneos.
pub mod barcode;
/// Jerarquía de carteros y tareas de relevo.
pub mod courier;
/// Reglas, tareas y balances del motor de créditos.
pub mod credit;
/// Configuración de proveedores IA y registro de uso.
pub mod ai;
/// Registros durables de la cola de retardo.
pub mod delay;
/// Tramas realtime y tipología de eventos del Hub.
pub mod realtime;
/// Sobre de eventos del Outbox transaccional.
pub mod outbox;
/// Catálogo semántico de fallos del núcleo.
pub mod faults;
/// Curva de reintentos compartida (backoff exponencial).
pub mod schedule;

#[cfg(test)]
mod tests_serialization;

pub use barcode::{Barcode, BarcodeStatus, ScanEvent, ScanType};
pub use courier::{Courier, CourierStatus, CourierTask, TaskPriority, TaskStatus};
pub use credit::{CreditRule, CreditTask, CreditTaskStatus, CreditTransaction, SkipReason, UserCredit};
pub use faults::{CoreFault, FaultBody};
pub use identity::{Permission, User, UserRole};
pub use letter::{Letter, LetterVisibility};
pub use opcode::OpCode;
pub use realtime::{EventType, RealtimeFrame};
pub use ai::{AiCallStatus, AiProviderConfig, AiTaskType, AiUsageLog};
pub use delay::{DelayRecord, DelayStatus, DelayTaskKind};
pub use outbox::{OutboxEvent, OutboxTopic};
