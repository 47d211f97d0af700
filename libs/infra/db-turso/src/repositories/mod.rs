// [libs/infra/db-turso/src/repositories/mod.rs]
/*!
 * =================================================================
 * APARATO: REPOSITORY ACCESS MATRIX (V7.0 - POSTAL TOPOLOGY)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: ORQUESTACIÓN DE SUBSISTEMAS DE PERSISTENCIA
 *
 * # Mathematical Proof (Modular Encapsulation):
 * El barrel file actúa como una interfaz galvánica. Los sub-módulos
 * permanecen aislados, y solo las estructuras de autoridad
 * (Repositories) son expuestas al exterior.
 * =================================================================
 */

// --- ESTRATO 1: CICLO DE VIDA POSTAL (TACTICAL) ---

/// Máquina de estados del barcode con diario y Outbox transaccional.
pub mod barcode;
/// Cuerpo de carteros: árbol, candidatos, tareas y escalada.
pub mod courier;
/// Cartas y su proyección de estado de entrega.
pub mod letter;
/// Identidades y contexto de actor para re-verificación de permisos.
pub mod user;

// --- ESTRATO 2: MOTORES ASÍNCRONOS ---

/// Cola durable de ejecución diferida con arrendamientos.
pub mod delay_queue;
/// Reglas, tareas, balances y asientos del motor de créditos.
pub mod credit;
/// Rotación de proveedores IA, cuotas y rastro de uso.
pub mod ai;
/// Registros de emparejamiento de pen-pals.
pub mod penpal;

// --- ESTRATO 3: SECUENCIA DE EVENTOS ---

/// Patrón Outbox: secuencia monótona y offsets por suscriptor.
pub mod outbox;

// --- RE-EXPORTACIONES SOBERANAS (NOMINAL ACCESS API) ---

pub use ai::AiRepository;
pub use barcode::{BarcodeRepository, ScanOutcome};
pub use courier::CourierRepository;
pub use credit::CreditRepository;
pub use delay_queue::DelayQueueRepository;
pub use letter::LetterRepository;
pub use outbox::OutboxRepository;
pub use penpal::PenpalRepository;
pub use user::UserRepository;

/// Proyección explícita de textos opcionales al valor SQL (NULL-safe).
pub(crate) fn opt_text(value: Option<String>) -> libsql::Value {
    match value {
        Some(text) => libsql::Value::Text(text),
        None => libsql::Value::Null,
    }
}
