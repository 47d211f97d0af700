// [libs/infra/db-turso/src/errors.rs]
/*!
 * =================================================================
 * APARATO: DATABASE ERROR CATALOG (V6.0 - POSTAL LEDGER)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DE PERSISTENCIA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CORE PARITY: Cada variante de dominio proyecta a su CoreFault
 *    (§ catálogo L2) en el límite del Orquestador.
 * 2. PANOPTICON COMPLIANCE: Prefijos de estrato para el renderizado
 *    cromático en el Dashboard.
 * =================================================================
 */

use estafeta_domain_models::faults::CoreFault;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Error de enlace físico o de red con el cluster de Turso.
    #[error("[L3_DB_NET_FAULT]: DATABASE_UPLINK_SEVERED -> {0}")]
    ConnectionError(String),

    /// Fallo de configuración del entorno (variables vacías).
    #[error("[L3_DB_CONFIG_FAULT]: STRATEGIC_ENV_VOID -> {0}")]
    ConfigurationError(String),

    /// Error de sintaxis o ejecución devuelto por el motor libSQL.
    #[error("[L3_DB_QUERY_FAULT]: SQL_QUERY_REJECTED -> {0}")]
    QueryError(#[from] libsql::Error),

    /// Fallo de transformación de tipos entre SQLite y el dominio.
    #[error("[L3_DB_MAPPING_FAULT]: DATA_MAPPING_VIOLATION -> {0}")]
    MappingError(String),

    /// Colapso al comprometer una secuencia multi-tabla.
    #[error("[L3_DB_FAULT]: TRANSACTION_COLLAPSE")]
    TransactionError,

    // --- ESTRATO DE OPERACIONES POSTALES ---

    /// La entidad solicitada no existe en las tablas activas.
    #[error("[L3_POSTAL_FAULT]: ENTITY_NOT_FOUND -> {0}")]
    NotFound(String),

    /// Violación de la máquina de estados bajo guardia de fila.
    #[error("[L3_POSTAL_FAULT]: INVALID_STATE_TRANSITION -> {0}")]
    InvalidTransition(String),

    /// Colisión de concurrencia: otra transacción ganó la guardia.
    #[error("[L3_POSTAL_FAULT]: GUARD_COLLISION -> {0}")]
    Conflict(String),

    /// Autoridad o permiso insuficiente re-verificado en el núcleo.
    #[error("[L3_POSTAL_FAULT]: AUTHORITY_DENIED -> {0}")]
    PermissionDenied(String),

    /// Tope de cuota o de créditos alcanzado.
    #[error("[L3_POSTAL_FAULT]: QUOTA_CEILING -> {0}")]
    QuotaExceeded(String),

    /// Campo rechazado por validación de dominio.
    #[error("[L3_POSTAL_FAULT]: INPUT_REJECTED -> {0}")]
    InvalidInput(String),
}

impl From<CoreFault> for DbError {
    /// Los veredictos puros del dominio entran al Ledger sin pérdida.
    fn from(fault: CoreFault) -> Self {
        match fault {
            CoreFault::InvalidInput(detail) => DbError::InvalidInput(detail),
            CoreFault::PermissionDenied(detail) => DbError::PermissionDenied(detail),
            CoreFault::NotFound(detail) => DbError::NotFound(detail),
            CoreFault::InvalidTransition(detail) => DbError::InvalidTransition(detail),
            CoreFault::Conflict(detail) => DbError::Conflict(detail),
            CoreFault::QuotaExceeded(detail) => DbError::QuotaExceeded(detail),
            other => DbError::MappingError(other.to_string()),
        }
    }
}

impl From<DbError> for CoreFault {
    /// Proyección al catálogo del núcleo en el límite del Orquestador.
    fn from(fault: DbError) -> Self {
        match fault {
            DbError::NotFound(detail) => CoreFault::NotFound(detail),
            DbError::InvalidTransition(detail) => CoreFault::InvalidTransition(detail),
            DbError::Conflict(detail) => CoreFault::Conflict(detail),
            DbError::PermissionDenied(detail) => CoreFault::PermissionDenied(detail),
            DbError::QuotaExceeded(detail) => CoreFault::QuotaExceeded(detail),
            DbError::InvalidInput(detail) => CoreFault::InvalidInput(detail),
            DbError::ConnectionError(detail) => CoreFault::Unavailable(detail),
            DbError::ConfigurationError(detail) => CoreFault::Internal(detail),
            DbError::QueryError(engine_fault) => CoreFault::Unavailable(engine_fault.to_string()),
            DbError::MappingError(detail) => CoreFault::Internal(detail),
            DbError::TransactionError => {
                CoreFault::Unavailable("TRANSACTION_COLLAPSE".to_string())
            }
        }
    }
}
