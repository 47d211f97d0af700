// [libs/domain/models/src/faults.rs]
/*!
 * =================================================================
 * APARATO: CORE FAULT CATALOG (V7.0 - PANOPTICON READY)
 * CLASIFICACIÓN: DOMAIN CORE (ESTRATO L2)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DEL NÚCLEO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. RETRY SEMANTICS: Cada variante declara su política de reintento;
 *    la Delay Queue y el Credit Engine solo reintentan transitorios.
 * 2. PANOPTICON COMPLIANCE: Mensajes con prefijo de estrato para el
 *    renderizado cromático en el Dashboard.
 * =================================================================
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Catálogo de fallos expuesto en todos los límites del núcleo.
#[derive(Error, Debug, Clone)]
pub enum CoreFault {
    /// Validación de campos: error del llamador, no reintentar.
    #[error("[L2_INPUT_FAULT]: FIELD_VALIDATION_REJECTED -> {0}")]
    InvalidInput(String),

    /// Rol o propiedad insuficiente; no reintentar.
    #[error("[L2_POLICY_FAULT]: AUTHORITY_DENIED -> {0}")]
    PermissionDenied(String),

    /// La entidad solicitada no existe en el Ledger.
    #[error("[L2_LOOKUP_FAULT]: ENTITY_NOT_FOUND -> {0}")]
    NotFound(String),

    /// Violación de la máquina de estados; no reintentar.
    #[error("[L2_STATE_FAULT]: INVALID_TRANSITION -> {0}")]
    InvalidTransition(String),

    /// Colisión de concurrencia optimista o de deduplicación.
    #[error("[L2_CONCURRENCY_FAULT]: OPTIMISTIC_COLLISION -> {0}")]
    Conflict(String),

    /// Cubeta de tokens agotada; reintentar tras la espera sugerida.
    #[error("[L2_THROTTLE_FAULT]: TOKEN_BUCKET_DRAINED -> {0}")]
    RateLimited(String),

    /// Tope diario IA o de créditos alcanzado; saltar, no reintentar.
    #[error("[L2_QUOTA_FAULT]: DAILY_CEILING_REACHED -> {0}")]
    QuotaExceeded(String),

    /// Vencimiento de plazo en transporte o subsistema.
    #[error("[L2_TIME_FAULT]: DEADLINE_EXCEEDED -> {0}")]
    Timeout(String),

    /// Subsistema inalcanzable; reintentar con backoff.
    #[error("[L2_LINK_FAULT]: SUBSYSTEM_UNAVAILABLE -> {0}")]
    Unavailable(String),

    /// Contenido retenido por la compuerta de moderación.
    #[error("[L2_CONTENT_FAULT]: MODERATION_FLAGGED -> {0}")]
    Moderation(String),

    /// Fallo inesperado; registrado con id de correlación.
    #[error("[L2_KERNEL_FAULT]: INTERNAL_COLLAPSE -> {0}")]
    Internal(String),
}

impl CoreFault {
    /// Código estable expuesto a los colaboradores de handlers.
    pub fn code(&self) -> &'static str {
        match self {
            CoreFault::InvalidInput(_) => "invalid_input",
            CoreFault::PermissionDenied(_) => "permission_denied",
            CoreFault::NotFound(_) => "not_found",
            CoreFault::InvalidTransition(_) => "invalid_transition",
            CoreFault::Conflict(_) => "conflict",
            CoreFault::RateLimited(_) => "rate_limited",
            CoreFault::QuotaExceeded(_) => "quota_exceeded",
            CoreFault::Timeout(_) => "timeout",
            CoreFault::Unavailable(_) => "unavailable",
            CoreFault::Moderation(_) => "moderation",
            CoreFault::Internal(_) => "internal",
        }
    }

    /// Política de reintento: solo los transitorios re-entran en cola.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreFault::Timeout(_) | CoreFault::Unavailable(_) | CoreFault::RateLimited(_))
    }

    /// Pista de espera para fallos transitorios (segundos).
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            CoreFault::RateLimited(_) => Some(30),
            CoreFault::Timeout(_) | CoreFault::Unavailable(_) => Some(60),
            _ => None,
        }
    }

    /// Proyección del fallo al contrato { code, message, details }.
    pub fn to_body(&self) -> FaultBody {
        FaultBody {
            code: self.code().to_string(),
            message: self.to_string(),
            details: None,
            retry_after_seconds: self.retry_after_seconds(),
        }
    }
}

/// Contrato de fallo visible al usuario final.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}
