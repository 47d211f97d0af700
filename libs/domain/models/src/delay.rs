// [libs/domain/models/src/delay.rs]
/*!
 * =================================================================
 * APARATO: DELAY QUEUE MODELS (V4.1 - LEASE ENFORCED)
 * CLASIFICACIÓN: DOMAIN ENTITIES (ESTRATO L2)
 * RESPONSABILIDAD: REGISTROS DURABLES DE EJECUCIÓN DIFERIDA
 *
 * # Mathematical Proof (Claim Exclusivity):
 * 'processing' solo es alcanzable desde 'pending' dentro de una
 * transacción de reclamo con guardia de estado; un reclamo colapsado
 * re-entra en elegibilidad cuando lease_until < now (Reaper).
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Tipos de tarea con handler registrado en el despachador.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DelayTaskKind {
    /// Materializa una respuesta IA diferida (cloud letter).
    #[serde(rename = "ai.reply")]
    AiReply,
    /// Busca y persiste un emparejamiento de pen-pals.
    #[serde(rename = "ai.match")]
    AiMatch,
    /// Re-evalúa la asignación de tareas sin cartero.
    #[serde(rename = "courier.unassigned_retry")]
    CourierUnassignedRetry,
    /// Barrido de expiración de barcodes sin vincular.
    #[serde(rename = "barcode.expire_sweep")]
    BarcodeExpireSweep,
}

impl DelayTaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DelayTaskKind::AiReply => "ai.reply",
            DelayTaskKind::AiMatch => "ai.match",
            DelayTaskKind::CourierUnassignedRetry => "courier.unassigned_retry",
            DelayTaskKind::BarcodeExpireSweep => "barcode.expire_sweep",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ai.reply" => Some(DelayTaskKind::AiReply),
            "ai.match" => Some(DelayTaskKind::AiMatch),
            "courier.unassigned_retry" => Some(DelayTaskKind::CourierUnassignedRetry),
            "barcode.expire_sweep" => Some(DelayTaskKind::BarcodeExpireSweep),
            _ => None,
        }
    }
}

/// Estados del registro diferido.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DelayStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl DelayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DelayStatus::Pending => "pending",
            DelayStatus::Processing => "processing",
            DelayStatus::Completed => "completed",
            DelayStatus::Failed => "failed",
            DelayStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(DelayStatus::Pending),
            "processing" => Some(DelayStatus::Processing),
            "completed" => Some(DelayStatus::Completed),
            "failed" => Some(DelayStatus::Failed),
            "cancelled" => Some(DelayStatus::Cancelled),
            _ => None,
        }
    }
}

/// Registro durable de la cola de retardo.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayRecord {
    pub id: String,
    pub kind: DelayTaskKind,
    /// Payload opaco; el handler registrado decodifica su struct.
    pub payload: serde_json::Value,
    pub delayed_until: DateTime<Utc>,
    pub status: DelayStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    /// Vencimiento del arrendamiento del worker que reclamó la fila.
    pub lease_until: Option<DateTime<Utc>>,
    pub result_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
