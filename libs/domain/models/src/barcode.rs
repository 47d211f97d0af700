// [libs/domain/models/src/barcode.rs]
/*!
 * =================================================================
 * APARATO: BARCODE LIFECYCLE MODELS (V5.0 - JOURNAL MASTER)
 * CLASIFICACIÓN: DOMAIN ENTITIES (ESTRATO L2)
 * RESPONSABILIDAD: TOKEN FÍSICO DE LA CARTA Y SU DIARIO DE ESCANEOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. JOURNAL SOVEREIGNTY: El diario de ScanEvents es la única fuente
 *    de verdad del estado de entrega; la carta solo proyecta.
 * 2. TERMINAL IMMUTABILITY: Estados terminales sellan la fila para
 *    el estado de negocio.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::opcode::OpCode;

/// Estados del ciclo de vida del token físico.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeStatus {
    /// Generado pero sin carta vinculada.
    Unactivated,
    /// Vinculado a sobre y destino; esperando recogida.
    Bound,
    /// En manos del cuerpo de carteros.
    InTransit,
    /// Entregado en el punto destino (terminal).
    Delivered,
    /// TTL agotado sin vinculación (terminal).
    Expired,
    /// Anulado por actor autorizado (terminal).
    Cancelled,
}

impl BarcodeStatus {
    /// Un estado terminal nunca vuelve a transicionar.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BarcodeStatus::Delivered | BarcodeStatus::Expired | BarcodeStatus::Cancelled
        )
    }

    /// Forma persistida estable del estado.
    pub fn as_str(&self) -> &'static str {
        match self {
            BarcodeStatus::Unactivated => "unactivated",
            BarcodeStatus::Bound => "bound",
            BarcodeStatus::InTransit => "in_transit",
            BarcodeStatus::Delivered => "delivered",
            BarcodeStatus::Expired => "expired",
            BarcodeStatus::Cancelled => "cancelled",
        }
    }

    /// Decodifica desde la forma persistida del Ledger.
    pub fn parse(raw_status: &str) -> Option<Self> {
        match raw_status {
            "unactivated" => Some(BarcodeStatus::Unactivated),
            "bound" => Some(BarcodeStatus::Bound),
            "in_transit" => Some(BarcodeStatus::InTransit),
            "delivered" => Some(BarcodeStatus::Delivered),
            "expired" => Some(BarcodeStatus::Expired),
            "cancelled" => Some(BarcodeStatus::Cancelled),
            _ => None,
        }
    }
}

/// Tipología física del escaneo registrado en el diario.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    /// Vinculación carta + sobre + destino.
    Bind,
    /// Recogida por el cartero asignado.
    Pickup,
    /// Punto de relevo intermedio (solo diario, sin cambio de estado).
    Transit,
    /// Entrega final en destino.
    Delivery,
    /// Anulación administrativa.
    Cancel,
}

impl ScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanType::Bind => "bind",
            ScanType::Pickup => "pickup",
            ScanType::Transit => "transit",
            ScanType::Delivery => "delivery",
            ScanType::Cancel => "cancel",
        }
    }

    pub fn parse(raw_type: &str) -> Option<Self> {
        match raw_type {
            "bind" => Some(ScanType::Bind),
            "pickup" => Some(ScanType::Pickup),
            "transit" => Some(ScanType::Transit),
            "delivery" => Some(ScanType::Delivery),
            "cancel" => Some(ScanType::Cancel),
            _ => None,
        }
    }
}

/// El token físico escaneable adherido a una carta.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Barcode {
    pub id: String,
    /// Código opaco impreso; su generación pertenece a colaboradores.
    pub code: String,
    pub status: BarcodeStatus,
    pub letter_id: Option<String>,
    pub envelope_id: Option<String>,
    pub recipient_op_code: Option<OpCode>,
    pub last_scanner_id: Option<String>,
    pub scan_count: u32,
    pub bound_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/**
 * Registro inmutable de un escaneo físico o transición administrativa.
 * Una vez cristalizado en el Ledger jamás se reescribe.
 */
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEvent {
    pub id: String,
    pub barcode_id: String,
    pub scanner_id: String,
    pub scan_type: ScanType,
    /// OP Code o coordenadas reportadas en el punto de escaneo.
    pub location: Option<String>,
    pub old_status: BarcodeStatus,
    pub new_status: BarcodeStatus,
    pub scanned_at: DateTime<Utc>,
    /// Metadatos opacos; cada consumidor decodifica su propio struct.
    pub metadata: serde_json::Value,
    /// Clave de deduplicación (barcode, actor, tipo, cubeta de minuto).
    pub dedup_key: String,
}
