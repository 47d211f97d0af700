// [libs/domain/lettering/src/lib.rs]
/*!
 * =================================================================
 * APARATO: BARCODE STATE MACHINE RULES (V6.0 - CLOSURE CERTIFIED)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: TABLA DE TRANSICIONES Y FÍSICA DEL ESCANEO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. PURE DECISION CORE: Este estrato decide; jamás persiste. El
 *    repositorio ejecuta el veredicto dentro de su transacción.
 * 2. TERMINAL SEAL: Estados terminales cierran el retículo; ninguna
 *    secuencia de operaciones los abandona.
 * 3. MINUTE-BUCKET DEDUP: Un segundo escaneo idéntico dentro de la
 *    misma cubeta de minuto es un no-op que devuelve el evento previo.
 *
 * # Mathematical Proof (Transition Closure):
 * El conjunto de estados es cerrado bajo la tabla: para todo estado S
 * y operación O, apply(S, O) ∈ {estado legal, rechazo InvalidTransition
 * sin mutación}. La certificación por proptest recorre el producto
 * cartesiano completo de (estado, tipo de escaneo).
 * =================================================================
 */

use chrono::{DateTime, Utc};
use estafeta_domain_models::barcode::{BarcodeStatus, ScanType};
use estafeta_domain_models::faults::CoreFault;

pub mod dedup;

pub use dedup::scan_dedup_key;

/// TTL por defecto de un barcode sin vincular (30 días).
pub const UNACTIVATED_TTL_HOURS: i64 = 24 * 30;

/// Objetivos legales desde cada estado (la tabla soberana).
pub fn allowed_targets(source_status: BarcodeStatus) -> &'static [BarcodeStatus] {
    match source_status {
        BarcodeStatus::Unactivated => &[
            BarcodeStatus::Bound,
            BarcodeStatus::Expired,
            BarcodeStatus::Cancelled,
        ],
        BarcodeStatus::Bound => &[BarcodeStatus::InTransit, BarcodeStatus::Cancelled],
        BarcodeStatus::InTransit => &[BarcodeStatus::Delivered, BarcodeStatus::Cancelled],
        // Terminales: retículo sellado.
        BarcodeStatus::Delivered | BarcodeStatus::Expired | BarcodeStatus::Cancelled => &[],
    }
}

/// Verifica la legalidad de una arista concreta de la tabla.
pub fn transition_is_legal(from: BarcodeStatus, to: BarcodeStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/**
 * Veredicto de un escaneo físico: estado exigido y estado resultante.
 *
 * Física del escaneo:
 * - pickup: exige 'bound' (DECISIÓN sellada: jamás desde 'unactivated',
 *   pues saltaría la validación de destino del bind) → 'in_transit'.
 * - transit: exige 'in_transit'; solo diario, el estado no cambia.
 * - delivery: exige 'in_transit' → 'delivered'.
 * - bind y cancel viajan por sus operaciones dedicadas.
 */
pub fn scan_verdict(
    current_status: BarcodeStatus,
    scan_type: ScanType,
) -> Result<BarcodeStatus, CoreFault> {
    let (required_status, target_status) = match scan_type {
        ScanType::Pickup => (BarcodeStatus::Bound, BarcodeStatus::InTransit),
        ScanType::Transit => (BarcodeStatus::InTransit, BarcodeStatus::InTransit),
        ScanType::Delivery => (BarcodeStatus::InTransit, BarcodeStatus::Delivered),
        ScanType::Bind | ScanType::Cancel => {
            return Err(CoreFault::InvalidInput(format!(
                "SCAN_TYPE_RESERVED: {} travels through its dedicated operation",
                scan_type.as_str()
            )));
        }
    };

    if current_status != required_status {
        return Err(CoreFault::InvalidTransition(format!(
            "SCAN_{}_REQUIRES_{}_GOT_{}",
            scan_type.as_str().to_uppercase(),
            required_status.as_str(),
            current_status.as_str()
        )));
    }

    Ok(target_status)
}

/// Veredicto de la operación de vinculación (bind).
pub fn bind_verdict(current_status: BarcodeStatus) -> Result<BarcodeStatus, CoreFault> {
    if current_status != BarcodeStatus::Unactivated {
        return Err(CoreFault::InvalidTransition(format!(
            "BIND_REQUIRES_unactivated_GOT_{}",
            current_status.as_str()
        )));
    }
    Ok(BarcodeStatus::Bound)
}

/// Veredicto de anulación administrativa.
pub fn cancel_verdict(current_status: BarcodeStatus) -> Result<BarcodeStatus, CoreFault> {
    if current_status.is_terminal() {
        return Err(CoreFault::InvalidTransition(format!(
            "CANCEL_ON_TERMINAL_{}",
            current_status.as_str()
        )));
    }
    Ok(BarcodeStatus::Cancelled)
}

/// Veredicto del barrido de expiración (solo 'unactivated' caduca).
pub fn expire_verdict(current_status: BarcodeStatus) -> Result<BarcodeStatus, CoreFault> {
    if current_status != BarcodeStatus::Unactivated {
        return Err(CoreFault::InvalidTransition(format!(
            "EXPIRE_REQUIRES_unactivated_GOT_{}",
            current_status.as_str()
        )));
    }
    Ok(BarcodeStatus::Expired)
}

/// Elegibilidad de expiración por TTL.
pub fn is_expiry_eligible(
    current_status: BarcodeStatus,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    current_status == BarcodeStatus::Unactivated
        && expires_at.map(|boundary| boundary <= now).unwrap_or(false)
}
