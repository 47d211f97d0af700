// [libs/domain/lettering/src/dedup.rs]
/*!
 * APARATO: SCAN DEDUPLICATION KEY
 * RESPONSABILIDAD: Clave idempotente (barcode, actor, tipo, cubeta de
 * minuto) para colapsar escaneos dobles del mismo gesto físico.
 */

use chrono::{DateTime, Utc};
use estafeta_domain_models::barcode::ScanType;

/**
 * Deriva la clave de deduplicación de un escaneo.
 *
 * La cubeta de minuto (timestamp truncado a 60s) absorbe el doble
 * disparo típico del gatillo de la pistola lectora: dos escaneos del
 * mismo actor sobre el mismo barcode y tipo dentro del mismo minuto
 * colapsan en una sola transición.
 */
pub fn scan_dedup_key(
    barcode_id: &str,
    actor_id: &str,
    scan_type: ScanType,
    scanned_at: DateTime<Utc>,
) -> String {
    let minute_bucket = scanned_at.timestamp() / 60;
    format!(
        "{}:{}:{}:{}",
        barcode_id,
        actor_id,
        scan_type.as_str(),
        minute_bucket
    )
}
