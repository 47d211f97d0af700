// [libs/domain/ai-cortex/src/selection.rs]
/*!
 * =================================================================
 * APARATO: PROVIDER ROTATION ENGINE (V4.1 - QUOTA WINDOW)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: ORDEN DE ATAQUE DE PROVEEDORES Y FÍSICA DE CUOTA
 *
 * # Mathematical Proof (Rotation Determinism):
 * Dado un conjunto de configuraciones, el orden de ataque es una
 * función pura de (active, used_quota, daily_quota, priority). Dos
 * réplicas del Orquestador producen la misma rotación para el mismo
 * snapshot del Ledger.
 * =================================================================
 */

use chrono::{DateTime, Duration, Utc};
use estafeta_domain_models::ai::AiProviderConfig;

/**
 * Ordena los proveedores elegibles para una invocación.
 *
 * 1. Si el llamador fija proveedor y está activo con cuota, encabeza
 *    el orden de ataque; un fallo de transporte sobre él rota al
 *    siguiente de la lista.
 * 2. Resto: activos con cuota disponible, prioridad ascendente.
 *
 * Las ventanas caducas se consideran CON cuota (el reinicio atómico
 * ocurre en la transacción de selección del repositorio).
 */
pub fn order_eligible_providers(
    mut configs: Vec<AiProviderConfig>,
    pinned_provider: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<AiProviderConfig> {
    configs.retain(|config| {
        config.active && (config.has_quota() || config.quota_window_is_stale(now))
    });
    configs.sort_by(|left, right| left.priority.cmp(&right.priority));

    if let Some(pinned_name) = pinned_provider {
        if let Some(pinned_index) = configs
            .iter()
            .position(|config| config.provider == pinned_name)
        {
            let pinned_config = configs.remove(pinned_index);
            configs.insert(0, pinned_config);
        }
        // Proveedor fijado inviable: la rotación general queda intacta.
    }

    configs
}

/**
 * Frontera del próximo reinicio de cuota: medianoche UTC siguiente.
 * DECISIÓN sellada: ventanas fijas ancladas a medianoche UTC, no
 * ventana móvil de 24h (ver DESIGN.md §Decisions).
 */
pub fn quota_window_next_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let midnight_today = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now);
    midnight_today + Duration::days(1)
}
