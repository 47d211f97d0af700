// [libs/domain/courier-graph/src/lib.rs]
/*!
 * =================================================================
 * APARATO: COURIER GRAPH AUTHORITY (V5.0 - PREFIX LATTICE)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: AUTORIDAD DE PREFIJO, INVARIANTES DEL ÁRBOL Y
 * RANKING DETERMINISTA DE ASIGNACIÓN
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. PURE DECISION CORE: El repositorio re-enuncia este ranking en su
 *    ORDER BY; la paridad entre ambos está certificada por test.
 * 2. DETERMINISTIC TIE-BREAK: prefijo más largo → menor carga → mayor
 *    tasa de éxito → aprobación más antigua (orden sellado).
 * =================================================================
 */

use chrono::{DateTime, Duration, Utc};
use estafeta_domain_models::courier::{Courier, CourierStatus};
use estafeta_domain_models::faults::CoreFault;
use estafeta_domain_models::identity::UserRole;
use estafeta_domain_models::opcode::OpCode;
use std::cmp::Ordering;

pub mod ranking;

pub use ranking::{rank_candidates, select_best_candidate};

/**
 * Autoridad de prefijo: el cartero C actúa sobre el barcode B sii su
 * prefijo gestionado es prefijo literal del OP Code destino de B.
 * El prefijo vacío (nivel ciudad) domina el espacio completo.
 */
pub fn has_prefix_authority(managed_prefix: &str, target: &OpCode) -> bool {
    target.as_str().starts_with(managed_prefix)
}

/**
 * Verifica los invariantes de una arista padre → hijo del árbol.
 *
 * # Errors:
 * - `CoreFault::InvalidInput`: nivel fuera de {1..4}, hijo cuyo nivel
 *   no sea exactamente parent.level - 1, prefijo del hijo que no
 *   extienda el del padre, o nivel 4 con padre.
 */
pub fn validate_tree_edge(child: &Courier, parent: Option<&Courier>) -> Result<(), CoreFault> {
    if !(1..=4).contains(&child.level) {
        return Err(CoreFault::InvalidInput(format!(
            "COURIER_LEVEL_OUT_OF_RANGE: {}",
            child.level
        )));
    }

    match parent {
        None => {
            if child.level != 4 {
                return Err(CoreFault::InvalidInput(format!(
                    "ORPHAN_COURIER_BELOW_CITY: level {} requires a parent",
                    child.level
                )));
            }
            if !child.managed_prefix.is_empty() {
                return Err(CoreFault::InvalidInput(
                    "CITY_LEVEL_REQUIRES_EMPTY_PREFIX".into(),
                ));
            }
        }
        Some(parent_node) => {
            if child.level != parent_node.level.saturating_sub(1) {
                return Err(CoreFault::InvalidInput(format!(
                    "LEVEL_STEP_VIOLATION: child {} under parent {}",
                    child.level, parent_node.level
                )));
            }
            if !child.managed_prefix.starts_with(&parent_node.managed_prefix) {
                return Err(CoreFault::InvalidInput(format!(
                    "PREFIX_LATTICE_VIOLATION: '{}' does not extend '{}'",
                    child.managed_prefix, parent_node.managed_prefix
                )));
            }
        }
    }

    Ok(())
}

/**
 * Reglas de promoción y creación del cuerpo:
 * un cartero de nivel N crea/degrada únicamente nivel N-1; la
 * aprobación de una solicitud de nivel N exige actor de nivel >= N.
 * Admins y super-admins portan autoridad plena.
 */
pub fn can_manage_level(actor_role: UserRole, target_level: u8) -> bool {
    if actor_role.is_admin() {
        return true;
    }
    match actor_role.courier_level() {
        Some(actor_level) => target_level + 1 == actor_level,
        None => false,
    }
}

pub fn can_approve_level(actor_role: UserRole, application_level: u8) -> bool {
    if actor_role.is_admin() {
        return true;
    }
    match actor_role.courier_level() {
        Some(actor_level) => actor_level >= application_level,
        None => false,
    }
}

/// Elegibilidad operativa de un candidato de asignación.
pub fn is_assignment_eligible(candidate: &Courier, target: &OpCode) -> bool {
    candidate.status == CourierStatus::Approved
        && candidate.current_task_count < candidate.max_daily_tasks
        && has_prefix_authority(&candidate.managed_prefix, target)
}

/**
 * Paso de escalada de una tarea huérfana: el prefijo se acorta un
 * carácter hacia el nivel padre. El prefijo vacío ya es la cúspide.
 */
pub fn escalation_step(current_prefix: &str) -> Option<String> {
    if current_prefix.is_empty() {
        return None;
    }
    Some(current_prefix[..current_prefix.len() - 1].to_string())
}

/// Una tarea huérfana escala cuando supera la ventana de reintento.
pub fn is_escalation_due(
    task_created_at: DateTime<Utc>,
    escalation_timeout_hours: i64,
    now: DateTime<Utc>,
) -> bool {
    now - task_created_at >= Duration::hours(escalation_timeout_hours)
}

/// Orden total del ranking expuesto para el comparador de candidatos.
pub(crate) fn candidate_ordering(left: &Courier, right: &Courier) -> Ordering {
    // 1. Prefijo más largo primero (más cerca del edificio).
    right
        .managed_prefix
        .len()
        .cmp(&left.managed_prefix.len())
        // 2. Menor carga vigente.
        .then(left.current_task_count.cmp(&right.current_task_count))
        // 3. Mayor tasa de éxito histórica.
        .then(
            right
                .success_rate
                .partial_cmp(&left.success_rate)
                .unwrap_or(Ordering::Equal),
        )
        // 4. Aprobación más antigua.
        .then(match (left.approved_at, right.approved_at) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}
