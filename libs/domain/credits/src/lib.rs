// [libs/domain/credits/src/lib.rs]
/*!
 * =================================================================
 * APARATO: CREDIT DECISION ENGINE (V5.0 - GATE CASCADE)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: GRAFO DE ESTADOS Y COMPUERTAS DE ELEGIBILIDAD
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. GATE CASCADE: regla → restricciones → topes; el primer rechazo
 *    sella la tarea como 'skipped' con razón auditable.
 * 2. GRAPH SOVEREIGNTY: Toda transición fuera del grafo se rechaza
 *    bajo cerrojo de fila en el estrato de persistencia.
 *
 * # Mathematical Proof (Cap Windows):
 * daily_cap = 0 ⟺ ventana ilimitada. Para cap > 0, el conteo de
 * tareas 'completed' del mismo (usuario, tipo) dentro de la ventana
 * móvil de 24h/7d jamás supera el cap, pues la compuerta se evalúa
 * antes de abandonar 'pending' y el conteo viaja bajo transacción.
 * =================================================================
 */

use chrono::{DateTime, Timelike, Utc};
use estafeta_domain_models::credit::{CreditRule, CreditTaskStatus, SkipReason};
use estafeta_domain_models::identity::UserRole;

/// Aristas legales del grafo de estados de una tarea de crédito.
pub fn transition_is_legal(from: CreditTaskStatus, to: CreditTaskStatus) -> bool {
    use CreditTaskStatus::*;
    matches!(
        (from, to),
        (Pending, Scheduled)
            | (Pending, Cancelled)
            | (Pending, Skipped)
            | (Scheduled, Executing)
            | (Scheduled, Cancelled)
            | (Executing, Completed)
            | (Executing, Failed)
            // Reintento: el fallo transitorio re-entra en ejecución.
            | (Failed, Executing)
    )
}

/// Veredicto de la cascada de compuertas previas a 'scheduled'.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    /// La tarea puede programarse con los puntos base de la regla.
    Admit { points: i64 },
    /// La tarea se sella como 'skipped' con razón auditable.
    Skip(SkipReason),
}

/**
 * COMPUERTA 1 + 2: regla habilitada y restricciones del actor.
 *
 * La compuerta de topes (3) exige el conteo de ventana y vive en
 * `cap_gate`; el motor la evalúa bajo la misma transacción que la
 * transición pending → scheduled.
 */
pub fn rule_gate(rule: &CreditRule, actor_role: UserRole, now: DateTime<Utc>) -> GateVerdict {
    if !rule.enabled || rule.base_points <= 0 {
        return GateVerdict::Skip(SkipReason::RuleDisabled);
    }

    let constraints = &rule.constraints;

    if actor_role.hierarchy_level() < constraints.min_role_level {
        return GateVerdict::Skip(SkipReason::ConstraintViolated);
    }

    if constraints
        .excluded_roles
        .iter()
        .any(|excluded| excluded == actor_role.as_str())
    {
        return GateVerdict::Skip(SkipReason::ConstraintViolated);
    }

    if let (Some(start_hour), Some(end_hour)) =
        (constraints.allowed_hour_start, constraints.allowed_hour_end)
    {
        let current_hour = now.hour() as u8;
        let inside_window = if start_hour <= end_hour {
            (start_hour..end_hour).contains(&current_hour)
        } else {
            // Ventana que cruza medianoche: [start, 24) ∪ [0, end).
            current_hour >= start_hour || current_hour < end_hour
        };
        if !inside_window {
            return GateVerdict::Skip(SkipReason::ConstraintViolated);
        }
    }

    GateVerdict::Admit {
        points: rule.base_points,
    }
}

/**
 * COMPUERTA 3: topes por ventana. Recibe los conteos de tareas
 * completadas del mismo (usuario, tipo) en 24h y 7d.
 */
pub fn cap_gate(rule: &CreditRule, completed_in_day: u32, completed_in_week: u32) -> GateVerdict {
    if rule.daily_cap > 0 && completed_in_day >= rule.daily_cap {
        return GateVerdict::Skip(SkipReason::DailyLimit);
    }
    if rule.weekly_cap > 0 && completed_in_week >= rule.weekly_cap {
        return GateVerdict::Skip(SkipReason::WeeklyLimit);
    }
    GateVerdict::Admit {
        points: rule.base_points,
    }
}
