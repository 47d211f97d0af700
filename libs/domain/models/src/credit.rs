// [libs/domain/models/src/credit.rs]
/*!
 * =================================================================
 * APARATO: CREDIT ENGINE MODELS (V6.0 - LEDGER PARITY)
 * CLASIFICACIÓN: DOMAIN ENTITIES (ESTRATO L2)
 * RESPONSABILIDAD: REGLAS, TAREAS Y BALANCES DEL MOTOR DE PUNTOS
 *
 * # Mathematical Proof (Balance Conservation):
 * El balance satisface available + used == total en todo instante
 * observable; 'earned' es monótono no-decreciente. Toda mutación viaja
 * en la misma transacción que su CreditTransaction, por lo que la suma
 * de transacciones reconstruye el balance bit-perfecto.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Estados del ciclo de vida de una tarea de crédito.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CreditTaskStatus {
    Pending,
    Scheduled,
    Executing,
    Completed,
    Failed,
    Cancelled,
    Skipped,
}

impl CreditTaskStatus {
    /// Terminales: completed, cancelled y skipped jamás transicionan.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CreditTaskStatus::Completed | CreditTaskStatus::Cancelled | CreditTaskStatus::Skipped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CreditTaskStatus::Pending => "pending",
            CreditTaskStatus::Scheduled => "scheduled",
            CreditTaskStatus::Executing => "executing",
            CreditTaskStatus::Completed => "completed",
            CreditTaskStatus::Failed => "failed",
            CreditTaskStatus::Cancelled => "cancelled",
            CreditTaskStatus::Skipped => "skipped",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(CreditTaskStatus::Pending),
            "scheduled" => Some(CreditTaskStatus::Scheduled),
            "executing" => Some(CreditTaskStatus::Executing),
            "completed" => Some(CreditTaskStatus::Completed),
            "failed" => Some(CreditTaskStatus::Failed),
            "cancelled" => Some(CreditTaskStatus::Cancelled),
            "skipped" => Some(CreditTaskStatus::Skipped),
            _ => None,
        }
    }
}

/// Motivo sellado de una tarea saltada (terminal con razón).
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    RuleDisabled,
    ConstraintViolated,
    DailyLimit,
    WeeklyLimit,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::RuleDisabled => "rule_disabled",
            SkipReason::ConstraintViolated => "constraint_violated",
            SkipReason::DailyLimit => "daily_limit",
            SkipReason::WeeklyLimit => "weekly_limit",
        }
    }
}

/// Restricciones de elegibilidad evaluadas antes de programar.
#[typeshare]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleConstraints {
    /// Nivel jerárquico mínimo exigido al actor (0 = sin piso).
    pub min_role_level: u8,
    /// Roles explícitamente excluidos (forma snake_case persistida).
    pub excluded_roles: Vec<String>,
    /// Ventana horaria permitida [start, end) en hora UTC (0-23).
    pub allowed_hour_start: Option<u8>,
    pub allowed_hour_end: Option<u8>,
}

/// Regla soberana de acreditación por tipo de tarea.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditRule {
    pub task_type: String,
    pub base_points: i64,
    /// 0 significa ilimitado en ambas ventanas.
    pub daily_cap: u32,
    pub weekly_cap: u32,
    /// true: pending → scheduled sin intervención manual.
    pub auto_execute: bool,
    pub enabled: bool,
    pub constraints: RuleConstraints,
}

/// Intención persistida de acreditar puntos a un usuario.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTask {
    pub id: String,
    pub user_id: String,
    pub task_type: String,
    pub points: i64,
    pub status: CreditTaskStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Clave de idempotencia junto a (user_id, task_type).
    pub reference_id: String,
    pub skip_reason: Option<SkipReason>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Balance de créditos por usuario.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCredit {
    pub user_id: String,
    pub total: i64,
    pub available: i64,
    pub used: i64,
    /// Acumulado vitalicio; jamás decrece.
    pub earned: i64,
    pub level: u32,
}

impl UserCredit {
    /// Nivel derivado del acumulado vitalicio: floor(earned/100) + 1.
    pub fn derive_level(earned_points: i64) -> u32 {
        (earned_points.max(0) as u64 / 100) as u32 + 1
    }
}

/// Asiento contable inmutable de cada mutación de balance.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: String,
    pub user_id: String,
    /// Positivo acredita, negativo debita.
    pub delta_points: i64,
    pub task_type: String,
    /// Referencia a la CreditTask que originó el asiento.
    pub credit_task_id: String,
    pub recorded_at: DateTime<Utc>,
}
