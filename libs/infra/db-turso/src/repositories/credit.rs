// [libs/infra/db-turso/src/repositories/credit.rs]
/*!
 * =================================================================
 * APARATO: CREDIT REPOSITORY (V9.0 - BALANCE CONSERVATION)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: COMPUERTAS, EJECUCIÓN ATÓMICA Y ASIENTOS CONTABLES
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. IDEMPOTENT AWARD: (user, task_type, reference) es única; la
 *    réplica de un Award devuelve la tarea existente sin duplicar.
 * 2. ATOMIC EXECUTION: balance + asiento + sellado de tarea viajan en
 *    UNA transacción; el Outbox certifica el cierre.
 * 3. WINDOW CAPS: el conteo de completadas en 24h/7d se evalúa en la
 *    misma transacción que la transición pending → scheduled.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::opt_text;
use crate::repositories::outbox::{append_within, parse_timestamp};
use crate::TursoClient;
use chrono::{DateTime, Duration, Utc};
use estafeta_domain_credits::{cap_gate, rule_gate, GateVerdict};
use estafeta_domain_models::credit::{
    CreditRule, CreditTask, CreditTaskStatus, RuleConstraints, SkipReason, UserCredit,
};
use estafeta_domain_models::identity::UserRole;
use estafeta_domain_models::outbox::OutboxTopic;
use estafeta_domain_models::schedule::retry_backoff;
use libsql::{params, Connection, Row};
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const FIND_RULE: &str = r#"
    SELECT task_type, base_points, daily_cap, weekly_cap, auto_execute, enabled, constraints_json
    FROM credit_rules WHERE task_type = ?1
"#;

const UPSERT_RULE: &str = r#"
    INSERT INTO credit_rules
        (task_type, base_points, daily_cap, weekly_cap, auto_execute, enabled, constraints_json)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
    ON CONFLICT(task_type) DO UPDATE SET
        base_points = excluded.base_points,
        daily_cap = excluded.daily_cap,
        weekly_cap = excluded.weekly_cap,
        auto_execute = excluded.auto_execute,
        enabled = excluded.enabled,
        constraints_json = excluded.constraints_json
"#;

const FIND_TASK_BY_DEDUP: &str = r#"
    SELECT id, user_id, task_type, points, status, attempts, max_attempts,
           scheduled_for, reference_id, skip_reason, metadata_json, created_at, completed_at
    FROM credit_tasks
    WHERE user_id = ?1 AND task_type = ?2 AND reference_id = ?3
"#;

const FIND_TASK: &str = r#"
    SELECT id, user_id, task_type, points, status, attempts, max_attempts,
           scheduled_for, reference_id, skip_reason, metadata_json, created_at, completed_at
    FROM credit_tasks WHERE id = ?1
"#;

const INITIALIZE_TASK: &str = r#"
    INSERT INTO credit_tasks
        (id, user_id, task_type, points, status, attempts, max_attempts,
         scheduled_for, reference_id, skip_reason, metadata_json, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?9, ?10, ?11)
"#;

/// Conteo de tareas computables del mismo (usuario, tipo) en una
/// ventana. Cuenta completadas Y vivas (pending/scheduled/executing):
/// así una ráfaga de Awards previa a la ejecución no desborda el tope
/// (propiedad: completadas en 24h <= daily_cap).
const COUNT_COUNTABLE_IN_WINDOW: &str = r#"
    SELECT COUNT(*) FROM credit_tasks
    WHERE user_id = ?1 AND task_type = ?2
      AND status NOT IN ('skipped', 'cancelled', 'failed')
      AND datetime(COALESCE(completed_at, created_at)) >= datetime(?3)
"#;

/// Tareas listas para el worker: programadas o en reintento vencido.
const FETCH_DUE_TASKS: &str = r#"
    SELECT id FROM credit_tasks
    WHERE (status = 'scheduled' OR (status = 'failed' AND attempts < max_attempts))
      AND datetime(scheduled_for) <= datetime(?1)
    ORDER BY scheduled_for ASC
    LIMIT ?2
"#;

/// Transición a 'executing' con guardia del grafo (scheduled|failed).
const GUARDED_BEGIN_EXECUTION: &str = r#"
    UPDATE credit_tasks
    SET status = 'executing'
    WHERE id = ?1 AND status IN ('scheduled', 'failed') AND attempts < max_attempts
"#;

const GUARDED_COMPLETE_TASK: &str = r#"
    UPDATE credit_tasks
    SET status = 'completed', completed_at = ?2
    WHERE id = ?1 AND status = 'executing'
"#;

const GUARDED_FAIL_TASK: &str = r#"
    UPDATE credit_tasks
    SET status = 'failed', attempts = attempts + 1, scheduled_for = ?2, failure_reason = ?3
    WHERE id = ?1 AND status = 'executing'
"#;

const GUARDED_CANCEL_TASK: &str = r#"
    UPDATE credit_tasks SET status = 'cancelled' WHERE id = ?1 AND status = 'pending'
"#;

/// Acreditación del balance con conservación available + used == total.
const UPSERT_BALANCE_CREDIT: &str = r#"
    INSERT INTO user_credits (user_id, total, available, used, earned, level)
    VALUES (?1, ?2, ?2, 0, ?2, ?3)
    ON CONFLICT(user_id) DO UPDATE SET
        total = total + ?2,
        available = available + ?2,
        earned = earned + ?2,
        level = ?3
"#;

const FIND_BALANCE: &str = r#"
    SELECT user_id, total, available, used, earned, level
    FROM user_credits WHERE user_id = ?1
"#;

const INSERT_TRANSACTION: &str = r#"
    INSERT INTO credit_transactions (id, user_id, delta_points, task_type, credit_task_id, recorded_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#;

pub struct CreditRepository {
    database_client: TursoClient,
}

impl CreditRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    pub async fn upsert_rule(&self, rule: &CreditRule) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let constraints_json = serde_json::to_string(&rule.constraints)
            .map_err(|e| DbError::MappingError(format!("CONSTRAINTS_DRIFT: {}", e)))?;

        connection
            .execute(
                UPSERT_RULE,
                params![
                    rule.task_type.clone(),
                    rule.base_points,
                    rule.daily_cap as i64,
                    rule.weekly_cap as i64,
                    rule.auto_execute as i64,
                    rule.enabled as i64,
                    constraints_json
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn find_rule(&self, task_type: &str) -> Result<Option<CreditRule>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection.query(FIND_RULE, params![task_type]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_rule_row(&row)?)),
            None => Ok(None),
        }
    }

    /**
     * OPERACIÓN AWARD: intención idempotente de acreditar puntos.
     *
     * Cascada en UNA transacción: deduplicación → regla → restricciones
     * → topes de ventana → cristalización ('scheduled' si auto_execute,
     * 'pending' en caso contrario; 'skipped' sellado con razón).
     */
    #[instrument(skip(self, metadata))]
    pub async fn award(
        &self,
        user_id: &str,
        task_type: &str,
        reference_id: &str,
        actor_role: UserRole,
        metadata: serde_json::Value,
        max_attempts: u32,
    ) -> Result<CreditTask, DbError> {
        let now = Utc::now();

        let connection = self.database_client.get_connection()?;
        let transaction = connection
            .transaction()
            .await
            .map_err(|_| DbError::TransactionError)?;

        // 1. DEDUPLICACIÓN: la réplica devuelve la tarea existente.
        let mut prior_rows = transaction
            .query(FIND_TASK_BY_DEDUP, params![user_id, task_type, reference_id])
            .await?;
        if let Some(prior_row) = prior_rows.next().await? {
            debug!("♻️  [AWARD_DEDUP]: ({}, {}, {}) collapsed.", user_id, task_type, reference_id);
            return map_task_row(&prior_row);
        }

        // 2. COMPUERTA DE REGLA: ausencia equivale a deshabilitada.
        let rule = match fetch_rule_within(&transaction, task_type).await? {
            Some(rule) => rule,
            None => {
                let skipped = self
                    .seal_task(&transaction, user_id, task_type, reference_id, 0, CreditTaskStatus::Skipped, Some(SkipReason::RuleDisabled), &metadata, max_attempts, now)
                    .await?;
                transaction.commit().await.map_err(|_| DbError::TransactionError)?;
                return Ok(skipped);
            }
        };

        let verdict = rule_gate(&rule, actor_role, now);
        if let GateVerdict::Skip(reason) = verdict {
            let skipped = self
                .seal_task(&transaction, user_id, task_type, reference_id, 0, CreditTaskStatus::Skipped, Some(reason), &metadata, max_attempts, now)
                .await?;
            transaction.commit().await.map_err(|_| DbError::TransactionError)?;
            return Ok(skipped);
        }

        // 3. COMPUERTA DE TOPES: conteo bajo la misma transacción.
        let completed_in_day =
            count_completed_within(&transaction, user_id, task_type, now - Duration::hours(24)).await?;
        let completed_in_week =
            count_completed_within(&transaction, user_id, task_type, now - Duration::days(7)).await?;

        if let GateVerdict::Skip(reason) = cap_gate(&rule, completed_in_day, completed_in_week) {
            let skipped = self
                .seal_task(&transaction, user_id, task_type, reference_id, 0, CreditTaskStatus::Skipped, Some(reason), &metadata, max_attempts, now)
                .await?;
            transaction.commit().await.map_err(|_| DbError::TransactionError)?;
            warn!("🚧 [AWARD_CAPPED]: ({}, {}) skipped: {}.", user_id, task_type, reason.as_str());
            return Ok(skipped);
        }

        // 4. CRISTALIZACIÓN
        let initial_status = if rule.auto_execute {
            CreditTaskStatus::Scheduled
        } else {
            CreditTaskStatus::Pending
        };

        let task = self
            .seal_task(&transaction, user_id, task_type, reference_id, rule.base_points, initial_status, None, &metadata, max_attempts, now)
            .await?;
        transaction.commit().await.map_err(|_| DbError::TransactionError)?;

        info!(
            "🏆 [AWARD_QUEUED]: {} pts of '{}' staged for [{}] as {}.",
            rule.base_points, task_type, user_id, initial_status.as_str()
        );
        Ok(task)
    }

    #[allow(clippy::too_many_arguments)]
    async fn seal_task(
        &self,
        transaction: &Connection,
        user_id: &str,
        task_type: &str,
        reference_id: &str,
        points: i64,
        status: CreditTaskStatus,
        skip_reason: Option<SkipReason>,
        metadata: &serde_json::Value,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<CreditTask, DbError> {
        let task_id = Uuid::new_v4().to_string();

        transaction
            .execute(
                INITIALIZE_TASK,
                params![
                    task_id.clone(),
                    user_id,
                    task_type,
                    points,
                    status.as_str(),
                    max_attempts as i64,
                    now.to_rfc3339(),
                    reference_id,
                    opt_text(skip_reason.map(|reason| reason.as_str().to_string())),
                    metadata.to_string(),
                    now.to_rfc3339()
                ],
            )
            .await?;

        let mut rows = transaction.query(FIND_TASK, params![task_id]).await?;
        match rows.next().await? {
            Some(row) => map_task_row(&row),
            None => Err(DbError::MappingError("SEALED_TASK_VANISHED".into())),
        }
    }

    /// Identificadores de tareas listas para el worker del motor.
    pub async fn fetch_due_task_ids(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<String>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(FETCH_DUE_TASKS, params![now.to_rfc3339(), limit])
            .await?;

        let mut due_ids = Vec::new();
        while let Some(row) = rows.next().await? {
            due_ids.push(row.get::<String>(0)?);
        }
        Ok(due_ids)
    }

    /// Reclamo del worker: scheduled|failed → executing bajo guardia.
    pub async fn begin_execution(&self, task_id: &str) -> Result<bool, DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection.execute(GUARDED_BEGIN_EXECUTION, params![task_id]).await?;
        Ok(affected > 0)
    }

    /**
     * EJECUCIÓN ATÓMICA: en una transacción acredita el balance,
     * cristaliza el asiento contable y sella la tarea como completada.
     */
    #[instrument(skip(self))]
    pub async fn complete_execution(&self, task_id: &str) -> Result<CreditTask, DbError> {
        let connection = self.database_client.get_connection()?;
        let transaction = connection
            .transaction()
            .await
            .map_err(|_| DbError::TransactionError)?;

        let mut task_rows = transaction.query(FIND_TASK, params![task_id]).await?;
        let task = match task_rows.next().await? {
            Some(row) => map_task_row(&row)?,
            None => return Err(DbError::NotFound(format!("CREDIT_TASK:{}", task_id))),
        };

        if task.status != CreditTaskStatus::Executing {
            return Err(DbError::InvalidTransition(format!(
                "COMPLETE_REQUIRES_executing_GOT_{}",
                task.status.as_str()
            )));
        }

        let now = Utc::now();

        // 1. BALANCE: total/available/earned suben juntos; nivel derivado.
        let current_earned = fetch_balance_within(&transaction, &task.user_id)
            .await?
            .map(|balance| balance.earned)
            .unwrap_or(0);
        let next_level = UserCredit::derive_level(current_earned + task.points);

        transaction
            .execute(
                UPSERT_BALANCE_CREDIT,
                params![task.user_id.clone(), task.points, next_level as i64],
            )
            .await?;

        // 2. ASIENTO CONTABLE
        transaction
            .execute(
                INSERT_TRANSACTION,
                params![
                    Uuid::new_v4().to_string(),
                    task.user_id.clone(),
                    task.points,
                    task.task_type.clone(),
                    task_id,
                    now.to_rfc3339()
                ],
            )
            .await?;

        // 3. SELLADO DE LA TAREA
        let affected = transaction
            .execute(GUARDED_COMPLETE_TASK, params![task_id, now.to_rfc3339()])
            .await?;
        if affected == 0 {
            return Err(DbError::Conflict(format!("COMPLETE_GUARD_LOST:{}", task_id)));
        }

        append_within(
            &transaction,
            OutboxTopic::CreditTaskCompleted,
            &json!({
                "credit_task_id": task_id,
                "user_id": task.user_id,
                "task_type": task.task_type,
                "points": task.points,
                "reference_id": task.reference_id,
            }),
        )
        .await?;

        transaction.commit().await.map_err(|_| DbError::TransactionError)?;

        info!("💎 [CREDIT_SEALED]: {} pts crystallized for [{}].", task.points, task.user_id);
        self.find_task(task_id).await
    }

    /**
     * Fallo de ejecución: re-programa con backoff mientras queden
     * intentos; el agotamiento sella 'failed' y certifica en el Outbox.
     */
    #[instrument(skip(self))]
    pub async fn fail_execution(
        &self,
        task_id: &str,
        failure_reason: &str,
        backoff_base_seconds: u64,
    ) -> Result<CreditTask, DbError> {
        let connection = self.database_client.get_connection()?;
        let transaction = connection
            .transaction()
            .await
            .map_err(|_| DbError::TransactionError)?;

        let mut task_rows = transaction.query(FIND_TASK, params![task_id]).await?;
        let task = match task_rows.next().await? {
            Some(row) => map_task_row(&row)?,
            None => return Err(DbError::NotFound(format!("CREDIT_TASK:{}", task_id))),
        };

        let next_attempts = task.attempts + 1;
        let retry_at = Utc::now() + retry_backoff(backoff_base_seconds, next_attempts);

        let affected = transaction
            .execute(
                GUARDED_FAIL_TASK,
                params![task_id, retry_at.to_rfc3339(), failure_reason],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::Conflict(format!("FAIL_GUARD_LOST:{}", task_id)));
        }

        if next_attempts >= task.max_attempts {
            append_within(
                &transaction,
                OutboxTopic::CreditTaskFailed,
                &json!({
                    "credit_task_id": task_id,
                    "user_id": task.user_id,
                    "task_type": task.task_type,
                    "attempts": next_attempts,
                    "reason": failure_reason,
                }),
            )
            .await?;
            warn!("💀 [CREDIT_EXHAUSTED]: Task [{}] failed terminally.", task_id);
        }

        transaction.commit().await.map_err(|_| DbError::TransactionError)?;
        self.find_task(task_id).await
    }

    /// pending → cancelled (no-op sobre cualquier otro estado).
    pub async fn cancel(&self, task_id: &str) -> Result<bool, DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection.execute(GUARDED_CANCEL_TASK, params![task_id]).await?;
        Ok(affected > 0)
    }

    pub async fn find_task(&self, task_id: &str) -> Result<CreditTask, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection.query(FIND_TASK, params![task_id]).await?;
        match rows.next().await? {
            Some(row) => map_task_row(&row),
            None => Err(DbError::NotFound(format!("CREDIT_TASK:{}", task_id))),
        }
    }

    pub async fn fetch_balance(&self, user_id: &str) -> Result<Option<UserCredit>, DbError> {
        let connection = self.database_client.get_connection()?;
        fetch_balance_within(&connection, user_id).await
    }
}

// --- FÍSICA INTERNA DE FILAS ---

async fn fetch_rule_within(
    transaction: &Connection,
    task_type: &str,
) -> Result<Option<CreditRule>, DbError> {
    let mut rows = transaction.query(FIND_RULE, params![task_type]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(map_rule_row(&row)?)),
        None => Ok(None),
    }
}

async fn count_completed_within(
    transaction: &Connection,
    user_id: &str,
    task_type: &str,
    window_start: DateTime<Utc>,
) -> Result<u32, DbError> {
    let mut rows = transaction
        .query(
            COUNT_COUNTABLE_IN_WINDOW,
            params![user_id, task_type, window_start.to_rfc3339()],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(row.get::<i64>(0)? as u32),
        None => Ok(0),
    }
}

async fn fetch_balance_within(
    connection: &Connection,
    user_id: &str,
) -> Result<Option<UserCredit>, DbError> {
    let mut rows = connection.query(FIND_BALANCE, params![user_id]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(UserCredit {
            user_id: row.get(0)?,
            total: row.get(1)?,
            available: row.get(2)?,
            used: row.get(3)?,
            earned: row.get(4)?,
            level: row.get::<i64>(5)? as u32,
        })),
        None => Ok(None),
    }
}

fn map_rule_row(row: &Row) -> Result<CreditRule, DbError> {
    let raw_constraints: String = row.get(6)?;
    let constraints: RuleConstraints = serde_json::from_str(&raw_constraints)
        .map_err(|e| DbError::MappingError(format!("CONSTRAINTS_DRIFT: {}", e)))?;

    Ok(CreditRule {
        task_type: row.get(0)?,
        base_points: row.get(1)?,
        daily_cap: row.get::<i64>(2)? as u32,
        weekly_cap: row.get::<i64>(3)? as u32,
        auto_execute: row.get::<i64>(4)? != 0,
        enabled: row.get::<i64>(5)? != 0,
        constraints,
    })
}

fn map_task_row(row: &Row) -> Result<CreditTask, DbError> {
    let raw_status: String = row.get(4)?;
    let status = CreditTaskStatus::parse(&raw_status)
        .ok_or_else(|| DbError::MappingError(format!("CREDIT_STATUS_DRIFT: {}", raw_status)))?;

    let raw_skip_reason: Option<String> = row.get(9)?;
    let skip_reason = match raw_skip_reason.as_deref() {
        Some("rule_disabled") => Some(SkipReason::RuleDisabled),
        Some("constraint_violated") => Some(SkipReason::ConstraintViolated),
        Some("daily_limit") => Some(SkipReason::DailyLimit),
        Some("weekly_limit") => Some(SkipReason::WeeklyLimit),
        _ => None,
    };

    let raw_metadata: String = row.get(10)?;

    Ok(CreditTask {
        id: row.get(0)?,
        user_id: row.get(1)?,
        task_type: row.get(2)?,
        points: row.get(3)?,
        status,
        attempts: row.get::<i64>(5)? as u32,
        max_attempts: row.get::<i64>(6)? as u32,
        scheduled_for: row
            .get::<Option<String>>(7)?
            .map(|raw| parse_timestamp(&raw))
            .transpose()?,
        reference_id: row.get(8)?,
        skip_reason,
        metadata: serde_json::from_str(&raw_metadata)
            .map_err(|e| DbError::MappingError(format!("TASK_METADATA_DRIFT: {}", e)))?,
        created_at: parse_timestamp(&row.get::<String>(11)?)?,
        completed_at: row
            .get::<Option<String>>(12)?
            .map(|raw| parse_timestamp(&raw))
            .transpose()?,
    })
}
