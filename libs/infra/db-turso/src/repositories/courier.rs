// [libs/infra/db-turso/src/repositories/courier.rs]
/*!
 * =================================================================
 * APARATO: COURIER REPOSITORY (V7.0 - DISPATCH AUTHORITY)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: ÁRBOL DEL CUERPO, CANDIDATOS Y TAREAS DE RELEVO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. RANKING PARITY: El ORDER BY de candidatos re-enuncia el orden del
 *    comparador de dominio; la paridad está certificada en el Proving
 *    Grounds (prefijo DESC, carga ASC, tasa DESC, antigüedad ASC).
 * 2. ORPHAN PIPELINE: Las tareas sin cartero quedan en 'pending' con
 *    asignación nula y re-entran cada 60s hasta la escalada de 24h.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::opt_text;
use crate::repositories::outbox::{append_within, parse_timestamp};
use crate::TursoClient;
use chrono::{DateTime, Utc};
use estafeta_domain_courier::{can_approve_level, can_manage_level, validate_tree_edge};
use estafeta_domain_models::courier::{
    Courier, CourierStatus, CourierTask, TaskPriority, TaskStatus,
};
use estafeta_domain_models::identity::{ActorContext, Permission};
use estafeta_domain_models::opcode::{validate_managed_prefix, OpCode};
use estafeta_domain_models::outbox::OutboxTopic;
use libsql::{params, Row};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Candidatos elegibles en el orden sellado del despacho.
const FETCH_RANKED_CANDIDATES: &str = r#"
    SELECT id, user_id, level, managed_prefix, parent_courier_id, status,
           current_task_count, max_daily_tasks, success_rate, approved_at, created_at
    FROM couriers
    WHERE status = 'approved'
      AND current_task_count < max_daily_tasks
      AND ?1 LIKE managed_prefix || '%'
    ORDER BY length(managed_prefix) DESC,
             current_task_count ASC,
             success_rate DESC,
             approved_at ASC
"#;

const FIND_COURIER: &str = r#"
    SELECT id, user_id, level, managed_prefix, parent_courier_id, status,
           current_task_count, max_daily_tasks, success_rate, approved_at, created_at
    FROM couriers WHERE id = ?1
"#;

const FIND_COURIER_BY_USER: &str = r#"
    SELECT id, user_id, level, managed_prefix, parent_courier_id, status,
           current_task_count, max_daily_tasks, success_rate, approved_at, created_at
    FROM couriers WHERE user_id = ?1
"#;

const INITIALIZE_COURIER: &str = r#"
    INSERT INTO couriers
        (id, user_id, level, managed_prefix, parent_courier_id, status,
         current_task_count, max_daily_tasks, success_rate, approved_at, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, 1.0, ?8, ?9)
"#;

const INITIALIZE_TASK: &str = r#"
    INSERT INTO courier_tasks
        (id, assigned_courier_id, barcode_id, letter_id, pickup_op_code,
         delivery_op_code, current_op_code, priority, status, deadline,
         reward_points, created_at, escalation_prefix)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, 'pending', ?8, ?9, ?10, ?11)
"#;

/// Reserva de carga del cartero al asignar (misma transacción).
const INCREMENT_COURIER_LOAD: &str = r#"
    UPDATE couriers SET current_task_count = current_task_count + 1 WHERE id = ?1
"#;

/// Tareas huérfanas elegibles para el bucle de reintento.
const FETCH_UNASSIGNED_TASKS: &str = r#"
    SELECT id, assigned_courier_id, barcode_id, letter_id, pickup_op_code,
           delivery_op_code, current_op_code, priority, status, deadline,
           reward_points, created_at, escalation_prefix, escalated_at
    FROM courier_tasks
    WHERE status = 'pending' AND assigned_courier_id IS NULL
    ORDER BY created_at ASC
    LIMIT ?1
"#;

/// Asignación con guardia: solo tareas aún huérfanas y pendientes.
const GUARDED_ASSIGN_TASK: &str = r#"
    UPDATE courier_tasks
    SET assigned_courier_id = ?2
    WHERE id = ?1 AND status = 'pending' AND assigned_courier_id IS NULL
"#;

/// Escalada: acorta el prefijo vigente y sella la marca temporal.
const GUARDED_ESCALATE_TASK: &str = r#"
    UPDATE courier_tasks
    SET escalation_prefix = ?2, escalated_at = ?3
    WHERE id = ?1 AND status = 'pending' AND assigned_courier_id IS NULL
"#;

const FIND_TASK: &str = r#"
    SELECT id, assigned_courier_id, barcode_id, letter_id, pickup_op_code,
           delivery_op_code, current_op_code, priority, status, deadline,
           reward_points, created_at, escalation_prefix, escalated_at
    FROM courier_tasks WHERE id = ?1
"#;

/// Tarea viva de un barcode (ancla de idempotencia del despacho).
const FIND_ACTIVE_TASK_FOR_BARCODE: &str = r#"
    SELECT id, assigned_courier_id, barcode_id, letter_id, pickup_op_code,
           delivery_op_code, current_op_code, priority, status, deadline,
           reward_points, created_at, escalation_prefix, escalated_at
    FROM courier_tasks
    WHERE barcode_id = ?1 AND status NOT IN ('delivered', 'failed')
    LIMIT 1
"#;

pub struct CourierRepository {
    database_client: TursoClient,
}

impl CourierRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /**
     * Registra un cartero validando los invariantes del árbol
     * (nivel padre-hijo y retículo de prefijos) antes de cristalizar.
     */
    #[instrument(skip(self, courier))]
    pub async fn register(&self, courier: &Courier) -> Result<(), DbError> {
        validate_managed_prefix(&courier.managed_prefix)?;

        let parent = match &courier.parent_courier_id {
            Some(parent_id) => Some(self.find(parent_id).await?),
            None => None,
        };
        validate_tree_edge(courier, parent.as_ref())?;

        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                INITIALIZE_COURIER,
                params![
                    courier.id.clone(),
                    courier.user_id.clone(),
                    courier.level as i64,
                    courier.managed_prefix.clone(),
                    opt_text(courier.parent_courier_id.clone()),
                    courier.status.as_str(),
                    courier.max_daily_tasks as i64,
                    opt_text(courier.approved_at.map(|at| at.to_rfc3339())),
                    courier.created_at.to_rfc3339()
                ],
            )
            .await?;

        info!(
            "🪪 [CORPS_REGISTER]: Courier [{}] level {} prefix '{}' sealed.",
            courier.id, courier.level, courier.managed_prefix
        );
        Ok(())
    }

    /**
     * GOBERNANZA: un cartero de nivel N crea únicamente nivel N-1
     * (admins sin restricción). El núcleo re-verifica permiso y
     * escalón antes de delegar en el registro estructural.
     */
    #[instrument(skip(self, actor, courier))]
    pub async fn register_via_actor(
        &self,
        actor: &ActorContext,
        courier: &Courier,
    ) -> Result<(), DbError> {
        actor.require(Permission::ManageCouriers)?;
        if !can_manage_level(actor.role, courier.level) {
            return Err(DbError::PermissionDenied(format!(
                "LEVEL_STEP_DENIED: {} cannot create level {}",
                actor.role.as_str(),
                courier.level
            )));
        }
        self.register(courier).await
    }

    /**
     * GOBERNANZA: la aprobación de una solicitud de nivel N exige un
     * actor de nivel >= N. Sella 'approved' con la marca temporal.
     */
    #[instrument(skip(self, actor))]
    pub async fn approve_application(
        &self,
        actor: &ActorContext,
        courier_id: &str,
    ) -> Result<Courier, DbError> {
        actor.require(Permission::ApproveApplications)?;

        let applicant = self.find(courier_id).await?;
        if applicant.status != CourierStatus::Pending {
            return Err(DbError::InvalidTransition(format!(
                "APPROVE_REQUIRES_pending_GOT_{}",
                applicant.status.as_str()
            )));
        }
        if !can_approve_level(actor.role, applicant.level) {
            return Err(DbError::PermissionDenied(format!(
                "APPROVAL_LEVEL_DENIED: {} over level {}",
                actor.role.as_str(),
                applicant.level
            )));
        }

        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE couriers SET status = 'approved', approved_at = ?2
                 WHERE id = ?1 AND status = 'pending'",
                params![courier_id, Utc::now().to_rfc3339()],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::Conflict(format!("APPROVE_GUARD_LOST:{}", courier_id)));
        }

        info!("✅ [CORPS_APPROVED]: Courier [{}] joined the active roster.", courier_id);
        self.find(courier_id).await
    }

    pub async fn find(&self, courier_id: &str) -> Result<Courier, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection.query(FIND_COURIER, params![courier_id]).await?;
        match rows.next().await? {
            Some(row) => map_courier_row(&row),
            None => Err(DbError::NotFound(format!("COURIER:{}", courier_id))),
        }
    }

    pub async fn find_by_user(&self, user_id: &str) -> Result<Option<Courier>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection.query(FIND_COURIER_BY_USER, params![user_id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_courier_row(&row)?)),
            None => Ok(None),
        }
    }

    /**
     * Candidatos elegibles para un destino, ya ordenados por el
     * ranking sellado del despacho.
     */
    #[instrument(skip(self))]
    pub async fn fetch_ranked_candidates(&self, target: &OpCode) -> Result<Vec<Courier>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(FETCH_RANKED_CANDIDATES, params![target.as_str()])
            .await?;

        let mut candidates = Vec::new();
        while let Some(row) = rows.next().await? {
            candidates.push(map_courier_row(&row)?);
        }
        Ok(candidates)
    }

    /**
     * Cristaliza la tarea de relevo de un barcode recién vinculado.
     * Con cartero: reserva su carga y sella el evento de asignación;
     * huérfana: queda en 'pending' para el bucle de reintento.
     */
    #[instrument(skip(self))]
    pub async fn create_task(
        &self,
        barcode_id: &str,
        letter_id: Option<&str>,
        pickup_op_code: Option<&str>,
        delivery_op_code: &OpCode,
        priority: TaskPriority,
        reward_points: i64,
        deadline: Option<DateTime<Utc>>,
        assigned_courier: Option<&Courier>,
    ) -> Result<CourierTask, DbError> {
        let connection = self.database_client.get_connection()?;
        let transaction = connection
            .transaction()
            .await
            .map_err(|_| DbError::TransactionError)?;

        let task_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        transaction
            .execute(
                INITIALIZE_TASK,
                params![
                    task_id.clone(),
                    opt_text(assigned_courier.map(|courier| courier.id.clone())),
                    barcode_id,
                    opt_text(letter_id.map(|l| l.to_string())),
                    opt_text(pickup_op_code.map(|p| p.to_string())),
                    delivery_op_code.as_str(),
                    priority.as_str(),
                    opt_text(deadline.map(|at| at.to_rfc3339())),
                    reward_points,
                    now.to_rfc3339(),
                    delivery_op_code.as_str()
                ],
            )
            .await?;

        if let Some(courier) = assigned_courier {
            transaction
                .execute(INCREMENT_COURIER_LOAD, params![courier.id.clone()])
                .await?;

            append_within(
                &transaction,
                OutboxTopic::NewTaskAssignment,
                &json!({
                    "task_id": task_id,
                    "courier_id": courier.id,
                    "courier_user_id": courier.user_id,
                    "barcode_id": barcode_id,
                    "delivery_op_code": delivery_op_code.as_str(),
                    "priority": priority.as_str(),
                    "reward_points": reward_points,
                }),
            )
            .await?;
        }

        transaction.commit().await.map_err(|_| DbError::TransactionError)?;

        match assigned_courier {
            Some(courier) => info!(
                "🚴 [DISPATCH]: Task [{}] assigned to courier [{}] (prefix '{}').",
                task_id, courier.id, courier.managed_prefix
            ),
            None => warn!(
                "🕳️  [DISPATCH_ORPHAN]: No eligible courier for [{}]; task [{}] queued.",
                delivery_op_code, task_id
            ),
        }

        self.find_task(&task_id).await
    }

    pub async fn find_task(&self, task_id: &str) -> Result<CourierTask, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection.query(FIND_TASK, params![task_id]).await?;
        match rows.next().await? {
            Some(row) => map_task_row(&row),
            None => Err(DbError::NotFound(format!("COURIER_TASK:{}", task_id))),
        }
    }

    /**
     * Tarea viva de un barcode; ancla de idempotencia del despachador
     * ante la re-entrega at-least-once de eventos del Outbox.
     */
    pub async fn find_active_task_for_barcode(
        &self,
        barcode_id: &str,
    ) -> Result<Option<CourierTask>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(FIND_ACTIVE_TASK_FOR_BARCODE, params![barcode_id])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_task_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Tareas huérfanas para el bucle de reintento del despachador.
    pub async fn fetch_unassigned_tasks(&self, limit: i64) -> Result<Vec<CourierTask>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection.query(FETCH_UNASSIGNED_TASKS, params![limit]).await?;

        let mut orphan_tasks = Vec::new();
        while let Some(row) = rows.next().await? {
            orphan_tasks.push(map_task_row(&row)?);
        }
        Ok(orphan_tasks)
    }

    /**
     * Asignación tardía de una tarea huérfana con guardia y reserva de
     * carga en una transacción.
     */
    #[instrument(skip(self, courier))]
    pub async fn assign_task(&self, task_id: &str, courier: &Courier) -> Result<bool, DbError> {
        let connection = self.database_client.get_connection()?;
        let transaction = connection
            .transaction()
            .await
            .map_err(|_| DbError::TransactionError)?;

        let affected = transaction
            .execute(GUARDED_ASSIGN_TASK, params![task_id, courier.id.clone()])
            .await?;
        if affected == 0 {
            return Ok(false);
        }

        transaction
            .execute(INCREMENT_COURIER_LOAD, params![courier.id.clone()])
            .await?;

        append_within(
            &transaction,
            OutboxTopic::NewTaskAssignment,
            &json!({
                "task_id": task_id,
                "courier_id": courier.id,
                "courier_user_id": courier.user_id,
                "retry_assignment": true,
            }),
        )
        .await?;

        transaction.commit().await.map_err(|_| DbError::TransactionError)?;

        info!("♻️  [DISPATCH_RETRY]: Orphan task [{}] adopted by [{}].", task_id, courier.id);
        Ok(true)
    }

    /**
     * Escalada de una tarea huérfana al prefijo padre (longitud - 1),
     * con notificación sellada en el Outbox para los admins del nivel.
     */
    #[instrument(skip(self))]
    pub async fn escalate_task(
        &self,
        task_id: &str,
        new_escalation_prefix: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let connection = self.database_client.get_connection()?;
        let transaction = connection
            .transaction()
            .await
            .map_err(|_| DbError::TransactionError)?;

        let affected = transaction
            .execute(
                GUARDED_ESCALATE_TASK,
                params![task_id, new_escalation_prefix, now.to_rfc3339()],
            )
            .await?;
        if affected == 0 {
            return Ok(false);
        }

        append_within(
            &transaction,
            OutboxTopic::TaskEscalated,
            &json!({
                "task_id": task_id,
                "escalation_prefix": new_escalation_prefix,
                "escalated_at": now.to_rfc3339(),
            }),
        )
        .await?;

        transaction.commit().await.map_err(|_| DbError::TransactionError)?;

        warn!(
            "📣 [DISPATCH_ESCALATION]: Task [{}] escalated to prefix '{}'.",
            task_id, new_escalation_prefix
        );
        Ok(true)
    }
}

// --- FÍSICA INTERNA DE FILAS ---

fn map_courier_row(row: &Row) -> Result<Courier, DbError> {
    let raw_status: String = row.get(5)?;
    let status = CourierStatus::parse(&raw_status)
        .ok_or_else(|| DbError::MappingError(format!("COURIER_STATUS_DRIFT: {}", raw_status)))?;

    Ok(Courier {
        id: row.get(0)?,
        user_id: row.get(1)?,
        level: row.get::<i64>(2)? as u8,
        managed_prefix: row.get(3)?,
        parent_courier_id: row.get(4)?,
        status,
        current_task_count: row.get::<i64>(6)? as u32,
        max_daily_tasks: row.get::<i64>(7)? as u32,
        success_rate: row.get::<f64>(8)?,
        approved_at: row
            .get::<Option<String>>(9)?
            .map(|raw| parse_timestamp(&raw))
            .transpose()?,
        created_at: parse_timestamp(&row.get::<String>(10)?)?,
    })
}

fn map_task_row(row: &Row) -> Result<CourierTask, DbError> {
    let raw_priority: String = row.get(7)?;
    let raw_status: String = row.get(8)?;

    Ok(CourierTask {
        id: row.get(0)?,
        assigned_courier_id: row.get(1)?,
        barcode_id: row.get(2)?,
        letter_id: row.get(3)?,
        pickup_op_code: row.get(4)?,
        delivery_op_code: row.get(5)?,
        current_op_code: row.get(6)?,
        priority: TaskPriority::parse(&raw_priority)
            .ok_or_else(|| DbError::MappingError(format!("PRIORITY_DRIFT: {}", raw_priority)))?,
        status: TaskStatus::parse(&raw_status)
            .ok_or_else(|| DbError::MappingError(format!("TASK_STATUS_DRIFT: {}", raw_status)))?,
        deadline: row
            .get::<Option<String>>(9)?
            .map(|raw| parse_timestamp(&raw))
            .transpose()?,
        reward_points: row.get(10)?,
        created_at: parse_timestamp(&row.get::<String>(11)?)?,
        escalation_prefix: row.get(12)?,
        escalated_at: row
            .get::<Option<String>>(13)?
            .map(|raw| parse_timestamp(&raw))
            .transpose()?,
    })
}
