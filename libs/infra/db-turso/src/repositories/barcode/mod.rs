// [libs/infra/db-turso/src/repositories/barcode/mod.rs]
/*!
 * =================================================================
 * APARATO: BARCODE REPOSITORY (V8.0 - JOURNAL SOVEREIGN)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: EJECUCIÓN TRANSACCIONAL DE LA MÁQUINA DE ESTADOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ONE-TRANSACTION RULE: Cada mutación ejecuta en UNA transacción:
 *    guardia de fila, nuevo estado, ScanEvent, proyección de carta,
 *    propagación de tarea y evento de Outbox. Un fallo aborta todo.
 * 2. MINUTE-BUCKET IDEMPOTENCY: La réplica de un escaneo devuelve el
 *    evento previo sin mutar (clave de deduplicación UNIQUE).
 * 3. RACE EXCLUSIVITY: bind vs. expire se resuelve por guardia de
 *    estado: exactamente una transición gana, jamás ambas.
 * =================================================================
 */

pub mod queries;

use crate::errors::DbError;
use crate::repositories::opt_text;
use crate::repositories::outbox::{append_within, parse_timestamp};
use crate::TursoClient;
use chrono::{DateTime, Duration, Utc};
use estafeta_domain_lettering::{
    bind_verdict, cancel_verdict, scan_dedup_key, scan_verdict, UNACTIVATED_TTL_HOURS,
};
use estafeta_domain_models::barcode::{Barcode, BarcodeStatus, ScanEvent, ScanType};
use estafeta_domain_models::courier::TaskStatus;
use estafeta_domain_models::identity::{ActorContext, Permission};
use estafeta_domain_models::opcode::OpCode;
use estafeta_domain_models::outbox::OutboxTopic;
use libsql::{params, Connection, Row};
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use self::queries as sql_registry;

/// Resultado de un escaneo: evento cristalizado y efectos propagados.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub event: ScanEvent,
    /// true cuando la cubeta de minuto colapsó la réplica (no-op).
    pub deduplicated: bool,
    pub barcode_status: BarcodeStatus,
    /// Propagación a la tarea de cartero vinculada, si existía.
    pub task_transition: Option<TaskTransition>,
}

#[derive(Debug, Clone)]
pub struct TaskTransition {
    pub task_id: String,
    pub courier_id: Option<String>,
    pub new_status: TaskStatus,
}

/// Repositorio de autoridad única del ciclo de vida del token postal.
pub struct BarcodeRepository {
    database_client: TursoClient,
}

impl BarcodeRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /**
     * Cristaliza un token sin activar con su TTL de vinculación.
     * El código opaco llega de los colaboradores; el ciclo de vida es nuestro.
     */
    #[instrument(skip(self))]
    pub async fn create(&self, code: &str, ttl_hours: Option<i64>) -> Result<Barcode, DbError> {
        let connection = self.database_client.get_connection()?;

        let barcode_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expiry_boundary = now + Duration::hours(ttl_hours.unwrap_or(UNACTIVATED_TTL_HOURS));

        connection
            .execute(
                sql_registry::INITIALIZE_BARCODE,
                params![
                    barcode_id.clone(),
                    code,
                    expiry_boundary.to_rfc3339(),
                    now.to_rfc3339()
                ],
            )
            .await?;

        self.find(&barcode_id).await
    }

    /// Lectura nominal de la fila del token.
    pub async fn find(&self, barcode_id: &str) -> Result<Barcode, DbError> {
        let connection = self.database_client.get_connection()?;

        let mut rows = connection
            .query(sql_registry::FIND_BARCODE, params![barcode_id])
            .await?;

        match rows.next().await? {
            Some(row) => map_barcode_row(&row),
            None => Err(DbError::NotFound(format!("BARCODE:{}", barcode_id))),
        }
    }

    /**
     * OPERACIÓN BIND: unactivated → bound en una transacción.
     *
     * Re-verificaciones del núcleo: permiso 'scan_code', sintaxis del
     * OP Code destino (ya sellada en el tipo) y autoridad de prefijo
     * del actor sobre el destino.
     *
     * # Errors:
     * - `DbError::PermissionDenied`: rol sin 'scan_code' o sin autoridad.
     * - `DbError::InvalidTransition`: estado distinto de 'unactivated'.
     * - `DbError::Conflict`: la guardia perdió contra el barrido de expiración.
     */
    #[instrument(skip(self, actor))]
    pub async fn bind(
        &self,
        barcode_id: &str,
        letter_id: &str,
        envelope_id: &str,
        recipient: &OpCode,
        actor: &ActorContext,
    ) -> Result<ScanEvent, DbError> {
        actor.require(Permission::ScanCode)?;
        if !actor.has_authority_over(recipient) {
            return Err(DbError::PermissionDenied(format!(
                "PREFIX_AUTHORITY_VOID: actor cannot bind into {}",
                recipient
            )));
        }

        let connection = self.database_client.get_connection()?;
        let transaction = connection
            .transaction()
            .await
            .map_err(|_| DbError::TransactionError)?;

        // 1. GUARDIA DE ESTADO
        let current = fetch_status(&transaction, barcode_id).await?;
        bind_verdict(current)?;

        let now = Utc::now();

        // 2. MUTACIÓN CON GUARDIA DE FILA
        let affected = transaction
            .execute(
                sql_registry::GUARDED_BIND_UPDATE,
                params![
                    barcode_id,
                    letter_id,
                    envelope_id,
                    recipient.as_str(),
                    actor.user_id.clone(),
                    now.to_rfc3339()
                ],
            )
            .await?;

        if affected == 0 {
            // El barrido de expiración ganó la carrera.
            return Err(DbError::Conflict(format!(
                "BIND_GUARD_LOST: barcode {} mutated concurrently",
                barcode_id
            )));
        }

        // 3. DIARIO INMUTABLE
        let event = forge_event(
            barcode_id,
            &actor.user_id,
            ScanType::Bind,
            Some(recipient.as_str().to_string()),
            BarcodeStatus::Unactivated,
            BarcodeStatus::Bound,
            now,
            json!({ "letter_id": letter_id, "envelope_id": envelope_id }),
        );
        insert_event(&transaction, &event).await?;

        // 4. PROYECCIÓN DE LA CARTA
        let mut letter_flag_rows = transaction
            .query(sql_registry::FIND_LETTER_FLAGS, params![letter_id])
            .await?;
        let is_urgent = match letter_flag_rows.next().await? {
            Some(row) => row.get::<i64>(1)? != 0,
            None => return Err(DbError::NotFound(format!("LETTER:{}", letter_id))),
        };

        transaction
            .execute(
                sql_registry::UPDATE_LETTER_PROJECTION,
                params![letter_id, BarcodeStatus::Bound.as_str(), barcode_id],
            )
            .await?;

        // 5. SELLADO DEL OUTBOX (misma transacción)
        append_within(
            &transaction,
            OutboxTopic::LetterStatusUpdate,
            &json!({
                "barcode_id": barcode_id,
                "letter_id": letter_id,
                "old_status": BarcodeStatus::Unactivated.as_str(),
                "new_status": BarcodeStatus::Bound.as_str(),
                "recipient_op_code": recipient.as_str(),
                "is_urgent": is_urgent,
                "actor_id": actor.user_id,
                "scan_event_id": event.id,
            }),
        )
        .await?;

        transaction.commit().await.map_err(|_| DbError::TransactionError)?;

        info!("📮 [BIND_SEALED]: Barcode [{}] bound toward [{}].", barcode_id, recipient);
        Ok(event)
    }

    /**
     * OPERACIÓN SCAN: pickup/transit/delivery con idempotencia por
     * cubeta de minuto y propagación a la tarea vinculada.
     */
    #[instrument(skip(self, actor, metadata))]
    pub async fn scan(
        &self,
        barcode_id: &str,
        actor: &ActorContext,
        scan_type: ScanType,
        location: Option<String>,
        metadata: serde_json::Value,
    ) -> Result<ScanOutcome, DbError> {
        actor.require(Permission::ScanCode)?;

        let now = Utc::now();
        let dedup_key = scan_dedup_key(barcode_id, &actor.user_id, scan_type, now);

        let connection = self.database_client.get_connection()?;
        let transaction = connection
            .transaction()
            .await
            .map_err(|_| DbError::TransactionError)?;

        // 1. DEDUPLICACIÓN: la réplica devuelve el evento previo sin mutar.
        let mut prior_rows = transaction
            .query(sql_registry::FIND_EVENT_BY_DEDUP, params![dedup_key.clone()])
            .await?;
        if let Some(prior_row) = prior_rows.next().await? {
            let prior_event = map_event_row(&prior_row)?;
            debug!("♻️  [SCAN_DEDUP]: Minute-bucket replay on [{}] collapsed.", barcode_id);
            let status = prior_event.new_status;
            return Ok(ScanOutcome {
                event: prior_event,
                deduplicated: true,
                barcode_status: status,
                task_transition: None,
            });
        }

        // 2. GUARDIA DE ESTADO Y AUTORIDAD
        let barcode = fetch_barcode(&transaction, barcode_id).await?;
        let recipient = barcode
            .recipient_op_code
            .clone()
            .ok_or_else(|| DbError::InvalidTransition(format!("SCAN_ON_UNBOUND:{}", barcode_id)))?;

        if !actor.has_authority_over(&recipient) {
            return Err(DbError::PermissionDenied(format!(
                "PREFIX_AUTHORITY_VOID: actor cannot scan {}",
                recipient
            )));
        }

        let new_status = scan_verdict(barcode.status, scan_type)?;

        // 3. MUTACIÓN CON GUARDIA DE FILA
        let affected = transaction
            .execute(
                sql_registry::GUARDED_SCAN_UPDATE,
                params![
                    barcode_id,
                    new_status.as_str(),
                    actor.user_id.clone(),
                    barcode.status.as_str()
                ],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::Conflict(format!(
                "SCAN_GUARD_LOST: barcode {} mutated concurrently",
                barcode_id
            )));
        }

        if new_status == BarcodeStatus::Delivered {
            transaction
                .execute(sql_registry::SET_DELIVERED_AT, params![barcode_id, now.to_rfc3339()])
                .await?;
        }

        // 4. DIARIO INMUTABLE
        let event = forge_event(
            barcode_id,
            &actor.user_id,
            scan_type,
            location.clone(),
            barcode.status,
            new_status,
            now,
            metadata,
        );
        insert_event(&transaction, &event).await?;

        // 5. PROYECCIÓN DE LA CARTA
        if let Some(letter_id) = &barcode.letter_id {
            transaction
                .execute(
                    sql_registry::UPDATE_LETTER_PROJECTION,
                    params![letter_id.clone(), new_status.as_str(), barcode_id],
                )
                .await?;
        }

        // 6. PROPAGACIÓN A LA TAREA (solo escaneos mueven su estado)
        let task_transition =
            propagate_to_task(&transaction, barcode_id, scan_type, location.as_deref()).await?;

        // 7. SELLADO DEL OUTBOX
        append_within(
            &transaction,
            OutboxTopic::LetterStatusUpdate,
            &json!({
                "barcode_id": barcode_id,
                "letter_id": barcode.letter_id,
                "old_status": barcode.status.as_str(),
                "new_status": new_status.as_str(),
                "scan_type": scan_type.as_str(),
                "recipient_op_code": recipient.as_str(),
                "actor_id": actor.user_id,
                "scan_event_id": event.id,
            }),
        )
        .await?;

        if let Some(transition) = &task_transition {
            append_within(
                &transaction,
                OutboxTopic::TaskStatusUpdate,
                &json!({
                    "task_id": transition.task_id,
                    "courier_id": transition.courier_id,
                    "barcode_id": barcode_id,
                    "new_status": transition.new_status.as_str(),
                    "location": location,
                }),
            )
            .await?;
        }

        transaction.commit().await.map_err(|_| DbError::TransactionError)?;

        info!(
            "📡 [SCAN_SEALED]: [{}] {} -> {} by [{}].",
            barcode_id,
            barcode.status.as_str(),
            new_status.as_str(),
            actor.user_id
        );

        Ok(ScanOutcome {
            event,
            deduplicated: false,
            barcode_status: new_status,
            task_transition,
        })
    }

    /**
     * OPERACIÓN CANCEL: anulación desde cualquier estado no terminal.
     * Autorizados: admins, carteros con autoridad de prefijo, o el
     * autor de la carta vinculada.
     */
    #[instrument(skip(self, actor))]
    pub async fn cancel(
        &self,
        barcode_id: &str,
        actor: &ActorContext,
        reason: &str,
    ) -> Result<ScanEvent, DbError> {
        let connection = self.database_client.get_connection()?;
        let transaction = connection
            .transaction()
            .await
            .map_err(|_| DbError::TransactionError)?;

        let barcode = fetch_barcode(&transaction, barcode_id).await?;
        cancel_verdict(barcode.status)?;

        // Compuerta de autoridad de anulación.
        let mut authorized = actor.role.is_admin();
        if !authorized {
            if let Some(recipient) = &barcode.recipient_op_code {
                authorized =
                    actor.role.holds(Permission::ScanCode) && actor.has_authority_over(recipient);
            }
        }
        if !authorized {
            if let Some(letter_id) = &barcode.letter_id {
                let mut author_rows = transaction
                    .query(sql_registry::FIND_LETTER_FLAGS, params![letter_id.clone()])
                    .await?;
                if let Some(row) = author_rows.next().await? {
                    let author_id: String = row.get(0)?;
                    authorized = author_id == actor.user_id;
                }
            }
        }
        if !authorized {
            return Err(DbError::PermissionDenied(format!(
                "CANCEL_AUTHORITY_VOID: actor {} on barcode {}",
                actor.user_id, barcode_id
            )));
        }

        let now = Utc::now();
        let affected = transaction
            .execute(
                sql_registry::GUARDED_CANCEL_UPDATE,
                params![
                    barcode_id,
                    actor.user_id.clone(),
                    reason,
                    barcode.status.as_str()
                ],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::Conflict(format!(
                "CANCEL_GUARD_LOST: barcode {} mutated concurrently",
                barcode_id
            )));
        }

        let event = forge_event(
            barcode_id,
            &actor.user_id,
            ScanType::Cancel,
            None,
            barcode.status,
            BarcodeStatus::Cancelled,
            now,
            json!({ "reason": reason }),
        );
        insert_event(&transaction, &event).await?;

        if let Some(letter_id) = &barcode.letter_id {
            transaction
                .execute(
                    sql_registry::UPDATE_LETTER_PROJECTION,
                    params![letter_id.clone(), BarcodeStatus::Cancelled.as_str(), barcode_id],
                )
                .await?;
        }

        // La tarea viva (si existe) se sella como fallida.
        let task_transition =
            propagate_to_task(&transaction, barcode_id, ScanType::Cancel, None).await?;

        append_within(
            &transaction,
            OutboxTopic::LetterStatusUpdate,
            &json!({
                "barcode_id": barcode_id,
                "letter_id": barcode.letter_id,
                "old_status": barcode.status.as_str(),
                "new_status": BarcodeStatus::Cancelled.as_str(),
                "reason": reason,
                "actor_id": actor.user_id,
                "scan_event_id": event.id,
            }),
        )
        .await?;

        if let Some(transition) = &task_transition {
            append_within(
                &transaction,
                OutboxTopic::TaskStatusUpdate,
                &json!({
                    "task_id": transition.task_id,
                    "courier_id": transition.courier_id,
                    "barcode_id": barcode_id,
                    "new_status": transition.new_status.as_str(),
                }),
            )
            .await?;
        }

        transaction.commit().await.map_err(|_| DbError::TransactionError)?;

        warn!("🛑 [CANCEL_SEALED]: Barcode [{}] voided: {}.", barcode_id, reason);
        Ok(event)
    }

    /**
     * BARRIDO DE EXPIRACIÓN: una transición por token, con guardia.
     * Un bind concurrente que ganó deja cero filas y el candidato se
     * descarta en silencio (exclusividad de la carrera).
     */
    #[instrument(skip(self))]
    pub async fn expire_sweep(&self, now: DateTime<Utc>, batch_limit: i64) -> Result<u32, DbError> {
        let connection = self.database_client.get_connection()?;

        let mut candidate_rows = connection
            .query(
                sql_registry::FIND_EXPIRY_CANDIDATES,
                params![now.to_rfc3339(), batch_limit],
            )
            .await?;

        let mut candidate_ids = Vec::new();
        while let Some(row) = candidate_rows.next().await? {
            candidate_ids.push(row.get::<String>(0)?);
        }

        let mut expired_count = 0u32;
        for barcode_id in candidate_ids {
            let transaction = connection
                .transaction()
                .await
                .map_err(|_| DbError::TransactionError)?;

            let affected = transaction
                .execute(sql_registry::GUARDED_EXPIRE_UPDATE, params![barcode_id.clone()])
                .await?;
            if affected == 0 {
                // Un bind concurrente ganó: el candidato ya no caduca.
                continue;
            }

            // El diario registra la transición administrativa como 'cancel'
            // de sistema con el motivo sellado en metadatos.
            let event = forge_event(
                &barcode_id,
                "system.expiry_sweeper",
                ScanType::Cancel,
                None,
                BarcodeStatus::Unactivated,
                BarcodeStatus::Expired,
                now,
                json!({ "reason": "ttl_expired" }),
            );
            insert_event(&transaction, &event).await?;

            append_within(
                &transaction,
                OutboxTopic::LetterStatusUpdate,
                &json!({
                    "barcode_id": barcode_id,
                    "old_status": BarcodeStatus::Unactivated.as_str(),
                    "new_status": BarcodeStatus::Expired.as_str(),
                    "reason": "ttl_expired",
                    "scan_event_id": event.id,
                }),
            )
            .await?;

            transaction.commit().await.map_err(|_| DbError::TransactionError)?;
            expired_count += 1;
        }

        if expired_count > 0 {
            info!("⏳ [EXPIRY_SWEEP]: {} unbound barcodes sealed as expired.", expired_count);
        }
        Ok(expired_count)
    }

    /// Rastro completo del token (fuente de verdad de la entrega).
    pub async fn get_trace(&self, barcode_id: &str) -> Result<Vec<ScanEvent>, DbError> {
        let connection = self.database_client.get_connection()?;

        let mut trace_rows = connection
            .query(sql_registry::FETCH_TRACE, params![barcode_id])
            .await?;

        let mut trace = Vec::new();
        while let Some(row) = trace_rows.next().await? {
            trace.push(map_event_row(&row)?);
        }
        Ok(trace)
    }
}

// --- FÍSICA INTERNA DE FILAS ---

async fn fetch_status(
    transaction: &Connection,
    barcode_id: &str,
) -> Result<BarcodeStatus, DbError> {
    Ok(fetch_barcode(transaction, barcode_id).await?.status)
}

async fn fetch_barcode(transaction: &Connection, barcode_id: &str) -> Result<Barcode, DbError> {
    let mut rows = transaction
        .query(sql_registry::FIND_BARCODE, params![barcode_id])
        .await?;
    match rows.next().await? {
        Some(row) => map_barcode_row(&row),
        None => Err(DbError::NotFound(format!("BARCODE:{}", barcode_id))),
    }
}

/// Propaga el escaneo a la tarea viva del token (misma transacción).
async fn propagate_to_task(
    transaction: &Connection,
    barcode_id: &str,
    scan_type: ScanType,
    location: Option<&str>,
) -> Result<Option<TaskTransition>, DbError> {
    let target_task_status = match scan_type {
        ScanType::Pickup => TaskStatus::Collected,
        ScanType::Transit => TaskStatus::InTransit,
        ScanType::Delivery => TaskStatus::Delivered,
        ScanType::Cancel => TaskStatus::Failed,
        ScanType::Bind => return Ok(None),
    };

    let mut task_rows = transaction
        .query(sql_registry::FIND_TASK_FOR_BARCODE, params![barcode_id])
        .await?;

    let Some(task_row) = task_rows.next().await? else {
        return Ok(None);
    };

    let task_id: String = task_row.get(0)?;
    let courier_id: Option<String> = task_row.get(1)?;
    let current_task_status: String = task_row.get(2)?;

    let affected = transaction
        .execute(
            sql_registry::GUARDED_TASK_UPDATE,
            params![
                task_id.clone(),
                target_task_status.as_str(),
                opt_text(location.map(|l| l.to_string())),
                current_task_status
            ],
        )
        .await?;
    if affected == 0 {
        return Ok(None);
    }

    // El cierre de la tarea ajusta la carga y métricas del cartero.
    if let Some(courier) = &courier_id {
        match target_task_status {
            TaskStatus::Delivered => {
                transaction
                    .execute(sql_registry::COURIER_DELIVERY_STATS, params![courier.clone()])
                    .await?;
            }
            TaskStatus::Failed => {
                transaction
                    .execute(sql_registry::COURIER_FAILURE_STATS, params![courier.clone()])
                    .await?;
            }
            _ => {}
        }
    }

    Ok(Some(TaskTransition {
        task_id,
        courier_id,
        new_status: target_task_status,
    }))
}

#[allow(clippy::too_many_arguments)]
fn forge_event(
    barcode_id: &str,
    scanner_id: &str,
    scan_type: ScanType,
    location: Option<String>,
    old_status: BarcodeStatus,
    new_status: BarcodeStatus,
    scanned_at: DateTime<Utc>,
    metadata: serde_json::Value,
) -> ScanEvent {
    ScanEvent {
        id: Uuid::new_v4().to_string(),
        barcode_id: barcode_id.to_string(),
        scanner_id: scanner_id.to_string(),
        scan_type,
        location,
        old_status,
        new_status,
        scanned_at,
        metadata,
        dedup_key: scan_dedup_key(barcode_id, scanner_id, scan_type, scanned_at),
    }
}

async fn insert_event(transaction: &Connection, event: &ScanEvent) -> Result<(), DbError> {
    transaction
        .execute(
            sql_registry::INSERT_SCAN_EVENT,
            params![
                event.id.clone(),
                event.barcode_id.clone(),
                event.scanner_id.clone(),
                event.scan_type.as_str(),
                opt_text(event.location.clone()),
                event.old_status.as_str(),
                event.new_status.as_str(),
                event.scanned_at.to_rfc3339(),
                event.metadata.to_string(),
                event.dedup_key.clone()
            ],
        )
        .await?;
    Ok(())
}

fn map_barcode_row(row: &Row) -> Result<Barcode, DbError> {
    let raw_status: String = row.get(2)?;
    let status = BarcodeStatus::parse(&raw_status)
        .ok_or_else(|| DbError::MappingError(format!("BARCODE_STATUS_DRIFT: {}", raw_status)))?;

    let raw_recipient: Option<String> = row.get(5)?;
    let recipient_op_code = match raw_recipient {
        Some(raw) => Some(OpCode::parse(&raw).map_err(DbError::from)?),
        None => None,
    };

    Ok(Barcode {
        id: row.get(0)?,
        code: row.get(1)?,
        status,
        letter_id: row.get(3)?,
        envelope_id: row.get(4)?,
        recipient_op_code,
        last_scanner_id: row.get(6)?,
        scan_count: row.get::<i64>(7)? as u32,
        bound_at: optional_timestamp(row.get::<Option<String>>(8)?)?,
        delivered_at: optional_timestamp(row.get::<Option<String>>(9)?)?,
        expires_at: optional_timestamp(row.get::<Option<String>>(10)?)?,
        created_at: parse_timestamp(&row.get::<String>(11)?)?,
    })
}

fn map_event_row(row: &Row) -> Result<ScanEvent, DbError> {
    let raw_scan_type: String = row.get(3)?;
    let scan_type = ScanType::parse(&raw_scan_type)
        .ok_or_else(|| DbError::MappingError(format!("SCAN_TYPE_DRIFT: {}", raw_scan_type)))?;

    let raw_old: String = row.get(5)?;
    let raw_new: String = row.get(6)?;
    let raw_metadata: String = row.get(8)?;

    Ok(ScanEvent {
        id: row.get(0)?,
        barcode_id: row.get(1)?,
        scanner_id: row.get(2)?,
        scan_type,
        location: row.get(4)?,
        old_status: BarcodeStatus::parse(&raw_old)
            .ok_or_else(|| DbError::MappingError(format!("STATUS_DRIFT: {}", raw_old)))?,
        new_status: BarcodeStatus::parse(&raw_new)
            .ok_or_else(|| DbError::MappingError(format!("STATUS_DRIFT: {}", raw_new)))?,
        scanned_at: parse_timestamp(&row.get::<String>(7)?)?,
        metadata: serde_json::from_str(&raw_metadata)
            .map_err(|e| DbError::MappingError(format!("EVENT_METADATA_DRIFT: {}", e)))?,
        dedup_key: row.get(9)?,
    })
}

fn optional_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>, DbError> {
    raw.map(|value| parse_timestamp(&value)).transpose()
}
