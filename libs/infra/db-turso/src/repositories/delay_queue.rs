// [libs/infra/db-turso/src/repositories/delay_queue.rs]
/*!
 * =================================================================
 * APARATO: DELAY QUEUE REPOSITORY (V8.0 - LEASE ENFORCED)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: RECLAMO EXCLUSIVO, ARRENDAMIENTOS Y REAPER
 *
 * # Mathematical Proof (Claim Exclusivity):
 * La guardia 'WHERE id = X AND status = pending' dentro de la
 * transacción de reclamo juega el papel de FOR UPDATE SKIP LOCKED
 * sobre SQLite: ante N workers concurrentes exactamente uno observa
 * filas afectadas = 1; el resto re-entra al bucle sin bloquear.
 * attempts <= max_attempts se preserva en reclamo, fallo y Reaper.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::outbox::parse_timestamp;
use crate::TursoClient;
use chrono::{DateTime, Duration, Utc};
use estafeta_domain_models::delay::{DelayRecord, DelayStatus, DelayTaskKind};
use estafeta_domain_models::schedule::retry_backoff;
use libsql::{params, Row};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const INITIALIZE_RECORD: &str = r#"
    INSERT INTO delay_queue
        (id, kind, payload_json, delayed_until, status, attempts, max_attempts, created_at)
    VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?6)
"#;

/// La fila elegible más temprana (solo con intentos restantes).
const FIND_EARLIEST_ELIGIBLE: &str = r#"
    SELECT id, kind, payload_json, delayed_until, status, attempts,
           max_attempts, lease_until, result_json, created_at
    FROM delay_queue
    WHERE status = 'pending'
      AND datetime(delayed_until) <= datetime(?1)
      AND attempts < max_attempts
    ORDER BY delayed_until ASC
    LIMIT 1
"#;

/// Reclamo atómico: pending → processing + arrendamiento.
const GUARDED_CLAIM: &str = r#"
    UPDATE delay_queue
    SET status = 'processing', lease_until = ?2
    WHERE id = ?1 AND status = 'pending'
"#;

const GUARDED_COMPLETE: &str = r#"
    UPDATE delay_queue
    SET status = 'completed', result_json = ?2, lease_until = NULL
    WHERE id = ?1 AND status = 'processing'
"#;

/// Reintento: processing → pending con backoff y contador.
const GUARDED_RESCHEDULE: &str = r#"
    UPDATE delay_queue
    SET status = 'pending', attempts = attempts + 1,
        delayed_until = ?2, lease_until = NULL, result_json = ?3
    WHERE id = ?1 AND status = 'processing'
"#;

/// Agotamiento: processing → failed terminal.
const GUARDED_FAIL: &str = r#"
    UPDATE delay_queue
    SET status = 'failed', attempts = attempts + 1,
        lease_until = NULL, result_json = ?2
    WHERE id = ?1 AND status = 'processing'
"#;

const GUARDED_CANCEL: &str = r#"
    UPDATE delay_queue SET status = 'cancelled' WHERE id = ?1 AND status = 'pending'
"#;

/// Reaper A: arrendamientos vencidos con intentos restantes → pending.
const REAP_TO_PENDING: &str = r#"
    UPDATE delay_queue
    SET status = 'pending', attempts = attempts + 1, lease_until = NULL
    WHERE status = 'processing'
      AND lease_until IS NOT NULL
      AND datetime(lease_until) < datetime(?1)
      AND attempts + 1 < max_attempts
"#;

/// Reaper B: arrendamientos vencidos sin intentos restantes → failed.
const REAP_TO_FAILED: &str = r#"
    UPDATE delay_queue
    SET status = 'failed', attempts = attempts + 1, lease_until = NULL
    WHERE status = 'processing'
      AND lease_until IS NOT NULL
      AND datetime(lease_until) < datetime(?1)
      AND attempts + 1 >= max_attempts
"#;

const FIND_RECORD: &str = r#"
    SELECT id, kind, payload_json, delayed_until, status, attempts,
           max_attempts, lease_until, result_json, created_at
    FROM delay_queue WHERE id = ?1
"#;

pub struct DelayQueueRepository {
    database_client: TursoClient,
}

impl DelayQueueRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /// Persiste una ejecución diferida en 'pending'.
    #[instrument(skip(self, payload))]
    pub async fn enqueue(
        &self,
        kind: DelayTaskKind,
        payload: serde_json::Value,
        delayed_until: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<DelayRecord, DbError> {
        let connection = self.database_client.get_connection()?;
        let record_id = Uuid::new_v4().to_string();

        connection
            .execute(
                INITIALIZE_RECORD,
                params![
                    record_id.clone(),
                    kind.as_str(),
                    payload.to_string(),
                    delayed_until.to_rfc3339(),
                    max_attempts as i64,
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;

        debug!("⏰ [DELAY_QUEUED]: '{}' staged for {}.", kind.as_str(), delayed_until);
        self.find(&record_id).await
    }

    /// pending → cancelled; no-op si un worker ya reclamó la fila.
    pub async fn cancel(&self, record_id: &str) -> Result<bool, DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection.execute(GUARDED_CANCEL, params![record_id]).await?;
        Ok(affected > 0)
    }

    /**
     * RECLAMO DEL WORKER: en una transacción selecciona la fila
     * elegible más temprana y la sella como 'processing' con su
     * arrendamiento. Una colisión de guardia devuelve None y el worker
     * re-entra sin bloquear.
     */
    #[instrument(skip(self))]
    pub async fn claim_next(
        &self,
        now: DateTime<Utc>,
        lease_seconds: u64,
    ) -> Result<Option<DelayRecord>, DbError> {
        let connection = self.database_client.get_connection()?;
        let transaction = connection
            .transaction()
            .await
            .map_err(|_| DbError::TransactionError)?;

        let mut eligible_rows = transaction
            .query(FIND_EARLIEST_ELIGIBLE, params![now.to_rfc3339()])
            .await?;

        let Some(eligible_row) = eligible_rows.next().await? else {
            return Ok(None);
        };
        let mut record = map_record_row(&eligible_row)?;
        drop(eligible_rows);

        let lease_boundary = now + Duration::seconds(lease_seconds as i64);
        let affected = transaction
            .execute(
                GUARDED_CLAIM,
                params![record.id.clone(), lease_boundary.to_rfc3339()],
            )
            .await?;
        if affected == 0 {
            // Otro worker ganó la guardia en la ventana de lectura.
            return Ok(None);
        }

        transaction.commit().await.map_err(|_| DbError::TransactionError)?;

        record.status = DelayStatus::Processing;
        record.lease_until = Some(lease_boundary);

        debug!("🔒 [DELAY_CLAIMED]: Record [{}] leased until {}.", record.id, lease_boundary);
        Ok(Some(record))
    }

    /// processing → completed con metadatos de resultado.
    pub async fn complete(
        &self,
        record_id: &str,
        result_metadata: serde_json::Value,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(GUARDED_COMPLETE, params![record_id, result_metadata.to_string()])
            .await?;
        if affected == 0 {
            return Err(DbError::Conflict(format!("COMPLETE_GUARD_LOST:{}", record_id)));
        }
        info!("✅ [DELAY_SEALED]: Record [{}] completed.", record_id);
        Ok(())
    }

    /**
     * Fallo del handler: re-programa con backoff exponencial mientras
     * queden intentos; el agotamiento sella 'failed'.
     */
    #[instrument(skip(self))]
    pub async fn fail_or_reschedule(
        &self,
        record_id: &str,
        failure_detail: &str,
        backoff_base_seconds: u64,
    ) -> Result<DelayStatus, DbError> {
        let record = self.find(record_id).await?;
        let next_attempts = record.attempts + 1;
        let failure_payload = serde_json::json!({ "last_error": failure_detail }).to_string();

        let connection = self.database_client.get_connection()?;

        if next_attempts < record.max_attempts {
            let retry_at = Utc::now() + retry_backoff(backoff_base_seconds, next_attempts);
            let affected = connection
                .execute(
                    GUARDED_RESCHEDULE,
                    params![record_id, retry_at.to_rfc3339(), failure_payload],
                )
                .await?;
            if affected == 0 {
                return Err(DbError::Conflict(format!("RESCHEDULE_GUARD_LOST:{}", record_id)));
            }
            warn!(
                "🔁 [DELAY_RETRY]: Record [{}] attempt {}/{} rescheduled for {}.",
                record_id, next_attempts, record.max_attempts, retry_at
            );
            Ok(DelayStatus::Pending)
        } else {
            let affected = connection
                .execute(GUARDED_FAIL, params![record_id, failure_payload])
                .await?;
            if affected == 0 {
                return Err(DbError::Conflict(format!("FAIL_GUARD_LOST:{}", record_id)));
            }
            warn!("💀 [DELAY_EXHAUSTED]: Record [{}] failed terminally.", record_id);
            Ok(DelayStatus::Failed)
        }
    }

    /**
     * Fallo NO transitorio: sella 'failed' terminal sin consumir la
     * escalera de reintentos (InvalidTransition, Moderation, etc. no
     * mejoran reintentando).
     */
    pub async fn fail_terminal(&self, record_id: &str, failure_detail: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let failure_payload = serde_json::json!({ "last_error": failure_detail, "terminal": true });

        let affected = connection
            .execute(GUARDED_FAIL, params![record_id, failure_payload.to_string()])
            .await?;
        if affected == 0 {
            return Err(DbError::Conflict(format!("FAIL_GUARD_LOST:{}", record_id)));
        }
        warn!("⛔ [DELAY_TERMINAL]: Record [{}] sealed as failed: {}.", record_id, failure_detail);
        Ok(())
    }

    /**
     * REAPER: devuelve a 'pending' los arrendamientos vencidos con
     * intentos restantes y sella 'failed' los agotados. Ninguna fila
     * permanece en 'processing' más allá de lease + intervalo.
     */
    #[instrument(skip(self))]
    pub async fn reap_expired_leases(&self, now: DateTime<Utc>) -> Result<(u64, u64), DbError> {
        let connection = self.database_client.get_connection()?;

        let failed = connection
            .execute(REAP_TO_FAILED, params![now.to_rfc3339()])
            .await?;
        let recovered = connection
            .execute(REAP_TO_PENDING, params![now.to_rfc3339()])
            .await?;

        if recovered > 0 || failed > 0 {
            warn!(
                "💀 [REAPER_SWEEP]: {} leases recovered to pending, {} sealed as failed.",
                recovered, failed
            );
        }
        Ok((recovered, failed))
    }

    pub async fn find(&self, record_id: &str) -> Result<DelayRecord, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection.query(FIND_RECORD, params![record_id]).await?;
        match rows.next().await? {
            Some(row) => map_record_row(&row),
            None => Err(DbError::NotFound(format!("DELAY_RECORD:{}", record_id))),
        }
    }
}

// --- FÍSICA INTERNA DE FILAS ---

fn map_record_row(row: &Row) -> Result<DelayRecord, DbError> {
    let raw_kind: String = row.get(1)?;
    let kind = DelayTaskKind::parse(&raw_kind)
        .ok_or_else(|| DbError::MappingError(format!("DELAY_KIND_DRIFT: {}", raw_kind)))?;

    let raw_status: String = row.get(4)?;
    let status = DelayStatus::parse(&raw_status)
        .ok_or_else(|| DbError::MappingError(format!("DELAY_STATUS_DRIFT: {}", raw_status)))?;

    let raw_payload: String = row.get(2)?;
    let raw_result: Option<String> = row.get(8)?;

    Ok(DelayRecord {
        id: row.get(0)?,
        kind,
        payload: serde_json::from_str(&raw_payload)
            .map_err(|e| DbError::MappingError(format!("DELAY_PAYLOAD_DRIFT: {}", e)))?,
        delayed_until: parse_timestamp(&row.get::<String>(3)?)?,
        status,
        attempts: row.get::<i64>(5)? as u32,
        max_attempts: row.get::<i64>(6)? as u32,
        lease_until: row
            .get::<Option<String>>(7)?
            .map(|raw| parse_timestamp(&raw))
            .transpose()?,
        result_metadata: raw_result
            .map(|raw| {
                serde_json::from_str(&raw)
                    .map_err(|e| DbError::MappingError(format!("DELAY_RESULT_DRIFT: {}", e)))
            })
            .transpose()?,
        created_at: parse_timestamp(&row.get::<String>(9)?)?,
    })
}
