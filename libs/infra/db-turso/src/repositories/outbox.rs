// [libs/infra/db-turso/src/repositories/outbox.rs]
/*!
 * =================================================================
 * APARATO: OUTBOX REPOSITORY (V4.0 - MONOTONE SEQUENCE)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: SECUENCIA DE EVENTOS Y OFFSETS POR SUSCRIPTOR
 *
 * # Mathematical Proof (At-Least-Once):
 * El evento se inserta en la MISMA transacción que la mutación de
 * dominio (append_within recibe la conexión de la transacción viva).
 * Cada suscriptor avanza su offset SOLO tras procesar; un colapso
 * re-entrega desde el último offset comprometido, y los consumidores
 * son idempotentes sobre (event_id, subscriber_id).
 * =================================================================
 */

use crate::errors::DbError;
use crate::TursoClient;
use chrono::{DateTime, Utc};
use estafeta_domain_models::outbox::{OutboxEvent, OutboxTopic};
use libsql::{params, Connection};
use tracing::{debug, instrument};

/**
 * Cristaliza un evento dentro de la transacción del llamador.
 * Las transacciones de libSQL derreferencian a Connection, por lo que
 * toda operación de dominio puede sellar su evento sin romper ACID.
 */
pub async fn append_within(
    transaction_connection: &Connection,
    topic: OutboxTopic,
    payload: &serde_json::Value,
) -> Result<(), DbError> {
    transaction_connection
        .execute(
            "INSERT INTO outbox (topic, payload_json, created_at) VALUES (?1, ?2, ?3)",
            params![topic.as_str(), payload.to_string(), Utc::now().to_rfc3339()],
        )
        .await?;
    Ok(())
}

/// Repositorio de lectura para el despachador del Event Bus.
pub struct OutboxRepository {
    database_client: TursoClient,
}

impl OutboxRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /// Offset comprometido del suscriptor (0 si jamás procesó).
    pub async fn committed_offset(&self, subscriber_id: &str) -> Result<i64, DbError> {
        let connection = self.database_client.get_connection()?;

        let mut offset_rows = connection
            .query(
                "SELECT committed_event_id FROM outbox_offsets WHERE subscriber_id = ?1",
                params![subscriber_id],
            )
            .await?;

        match offset_rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?),
            None => Ok(0),
        }
    }

    /**
     * Ráfaga de eventos posteriores al offset del suscriptor, en orden
     * estricto de secuencia.
     */
    #[instrument(skip(self))]
    pub async fn fetch_after(
        &self,
        subscriber_id: &str,
        batch_limit: i64,
    ) -> Result<Vec<OutboxEvent>, DbError> {
        let committed = self.committed_offset(subscriber_id).await?;
        let connection = self.database_client.get_connection()?;

        let mut event_rows = connection
            .query(
                "SELECT event_id, topic, payload_json, created_at
                 FROM outbox
                 WHERE event_id > ?1
                 ORDER BY event_id ASC
                 LIMIT ?2",
                params![committed, batch_limit],
            )
            .await?;

        let mut pending_events: Vec<OutboxEvent> = Vec::new();
        while let Some(row) = event_rows.next().await? {
            let event_id = row.get::<i64>(0)?;
            let raw_topic: String = row.get(1)?;
            let Some(topic) = OutboxTopic::parse(&raw_topic) else {
                // Tópico fuera de contrato. Solo es seguro saltarlo de
                // forma permanente cuando ningún evento conocido lo
                // precede en la ráfaga; de lo contrario la ráfaga se
                // corta y el prefijo conocido procesa primero.
                if pending_events.is_empty() {
                    debug!("⚪ [OUTBOX]: Unknown topic '{}' sealed past (#{}).", raw_topic, event_id);
                    self.commit_offset(subscriber_id, event_id).await?;
                    continue;
                }
                break;
            };

            let raw_payload: String = row.get(2)?;
            let raw_created_at: String = row.get(3)?;

            pending_events.push(OutboxEvent {
                event_id,
                topic,
                payload: serde_json::from_str(&raw_payload)
                    .map_err(|e| DbError::MappingError(format!("OUTBOX_PAYLOAD_DRIFT: {}", e)))?,
                created_at: parse_timestamp(&raw_created_at)?,
            });
        }

        Ok(pending_events)
    }

    /// Compromete el offset del suscriptor tras procesar la ráfaga.
    pub async fn commit_offset(&self, subscriber_id: &str, event_id: i64) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;

        connection
            .execute(
                "INSERT INTO outbox_offsets (subscriber_id, committed_event_id, updated_at)
                 VALUES (?1, ?2, CURRENT_TIMESTAMP)
                 ON CONFLICT(subscriber_id) DO UPDATE SET
                    committed_event_id = excluded.committed_event_id,
                    updated_at = CURRENT_TIMESTAMP",
                params![subscriber_id, event_id],
            )
            .await?;

        debug!("📌 [OUTBOX]: Subscriber [{}] committed up to #{}.", subscriber_id, event_id);
        Ok(())
    }
}

/// Decodifica sellos temporales RFC3339 o del formato DATETIME de SQLite.
pub(crate) fn parse_timestamp(raw_timestamp: &str) -> Result<DateTime<Utc>, DbError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw_timestamp) {
        return Ok(parsed.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw_timestamp, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| DbError::MappingError(format!("TIMESTAMP_DRIFT '{}': {}", raw_timestamp, e)))
}
