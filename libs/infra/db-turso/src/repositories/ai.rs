// [libs/infra/db-turso/src/repositories/ai.rs]
/*!
 * =================================================================
 * APARATO: AI PROVIDER REPOSITORY (V6.0 - QUOTA ATOMIC)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: ROTACIÓN DE PROVEEDORES, CUOTAS Y RASTRO DE USO
 *
 * # Mathematical Proof (Quota/Log Atomicity):
 * used_quota se incrementa en la MISMA transacción que el asiento de
 * AiUsageLog: para toda llamada exitosa, el delta del contador iguala
 * los tokens asentados en su ventana transaccional (propiedad §8.4).
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::outbox::parse_timestamp;
use crate::TursoClient;
use chrono::{DateTime, Utc};
use estafeta_domain_ai_cortex::quota_window_next_boundary;
use estafeta_domain_models::ai::{AiCallStatus, AiProviderConfig, AiTaskType, AiUsageLog};
use libsql::{params, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const FETCH_ACTIVE_CONFIGS: &str = r#"
    SELECT provider, api_endpoint, model, temperature, max_tokens, priority,
           daily_quota, used_quota, quota_reset_at, request_timeout_seconds, active
    FROM ai_configs
    WHERE active = 1
    ORDER BY priority ASC
"#;

const UPSERT_CONFIG: &str = r#"
    INSERT INTO ai_configs
        (provider, api_endpoint, model, temperature, max_tokens, priority,
         daily_quota, used_quota, quota_reset_at, request_timeout_seconds, active)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
    ON CONFLICT(provider) DO UPDATE SET
        api_endpoint = excluded.api_endpoint,
        model = excluded.model,
        temperature = excluded.temperature,
        max_tokens = excluded.max_tokens,
        priority = excluded.priority,
        daily_quota = excluded.daily_quota,
        request_timeout_seconds = excluded.request_timeout_seconds,
        active = excluded.active
"#;

/// Reinicio atómico de ventanas caducas (frontera = próxima medianoche UTC).
const RESET_STALE_WINDOWS: &str = r#"
    UPDATE ai_configs
    SET used_quota = 0, quota_reset_at = ?2
    WHERE active = 1 AND datetime(quota_reset_at) <= datetime(?1)
"#;

/// Incremento de cuota consumida (misma transacción que el asiento).
const INCREMENT_USED_QUOTA: &str = r#"
    UPDATE ai_configs SET used_quota = used_quota + ?2 WHERE provider = ?1
"#;

/// Presupuesto de fallos: el 4xx cuenta contra el proveedor.
const INCREMENT_FAILURE_COUNT: &str = r#"
    UPDATE ai_configs SET failure_count = failure_count + 1 WHERE provider = ?1
"#;

const INSERT_USAGE_LOG: &str = r#"
    INSERT INTO ai_usage_log
        (id, provider, model, task_type, task_id, input_tokens, output_tokens,
         response_time_ms, status, recorded_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
"#;

const FIND_CONFIG: &str = r#"
    SELECT provider, api_endpoint, model, temperature, max_tokens, priority,
           daily_quota, used_quota, quota_reset_at, request_timeout_seconds, active
    FROM ai_configs WHERE provider = ?1
"#;

pub struct AiRepository {
    database_client: TursoClient,
}

impl AiRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    pub async fn upsert_config(&self, config: &AiProviderConfig) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                UPSERT_CONFIG,
                params![
                    config.provider.clone(),
                    config.api_endpoint.clone(),
                    config.model.clone(),
                    config.temperature,
                    config.max_tokens as i64,
                    config.priority as i64,
                    config.daily_quota as i64,
                    config.used_quota as i64,
                    config.quota_reset_at.to_rfc3339(),
                    config.request_timeout_seconds as i64,
                    config.active as i64
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn find_config(&self, provider: &str) -> Result<Option<AiProviderConfig>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection.query(FIND_CONFIG, params![provider]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_config_row(&row)?)),
            None => Ok(None),
        }
    }

    /**
     * Snapshot de rotación: reinicia atómicamente las ventanas caducas
     * y devuelve los proveedores activos por prioridad ascendente.
     */
    #[instrument(skip(self))]
    pub async fn fetch_rotation_snapshot(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AiProviderConfig>, DbError> {
        let connection = self.database_client.get_connection()?;

        let reset_count = connection
            .execute(
                RESET_STALE_WINDOWS,
                params![now.to_rfc3339(), quota_window_next_boundary(now).to_rfc3339()],
            )
            .await?;
        if reset_count > 0 {
            info!("🌅 [QUOTA_RESET]: {} provider windows rolled to next UTC midnight.", reset_count);
        }

        let mut rows = connection.query(FETCH_ACTIVE_CONFIGS, ()).await?;
        let mut configs = Vec::new();
        while let Some(row) = rows.next().await? {
            configs.push(map_config_row(&row)?);
        }
        Ok(configs)
    }

    /**
     * ÉXITO: asiento de uso + incremento de cuota en UNA transacción.
     */
    #[instrument(skip(self))]
    pub async fn record_success(
        &self,
        provider: &str,
        model: &str,
        task_type: AiTaskType,
        task_id: &str,
        input_tokens: u64,
        output_tokens: u64,
        response_time_ms: u64,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let transaction = connection
            .transaction()
            .await
            .map_err(|_| DbError::TransactionError)?;

        transaction
            .execute(
                INSERT_USAGE_LOG,
                params![
                    Uuid::new_v4().to_string(),
                    provider,
                    model,
                    task_type.as_str(),
                    task_id,
                    input_tokens as i64,
                    output_tokens as i64,
                    response_time_ms as i64,
                    AiCallStatus::Success.as_str(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;

        let total_tokens = (input_tokens + output_tokens) as i64;
        transaction
            .execute(INCREMENT_USED_QUOTA, params![provider, total_tokens])
            .await?;

        transaction.commit().await.map_err(|_| DbError::TransactionError)?;

        debug!("🧾 [AI_USAGE]: {} tokens sealed against [{}].", total_tokens, provider);
        Ok(())
    }

    /// Fallo o retención: asiento sin tocar la cuota del proveedor.
    #[instrument(skip(self))]
    pub async fn record_failure(
        &self,
        provider: &str,
        model: &str,
        task_type: AiTaskType,
        task_id: &str,
        response_time_ms: u64,
        status: AiCallStatus,
        counts_against_budget: bool,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;

        connection
            .execute(
                INSERT_USAGE_LOG,
                params![
                    Uuid::new_v4().to_string(),
                    provider,
                    model,
                    task_type.as_str(),
                    task_id,
                    0i64,
                    0i64,
                    response_time_ms as i64,
                    status.as_str(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;

        if counts_against_budget {
            connection
                .execute(INCREMENT_FAILURE_COUNT, params![provider])
                .await?;
        }
        Ok(())
    }

    /// Rastro de uso por tarea (auditoría y Proving Grounds).
    pub async fn fetch_usage_for_task(&self, task_id: &str) -> Result<Vec<AiUsageLog>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, provider, model, task_type, task_id, input_tokens, output_tokens,
                        response_time_ms, status, recorded_at
                 FROM ai_usage_log WHERE task_id = ?1 ORDER BY recorded_at ASC",
                params![task_id],
            )
            .await?;

        let mut usage_entries = Vec::new();
        while let Some(row) = rows.next().await? {
            usage_entries.push(map_usage_row(&row)?);
        }
        Ok(usage_entries)
    }
}

// --- FÍSICA INTERNA DE FILAS ---

fn map_config_row(row: &Row) -> Result<AiProviderConfig, DbError> {
    Ok(AiProviderConfig {
        provider: row.get(0)?,
        api_endpoint: row.get(1)?,
        model: row.get(2)?,
        temperature: row.get(3)?,
        max_tokens: row.get::<i64>(4)? as u32,
        priority: row.get::<i64>(5)? as u32,
        daily_quota: row.get::<i64>(6)? as u64,
        used_quota: row.get::<i64>(7)? as u64,
        quota_reset_at: parse_timestamp(&row.get::<String>(8)?)?,
        request_timeout_seconds: row.get::<i64>(9)? as u64,
        active: row.get::<i64>(10)? != 0,
    })
}

fn map_usage_row(row: &Row) -> Result<AiUsageLog, DbError> {
    let raw_task_type: String = row.get(3)?;
    let raw_status: String = row.get(8)?;

    Ok(AiUsageLog {
        id: row.get(0)?,
        provider: row.get(1)?,
        model: row.get(2)?,
        task_type: AiTaskType::parse(&raw_task_type)
            .ok_or_else(|| DbError::MappingError(format!("AI_TASK_DRIFT: {}", raw_task_type)))?,
        task_id: row.get(4)?,
        input_tokens: row.get::<i64>(5)? as u64,
        output_tokens: row.get::<i64>(6)? as u64,
        response_time_ms: row.get::<i64>(7)? as u64,
        status: match raw_status.as_str() {
            "success" => AiCallStatus::Success,
            "moderated" => AiCallStatus::Moderated,
            _ => AiCallStatus::Failed,
        },
        recorded_at: parse_timestamp(&row.get::<String>(9)?)?,
    })
}
