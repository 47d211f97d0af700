// [libs/infra/db-turso/src/repositories/penpal.rs]
/*!
 * APARATO: PENPAL MATCH REPOSITORY
 * RESPONSABILIDAD: Contrato durable mínimo del emparejamiento: el
 * handler 'ai.match' persiste aquí y el colaborador de matching lee.
 */

use crate::errors::DbError;
use crate::TursoClient;
use chrono::Utc;
use libsql::params;
use tracing::{info, instrument};
use uuid::Uuid;

pub struct PenpalRepository {
    database_client: TursoClient,
}

impl PenpalRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /// Cristaliza una propuesta de emparejamiento con su puntaje.
    #[instrument(skip(self))]
    pub async fn record_match(
        &self,
        user_a: &str,
        user_b: &str,
        score: f64,
    ) -> Result<String, DbError> {
        let connection = self.database_client.get_connection()?;
        let match_id = Uuid::new_v4().to_string();

        connection
            .execute(
                "INSERT INTO penpal_matches (id, user_a, user_b, score, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'proposed', ?5)",
                params![
                    match_id.clone(),
                    user_a,
                    user_b,
                    score,
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;

        info!("💌 [PENPAL_MATCH]: [{}] ↔ [{}] scored {:.2}.", user_a, user_b, score);
        Ok(match_id)
    }

    /// Conteo de propuestas vivas de un usuario (límite del matcher).
    pub async fn count_open_matches(&self, user_id: &str) -> Result<u32, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT COUNT(*) FROM penpal_matches
                 WHERE (user_a = ?1 OR user_b = ?1) AND status = 'proposed'",
                params![user_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? as u32),
            None => Ok(0),
        }
    }
}
