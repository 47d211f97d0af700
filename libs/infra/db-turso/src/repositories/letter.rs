// [libs/infra/db-turso/src/repositories/letter.rs]
/*!
 * APARATO: LETTER REPOSITORY
 * RESPONSABILIDAD: Cartas autoradas y su proyección de entrega. El
 * diario de escaneos es la fuente de verdad; aquí solo se proyecta.
 */

use crate::errors::DbError;
use crate::repositories::opt_text;
use crate::repositories::outbox::{append_within, parse_timestamp};
use crate::TursoClient;
use chrono::Utc;
use estafeta_domain_models::barcode::BarcodeStatus;
use estafeta_domain_models::letter::{Letter, LetterVisibility};
use estafeta_domain_models::outbox::OutboxTopic;
use libsql::{params, Row};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

const INITIALIZE_LETTER: &str = r#"
    INSERT INTO letters
        (id, author_user_id, title, content, visibility, is_urgent, envelope_id, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
"#;

const FIND_LETTER: &str = r#"
    SELECT id, author_user_id, title, content, visibility, is_urgent,
           barcode_id, envelope_id, delivery_status, created_at
    FROM letters WHERE id = ?1
"#;

pub struct LetterRepository {
    database_client: TursoClient,
}

impl LetterRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /**
     * Cristaliza una carta y sella 'letter.created' en el Outbox
     * dentro de la misma transacción (las respuestas IA diferidas
     * nacen por esta vía).
     */
    #[instrument(skip(self, content))]
    pub async fn create(
        &self,
        author_user_id: &str,
        title: &str,
        content: &str,
        visibility: LetterVisibility,
        is_urgent: bool,
        envelope_id: Option<&str>,
    ) -> Result<Letter, DbError> {
        let connection = self.database_client.get_connection()?;
        let transaction = connection
            .transaction()
            .await
            .map_err(|_| DbError::TransactionError)?;

        let letter_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        transaction
            .execute(
                INITIALIZE_LETTER,
                params![
                    letter_id.clone(),
                    author_user_id,
                    title,
                    content,
                    visibility.as_str(),
                    is_urgent as i64,
                    opt_text(envelope_id.map(|e| e.to_string())),
                    now.to_rfc3339()
                ],
            )
            .await?;

        append_within(
            &transaction,
            OutboxTopic::LetterCreated,
            &json!({
                "letter_id": letter_id,
                "author_user_id": author_user_id,
                "is_urgent": is_urgent,
            }),
        )
        .await?;

        transaction.commit().await.map_err(|_| DbError::TransactionError)?;

        info!("✉️  [LETTER_SEALED]: Letter [{}] authored by [{}].", letter_id, author_user_id);
        self.find(&letter_id).await
    }

    pub async fn find(&self, letter_id: &str) -> Result<Letter, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection.query(FIND_LETTER, params![letter_id]).await?;
        match rows.next().await? {
            Some(row) => map_letter_row(&row),
            None => Err(DbError::NotFound(format!("LETTER:{}", letter_id))),
        }
    }
}

fn map_letter_row(row: &Row) -> Result<Letter, DbError> {
    let raw_visibility: String = row.get(4)?;
    let raw_delivery: Option<String> = row.get(8)?;

    Ok(Letter {
        id: row.get(0)?,
        author_user_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        visibility: LetterVisibility::parse(&raw_visibility)
            .ok_or_else(|| DbError::MappingError(format!("VISIBILITY_DRIFT: {}", raw_visibility)))?,
        is_urgent: row.get::<i64>(5)? != 0,
        barcode_id: row.get(6)?,
        envelope_id: row.get(7)?,
        delivery_status: raw_delivery.as_deref().and_then(BarcodeStatus::parse),
        created_at: parse_timestamp(&row.get::<String>(9)?)?,
    })
}
