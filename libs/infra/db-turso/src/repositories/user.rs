// [libs/infra/db-turso/src/repositories/user.rs]
/*!
 * APARATO: USER REPOSITORY
 * RESPONSABILIDAD: Identidades y construcción del contexto de actor
 * para la re-verificación de permisos en el límite del núcleo.
 */

use crate::errors::DbError;
use crate::repositories::opt_text;
use crate::repositories::outbox::parse_timestamp;
use crate::TursoClient;
use estafeta_domain_models::identity::{ActorContext, User, UserRole};
use estafeta_domain_models::opcode::OpCode;
use libsql::{params, Row};
use tracing::instrument;

const INITIALIZE_USER: &str = r#"
    INSERT INTO users (id, nickname, role, school_code, op_code, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#;

const FIND_USER: &str = r#"
    SELECT id, nickname, role, school_code, op_code, created_at
    FROM users WHERE id = ?1
"#;

/// Contexto del actor con el prefijo gestionado del cartero (si existe).
const FIND_ACTOR_CONTEXT: &str = r#"
    SELECT u.id, u.role, u.school_code, c.managed_prefix
    FROM users u
    LEFT JOIN couriers c ON c.user_id = u.id AND c.status = 'approved'
    WHERE u.id = ?1
"#;

pub struct UserRepository {
    database_client: TursoClient,
}

impl UserRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    pub async fn create(&self, user: &User) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                INITIALIZE_USER,
                params![
                    user.id.clone(),
                    user.nickname.clone(),
                    user.role.as_str(),
                    user.school_code.clone(),
                    opt_text(user.op_code.as_ref().map(|code| code.as_str().to_string())),
                    user.created_at.to_rfc3339()
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn find(&self, user_id: &str) -> Result<User, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection.query(FIND_USER, params![user_id]).await?;
        match rows.next().await? {
            Some(row) => map_user_row(&row),
            None => Err(DbError::NotFound(format!("USER:{}", user_id))),
        }
    }

    /**
     * Forja el contexto de actor que viaja con cada operación del
     * núcleo: rol, escuela y el prefijo gestionado si es cartero.
     */
    #[instrument(skip(self))]
    pub async fn fetch_actor_context(&self, user_id: &str) -> Result<ActorContext, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection.query(FIND_ACTOR_CONTEXT, params![user_id]).await?;

        match rows.next().await? {
            Some(row) => {
                let raw_role: String = row.get(1)?;
                Ok(ActorContext {
                    user_id: row.get(0)?,
                    role: UserRole::parse(&raw_role)?,
                    school_code: row.get(2)?,
                    managed_prefix: row.get(3)?,
                })
            }
            None => Err(DbError::NotFound(format!("USER:{}", user_id))),
        }
    }
}

impl UserRepository {
    /**
     * Candidatos de pen-pal: usuarios de OTRA escuela, más antiguos
     * primero (el matcher favorece cuentas asentadas).
     */
    pub async fn fetch_match_candidates(
        &self,
        requester_user_id: &str,
        requester_school_code: &str,
        limit: i64,
    ) -> Result<Vec<User>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, nickname, role, school_code, op_code, created_at
                 FROM users
                 WHERE id != ?1 AND school_code != ?2 AND role = 'user'
                 ORDER BY created_at ASC
                 LIMIT ?3",
                params![requester_user_id, requester_school_code, limit],
            )
            .await?;

        let mut candidates = Vec::new();
        while let Some(row) = rows.next().await? {
            candidates.push(map_user_row(&row)?);
        }
        Ok(candidates)
    }
}

fn map_user_row(row: &Row) -> Result<User, DbError> {
    let raw_role: String = row.get(2)?;
    let raw_op_code: Option<String> = row.get(4)?;

    Ok(User {
        id: row.get(0)?,
        nickname: row.get(1)?,
        role: UserRole::parse(&raw_role)?,
        school_code: row.get(3)?,
        op_code: raw_op_code
            .map(|raw| OpCode::parse(&raw))
            .transpose()
            .map_err(DbError::from)?,
        created_at: parse_timestamp(&row.get::<String>(5)?)?,
    })
}
