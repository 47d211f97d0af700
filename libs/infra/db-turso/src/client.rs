// [libs/infra/db-turso/src/client.rs]
/*!
 * =================================================================
 * APARATO: DATABASE CONNECTION CLIENT (V7.0 - GENESIS ANCHOR)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GESTIÓN DE ENLACES TÁCTICOS Y PERSISTENCIA ACID
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. LOCATION TAXONOMY: La URL se clasifica en tres sustratos
 *    (cluster remoto, disco local, memoria compartida) antes de
 *    encender el driver; cada sustrato tiene su contrato de acceso.
 * 2. SINGLE GENESIS: Una única conexión de génesis solidifica el
 *    esquema en los tres sustratos; en memoria esa MISMA conexión
 *    queda anclada para que SQLite no purgue el segmento compartido
 *    entre hilos antes de que el resto del enjambre se conecte.
 * =================================================================
 */

use crate::errors::DbError;
use crate::schema::apply_full_postal_schema;
use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Clasificación del sustrato físico detrás de la URL de conexión.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LedgerLocation {
    /// Cluster remoto de Turso (libsql:// o https://); exige token.
    RemoteCluster,
    /// Archivo SQLite sobre disco local.
    LocalDisk,
    /// Segmento de memoria compartida (Proving Grounds y arranques efímeros).
    SharedMemory,
}

/// Taxonomía pura de la URL; rechaza el vacío antes de tocar el driver.
fn classify_location(database_connection_url: &str) -> Result<LedgerLocation, DbError> {
    if database_connection_url.trim().is_empty() {
        return Err(DbError::ConfigurationError(
            "CRITICAL_FAULT: DATABASE_URL_UNDEFINED".into(),
        ));
    }

    if database_connection_url.starts_with("libsql://")
        || database_connection_url.starts_with("https://")
    {
        return Ok(LedgerLocation::RemoteCluster);
    }

    let carries_memory_marker = database_connection_url.contains(":memory:")
        || database_connection_url.contains("mode=memory");
    if carries_memory_marker {
        return Ok(LedgerLocation::SharedMemory);
    }

    Ok(LedgerLocation::LocalDisk)
}

#[derive(Clone)]
pub struct TursoClient {
    internal_database_driver: Arc<Database>,
    /// Conexión de génesis retenida SOLO en modo memoria: mientras
    /// viva, el segmento compartido sobrevive entre hilos.
    _memory_persistence_anchor: Option<Arc<Connection>>,
}

impl TursoClient {
    #[instrument(skip(database_access_token))]
    pub async fn connect(
        database_connection_url: &str,
        database_access_token: Option<String>,
    ) -> Result<Self, DbError> {
        let location = classify_location(database_connection_url)?;

        info!(
            "🔌 [DATABASE]: Initiating tactical link ({:?}) to [{}]",
            location, database_connection_url
        );

        // 1. IGNICIÓN DEL DRIVER SEGÚN SUSTRATO
        let ignited_driver = match location {
            LedgerLocation::RemoteCluster => {
                let access_token = database_access_token.ok_or_else(|| {
                    DbError::ConnectionError(
                        "SECURITY_FAULT: Remote access denied (Token missing)".into(),
                    )
                })?;
                Builder::new_remote(database_connection_url.to_string(), access_token)
                    .build()
                    .await
            }
            LedgerLocation::LocalDisk | LedgerLocation::SharedMemory => {
                Builder::new_local(database_connection_url).build().await
            }
        }
        .map_err(|ignition_fault| {
            DbError::ConnectionError(format!("DRIVER_IGNITION_FAILURE: {}", ignition_fault))
        })?;

        let shared_driver = Arc::new(ignited_driver);

        // 2. GÉNESIS ÚNICO: la primera conexión del proceso solidifica
        // el esquema, sea cual sea el sustrato.
        let genesis_connection = shared_driver.connect().map_err(|link_fault| {
            DbError::ConnectionError(format!("GENESIS_LINK_FAULT: {}", link_fault))
        })?;

        apply_full_postal_schema(&genesis_connection)
            .await
            .map_err(|schema_fault| {
                DbError::ConnectionError(format!("SCHEMA_SYNC_FAULT: {}", schema_fault))
            })?;

        // 3. ANCLAJE CONDICIONAL: solo el sustrato de memoria retiene
        // la conexión de génesis; disco y remoto la liberan aquí.
        let memory_anchor = match location {
            LedgerLocation::SharedMemory => {
                info!("⚓ [DATABASE]: Memory strata solidified and anchored.");
                Some(Arc::new(genesis_connection))
            }
            LedgerLocation::RemoteCluster | LedgerLocation::LocalDisk => None,
        };

        Ok(Self {
            internal_database_driver: shared_driver,
            _memory_persistence_anchor: memory_anchor,
        })
    }

    pub fn get_connection(&self) -> Result<Connection, DbError> {
        self.internal_database_driver.connect().map_err(|allocation_fault| {
            error!("⚠️ [POOL_FAULT]: Connection allocation failed: {}", allocation_fault);
            DbError::ConnectionError(allocation_fault.to_string())
        })
    }
}
