// [libs/infra/db-turso/src/schema.rs]
/**
 * =================================================================
 * APARATO: POSTAL DATABASE SCHEMA (V9.0 - RELAY STRATA)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GOBERNANZA ESTRUCTURAL E IDEMPOTENCIA TOTAL
 *
 * VISION HIPER-HOLÍSTICA:
 * 1. OUTBOX SOVEREIGNTY: La secuencia monótona del Outbox nace aquí
 *    (rowid AUTOINCREMENT) junto a la tabla de offsets por suscriptor.
 * 2. IDEMPOTENCIA: Gestión de errores para migraciones en caliente.
 * 3. PERFORMANCE: Índices de aceleración para el despacho masivo.
 * =================================================================
 */

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, instrument, warn};

/**
 * ESTRATO 1: SOLIDIFICACIÓN (Génesis de Tablas)
 * Define las entidades base del ecosistema postal.
 */
const POSTAL_TABLES: &[(&str, &str)] = &[
    ("TABLE_USERS", r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            nickname TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user',
            school_code TEXT NOT NULL,
            op_code TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_COURIERS", r#"
        CREATE TABLE IF NOT EXISTS couriers (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            level INTEGER NOT NULL,
            managed_prefix TEXT NOT NULL DEFAULT '',
            parent_courier_id TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            current_task_count INTEGER NOT NULL DEFAULT 0,
            max_daily_tasks INTEGER NOT NULL DEFAULT 20,
            success_rate REAL NOT NULL DEFAULT 1.0,
            approved_at DATETIME,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_LETTERS", r#"
        CREATE TABLE IF NOT EXISTS letters (
            id TEXT PRIMARY KEY,
            author_user_id TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL,
            visibility TEXT NOT NULL DEFAULT 'private',
            is_urgent INTEGER NOT NULL DEFAULT 0,
            barcode_id TEXT,
            envelope_id TEXT,
            delivery_status TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_BARCODES", r#"
        CREATE TABLE IF NOT EXISTS barcodes (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'unactivated',
            letter_id TEXT,
            envelope_id TEXT,
            recipient_op_code TEXT,
            last_scanner_id TEXT,
            scan_count INTEGER NOT NULL DEFAULT 0,
            bound_at DATETIME,
            delivered_at DATETIME,
            expires_at DATETIME,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_SCAN_EVENTS", r#"
        CREATE TABLE IF NOT EXISTS scan_events (
            id TEXT PRIMARY KEY,
            barcode_id TEXT NOT NULL,
            scanner_id TEXT NOT NULL,
            scan_type TEXT NOT NULL,
            location TEXT,
            old_status TEXT NOT NULL,
            new_status TEXT NOT NULL,
            scanned_at DATETIME NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            dedup_key TEXT NOT NULL UNIQUE
        );
    "#),
    ("TABLE_COURIER_TASKS", r#"
        CREATE TABLE IF NOT EXISTS courier_tasks (
            id TEXT PRIMARY KEY,
            assigned_courier_id TEXT,
            barcode_id TEXT NOT NULL,
            letter_id TEXT,
            pickup_op_code TEXT,
            delivery_op_code TEXT NOT NULL,
            current_op_code TEXT,
            priority TEXT NOT NULL DEFAULT 'normal',
            status TEXT NOT NULL DEFAULT 'pending',
            deadline DATETIME,
            reward_points INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_AI_CONFIGS", r#"
        CREATE TABLE IF NOT EXISTS ai_configs (
            provider TEXT PRIMARY KEY,
            api_endpoint TEXT NOT NULL,
            model TEXT NOT NULL,
            temperature REAL NOT NULL DEFAULT 0.7,
            max_tokens INTEGER NOT NULL DEFAULT 1024,
            priority INTEGER NOT NULL DEFAULT 100,
            daily_quota INTEGER NOT NULL DEFAULT 100000,
            used_quota INTEGER NOT NULL DEFAULT 0,
            quota_reset_at DATETIME NOT NULL,
            request_timeout_seconds INTEGER NOT NULL DEFAULT 30,
            active INTEGER NOT NULL DEFAULT 1
        );
    "#),
    ("TABLE_AI_USAGE_LOG", r#"
        CREATE TABLE IF NOT EXISTS ai_usage_log (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            model TEXT NOT NULL,
            task_type TEXT NOT NULL,
            task_id TEXT NOT NULL,
            input_tokens INTEGER NOT NULL DEFAULT 0,
            output_tokens INTEGER NOT NULL DEFAULT 0,
            response_time_ms INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            recorded_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_DELAY_QUEUE", r#"
        CREATE TABLE IF NOT EXISTS delay_queue (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            payload_json TEXT NOT NULL DEFAULT '{}',
            delayed_until DATETIME NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 3,
            lease_until DATETIME,
            result_json TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_CREDIT_RULES", r#"
        CREATE TABLE IF NOT EXISTS credit_rules (
            task_type TEXT PRIMARY KEY,
            base_points INTEGER NOT NULL DEFAULT 0,
            daily_cap INTEGER NOT NULL DEFAULT 0,
            weekly_cap INTEGER NOT NULL DEFAULT 0,
            auto_execute INTEGER NOT NULL DEFAULT 1,
            enabled INTEGER NOT NULL DEFAULT 1,
            constraints_json TEXT NOT NULL DEFAULT '{}'
        );
    "#),
    ("TABLE_CREDIT_TASKS", r#"
        CREATE TABLE IF NOT EXISTS credit_tasks (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            task_type TEXT NOT NULL,
            points INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 3,
            scheduled_for DATETIME,
            reference_id TEXT NOT NULL,
            skip_reason TEXT,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            completed_at DATETIME,
            UNIQUE(user_id, task_type, reference_id)
        );
    "#),
    ("TABLE_USER_CREDITS", r#"
        CREATE TABLE IF NOT EXISTS user_credits (
            user_id TEXT PRIMARY KEY,
            total INTEGER NOT NULL DEFAULT 0,
            available INTEGER NOT NULL DEFAULT 0,
            used INTEGER NOT NULL DEFAULT 0,
            earned INTEGER NOT NULL DEFAULT 0,
            level INTEGER NOT NULL DEFAULT 1
        );
    "#),
    ("TABLE_CREDIT_TRANSACTIONS", r#"
        CREATE TABLE IF NOT EXISTS credit_transactions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            delta_points INTEGER NOT NULL,
            task_type TEXT NOT NULL,
            credit_task_id TEXT NOT NULL,
            recorded_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_PENPAL_MATCHES", r#"
        CREATE TABLE IF NOT EXISTS penpal_matches (
            id TEXT PRIMARY KEY,
            user_a TEXT NOT NULL,
            user_b TEXT NOT NULL,
            score REAL NOT NULL DEFAULT 0.0,
            status TEXT NOT NULL DEFAULT 'proposed',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_OUTBOX", r#"
        CREATE TABLE IF NOT EXISTS outbox (
            event_id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_OUTBOX_OFFSETS", r#"
        CREATE TABLE IF NOT EXISTS outbox_offsets (
            subscriber_id TEXT PRIMARY KEY,
            committed_event_id INTEGER NOT NULL DEFAULT 0,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
];

/**
 * ESTRATO 2: EVOLUCIÓN (Mutaciones de Columna)
 * Asegura que las tablas existentes se adapten a las nuevas capacidades.
 */
const EVOLUTIONARY_STRATA: &[(&str, &str)] = &[
    // --- ESCALADA DE TAREAS HUÉRFANAS ---
    ("TASK_ESCALATION_PREFIX", "ALTER TABLE courier_tasks ADD COLUMN escalation_prefix TEXT"),
    ("TASK_ESCALATED_AT", "ALTER TABLE courier_tasks ADD COLUMN escalated_at DATETIME"),

    // --- RASTRO DE ANULACIÓN Y FALLO ---
    ("BARCODE_CANCEL_REASON", "ALTER TABLE barcodes ADD COLUMN cancel_reason TEXT"),
    ("CREDIT_FAILURE_REASON", "ALTER TABLE credit_tasks ADD COLUMN failure_reason TEXT"),

    // --- MÉTRICAS DEL CUERPO DE CARTEROS ---
    ("COURIER_COMPLETED", "ALTER TABLE couriers ADD COLUMN completed_tasks INTEGER DEFAULT 0"),
    ("COURIER_FAILED", "ALTER TABLE couriers ADD COLUMN failed_tasks INTEGER DEFAULT 0"),

    // --- PRESUPUESTO DE FALLOS IA ---
    ("AI_FAILURE_COUNT", "ALTER TABLE ai_configs ADD COLUMN failure_count INTEGER DEFAULT 0"),
];

/**
 * ESTRATO 3: ENDURECIMIENTO (Índices de Aceleración)
 * Optimiza el acceso para el despacho y los barridos periódicos.
 */
const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    ("IDX_BARCODES_EXPIRY", "CREATE INDEX IF NOT EXISTS idx_barcodes_expiry ON barcodes(status, expires_at);"),
    ("IDX_SCAN_EVENTS_BARCODE", "CREATE INDEX IF NOT EXISTS idx_scan_events_barcode ON scan_events(barcode_id, scanned_at);"),
    ("IDX_TASKS_DISPATCH", "CREATE INDEX IF NOT EXISTS idx_tasks_dispatch ON courier_tasks(status, assigned_courier_id);"),
    ("IDX_TASKS_BARCODE", "CREATE INDEX IF NOT EXISTS idx_tasks_barcode ON courier_tasks(barcode_id);"),
    ("IDX_COURIERS_ELIGIBILITY", "CREATE INDEX IF NOT EXISTS idx_couriers_eligibility ON couriers(status, managed_prefix);"),
    ("IDX_DELAY_CLAIM", "CREATE INDEX IF NOT EXISTS idx_delay_claim ON delay_queue(status, delayed_until);"),
    ("IDX_CREDIT_WINDOW", "CREATE INDEX IF NOT EXISTS idx_credit_window ON credit_tasks(user_id, task_type, status, completed_at);"),
    ("IDX_USAGE_PROVIDER", "CREATE INDEX IF NOT EXISTS idx_usage_provider ON ai_usage_log(provider, recorded_at);"),
];

/**
 * Ejecuta la secuencia maestra de sincronización del esquema.
 *
 * # Errors:
 * Retorna error si alguna tabla base falla en solidificarse, indicando
 * un colapso en el enlace con Turso.
 */
#[instrument(skip(database_connection))]
pub async fn apply_full_postal_schema(database_connection: &Connection) -> Result<()> {
    info!("🏗️ [SCHEMA_ENGINE]: Initiating structural synchronization V9.0...");

    solidify_base_strata(database_connection).await?;
    execute_evolutionary_repair(database_connection).await?;
    harden_access_layer(database_connection).await?;

    info!("✅ [SCHEMA_ENGINE]: Postal Ledger V9.0 level and certified.");
    Ok(())
}

async fn solidify_base_strata(db: &Connection) -> Result<()> {
    for (identifier, sql) in POSTAL_TABLES {
        debug!("  ↳ Solidifying: {}", identifier);
        db.execute(*sql, ())
            .await
            .with_context(|| format!("CRITICAL_SOLIDIFICATION_FAULT: {}", identifier))?;
    }
    Ok(())
}

async fn execute_evolutionary_repair(db: &Connection) -> Result<()> {
    for (identifier, sql) in EVOLUTIONARY_STRATA {
        match db.execute(*sql, ()).await {
            Ok(_) => debug!("  🟢 [REPAIR_OK]: Applied evolutionary stratum {}", identifier),
            Err(e) => {
                let message = e.to_string();
                if message.contains("duplicate column name") {
                    debug!("  ⚪ [REPAIR_SKIP]: {} already level.", identifier);
                } else {
                    warn!("  ⚠️ [REPAIR_BYPASS]: {} check incomplete: {}", identifier, message);
                }
            }
        }
    }
    Ok(())
}

async fn harden_access_layer(db: &Connection) -> Result<()> {
    for (identifier, sql) in ACCELERATION_INDEXES {
        debug!("  ↳ Hardening: {}", identifier);
        db.execute(*sql, ())
            .await
            .with_context(|| format!("CRITICAL_HARDENING_FAULT: {}", identifier))?;
    }
    Ok(())
}
