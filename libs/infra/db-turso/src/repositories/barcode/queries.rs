// [libs/infra/db-turso/src/repositories/barcode/queries.rs]
/*!
 * =================================================================
 * APARATO: BARCODE SQL REGISTRY (V5.0 - STATE GUARD SQL)
 * CLASIFICACIÓN: INFRASTRUCTURE SQL (ESTRATO L3)
 * RESPONSABILIDAD: SENTENCIAS ATÓMICAS DEL CICLO DE VIDA POSTAL
 *
 * # Mathematical Proof (ACID Consistency):
 * Las sentencias mutantes portan guardias de estado (WHERE status = X)
 * para que la transición de propiedad sea una operación atómica
 * indivisible: la primera transacción en comprometer gana y las
 * concurrentes observan cero filas afectadas.
 * =================================================================
 */

// --- ESTRATO DE IGNICIÓN ---

/// Cristaliza un token sin activar con su TTL de vinculación.
pub const INITIALIZE_BARCODE: &str = r#"
    INSERT INTO barcodes (id, code, status, expires_at, created_at)
    VALUES (?1, ?2, 'unactivated', ?3, ?4)
"#;

/// Lectura de la fila del token al abrir la transacción.
pub const FIND_BARCODE: &str = r#"
    SELECT id, code, status, letter_id, envelope_id, recipient_op_code,
           last_scanner_id, scan_count, bound_at, delivered_at, expires_at, created_at
    FROM barcodes
    WHERE id = ?1
"#;

// --- ESTRATO DE VINCULACIÓN (BIND) ---

/// Vincula carta + sobre + destino. Guardia: solo desde 'unactivated'.
pub const GUARDED_BIND_UPDATE: &str = r#"
    UPDATE barcodes
    SET status = 'bound',
        letter_id = ?2,
        envelope_id = ?3,
        recipient_op_code = ?4,
        last_scanner_id = ?5,
        scan_count = scan_count + 1,
        bound_at = ?6
    WHERE id = ?1 AND status = 'unactivated'
"#;

// --- ESTRATO DE ESCANEO FÍSICO ---

/// Transición genérica de escaneo con guardia del estado de origen.
pub const GUARDED_SCAN_UPDATE: &str = r#"
    UPDATE barcodes
    SET status = ?2,
        last_scanner_id = ?3,
        scan_count = scan_count + 1
    WHERE id = ?1 AND status = ?4
"#;

/// Sella la marca de entrega final.
pub const SET_DELIVERED_AT: &str = r#"
    UPDATE barcodes SET delivered_at = ?2 WHERE id = ?1
"#;

// --- ESTRATO DE ANULACIÓN Y EXPIRACIÓN ---

/// Anulación administrativa. Guardia: jamás desde terminales.
pub const GUARDED_CANCEL_UPDATE: &str = r#"
    UPDATE barcodes
    SET status = 'cancelled',
        last_scanner_id = ?2,
        scan_count = scan_count + 1,
        cancel_reason = ?3
    WHERE id = ?1 AND status = ?4
"#;

/// Candidatos del barrido: sin activar con TTL vencido.
pub const FIND_EXPIRY_CANDIDATES: &str = r#"
    SELECT id FROM barcodes
    WHERE status = 'unactivated'
      AND expires_at IS NOT NULL
      AND datetime(expires_at) <= datetime(?1)
    LIMIT ?2
"#;

/// Expiración con guardia: un bind concurrente que ganó deja 0 filas.
pub const GUARDED_EXPIRE_UPDATE: &str = r#"
    UPDATE barcodes
    SET status = 'expired'
    WHERE id = ?1 AND status = 'unactivated'
"#;

// --- ESTRATO DE DIARIO (JOURNAL) ---

/// Cristaliza un ScanEvent inmutable con su clave de deduplicación.
pub const INSERT_SCAN_EVENT: &str = r#"
    INSERT INTO scan_events
        (id, barcode_id, scanner_id, scan_type, location,
         old_status, new_status, scanned_at, metadata_json, dedup_key)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
"#;

/// Detección de réplica dentro de la cubeta de minuto.
pub const FIND_EVENT_BY_DEDUP: &str = r#"
    SELECT id, barcode_id, scanner_id, scan_type, location,
           old_status, new_status, scanned_at, metadata_json, dedup_key
    FROM scan_events
    WHERE dedup_key = ?1
"#;

/// Rastro completo del token en orden de ocurrencia.
pub const FETCH_TRACE: &str = r#"
    SELECT id, barcode_id, scanner_id, scan_type, location,
           old_status, new_status, scanned_at, metadata_json, dedup_key
    FROM scan_events
    WHERE barcode_id = ?1
    ORDER BY scanned_at ASC, id ASC
"#;

// --- ESTRATO DE PROYECCIÓN (LETTER) ---

/// La carta solo proyecta; el diario es la fuente de verdad.
pub const UPDATE_LETTER_PROJECTION: &str = r#"
    UPDATE letters SET delivery_status = ?2, barcode_id = ?3 WHERE id = ?1
"#;

/// Urgencia de la carta para heredar la prioridad de la tarea.
pub const FIND_LETTER_FLAGS: &str = r#"
    SELECT author_user_id, is_urgent FROM letters WHERE id = ?1
"#;

// --- ESTRATO DE PROPAGACIÓN (COURIER TASK) ---

/// Tarea viva vinculada al token (si existe).
pub const FIND_TASK_FOR_BARCODE: &str = r#"
    SELECT id, assigned_courier_id, status FROM courier_tasks
    WHERE barcode_id = ?1 AND status NOT IN ('delivered', 'failed')
    LIMIT 1
"#;

/// Propagación del escaneo a la tarea, con guardia del estado previo.
pub const GUARDED_TASK_UPDATE: &str = r#"
    UPDATE courier_tasks
    SET status = ?2, current_op_code = ?3
    WHERE id = ?1 AND status = ?4
"#;

/// Cierre exitoso: libera carga y re-computa la tasa de éxito.
pub const COURIER_DELIVERY_STATS: &str = r#"
    UPDATE couriers
    SET current_task_count = MAX(current_task_count - 1, 0),
        completed_tasks = completed_tasks + 1,
        success_rate = CAST(completed_tasks + 1 AS REAL)
                       / (completed_tasks + 1 + failed_tasks)
    WHERE id = ?1
"#;

/// Cierre fallido: libera carga y castiga la tasa de éxito.
pub const COURIER_FAILURE_STATS: &str = r#"
    UPDATE couriers
    SET current_task_count = MAX(current_task_count - 1, 0),
        failed_tasks = failed_tasks + 1,
        success_rate = CAST(completed_tasks AS REAL)
                       / (completed_tasks + failed_tasks + 1)
    WHERE id = ?1
"#;
