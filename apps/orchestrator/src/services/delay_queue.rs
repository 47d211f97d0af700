// [apps/orchestrator/src/services/delay_queue.rs]
/*!
 * =================================================================
 * APARATO: DELAY QUEUE SERVICE (V8.0 - WORKER POOL & REAPER)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: POOL DE WORKERS, REGISTRO DE HANDLERS Y REAPER
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. EXPLICIT REGISTRY: Cada handler se registra en el arranque con
 *    (taskType → func); sin anotaciones mágicas ni descubrimiento.
 * 2. LEASE SEMANTICS: La ejecución del handler corre bajo timeout
 *    igual al arrendamiento; el Reaper recupera filas de workers
 *    colapsados devolviendo los leases vencidos a 'pending'.
 * 3. RETRY POLICY: Timeout/Unavailable/RateLimited re-entran con
 *    backoff exponencial; el resto del catálogo sella 'failed'
 *    terminal y certifica el cierre en el Outbox.
 * =================================================================
 */

use crate::state::AppState;
use chrono::Utc;
use estafeta_domain_models::delay::{DelayRecord, DelayTaskKind};
use estafeta_domain_models::faults::CoreFault;
use estafeta_domain_models::outbox::OutboxTopic;
use estafeta_infra_db::repositories::outbox::append_within;
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

/// Cadencia del sondeo de un worker sin filas elegibles.
const IDLE_POLL_INTERVAL_MS: u64 = 1000;
/// Cadencia del barrido del Reaper sobre arrendamientos vencidos.
const REAPER_INTERVAL_SECONDS: u64 = 30;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value, CoreFault>> + Send>>;
pub type DelayHandlerFn = fn(AppState, DelayRecord) -> HandlerFuture;

/**
 * Registro explícito (taskType → func) construido en el arranque.
 */
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<DelayTaskKind, DelayHandlerFn>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: DelayTaskKind, handler: DelayHandlerFn) {
        debug!("🔌 [REGISTRY]: Handler wired for '{}'.", kind.as_str());
        self.handlers.insert(kind, handler);
    }

    pub fn resolve(&self, kind: DelayTaskKind) -> Option<DelayHandlerFn> {
        self.handlers.get(&kind).copied()
    }
}

pub struct DelayQueueService {
    application_state: AppState,
    handler_registry: Arc<HandlerRegistry>,
}

impl DelayQueueService {
    pub fn new(application_state: AppState, handler_registry: HandlerRegistry) -> Self {
        Self {
            application_state,
            handler_registry: Arc::new(handler_registry),
        }
    }

    /// Despliega el pool de N workers y el daemon Reaper.
    pub fn spawn_worker_pool(self) {
        let worker_count = self.application_state.config.delay_queue_workers;
        info!("⚙️  [DELAY_POOL]: Igniting {} workers + reaper.", worker_count);

        for worker_index in 0..worker_count {
            let state = self.application_state.clone();
            let registry = self.handler_registry.clone();
            tokio::spawn(async move {
                run_worker_loop(worker_index, state, registry).await;
            });
        }

        let reaper_state = self.application_state.clone();
        tokio::spawn(async move {
            run_reaper_loop(reaper_state).await;
        });
    }
}

/**
 * Bucle perpetuo de UN worker: reclamar → ejecutar → sellar.
 * La cancelación se honra en cada iteración vía el timeout del
 * arrendamiento sobre la ejecución del handler.
 */
async fn run_worker_loop(
    worker_index: usize,
    state: AppState,
    registry: Arc<HandlerRegistry>,
) {
    let lease_seconds = state.config.delay_queue_lease_seconds;
    let backoff_base = state.config.delay_queue_backoff_base_seconds;

    loop {
        match state.delay_repository.claim_next(Utc::now(), lease_seconds).await {
            Ok(Some(record)) => {
                execute_claimed_record(worker_index, &state, &registry, record, lease_seconds, backoff_base)
                    .await;
            }
            Ok(None) => {
                sleep(Duration::from_millis(IDLE_POLL_INTERVAL_MS)).await;
            }
            Err(claim_fault) => {
                error!("❌ [WORKER_{}_FAULT]: Claim failed: {}", worker_index, claim_fault);
                sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

#[instrument(skip(state, registry, record), fields(record_id = %record.id, kind = %record.kind.as_str()))]
async fn execute_claimed_record(
    worker_index: usize,
    state: &AppState,
    registry: &HandlerRegistry,
    record: DelayRecord,
    lease_seconds: u64,
    backoff_base: u64,
) {
    let Some(handler) = registry.resolve(record.kind) else {
        let detail = format!("NO_HANDLER_REGISTERED: {}", record.kind.as_str());
        seal_terminal_failure(state, &record, &detail).await;
        return;
    };

    debug!("🎯 [WORKER_{}]: Executing '{}' [{}].", worker_index, record.kind.as_str(), record.id);

    // El handler ejecuta FUERA de la transacción de reclamo, acotado
    // al arrendamiento: un handler colgado pierde su lease y el Reaper
    // devuelve la fila al pool.
    let execution_result = timeout(
        Duration::from_secs(lease_seconds),
        handler(state.clone(), record.clone()),
    )
    .await;

    match execution_result {
        Ok(Ok(result_metadata)) => {
            if let Err(seal_fault) = state.delay_repository.complete(&record.id, result_metadata).await {
                error!("❌ [WORKER_{}_SEAL]: Completion lost: {}", worker_index, seal_fault);
            }
        }
        Ok(Err(handler_fault)) if handler_fault.is_retryable() => {
            if let Err(retry_fault) = state
                .delay_repository
                .fail_or_reschedule(&record.id, &handler_fault.to_string(), backoff_base)
                .await
            {
                error!("❌ [WORKER_{}_RETRY]: Reschedule lost: {}", worker_index, retry_fault);
            }
        }
        Ok(Err(handler_fault)) => {
            // Fallo no transitorio: terminal, certificado en el Outbox.
            seal_terminal_failure(state, &record, &handler_fault.to_string()).await;
        }
        Err(_lease_elapsed) => {
            warn!("⏱️  [WORKER_{}_LEASE]: Handler outlived its lease on [{}].", worker_index, record.id);
            if let Err(retry_fault) = state
                .delay_repository
                .fail_or_reschedule(&record.id, "LEASE_TIMEOUT", backoff_base)
                .await
            {
                error!("❌ [WORKER_{}_RETRY]: Reschedule lost: {}", worker_index, retry_fault);
            }
        }
    }
}

/// Sella el fallo terminal y lo certifica para los suscriptores.
async fn seal_terminal_failure(state: &AppState, record: &DelayRecord, detail: &str) {
    if let Err(seal_fault) = state.delay_repository.fail_terminal(&record.id, detail).await {
        error!("❌ [DELAY_SEAL]: Terminal failure not persisted: {}", seal_fault);
        return;
    }

    let outbox_result = async {
        let connection = state.database_client.get_connection()?;
        append_within(
            &connection,
            OutboxTopic::Notification,
            &json!({
                "kind": "delay_task_failed",
                "record_id": record.id,
                "task_type": record.kind.as_str(),
                "reason": detail,
            }),
        )
        .await
    }
    .await;

    if let Err(outbox_fault) = outbox_result {
        error!("❌ [DELAY_SEAL]: Failure event not crystallized: {}", outbox_fault);
    }
}

/// Daemon Reaper: ningún lease vencido sobrevive más de un intervalo.
async fn run_reaper_loop(state: AppState) {
    info!("💀 [REAPER_ACTIVE]: Lease hygiene daemon initiated.");
    let mut reaper_ticker = interval(Duration::from_secs(REAPER_INTERVAL_SECONDS));

    loop {
        reaper_ticker.tick().await;

        match state.delay_repository.reap_expired_leases(Utc::now()).await {
            Ok((0, 0)) => {}
            Ok((recovered, failed)) => {
                info!("💀 [REAPER_SWEEP]: {} recovered, {} sealed failed.", recovered, failed);
            }
            Err(reap_fault) => {
                error!("❌ [REAPER_FAULT]: Sweep failed: {}", reap_fault);
            }
        }
    }
}
