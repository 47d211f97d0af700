// [apps/orchestrator/src/services/credit_engine.rs]
/*!
 * =================================================================
 * APARATO: CREDIT ENGINE SERVICE (V7.0 - SERIAL PER USER)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: EJECUCIÓN DE TAREAS PROGRAMADAS CON MUTEX POR USUARIO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. PER-USER SERIALIZATION: Dentro de un usuario las tareas ejecutan
 *    en serie (mutex por usuario); entre usuarios en paralelo.
 * 2. LOCK DISCIPLINE: fila del Ledger → mutex de usuario, jamás a la
 *    inversa: el reclamo de la fila (executing) precede al mutex, y
 *    el mutex se libera antes de cualquier fan-out.
 * 3. RETRY POLICY: Transitorios re-entran con el backoff de la curva
 *    compartida hasta credit.max_attempts; el resto sella 'failed'.
 * =================================================================
 */

use crate::state::AppState;
use chrono::Utc;
use estafeta_domain_models::credit::CreditTask;
use estafeta_domain_models::faults::CoreFault;
use estafeta_domain_models::identity::UserRole;
use estafeta_infra_db::DbError;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

/// Cadencia del sondeo de tareas vencidas y ráfaga por ciclo.
const ENGINE_POLL_INTERVAL_MS: u64 = 2000;
const ENGINE_BATCH_SIZE: i64 = 16;

#[derive(Clone)]
pub struct CreditEngineService {
    application_state: AppState,
}

impl CreditEngineService {
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /**
     * OPERACIÓN AWARD: fachada del núcleo hacia los colaboradores.
     * Resuelve el rol del actor y delega la cascada de compuertas al
     * repositorio (deduplicación, regla, restricciones, topes).
     */
    #[instrument(skip(self, metadata))]
    pub async fn award(
        &self,
        user_id: &str,
        task_type: &str,
        reference_id: &str,
        metadata: serde_json::Value,
    ) -> Result<CreditTask, CoreFault> {
        let state = &self.application_state;

        let actor_role = state
            .user_repository
            .find(user_id)
            .await
            .map(|user| user.role)
            .unwrap_or(UserRole::User);

        state
            .credit_repository
            .award(
                user_id,
                task_type,
                reference_id,
                actor_role,
                metadata,
                state.config.credit_max_attempts,
            )
            .await
            .map_err(CoreFault::from)
    }

    /// Despliega el worker perpetuo del motor en el reactor de Tokio.
    pub fn spawn_execution_worker(self) {
        tokio::spawn(async move {
            info!("💎 [CREDIT_ENGINE]: Execution worker online ({} ms cadence).", ENGINE_POLL_INTERVAL_MS);
            let mut engine_ticker = interval(Duration::from_millis(ENGINE_POLL_INTERVAL_MS));

            loop {
                engine_ticker.tick().await;

                if let Err(cycle_fault) = self.run_execution_cycle().await {
                    error!("❌ [ENGINE_FAULT]: Execution cycle failed: {}", cycle_fault);
                }
            }
        });
    }

    /// Un ciclo de ejecución: reclama y sella la ráfaga vencida.
    #[instrument(skip(self))]
    pub async fn run_execution_cycle(&self) -> anyhow::Result<()> {
        let state = &self.application_state;

        let due_task_ids = state
            .credit_repository
            .fetch_due_task_ids(Utc::now(), ENGINE_BATCH_SIZE)
            .await?;

        for task_id in due_task_ids {
            let task = match state.credit_repository.find_task(&task_id).await {
                Ok(task) => task,
                Err(DbError::NotFound(_)) => continue,
                Err(lookup_fault) => return Err(lookup_fault.into()),
            };

            // DISCIPLINA DE CERROJOS: la fila del Ledger se reclama
            // PRIMERO (guardia scheduled|failed → executing); solo con
            // la fila en propiedad se adquiere el mutex del usuario.
            match state.credit_repository.begin_execution(&task_id).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("♻️  [ENGINE_SKIP]: Task [{}] claimed elsewhere or sealed.", task_id);
                    continue;
                }
                Err(claim_fault) => return Err(claim_fault.into()),
            }

            // Serialización por usuario: el mutex vive mientras la
            // ejecución muta el balance de ESE usuario.
            let user_lock = state.user_execution_lock(&task.user_id);
            let _serial_guard = user_lock.lock().await;

            match state.credit_repository.complete_execution(&task_id).await {
                Ok(completed_task) => {
                    debug!(
                        "💎 [ENGINE_SEALED]: {} pts to [{}] via '{}'.",
                        completed_task.points, completed_task.user_id, completed_task.task_type
                    );
                }
                Err(execution_fault) => {
                    warn!("🔁 [ENGINE_RETRY]: Task [{}] execution failed: {}", task_id, execution_fault);
                    state
                        .credit_repository
                        .fail_execution(
                            &task_id,
                            &execution_fault.to_string(),
                            state.config.delay_queue_backoff_base_seconds,
                        )
                        .await?;
                }
            }
        }

        Ok(())
    }
}
