// [apps/orchestrator/src/services/courier_dispatch.rs]
/*!
 * =================================================================
 * APARATO: COURIER DISPATCH SERVICE (V6.0 - ORPHAN SHEPHERD)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: ASIGNACIÓN EN EL BIND, REINTENTO Y ESCALADA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. RANKING SEALED: prefijo más largo → menor carga → mayor tasa →
 *    aprobación más antigua; el repositorio ya entrega este orden y
 *    el dominio lo re-certifica.
 * 2. ORPHAN LOOP: tareas sin cartero re-entran cada intervalo de
 *    reasignación; tras la ventana de escalada el prefijo se acorta
 *    un carácter y los admins del nivel reciben la notificación.
 * =================================================================
 */

use crate::state::AppState;
use chrono::Utc;
use estafeta_domain_courier::{escalation_step, is_escalation_due, select_best_candidate};
use estafeta_domain_models::courier::TaskPriority;
use estafeta_domain_models::opcode::OpCode;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

/// Recompensa por defecto cuando la regla de créditos no fija otra.
const DEFAULT_REWARD_POINTS: i64 = 10;
/// Ráfaga máxima de huérfanas re-evaluadas por ciclo.
const ORPHAN_BATCH_SIZE: i64 = 50;

#[derive(Clone)]
pub struct CourierDispatchService {
    application_state: AppState,
}

impl CourierDispatchService {
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /**
     * ASIGNACIÓN EN EL BIND (unactivated → bound).
     *
     * Idempotente ante la re-entrega del bus: un barcode con tarea
     * viva no genera una segunda. Sin candidato elegible, la tarea
     * nace huérfana y entra al bucle de reintento.
     */
    #[instrument(skip(self))]
    pub async fn dispatch_for_bound_barcode(
        &self,
        barcode_id: &str,
        recipient_op_code: &str,
        letter_id: Option<&str>,
        is_urgent: bool,
    ) -> anyhow::Result<()> {
        let state = &self.application_state;

        // Ancla de idempotencia del despacho.
        if state
            .courier_repository
            .find_active_task_for_barcode(barcode_id)
            .await?
            .is_some()
        {
            debug!("♻️  [DISPATCH_DEDUP]: Barcode [{}] already carries a live task.", barcode_id);
            return Ok(());
        }

        let delivery_target = OpCode::parse(recipient_op_code)?;

        // El repositorio entrega el ranking; el dominio lo re-certifica.
        let ranked_candidates = state
            .courier_repository
            .fetch_ranked_candidates(&delivery_target)
            .await?;
        let chosen_courier = select_best_candidate(ranked_candidates, &delivery_target);

        let reward_points = match state.credit_repository.find_rule("courier_delivery").await? {
            Some(rule) if rule.base_points > 0 => rule.base_points,
            _ => DEFAULT_REWARD_POINTS,
        };

        let priority = if is_urgent {
            TaskPriority::Urgent
        } else {
            TaskPriority::Normal
        };

        state
            .courier_repository
            .create_task(
                barcode_id,
                letter_id,
                None,
                &delivery_target,
                priority,
                reward_points,
                None,
                chosen_courier.as_ref(),
            )
            .await?;

        Ok(())
    }

    /**
     * DAEMON DE HUÉRFANAS: re-evalúa la asignación cada intervalo de
     * reasignación y escala al prefijo padre tras la ventana sellada.
     */
    pub fn spawn_orphan_shepherd(self) {
        let reassignment_interval =
            self.application_state.config.courier_reassignment_interval_seconds;
        let escalation_timeout_hours =
            self.application_state.config.courier_escalation_timeout_hours;

        tokio::spawn(async move {
            info!(
                "🐑 [ORPHAN_SHEPHERD]: Reassignment loop online ({}s cadence, {}h escalation).",
                reassignment_interval, escalation_timeout_hours
            );
            let mut shepherd_ticker = interval(Duration::from_secs(reassignment_interval));

            loop {
                shepherd_ticker.tick().await;

                if let Err(cycle_fault) = self.run_reassignment_cycle(escalation_timeout_hours).await {
                    error!("❌ [SHEPHERD_FAULT]: Reassignment cycle failed: {}", cycle_fault);
                }
            }
        });
    }

    /// Un ciclo de re-evaluación; también invocable por el handler
    /// 'courier.unassigned_retry' de la cola de retardo.
    #[instrument(skip(self))]
    pub async fn run_reassignment_cycle(&self, escalation_timeout_hours: i64) -> anyhow::Result<()> {
        let state = &self.application_state;
        let now = Utc::now();

        let orphan_tasks = state
            .courier_repository
            .fetch_unassigned_tasks(ORPHAN_BATCH_SIZE)
            .await?;

        for orphan_task in orphan_tasks {
            let delivery_target = OpCode::parse(&orphan_task.delivery_op_code)?;

            // 1. REINTENTO DE ASIGNACIÓN con el ranking vigente.
            let ranked_candidates = state
                .courier_repository
                .fetch_ranked_candidates(&delivery_target)
                .await?;
            if let Some(candidate) = select_best_candidate(ranked_candidates, &delivery_target) {
                if state
                    .courier_repository
                    .assign_task(&orphan_task.id, &candidate)
                    .await?
                {
                    continue;
                }
            }

            // 2. ESCALADA: la ventana corre desde la última escalada
            // (o desde la creación si aún no hubo ninguna).
            let escalation_anchor = orphan_task.escalated_at.unwrap_or(orphan_task.created_at);
            if !is_escalation_due(escalation_anchor, escalation_timeout_hours, now) {
                continue;
            }

            let current_prefix = orphan_task
                .escalation_prefix
                .clone()
                .unwrap_or_else(|| orphan_task.delivery_op_code.clone());

            match escalation_step(&current_prefix) {
                Some(parent_prefix) => {
                    state
                        .courier_repository
                        .escalate_task(&orphan_task.id, &parent_prefix, now)
                        .await?;
                }
                None => {
                    // Cúspide alcanzada: la tarea permanece visible a los
                    // admins de ciudad en cada ciclo.
                    warn!(
                        "🏔️  [SHEPHERD_APEX]: Task [{}] already escalated city-wide.",
                        orphan_task.id
                    );
                }
            }
        }

        Ok(())
    }
}
