// [apps/orchestrator/src/services/event_bus.rs]
/*!
 * =================================================================
 * APARATO: OUTBOX EVENT BUS (V8.0 - AT-LEAST-ONCE BRIDGE)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: PUENTE DEL OUTBOX HACIA SUSCRIPTORES EN PROCESO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. OFFSET SOVEREIGNTY: Cada suscriptor (hub, créditos, despacho,
 *    métricas) avanza su propio offset sobre la secuencia monótona;
 *    el colapso de uno jamás frena a los demás.
 * 2. REPLAY SAFETY: La re-entrega tras un crash es segura porque cada
 *    consumidor es idempotente sobre (event_id, subscriber): el Award
 *    deduplica por referencia y el despacho ancla por barcode.
 * =================================================================
 */

use crate::services::courier_dispatch::CourierDispatchService;
use crate::state::AppState;
use estafeta_domain_models::outbox::{OutboxEvent, OutboxTopic};
use estafeta_domain_models::realtime::{school_room, EventType, RealtimeFrame, ROOM_ADMINS, ROOM_COURIERS};
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

/// Suscriptores registrados sobre la secuencia del Outbox.
const SUBSCRIBER_HUB: &str = "hub_forwarder";
const SUBSCRIBER_CREDITS: &str = "credit_accrual";
const SUBSCRIBER_DISPATCH: &str = "courier_dispatch";
const SUBSCRIBER_METRICS: &str = "bus_metrics";

/// Ráfaga máxima por drenado y cadencia del sondeo.
const DISPATCH_BATCH_SIZE: i64 = 64;
const POLL_INTERVAL_MS: u64 = 500;

pub struct EventBusService {
    application_state: AppState,
    dispatch_service: CourierDispatchService,
}

impl EventBusService {
    pub fn new(application_state: AppState) -> Self {
        let dispatch_service = CourierDispatchService::new(application_state.clone());
        Self {
            application_state,
            dispatch_service,
        }
    }

    /// Inicia el bucle perpetuo de drenado en el reactor de Tokio.
    pub fn spawn_dispatch_loop(self) {
        tokio::spawn(async move {
            info!("🚌 [EVENT_BUS]: Outbox bridge online ({} ms cadence).", POLL_INTERVAL_MS);
            let mut poll_ticker = interval(Duration::from_millis(POLL_INTERVAL_MS));

            loop {
                poll_ticker.tick().await;
                self.drain_once().await;
            }
        });
    }

    /**
     * Una pasada completa sobre todos los suscriptores. El colapso de
     * uno jamás frena a los demás (cada cual retoma desde su offset).
     */
    pub async fn drain_once(&self) {
        for subscriber_id in [
            SUBSCRIBER_HUB,
            SUBSCRIBER_CREDITS,
            SUBSCRIBER_DISPATCH,
            SUBSCRIBER_METRICS,
        ] {
            if let Err(drain_fault) = self.drain_subscriber(subscriber_id).await {
                error!("❌ [BUS_FAULT]: Subscriber [{}] drain failed: {}", subscriber_id, drain_fault);
            }
        }
    }

    /**
     * Drena la ráfaga pendiente de UN suscriptor, comprometiendo su
     * offset evento a evento (at-least-once ante cualquier colapso).
     */
    #[instrument(skip(self))]
    async fn drain_subscriber(&self, subscriber_id: &str) -> anyhow::Result<()> {
        let pending_events = self
            .application_state
            .outbox_repository
            .fetch_after(subscriber_id, DISPATCH_BATCH_SIZE)
            .await?;

        for event in pending_events {
            let process_result = match subscriber_id {
                SUBSCRIBER_HUB => self.forward_to_hub(&event),
                SUBSCRIBER_CREDITS => self.accrue_credits(&event).await,
                SUBSCRIBER_DISPATCH => self.drive_dispatch(&event).await,
                SUBSCRIBER_METRICS => {
                    self.application_state.bus_metrics.increment(event.topic.as_str());
                    Ok(())
                }
                unknown => {
                    warn!("🕳️  [BUS_UNKNOWN]: Subscriber [{}] has no handler.", unknown);
                    Ok(())
                }
            };

            match process_result {
                Ok(()) => {
                    self.application_state
                        .outbox_repository
                        .commit_offset(subscriber_id, event.event_id)
                        .await?;
                }
                Err(process_fault) => {
                    // El offset NO avanza: el evento re-entra al próximo tick.
                    warn!(
                        "🔁 [BUS_RETRY]: Event #{} held for [{}]: {}",
                        event.event_id, subscriber_id, process_fault
                    );
                    break;
                }
            }
        }

        Ok(())
    }

    // --- SUSCRIPTOR 1: REENVÍO AL HUB REALTIME ---

    fn forward_to_hub(&self, event: &OutboxEvent) -> anyhow::Result<()> {
        let frame = match event.topic {
            OutboxTopic::LetterStatusUpdate => {
                let mut frame =
                    RealtimeFrame::new(EventType::LetterStatusUpdate, event.payload.clone());
                // Sala de escuela derivada del segmento escolar del destino.
                frame = match event.payload["recipient_op_code"].as_str() {
                    Some(op_code) if op_code.len() >= 2 => frame.for_room(school_room(&op_code[..2])),
                    _ => frame,
                };
                frame
            }
            OutboxTopic::NewTaskAssignment => {
                let mut frame =
                    RealtimeFrame::new(EventType::NewTaskAssignment, event.payload.clone());
                if let Some(courier_user_id) = event.payload["courier_user_id"].as_str() {
                    frame = frame.for_user(courier_user_id);
                }
                frame
            }
            OutboxTopic::TaskStatusUpdate => {
                RealtimeFrame::new(EventType::TaskStatusUpdate, event.payload.clone())
                    .for_room(ROOM_COURIERS)
            }
            OutboxTopic::TaskEscalated
            | OutboxTopic::CreditTaskFailed
            | OutboxTopic::ModerationFlagged => {
                RealtimeFrame::new(EventType::Notification, event.payload.clone())
                    .for_room(ROOM_ADMINS)
            }
            OutboxTopic::CreditTaskCompleted | OutboxTopic::LetterCreated => {
                let target_user = event.payload["user_id"]
                    .as_str()
                    .or_else(|| event.payload["author_user_id"].as_str());
                let frame = RealtimeFrame::new(EventType::Notification, event.payload.clone());
                match target_user {
                    Some(user_id) => frame.for_user(user_id),
                    None => frame,
                }
            }
            OutboxTopic::Notification => {
                RealtimeFrame::new(EventType::Notification, event.payload.clone())
            }
        };

        self.application_state.hub.publish(frame);
        Ok(())
    }

    // --- SUSCRIPTOR 2: ACUMULACIÓN DE CRÉDITOS ---

    /**
     * Mapea eventos del ciclo postal a intenciones de Award. Las
     * referencias elegidas (barcode, tarea, carta) hacen cada Award
     * idempotente ante la re-entrega del bus.
     */
    async fn accrue_credits(&self, event: &OutboxEvent) -> anyhow::Result<()> {
        let state = &self.application_state;
        let max_attempts = state.config.credit_max_attempts;

        match event.topic {
            OutboxTopic::LetterStatusUpdate
                if event.payload["new_status"].as_str() == Some("delivered") =>
            {
                let Some(letter_id) = event.payload["letter_id"].as_str() else {
                    return Ok(());
                };
                let Some(barcode_id) = event.payload["barcode_id"].as_str() else {
                    return Ok(());
                };

                let letter = state.letter_repository.find(letter_id).await?;
                let author = state.user_repository.find(&letter.author_user_id).await?;

                state
                    .credit_repository
                    .award(
                        &author.id,
                        "letter_delivered",
                        barcode_id,
                        author.role,
                        serde_json::json!({ "letter_id": letter_id }),
                        max_attempts,
                    )
                    .await?;
            }
            OutboxTopic::TaskStatusUpdate
                if event.payload["new_status"].as_str() == Some("delivered") =>
            {
                let (Some(task_id), Some(courier_id)) = (
                    event.payload["task_id"].as_str(),
                    event.payload["courier_id"].as_str(),
                ) else {
                    return Ok(());
                };

                let courier = state.courier_repository.find(courier_id).await?;
                let courier_user = state.user_repository.find(&courier.user_id).await?;

                state
                    .credit_repository
                    .award(
                        &courier_user.id,
                        "courier_delivery",
                        task_id,
                        courier_user.role,
                        serde_json::json!({ "courier_id": courier_id }),
                        max_attempts,
                    )
                    .await?;
            }
            OutboxTopic::LetterCreated => {
                let (Some(letter_id), Some(author_user_id)) = (
                    event.payload["letter_id"].as_str(),
                    event.payload["author_user_id"].as_str(),
                ) else {
                    return Ok(());
                };

                let author = state.user_repository.find(author_user_id).await?;
                state
                    .credit_repository
                    .award(
                        author_user_id,
                        "letter_created",
                        letter_id,
                        author.role,
                        serde_json::json!({}),
                        max_attempts,
                    )
                    .await?;
            }
            _ => {}
        }

        Ok(())
    }

    // --- SUSCRIPTOR 3: DESPACHO DE CARTEROS ---

    /// El bind (unactivated → bound) dispara la asignación de tarea.
    async fn drive_dispatch(&self, event: &OutboxEvent) -> anyhow::Result<()> {
        if event.topic != OutboxTopic::LetterStatusUpdate
            || event.payload["new_status"].as_str() != Some("bound")
        {
            return Ok(());
        }

        let (Some(barcode_id), Some(recipient_op_code)) = (
            event.payload["barcode_id"].as_str(),
            event.payload["recipient_op_code"].as_str(),
        ) else {
            return Ok(());
        };

        let is_urgent = event.payload["is_urgent"].as_bool().unwrap_or(false);
        let letter_id = event.payload["letter_id"].as_str();

        self.dispatch_service
            .dispatch_for_bound_barcode(barcode_id, recipient_op_code, letter_id, is_urgent)
            .await?;

        debug!("🚦 [BUS_DISPATCH]: Bind of [{}] routed to courier dispatch.", barcode_id);
        Ok(())
    }
}
