// [apps/orchestrator/src/services/delay_handlers.rs]
/*!
 * =================================================================
 * APARATO: DELAY TASK HANDLERS (V6.0 - CLOUD LETTER FORGE)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: HANDLERS REGISTRADOS DE LA COLA DE RETARDO
 *
 * El conjunto núcleo: ai.reply (carta en la nube), ai.match
 * (emparejamiento), courier.unassigned_retry (re-asignación) y
 * barcode.expire_sweep (barrido de TTL). Cada handler decodifica su
 * propio payload tipado del blob opaco del registro.
 * =================================================================
 */

use crate::services::ai_router::{AiRouterService, GenerateDirective};
use crate::services::courier_dispatch::CourierDispatchService;
use crate::services::delay_queue::{DelayHandlerFn, HandlerFuture, HandlerRegistry};
use crate::state::AppState;
use chrono::Utc;
use estafeta_domain_ai_cortex::persona::forge_reply_prompt;
use estafeta_domain_models::ai::AiTaskType;
use estafeta_domain_models::delay::{DelayRecord, DelayTaskKind};
use estafeta_domain_models::faults::CoreFault;
use estafeta_domain_models::identity::{ActorContext, UserRole};
use estafeta_domain_models::letter::LetterVisibility;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Construye el registro con el conjunto núcleo de handlers.
pub fn build_core_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(DelayTaskKind::AiReply, ai_reply_handler as DelayHandlerFn);
    registry.register(DelayTaskKind::AiMatch, ai_match_handler as DelayHandlerFn);
    registry.register(
        DelayTaskKind::CourierUnassignedRetry,
        courier_retry_handler as DelayHandlerFn,
    );
    registry.register(
        DelayTaskKind::BarcodeExpireSweep,
        expire_sweep_handler as DelayHandlerFn,
    );
    registry
}

/// Actor de sistema con autoridad universal para el bind de respuestas.
fn system_postman_actor() -> ActorContext {
    ActorContext {
        user_id: "system.ai_postman".to_string(),
        role: UserRole::PlatformAdmin,
        school_code: "00".to_string(),
        managed_prefix: None,
    }
}

// --- HANDLER 1: ai.reply (CARTA EN LA NUBE) ---

#[derive(Debug, Deserialize)]
struct AiReplyPayload {
    original_letter_id: String,
    requester_user_id: String,
    persona: String,
    #[serde(default)]
    pinned_provider: Option<String>,
}

/**
 * Materializa la respuesta diferida: resuelve la carta original,
 * invoca el enrutador IA con la persona, crea la carta de respuesta,
 * la vincula a un barcode nuevo y acredita 'ai_interaction'.
 */
pub fn ai_reply_handler(state: AppState, record: DelayRecord) -> HandlerFuture {
    Box::pin(async move {
        let payload: AiReplyPayload = serde_json::from_value(record.payload.clone())
            .map_err(|decode_fault| {
                CoreFault::InvalidInput(format!("AI_REPLY_PAYLOAD_DRIFT: {}", decode_fault))
            })?;

        run_ai_reply(&state, &record, payload).await
    })
}

#[instrument(skip(state, record, payload), fields(record_id = %record.id))]
async fn run_ai_reply(
    state: &AppState,
    record: &DelayRecord,
    payload: AiReplyPayload,
) -> Result<serde_json::Value, CoreFault> {
    // 1. CARTA ORIGINAL Y DESTINO DEL SOLICITANTE
    let original_letter = state
        .letter_repository
        .find(&payload.original_letter_id)
        .await
        .map_err(CoreFault::from)?;

    let requester = state
        .user_repository
        .find(&payload.requester_user_id)
        .await
        .map_err(CoreFault::from)?;

    let delivery_op_code = requester.op_code.clone().ok_or_else(|| {
        CoreFault::InvalidInput(format!(
            "REQUESTER_WITHOUT_OP_CODE: {}",
            payload.requester_user_id
        ))
    })?;

    // 2. GENERACIÓN CON LA PERSONA SOLICITADA
    let router = AiRouterService::new(state.clone());
    let artifact = router
        .generate(GenerateDirective {
            task_type: AiTaskType::Reply,
            task_id: record.id.clone(),
            user_id: payload.requester_user_id.clone(),
            pinned_provider: payload.pinned_provider.clone(),
            prompt: forge_reply_prompt(&payload.persona, &original_letter.content),
            deadline: Duration::from_secs(state.config.ai_request_timeout_seconds * 2),
        })
        .await?;

    // 3. CARTA DE RESPUESTA (emite letter.created en su transacción)
    let reply_letter = state
        .letter_repository
        .create(
            &payload.requester_user_id,
            &format!("Re: {}", original_letter.title),
            &artifact.text,
            LetterVisibility::Private,
            false,
            None,
        )
        .await
        .map_err(CoreFault::from)?;

    // 4. BARCODE NUEVO + BIND (emite el evento de entrega)
    let postman = system_postman_actor();
    let barcode = state
        .barcode_repository
        .create(&format!("CLOUD-{}", Uuid::new_v4().simple()), None)
        .await
        .map_err(CoreFault::from)?;

    state
        .barcode_repository
        .bind(
            &barcode.id,
            &reply_letter.id,
            &format!("ENV-{}", Uuid::new_v4().simple()),
            &delivery_op_code,
            &postman,
        )
        .await
        .map_err(CoreFault::from)?;

    // 5. ACREDITACIÓN DE LA INTERACCIÓN IA
    state
        .credit_repository
        .award(
            &payload.requester_user_id,
            "ai_interaction",
            &record.id,
            requester.role,
            json!({ "reply_letter_id": reply_letter.id }),
            state.config.credit_max_attempts,
        )
        .await
        .map_err(CoreFault::from)?;

    info!(
        "☁️  [CLOUD_LETTER]: Reply [{}] forged via [{}] toward [{}].",
        reply_letter.id, artifact.provider_used, delivery_op_code
    );

    Ok(json!({
        "reply_letter_id": reply_letter.id,
        "barcode_id": barcode.id,
        "provider_used": artifact.provider_used,
        "total_tokens": artifact.total_tokens(),
    }))
}

// --- HANDLER 2: ai.match (EMPAREJAMIENTO DE PEN-PALS) ---

#[derive(Debug, Deserialize)]
struct AiMatchPayload {
    user_id: String,
}

/// Máximo de propuestas vivas por usuario antes de saltar el match.
const OPEN_MATCH_CEILING: u32 = 5;

pub fn ai_match_handler(state: AppState, record: DelayRecord) -> HandlerFuture {
    Box::pin(async move {
        let payload: AiMatchPayload = serde_json::from_value(record.payload.clone())
            .map_err(|decode_fault| {
                CoreFault::InvalidInput(format!("AI_MATCH_PAYLOAD_DRIFT: {}", decode_fault))
            })?;

        let requester = state
            .user_repository
            .find(&payload.user_id)
            .await
            .map_err(CoreFault::from)?;

        let open_matches = state
            .penpal_repository
            .count_open_matches(&payload.user_id)
            .await
            .map_err(CoreFault::from)?;
        if open_matches >= OPEN_MATCH_CEILING {
            warn!("🚧 [MATCH_CEILING]: [{}] already holds {} proposals.", payload.user_id, open_matches);
            return Ok(json!({ "matched": false, "reason": "open_match_ceiling" }));
        }

        // Candidatos de otra escuela; el primero sin propuesta viva gana.
        let candidates = state
            .user_repository
            .fetch_match_candidates(&payload.user_id, &requester.school_code, 10)
            .await
            .map_err(CoreFault::from)?;

        for candidate in candidates {
            let candidate_open = state
                .penpal_repository
                .count_open_matches(&candidate.id)
                .await
                .map_err(CoreFault::from)?;
            if candidate_open >= OPEN_MATCH_CEILING {
                continue;
            }

            // Afinidad base entre escuelas distintas; la curaduría fina
            // pertenece al colaborador de matching.
            let affinity_score = 0.75;
            let match_id = state
                .penpal_repository
                .record_match(&payload.user_id, &candidate.id, affinity_score)
                .await
                .map_err(CoreFault::from)?;

            return Ok(json!({
                "matched": true,
                "match_id": match_id,
                "candidate_user_id": candidate.id,
                "score": affinity_score,
            }));
        }

        Ok(json!({ "matched": false, "reason": "no_candidates" }))
    })
}

// --- HANDLER 3: courier.unassigned_retry ---

pub fn courier_retry_handler(state: AppState, _record: DelayRecord) -> HandlerFuture {
    Box::pin(async move {
        let escalation_timeout_hours = state.config.courier_escalation_timeout_hours;
        let dispatch = CourierDispatchService::new(state);

        dispatch
            .run_reassignment_cycle(escalation_timeout_hours)
            .await
            .map_err(|cycle_fault| CoreFault::Internal(cycle_fault.to_string()))?;

        Ok(json!({ "cycle": "completed" }))
    })
}

// --- HANDLER 4: barcode.expire_sweep ---

/// Ráfaga máxima del barrido disparado por la cola de retardo.
const SWEEP_BATCH_SIZE: i64 = 200;

pub fn expire_sweep_handler(state: AppState, _record: DelayRecord) -> HandlerFuture {
    Box::pin(async move {
        let expired_count = state
            .barcode_repository
            .expire_sweep(Utc::now(), SWEEP_BATCH_SIZE)
            .await
            .map_err(CoreFault::from)?;

        Ok(json!({ "expired": expired_count }))
    })
}
