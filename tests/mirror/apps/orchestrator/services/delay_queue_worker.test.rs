// [tests/mirror/apps/orchestrator/services/delay_queue_worker.test.rs]
/**
 * =================================================================
 * APARATO: DELAY WORKER TEST (V2.0 - REGISTRY EXECUTION)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: RECLAMO → HANDLER REGISTRADO → SELLADO
 * =================================================================
 */

use chrono::{Duration, Utc};
use estafeta_domain_models::barcode::BarcodeStatus;
use estafeta_domain_models::delay::{DelayStatus, DelayTaskKind};
use estafeta_infra_db::TursoClient;
use estafeta_orchestrator::config::EstafetaConfig;
use estafeta_orchestrator::services::delay_handlers::build_core_registry;
use estafeta_orchestrator::state::AppState;
use serde_json::json;

#[tokio::test]
async fn certify_expire_sweep_handler_through_registry() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing registry-driven sweep...");

    let client = TursoClient::connect("file:worker_sweep?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let state = AppState::new(client, EstafetaConfig::from_env());

    // Un token con TTL ya vencido espera al barrido.
    let stale_barcode = state.barcode_repository.create("BC-STALE", Some(0)).await.unwrap();

    // 1. ENCOLADO: el barrido viaja como tarea diferida del núcleo.
    let record = state
        .delay_repository
        .enqueue(
            DelayTaskKind::BarcodeExpireSweep,
            json!({}),
            Utc::now() - Duration::seconds(1),
            3,
        )
        .await
        .unwrap();

    // 2. RECLAMO DEL WORKER bajo arrendamiento.
    let claimed = state
        .delay_repository
        .claim_next(Utc::now(), 60)
        .await
        .unwrap()
        .expect("due record must be claimable");
    assert_eq!(claimed.id, record.id);

    // 3. EJECUCIÓN VÍA REGISTRO EXPLÍCITO (taskType → func).
    let registry = build_core_registry();
    let handler = registry
        .resolve(DelayTaskKind::BarcodeExpireSweep)
        .expect("core handler must be registered");
    let result_metadata = handler(state.clone(), claimed.clone()).await.unwrap();
    assert_eq!(result_metadata["expired"], 1);

    // 4. SELLADO: processing → completed con el resultado.
    state.delay_repository.complete(&record.id, result_metadata).await.unwrap();
    let sealed = state.delay_repository.find(&record.id).await.unwrap();
    assert_eq!(sealed.status, DelayStatus::Completed);

    let swept = state.barcode_repository.find(&stale_barcode.id).await.unwrap();
    assert_eq!(swept.status, BarcodeStatus::Expired);

    println!("   ✅ [SUCCESS]: Registry, claim and seal pipeline certified.");
}

#[tokio::test]
async fn certify_unknown_payload_is_terminal_not_retried() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing terminal failure policy...");

    let client = TursoClient::connect("file:worker_terminal?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let state = AppState::new(client, EstafetaConfig::from_env());

    // Payload malformado para 'ai.reply': el handler decodifica y
    // rechaza con InvalidInput (no transitorio, jamás reintentar).
    let record = state
        .delay_repository
        .enqueue(
            DelayTaskKind::AiReply,
            json!({ "garbage": true }),
            Utc::now() - Duration::seconds(1),
            3,
        )
        .await
        .unwrap();

    let claimed = state.delay_repository.claim_next(Utc::now(), 60).await.unwrap().unwrap();

    let registry = build_core_registry();
    let handler = registry.resolve(DelayTaskKind::AiReply).unwrap();
    let handler_fault = handler(state.clone(), claimed).await.unwrap_err();
    assert!(!handler_fault.is_retryable(), "decode faults must be terminal");

    // El worker sella 'failed' terminal (política §faults).
    state
        .delay_repository
        .fail_terminal(&record.id, &handler_fault.to_string())
        .await
        .unwrap();
    let sealed = state.delay_repository.find(&record.id).await.unwrap();
    assert_eq!(sealed.status, DelayStatus::Failed);

    println!("   ✅ [SUCCESS]: Terminal policy certified.");
}
