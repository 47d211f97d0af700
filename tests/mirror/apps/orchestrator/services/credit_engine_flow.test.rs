// [tests/mirror/apps/orchestrator/services/credit_engine_flow.test.rs]
/**
 * =================================================================
 * APARATO: CREDIT ENGINE FLOW TEST (V2.0 - SERIAL EXECUTION)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: AWARD → WORKER → BALANCE, EN SERIE POR USUARIO
 * =================================================================
 */

use chrono::Utc;
use estafeta_domain_models::credit::{CreditRule, CreditTaskStatus, RuleConstraints};
use estafeta_domain_models::identity::{User, UserRole};
use estafeta_infra_db::TursoClient;
use estafeta_orchestrator::config::EstafetaConfig;
use estafeta_orchestrator::services::CreditEngineService;
use estafeta_orchestrator::state::AppState;
use serde_json::json;

#[tokio::test]
async fn certify_award_to_balance_through_worker() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing engine award → execution flow...");

    let client = TursoClient::connect("file:engine_flow?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let state = AppState::new(client, EstafetaConfig::from_env());

    state
        .user_repository
        .create(&User {
            id: "flow-user".into(),
            nickname: "Rin".into(),
            role: UserRole::User,
            school_code: "PK".into(),
            op_code: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    state
        .credit_repository
        .upsert_rule(&CreditRule {
            task_type: "letter_created".into(),
            base_points: 10,
            daily_cap: 0,
            weekly_cap: 0,
            auto_execute: true,
            enabled: true,
            constraints: RuleConstraints::default(),
        })
        .await
        .unwrap();

    let engine = CreditEngineService::new(state.clone());

    // 1. AWARD: la fachada resuelve el rol contra el Ledger.
    let staged = engine
        .award("flow-user", "letter_created", "letter-flow-1", json!({}))
        .await
        .unwrap();
    assert_eq!(staged.status, CreditTaskStatus::Scheduled);

    // 2. WORKER: un ciclo reclama y sella bajo el mutex del usuario.
    engine.run_execution_cycle().await.unwrap();

    let sealed = state.credit_repository.find_task(&staged.id).await.unwrap();
    assert_eq!(sealed.status, CreditTaskStatus::Completed);
    assert!(sealed.completed_at.is_some());

    // 3. BALANCE: conservación y nivel derivado.
    let balance = state.credit_repository.fetch_balance("flow-user").await.unwrap().unwrap();
    assert_eq!(balance.earned, 10);
    assert_eq!(balance.available + balance.used, balance.total);
    assert_eq!(balance.level, 1);

    // 4. IDEMPOTENCIA EXTREMO A EXTREMO: replay del mismo Award tras
    // la ejecución devuelve la tarea completada, sin re-acreditar.
    let replay = engine
        .award("flow-user", "letter_created", "letter-flow-1", json!({}))
        .await
        .unwrap();
    assert_eq!(replay.id, staged.id);

    engine.run_execution_cycle().await.unwrap();
    let balance_after_replay =
        state.credit_repository.fetch_balance("flow-user").await.unwrap().unwrap();
    assert_eq!(balance_after_replay.earned, 10, "L4_ENGINE_FAULT: replay double-credited");

    println!("   ✅ [SUCCESS]: Award-to-balance pipeline certified.");
}

#[tokio::test]
async fn certify_parallel_users_serial_within_user() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing per-user serialization...");

    let client = TursoClient::connect("file:engine_serial?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let state = AppState::new(client, EstafetaConfig::from_env());

    state
        .credit_repository
        .upsert_rule(&CreditRule {
            task_type: "letter_delivered".into(),
            base_points: 15,
            daily_cap: 0,
            weekly_cap: 0,
            auto_execute: true,
            enabled: true,
            constraints: RuleConstraints::default(),
        })
        .await
        .unwrap();

    let engine = CreditEngineService::new(state.clone());

    // Dos usuarios, tres tareas cada uno.
    for user_index in 0..2 {
        for reference_index in 0..3 {
            engine
                .award(
                    &format!("serial-user-{}", user_index),
                    "letter_delivered",
                    &format!("bc-{}-{}", user_index, reference_index),
                    json!({}),
                )
                .await
                .unwrap();
        }
    }

    // Ciclos hasta drenar la cola (ráfaga de 16 cubre las 6).
    engine.run_execution_cycle().await.unwrap();

    for user_index in 0..2 {
        let balance = state
            .credit_repository
            .fetch_balance(&format!("serial-user-{}", user_index))
            .await
            .unwrap()
            .unwrap();
        // La serialización por usuario preserva la suma exacta.
        assert_eq!(balance.earned, 45, "L4_ENGINE_FAULT: interleaved execution drifted");
        assert_eq!(balance.available + balance.used, balance.total);
    }

    println!("   ✅ [SUCCESS]: Per-user serial, cross-user parallel certified.");
}
