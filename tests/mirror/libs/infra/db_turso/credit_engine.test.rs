// [tests/mirror/libs/infra/db_turso/credit_engine.test.rs]
/**
 * =================================================================
 * APARATO: CREDIT ENGINE TEST (V4.0 - BALANCE CONSERVATION)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: TOPES POR VENTANA, IDEMPOTENCIA Y CONSERVACIÓN
 * =================================================================
 */

use estafeta_domain_models::credit::{CreditRule, CreditTaskStatus, RuleConstraints, SkipReason};
use estafeta_domain_models::identity::UserRole;
use estafeta_infra_db::repositories::CreditRepository;
use estafeta_infra_db::TursoClient;
use serde_json::json;

async fn seed_rule(repository: &CreditRepository, task_type: &str, points: i64, daily_cap: u32) {
    repository
        .upsert_rule(&CreditRule {
            task_type: task_type.into(),
            base_points: points,
            daily_cap,
            weekly_cap: 0,
            auto_execute: true,
            enabled: true,
            constraints: RuleConstraints::default(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn certify_daily_cap_five_letters_three_admitted() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing daily cap (5 awards, cap 3)...");

    let client = TursoClient::connect("file:credit_caps?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let credit_repository = CreditRepository::new(client.clone());
    seed_rule(&credit_repository, "letter_created", 10, 3).await;

    // 1. RÁFAGA: cinco cartas el mismo día.
    let mut admitted = 0u32;
    let mut skipped_by_cap = 0u32;
    for letter_index in 0..5 {
        let task = credit_repository
            .award(
                "user-cap",
                "letter_created",
                &format!("letter-{}", letter_index),
                UserRole::User,
                json!({}),
                3,
            )
            .await
            .unwrap();

        match task.status {
            CreditTaskStatus::Scheduled => admitted += 1,
            CreditTaskStatus::Skipped => {
                assert_eq!(task.skip_reason, Some(SkipReason::DailyLimit));
                skipped_by_cap += 1;
            }
            other => panic!("L3_CAP_FAULT: unexpected status {:?}", other),
        }
    }
    assert_eq!(admitted, 3, "L3_CAP_FAULT: cap overshoot");
    assert_eq!(skipped_by_cap, 2);

    // 2. EJECUCIÓN: las tres admitidas cristalizan el balance.
    let due_ids = credit_repository
        .fetch_due_task_ids(chrono::Utc::now(), 10)
        .await
        .unwrap();
    assert_eq!(due_ids.len(), 3);

    for task_id in &due_ids {
        assert!(credit_repository.begin_execution(task_id).await.unwrap());
        credit_repository.complete_execution(task_id).await.unwrap();
    }

    // 3. CONSERVACIÓN: earned subió exactamente 3 × 10 y
    // available + used == total.
    let balance = credit_repository.fetch_balance("user-cap").await.unwrap().unwrap();
    assert_eq!(balance.earned, 30, "L3_BALANCE_FAULT: earned drift");
    assert_eq!(balance.available + balance.used, balance.total, "conservation broken");
    assert_eq!(balance.total, 30);

    // 4. ASIENTOS: una transacción por tarea completada, con referencia.
    let conn = client.get_connection().unwrap();
    let mut tx_rows = conn
        .query(
            "SELECT COUNT(*) FROM credit_transactions WHERE user_id = 'user-cap'",
            (),
        )
        .await
        .unwrap();
    let transaction_count: i64 = tx_rows.next().await.unwrap().unwrap().get(0).unwrap();
    assert_eq!(transaction_count, 3);

    println!("   ✅ [SUCCESS]: Cap, execution and conservation certified.");
}

#[tokio::test]
async fn certify_award_idempotency_and_gate_cascade() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing award dedup + gates...");

    let client = TursoClient::connect("file:credit_gates?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let credit_repository = CreditRepository::new(client.clone());
    seed_rule(&credit_repository, "letter_delivered", 15, 0).await;

    // 1. IDEMPOTENCIA: la réplica devuelve la MISMA tarea.
    let first = credit_repository
        .award("user-idem", "letter_delivered", "barcode-7", UserRole::User, json!({}), 3)
        .await
        .unwrap();
    let replay = credit_repository
        .award("user-idem", "letter_delivered", "barcode-7", UserRole::User, json!({}), 3)
        .await
        .unwrap();
    assert_eq!(first.id, replay.id, "L3_DEDUP_FAULT: duplicate task forged");

    // A lo sumo una completada por (user, type, reference).
    assert!(credit_repository.begin_execution(&first.id).await.unwrap());
    credit_repository.complete_execution(&first.id).await.unwrap();
    let post_completion_replay = credit_repository
        .award("user-idem", "letter_delivered", "barcode-7", UserRole::User, json!({}), 3)
        .await
        .unwrap();
    assert_eq!(post_completion_replay.status, CreditTaskStatus::Completed);

    // 2. REGLA AUSENTE: sellado 'skipped' con razón.
    let unknown_rule = credit_repository
        .award("user-idem", "mystery_rule", "ref-1", UserRole::User, json!({}), 3)
        .await
        .unwrap();
    assert_eq!(unknown_rule.status, CreditTaskStatus::Skipped);
    assert_eq!(unknown_rule.skip_reason, Some(SkipReason::RuleDisabled));

    // 3. RESTRICCIÓN DE ROL: piso jerárquico filtra usuarios planos.
    credit_repository
        .upsert_rule(&CreditRule {
            task_type: "courier_delivery".into(),
            base_points: 20,
            daily_cap: 0,
            weekly_cap: 0,
            auto_execute: true,
            enabled: true,
            constraints: RuleConstraints {
                min_role_level: 2,
                ..RuleConstraints::default()
            },
        })
        .await
        .unwrap();

    let gated = credit_repository
        .award("user-idem", "courier_delivery", "task-1", UserRole::User, json!({}), 3)
        .await
        .unwrap();
    assert_eq!(gated.skip_reason, Some(SkipReason::ConstraintViolated));

    let courier_pass = credit_repository
        .award("courier-user", "courier_delivery", "task-2", UserRole::CourierL1, json!({}), 3)
        .await
        .unwrap();
    assert_eq!(courier_pass.status, CreditTaskStatus::Scheduled);

    println!("   ✅ [SUCCESS]: Dedup and gate cascade certified.");
}

#[tokio::test]
async fn certify_retry_exhaustion_path() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing failure ladder...");

    let client = TursoClient::connect("file:credit_retry?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let credit_repository = CreditRepository::new(client.clone());
    seed_rule(&credit_repository, "ai_interaction", 5, 0).await;

    let task = credit_repository
        .award("user-retry", "ai_interaction", "record-1", UserRole::User, json!({}), 2)
        .await
        .unwrap();

    // executing → failed (intento 1, re-programada con backoff).
    assert!(credit_repository.begin_execution(&task.id).await.unwrap());
    let after_first_failure = credit_repository
        .fail_execution(&task.id, "ledger hiccup", 1)
        .await
        .unwrap();
    assert_eq!(after_first_failure.status, CreditTaskStatus::Failed);
    assert_eq!(after_first_failure.attempts, 1);

    // failed → executing (reintento legal del grafo) → agotamiento.
    assert!(credit_repository.begin_execution(&task.id).await.unwrap());
    let exhausted = credit_repository
        .fail_execution(&task.id, "ledger hiccup again", 1)
        .await
        .unwrap();
    assert_eq!(exhausted.attempts, 2);
    assert!(exhausted.attempts <= exhausted.max_attempts);

    // Sin intentos restantes, el reclamo queda vedado por la guardia.
    assert!(!credit_repository.begin_execution(&task.id).await.unwrap());

    // El agotamiento quedó certificado en el Outbox.
    let conn = client.get_connection().unwrap();
    let mut outbox_rows = conn
        .query("SELECT COUNT(*) FROM outbox WHERE topic = 'credit.failed'", ())
        .await
        .unwrap();
    let failed_events: i64 = outbox_rows.next().await.unwrap().unwrap().get(0).unwrap();
    assert_eq!(failed_events, 1);

    println!("   ✅ [SUCCESS]: Retry ladder and terminal seal certified.");
}
