// [tests/mirror/apps/orchestrator/services/courier_dispatch_flow.test.rs]
/**
 * =================================================================
 * APARATO: COURIER DISPATCH FLOW TEST (V2.0 - ORPHAN PIPELINE S2)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: TAREA HUÉRFANA → REINTENTO → ESCALADA → ADOPCIÓN
 * =================================================================
 */

use chrono::Utc;
use estafeta_domain_models::courier::{Courier, CourierStatus};
use estafeta_domain_models::identity::{User, UserRole};
use estafeta_infra_db::TursoClient;
use estafeta_orchestrator::config::EstafetaConfig;
use estafeta_orchestrator::services::CourierDispatchService;
use estafeta_orchestrator::state::AppState;

#[tokio::test]
async fn certify_unassignable_task_escalates_then_adopts() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing orphan pipeline (S2)...");

    let client = TursoClient::connect("file:dispatch_flow?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let state = AppState::new(client.clone(), EstafetaConfig::from_env());
    let dispatch = CourierDispatchService::new(state.clone());

    // 1. BIND SIN CARTERO ELEGIBLE: la tarea nace huérfana.
    dispatch
        .dispatch_for_bound_barcode("BC-S2", "QQ1234", Some("letter-s2"), false)
        .await
        .unwrap();

    let orphan = state
        .courier_repository
        .find_active_task_for_barcode("BC-S2")
        .await
        .unwrap()
        .expect("orphan task must exist");
    assert!(orphan.assigned_courier_id.is_none(), "L4_DISPATCH_FAULT: ghost assignment");

    // 2. RE-ENTREGA DEL BUS: el ancla por barcode impide la segunda tarea.
    dispatch
        .dispatch_for_bound_barcode("BC-S2", "QQ1234", Some("letter-s2"), false)
        .await
        .unwrap();
    let conn = client.get_connection().unwrap();
    let mut task_rows = conn
        .query("SELECT COUNT(*) FROM courier_tasks WHERE barcode_id = 'BC-S2'", ())
        .await
        .unwrap();
    let task_count: i64 = task_rows.next().await.unwrap().unwrap().get(0).unwrap();
    assert_eq!(task_count, 1, "L4_DISPATCH_FAULT: duplicate dispatch");

    // 3. CICLO CON VENTANA VENCIDA (0h): sin candidatos, escala al
    // prefijo padre y sella la notificación del nivel.
    dispatch.run_reassignment_cycle(0).await.unwrap();

    let escalated = state.courier_repository.find_task(&orphan.id).await.unwrap();
    assert_eq!(escalated.escalation_prefix.as_deref(), Some("QQ123"));
    assert!(escalated.escalated_at.is_some());

    let mut escalation_rows = conn
        .query("SELECT COUNT(*) FROM outbox WHERE topic = 'task.escalated'", ())
        .await
        .unwrap();
    let escalation_events: i64 = escalation_rows.next().await.unwrap().unwrap().get(0).unwrap();
    assert!(escalation_events >= 1, "L4_DISPATCH_FAULT: escalation not certified");

    // 4. ADOPCIÓN: aparece un cartero de ciudad y el siguiente ciclo
    // entrega la huérfana.
    let now = Utc::now();
    state
        .user_repository
        .create(&User {
            id: "late-city-user".into(),
            nickname: "Ciudad".into(),
            role: UserRole::CourierL4,
            school_code: "QQ".into(),
            op_code: None,
            created_at: now,
        })
        .await
        .unwrap();
    state
        .courier_repository
        .register(&Courier {
            id: "late-city".into(),
            user_id: "late-city-user".into(),
            level: 4,
            managed_prefix: String::new(),
            parent_courier_id: None,
            status: CourierStatus::Approved,
            current_task_count: 0,
            max_daily_tasks: 20,
            success_rate: 1.0,
            approved_at: Some(now),
            created_at: now,
        })
        .await
        .unwrap();

    dispatch.run_reassignment_cycle(24).await.unwrap();

    let adopted = state.courier_repository.find_task(&orphan.id).await.unwrap();
    assert_eq!(adopted.assigned_courier_id.as_deref(), Some("late-city"));

    let adopter = state.courier_repository.find("late-city").await.unwrap();
    assert_eq!(adopter.current_task_count, 1, "load reservation missing on adoption");

    println!("   ✅ [SUCCESS]: Orphan retry, escalation and adoption certified.");
}
