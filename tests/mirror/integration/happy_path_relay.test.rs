// [tests/mirror/integration/happy_path_relay.test.rs]
/**
 * =================================================================
 * APARATO: HAPPY PATH RELAY TEST (V3.0 - SCENARIO S1)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO INTEGRATION-MIRROR
 * RESPONSABILIDAD: CARTA → BIND → PICKUP → DELIVERY, EXTREMO A EXTREMO
 *
 * Certifica la cadena completa: diario de escaneos, despacho del
 * cartero, multidifusión realtime y acreditación de puntos para el
 * autor y el cartero.
 * =================================================================
 */

use chrono::Utc;
use estafeta_domain_models::barcode::{BarcodeStatus, ScanType};
use estafeta_domain_models::courier::{Courier, CourierStatus, TaskStatus};
use estafeta_domain_models::credit::{CreditRule, RuleConstraints};
use estafeta_domain_models::identity::{ActorContext, User, UserRole};
use estafeta_domain_models::letter::LetterVisibility;
use estafeta_domain_models::opcode::OpCode;
use estafeta_domain_models::realtime::EventType;
use estafeta_infra_db::TursoClient;
use estafeta_orchestrator::config::EstafetaConfig;
use estafeta_orchestrator::services::{CreditEngineService, EventBusService};
use estafeta_orchestrator::state::AppState;
use serde_json::json;
use std::time::Duration;

async fn seed_rule(state: &AppState, task_type: &str, points: i64, daily_cap: u32, min_level: u8) {
    state
        .credit_repository
        .upsert_rule(&CreditRule {
            task_type: task_type.into(),
            base_points: points,
            daily_cap,
            weekly_cap: 0,
            auto_execute: true,
            enabled: true,
            constraints: RuleConstraints {
                min_role_level: min_level,
                ..RuleConstraints::default()
            },
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn certify_scenario_s1_full_relay() {
    println!("\n🧪 [PROVING_GROUNDS]: Running Scenario S1 end to end...");

    let client = TursoClient::connect("file:happy_path?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let state = AppState::new(client, EstafetaConfig::from_env());
    let now = Utc::now();

    // --- 1. SETUP: POBLACIÓN DEL CAMPUS 'PK' ---
    state
        .user_repository
        .create(&User {
            id: "s1-author".into(),
            nickname: "Ana".into(),
            role: UserRole::User,
            school_code: "PK".into(),
            op_code: OpCode::parse("PK5F1A").ok(),
            created_at: now,
        })
        .await
        .unwrap();
    state
        .user_repository
        .create(&User {
            id: "s1-courier-user".into(),
            nickname: "Kai".into(),
            role: UserRole::CourierL2,
            school_code: "PK".into(),
            op_code: None,
            created_at: now,
        })
        .await
        .unwrap();
    state
        .courier_repository
        .register(&Courier {
            id: "s1-courier".into(),
            user_id: "s1-courier-user".into(),
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

    seed_rule(&state, "letter_created", 10, 3, 0).await;
    seed_rule(&state, "letter_delivered", 15, 0, 0).await;
    seed_rule(&state, "courier_delivery", 20, 0, 2).await;

    // Conexiones realtime asentadas ANTES del tráfico.
    let author_seat = state.hub.register("s1-author", UserRole::User, "PK");
    let courier_seat = state.hub.register("s1-courier-user", UserRole::CourierL2, "PK");

    let bus = EventBusService::new(state.clone());
    let engine = CreditEngineService::new(state.clone());

    let courier_actor = ActorContext {
        user_id: "s1-courier-user".into(),
        role: UserRole::CourierL2,
        school_code: "PK".into(),
        managed_prefix: Some(String::new()),
    };

    // --- 2. CARTA + BIND HACIA 'PK5F3D' ---
    let letter = state
        .letter_repository
        .create("s1-author", "Primavera", "Querido amigo...", LetterVisibility::Private, false, None)
        .await
        .unwrap();
    let barcode = state.barcode_repository.create("BC-S1", None).await.unwrap();
    let recipient = OpCode::parse("PK5F3D").unwrap();

    state
        .barcode_repository
        .bind(&barcode.id, &letter.id, "ENV-S1", &recipient, &courier_actor)
        .await
        .unwrap();

    bus.drain_once().await;

    // El despacho asignó al cartero cuyo prefijo cubre el destino.
    let task = state
        .courier_repository
        .find_active_task_for_barcode(&barcode.id)
        .await
        .unwrap()
        .expect("assignment must exist");
    assert_eq!(task.assigned_courier_id.as_deref(), Some("s1-courier"));

    // --- 3. RELEVO FÍSICO: pickup → delivery ---
    state
        .barcode_repository
        .scan(&barcode.id, &courier_actor, ScanType::Pickup, Some("PK5F00".into()), json!({}))
        .await
        .unwrap();
    let delivery = state
        .barcode_repository
        .scan(&barcode.id, &courier_actor, ScanType::Delivery, Some("PK5F3D".into()), json!({}))
        .await
        .unwrap();
    assert_eq!(delivery.barcode_status, BarcodeStatus::Delivered);

    // Dos pasadas del bus: eventos primarios + derivados.
    bus.drain_once().await;
    bus.drain_once().await;
    engine.run_execution_cycle().await.unwrap();

    // --- 4. CERTIFICACIONES ---

    // a) Diario: exactamente 3 ScanEvents (bind, pickup, delivery).
    let trace = state.barcode_repository.get_trace(&barcode.id).await.unwrap();
    assert_eq!(trace.len(), 3, "S1_FAULT: journal drift");
    assert!(trace.iter().all(|event| event.old_status != event.new_status));

    // b) Tarea sellada como entregada por los escaneos, jamás a mano.
    let delivered_task = state.courier_repository.find_task(&task.id).await.unwrap();
    assert_eq!(delivered_task.status, TaskStatus::Delivered);

    // c) Realtime: el autor observó las 3 actualizaciones de estado.
    let mut author_status_updates = 0;
    while let Ok(Some(frame)) =
        tokio::time::timeout(Duration::from_millis(100), author_seat.buffer.pop_wait()).await
    {
        if frame.event_type == EventType::LetterStatusUpdate {
            author_status_updates += 1;
        }
    }
    assert_eq!(author_status_updates, 3, "S1_FAULT: realtime fan-out drift");

    // El cartero recibió su asignación.
    let mut courier_saw_assignment = false;
    while let Ok(Some(frame)) =
        tokio::time::timeout(Duration::from_millis(100), courier_seat.buffer.pop_wait()).await
    {
        if frame.event_type == EventType::NewTaskAssignment {
            courier_saw_assignment = true;
        }
    }
    assert!(courier_saw_assignment, "S1_FAULT: assignment frame missing");

    // d) Créditos: autor (carta creada + entregada) y cartero (entrega)
    // con ambas tareas completadas y balances conservados.
    let author_balance = state.credit_repository.fetch_balance("s1-author").await.unwrap().unwrap();
    assert_eq!(author_balance.earned, 25, "S1_FAULT: author credits drift (10 + 15)");
    assert_eq!(author_balance.available, 25);
    assert_eq!(author_balance.available + author_balance.used, author_balance.total);

    let courier_balance = state
        .credit_repository
        .fetch_balance("s1-courier-user")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(courier_balance.earned, 20, "S1_FAULT: courier credits drift");
    assert_eq!(courier_balance.available, 20);

    println!("   ✅ [SUCCESS]: Scenario S1 certified end to end.");
}
