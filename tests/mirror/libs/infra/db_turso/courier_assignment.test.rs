// [tests/mirror/libs/infra/db_turso/courier_assignment.test.rs]
/**
 * =================================================================
 * APARATO: COURIER ASSIGNMENT TEST (V3.0 - RANKING PARITY)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: EL ORDER BY DEL LEDGER IGUALA AL COMPARADOR L2
 * =================================================================
 */

use chrono::{TimeZone, Utc};
use estafeta_domain_courier::rank_candidates;
use estafeta_domain_models::courier::{Courier, CourierStatus, TaskPriority};
use estafeta_domain_models::identity::{ActorContext, UserRole};
use estafeta_domain_models::opcode::OpCode;
use estafeta_infra_db::repositories::CourierRepository;
use estafeta_infra_db::{DbError, TursoClient};

fn forge_courier(id: &str, level: u8, prefix: &str, parent: Option<&str>, load: u32, rate: f64, approved_day: u32) -> Courier {
    Courier {
        id: id.to_string(),
        user_id: format!("user-{}", id),
        level,
        managed_prefix: prefix.to_string(),
        parent_courier_id: parent.map(|p| p.to_string()),
        status: CourierStatus::Approved,
        current_task_count: load,
        max_daily_tasks: 10,
        success_rate: rate,
        approved_at: Some(Utc.with_ymd_and_hms(2026, 1, approved_day, 9, 0, 0).unwrap()),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn certify_sql_ranking_matches_domain_comparator() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing SQL/domain ranking parity...");

    let client = TursoClient::connect("file:courier_rank?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let courier_repository = CourierRepository::new(client.clone());

    // Árbol de cuatro niveles sobre la escuela 'PK'.
    let fleet = vec![
        forge_courier("city", 4, "", None, 2, 0.9, 1),
        forge_courier("school", 3, "PK", Some("city"), 1, 0.8, 2),
        forge_courier("zone-busy", 2, "PK5F", Some("school"), 7, 0.99, 3),
        forge_courier("zone-idle", 2, "PK5F", Some("school"), 1, 0.70, 4),
        forge_courier("point", 1, "PK5F3D", Some("zone-idle"), 9, 0.50, 5),
    ];
    for courier in &fleet {
        courier_repository.register(courier).await.unwrap();
    }

    let target = OpCode::parse("PK5F3D").unwrap();

    // 1. PARIDAD: el ORDER BY del Ledger y el comparador L2 coinciden.
    let sql_ranked = courier_repository.fetch_ranked_candidates(&target).await.unwrap();
    let domain_ranked = rank_candidates(fleet.clone(), &target);

    let sql_order: Vec<&str> = sql_ranked.iter().map(|c| c.id.as_str()).collect();
    let domain_order: Vec<&str> = domain_ranked.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(sql_order, domain_order, "L3_RANKING_FAULT: SQL/domain drift");

    // El punto (prefijo completo) encabeza pese a su carga.
    assert_eq!(sql_order.first().copied(), Some("point"));

    // 2. ASIGNACIÓN: reserva de carga + evento de asignación sellado.
    let chosen = sql_ranked.first().unwrap();
    let task = courier_repository
        .create_task(
            "BC-RANK-1",
            Some("letter-1"),
            None,
            &target,
            TaskPriority::Urgent,
            20,
            None,
            Some(chosen),
        )
        .await
        .unwrap();

    assert_eq!(task.assigned_courier_id.as_deref(), Some("point"));
    assert_eq!(task.priority, TaskPriority::Urgent);

    let reloaded = courier_repository.find("point").await.unwrap();
    assert_eq!(reloaded.current_task_count, 10, "load reservation missing");

    // 3. INVARIANTE DE AUTORIDAD: el prefijo del asignado es prefijo
    // del OP Code de entrega.
    assert!(task.delivery_op_code.starts_with(&chosen.managed_prefix));

    let conn = client.get_connection().unwrap();
    let mut outbox_rows = conn
        .query("SELECT COUNT(*) FROM outbox WHERE topic = 'task.assignment'", ())
        .await
        .unwrap();
    let assignment_events: i64 = outbox_rows.next().await.unwrap().unwrap().get(0).unwrap();
    assert_eq!(assignment_events, 1);

    println!("   ✅ [SUCCESS]: Ranking parity and load reservation certified.");
}

#[tokio::test]
async fn certify_orphan_task_and_escalation_ladder() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing orphan pipeline...");

    let client = TursoClient::connect("file:courier_orphan?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let courier_repository = CourierRepository::new(client.clone());

    // Destino sin cartero elegible: la tarea nace huérfana.
    let target = OpCode::parse("ZZ9999").unwrap();
    let orphan = courier_repository
        .create_task("BC-ORPHAN", None, None, &target, TaskPriority::Normal, 10, None, None)
        .await
        .unwrap();
    assert!(orphan.assigned_courier_id.is_none());

    let pending = courier_repository.fetch_unassigned_tasks(10).await.unwrap();
    assert_eq!(pending.len(), 1);

    // Escalada al prefijo padre con notificación sellada.
    let escalated = courier_repository
        .escalate_task(&orphan.id, "ZZ999", Utc::now())
        .await
        .unwrap();
    assert!(escalated);

    let reloaded = courier_repository.find_task(&orphan.id).await.unwrap();
    assert_eq!(reloaded.escalation_prefix.as_deref(), Some("ZZ999"));
    assert!(reloaded.escalated_at.is_some());

    let conn = client.get_connection().unwrap();
    let mut outbox_rows = conn
        .query("SELECT COUNT(*) FROM outbox WHERE topic = 'task.escalated'", ())
        .await
        .unwrap();
    let escalation_events: i64 = outbox_rows.next().await.unwrap().unwrap().get(0).unwrap();
    assert_eq!(escalation_events, 1);

    // Adopción tardía con guardia: registra un cartero y asigna.
    let adopter = forge_courier("late-city", 4, "", None, 0, 1.0, 6);
    courier_repository.register(&adopter).await.unwrap();
    assert!(courier_repository.assign_task(&orphan.id, &adopter).await.unwrap());

    // La guardia colapsa la doble adopción.
    assert!(!courier_repository.assign_task(&orphan.id, &adopter).await.unwrap());

    println!("   ✅ [SUCCESS]: Orphan retry, escalation and guarded adoption certified.");
}

#[tokio::test]
async fn certify_corps_governance_rules() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing promotion/approval governance...");

    let client = TursoClient::connect("file:courier_gov?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let courier_repository = CourierRepository::new(client.clone());

    // Árbol base: ciudad (L4) y escuela (L3) activos.
    courier_repository.register(&forge_courier("gov-city", 4, "", None, 0, 1.0, 1)).await.unwrap();
    courier_repository
        .register(&forge_courier("gov-school", 3, "PK", Some("gov-city"), 0, 1.0, 2))
        .await
        .unwrap();

    let school_actor = ActorContext {
        user_id: "user-gov-school".into(),
        role: UserRole::CourierL3,
        school_code: "PK".into(),
        managed_prefix: Some("PK".into()),
    };

    // 1. CREACIÓN: L3 crea L2 (N-1) pero jamás L1 (doble salto).
    let mut zone_applicant = forge_courier("gov-zone", 2, "PK5F", Some("gov-school"), 0, 1.0, 3);
    zone_applicant.status = CourierStatus::Pending;
    courier_repository
        .register_via_actor(&school_actor, &zone_applicant)
        .await
        .unwrap();

    let building_jump = forge_courier("gov-building", 1, "PK5F3D", Some("gov-zone"), 0, 1.0, 4);
    let jump_fault = courier_repository
        .register_via_actor(&school_actor, &building_jump)
        .await;
    assert!(matches!(jump_fault, Err(DbError::PermissionDenied(_))),
        "L3_GOV_FAULT: double level step admitted");

    // 2. APROBACIÓN: exige nivel de actor >= nivel de la solicitud.
    let approved = courier_repository
        .approve_application(&school_actor, "gov-zone")
        .await
        .unwrap();
    assert_eq!(approved.status, CourierStatus::Approved);
    assert!(approved.approved_at.is_some());

    // Re-aprobación: la guardia de estado rechaza.
    let replay_fault = courier_repository.approve_application(&school_actor, "gov-zone").await;
    assert!(matches!(replay_fault, Err(DbError::InvalidTransition(_))));

    // Un usuario sin la capacidad es rechazado en el límite del núcleo.
    let plain_actor = ActorContext {
        user_id: "plain".into(),
        role: UserRole::User,
        school_code: "PK".into(),
        managed_prefix: None,
    };
    let permission_fault = courier_repository
        .register_via_actor(&plain_actor, &zone_applicant)
        .await;
    assert!(matches!(permission_fault, Err(DbError::PermissionDenied(_))));

    println!("   ✅ [SUCCESS]: Corps governance rules certified.");
}
