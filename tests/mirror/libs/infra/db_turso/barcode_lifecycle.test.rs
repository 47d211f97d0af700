// [tests/mirror/libs/infra/db_turso/barcode_lifecycle.test.rs]
/**
 * =================================================================
 * APARATO: BARCODE LIFECYCLE TEST (V3.0 - JOURNAL PARITY)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: CERTIFICACIÓN DEL CICLO bind → pickup → delivery
 * =================================================================
 */

use chrono::Utc;
use estafeta_domain_models::barcode::{BarcodeStatus, ScanType};
use estafeta_domain_models::identity::{ActorContext, User, UserRole};
use estafeta_domain_models::letter::LetterVisibility;
use estafeta_domain_models::opcode::OpCode;
use estafeta_infra_db::repositories::{BarcodeRepository, LetterRepository, UserRepository};
use estafeta_infra_db::{DbError, TursoClient};
use serde_json::json;

fn courier_actor(prefix: &str) -> ActorContext {
    ActorContext {
        user_id: "courier-user-1".to_string(),
        role: UserRole::CourierL2,
        school_code: "PK".to_string(),
        managed_prefix: Some(prefix.to_string()),
    }
}

#[tokio::test]
async fn certify_full_delivery_lifecycle_with_journal_parity() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing barcode lifecycle V3.0...");

    // 1. SETUP: Ledger táctico en memoria con caché compartido.
    let client = TursoClient::connect("file:barcode_lifecycle?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let barcode_repository = BarcodeRepository::new(client.clone());
    let letter_repository = LetterRepository::new(client.clone());
    let user_repository = UserRepository::new(client.clone());

    user_repository
        .create(&User {
            id: "author-1".into(),
            nickname: "Ana".into(),
            role: UserRole::User,
            school_code: "PK".into(),
            op_code: OpCode::parse("PK5F1A").ok(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let letter = letter_repository
        .create("author-1", "Hola", "Querido amigo...", LetterVisibility::Private, false, None)
        .await
        .unwrap();

    let barcode = barcode_repository.create("BC-0001", None).await.unwrap();
    assert_eq!(barcode.status, BarcodeStatus::Unactivated);

    let recipient = OpCode::parse("PK5F3D").unwrap();
    let actor = courier_actor("PK5F");

    // 2. BIND: unactivated → bound con proyección de carta.
    barcode_repository
        .bind(&barcode.id, &letter.id, "ENV-1", &recipient, &actor)
        .await
        .unwrap();

    let bound = barcode_repository.find(&barcode.id).await.unwrap();
    assert_eq!(bound.status, BarcodeStatus::Bound);
    assert_eq!(bound.recipient_op_code.as_ref().map(|c| c.as_str()), Some("PK5F3D"));

    // 3. ESCANEOS FÍSICOS: pickup → transit (solo diario) → delivery.
    let pickup = barcode_repository
        .scan(&barcode.id, &actor, ScanType::Pickup, Some("PK5F00".into()), json!({}))
        .await
        .unwrap();
    assert_eq!(pickup.barcode_status, BarcodeStatus::InTransit);

    let transit = barcode_repository
        .scan(&barcode.id, &actor, ScanType::Transit, Some("PK5F11".into()), json!({}))
        .await
        .unwrap();
    assert_eq!(transit.barcode_status, BarcodeStatus::InTransit);

    let delivery = barcode_repository
        .scan(&barcode.id, &actor, ScanType::Delivery, Some("PK5F3D".into()), json!({}))
        .await
        .unwrap();
    assert_eq!(delivery.barcode_status, BarcodeStatus::Delivered);

    // 4. PARIDAD DEL DIARIO: 4 eventos; los cambios de estado (old !=
    // new) igualan exactamente las transiciones ejecutadas (3).
    let trace = barcode_repository.get_trace(&barcode.id).await.unwrap();
    assert_eq!(trace.len(), 4, "L3_JOURNAL_FAULT: trace length drift");

    let status_changes = trace.iter().filter(|event| event.old_status != event.new_status).count();
    assert_eq!(status_changes, 3, "L3_JOURNAL_FAULT: status-change parity broken");

    // 5. PROYECCIÓN: la carta refleja el diario en la misma transacción.
    let projected_letter = letter_repository.find(&letter.id).await.unwrap();
    assert_eq!(projected_letter.delivery_status, Some(BarcodeStatus::Delivered));
    assert_eq!(projected_letter.barcode_id.as_deref(), Some(bound.id.as_str()));

    // 6. TERMINAL SEAL: un escaneo sobre 'delivered' rechaza sin mutar.
    let replay_fault = barcode_repository
        .scan(&barcode.id, &courier_actor("PK5F"), ScanType::Pickup, None, json!({}))
        .await;
    assert!(matches!(replay_fault, Err(DbError::InvalidTransition(_))));

    // 7. OUTBOX: cada transición selló su evento en la misma transacción.
    let conn = client.get_connection().unwrap();
    let mut outbox_rows = conn
        .query("SELECT COUNT(*) FROM outbox WHERE topic = 'letter.status_update'", ())
        .await
        .unwrap();
    let status_events: i64 = outbox_rows.next().await.unwrap().unwrap().get(0).unwrap();
    assert_eq!(status_events, 4, "L3_OUTBOX_FAULT: status events not crystallized");

    println!("   ✅ [SUCCESS]: Lifecycle, journal parity and outbox certified.");
}

#[tokio::test]
async fn certify_authority_and_permission_rechecks() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing bind authority gates...");

    let client = TursoClient::connect("file:barcode_authority?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let barcode_repository = BarcodeRepository::new(client.clone());
    let letter_repository = LetterRepository::new(client.clone());

    let letter = letter_repository
        .create("author-2", "T", "C", LetterVisibility::Private, false, None)
        .await
        .unwrap();
    let barcode = barcode_repository.create("BC-0002", None).await.unwrap();
    let recipient = OpCode::parse("QH1122").unwrap();

    // Un usuario sin 'scan_code' no vincula.
    let plain_user = ActorContext {
        user_id: "author-2".into(),
        role: UserRole::User,
        school_code: "QH".into(),
        managed_prefix: None,
    };
    let permission_fault = barcode_repository
        .bind(&barcode.id, &letter.id, "ENV-2", &recipient, &plain_user)
        .await;
    assert!(matches!(permission_fault, Err(DbError::PermissionDenied(_))));

    // Un cartero fuera de su prefijo tampoco.
    let foreign_courier = ActorContext {
        user_id: "courier-foreign".into(),
        role: UserRole::CourierL1,
        school_code: "PK".into(),
        managed_prefix: Some("PK5F3D".into()),
    };
    let authority_fault = barcode_repository
        .bind(&barcode.id, &letter.id, "ENV-2", &recipient, &foreign_courier)
        .await;
    assert!(matches!(authority_fault, Err(DbError::PermissionDenied(_))));

    // El prefijo vacío (nivel ciudad) porta autoridad universal.
    let city_courier = ActorContext {
        user_id: "courier-city".into(),
        role: UserRole::CourierL4,
        school_code: "QH".into(),
        managed_prefix: Some(String::new()),
    };
    barcode_repository
        .bind(&barcode.id, &letter.id, "ENV-2", &recipient, &city_courier)
        .await
        .unwrap();

    println!("   ✅ [SUCCESS]: Permission and prefix authority gates certified.");
}
