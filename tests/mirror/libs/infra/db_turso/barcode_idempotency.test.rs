// [tests/mirror/libs/infra/db_turso/barcode_idempotency.test.rs]
/**
 * =================================================================
 * APARATO: SCAN IDEMPOTENCY TEST (V2.0 - MINUTE BUCKET)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: LA RÉPLICA DE UN ESCANEO ES UN NO-OP EXACTO
 * =================================================================
 */

use estafeta_domain_models::barcode::{BarcodeStatus, ScanType};
use estafeta_domain_models::identity::{ActorContext, UserRole};
use estafeta_domain_models::letter::LetterVisibility;
use estafeta_domain_models::opcode::OpCode;
use estafeta_infra_db::repositories::{BarcodeRepository, LetterRepository};
use estafeta_infra_db::TursoClient;
use serde_json::json;

#[tokio::test]
async fn certify_duplicate_scan_collapses_to_prior_event() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing minute-bucket idempotency...");

    let client = TursoClient::connect("file:barcode_idem?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let barcode_repository = BarcodeRepository::new(client.clone());
    let letter_repository = LetterRepository::new(client.clone());

    let letter = letter_repository
        .create("author-9", "T", "C", LetterVisibility::Private, false, None)
        .await
        .unwrap();
    let barcode = barcode_repository.create("BC-IDEM", None).await.unwrap();

    let actor = ActorContext {
        user_id: "courier-9".into(),
        role: UserRole::CourierL2,
        school_code: "PK".into(),
        managed_prefix: Some("PK".into()),
    };
    let recipient = OpCode::parse("PK9A2B").unwrap();

    barcode_repository
        .bind(&barcode.id, &letter.id, "ENV-9", &recipient, &actor)
        .await
        .unwrap();

    // 1. PRIMER GESTO FÍSICO: transición real.
    let first = barcode_repository
        .scan(&barcode.id, &actor, ScanType::Pickup, Some("PK9A00".into()), json!({}))
        .await
        .unwrap();
    assert!(!first.deduplicated);
    assert_eq!(first.barcode_status, BarcodeStatus::InTransit);

    // 2. DOBLE DISPARO DEL GATILLO: misma cubeta de minuto → no-op que
    // devuelve el MISMO evento (idéntico id, cero mutación).
    let replay = barcode_repository
        .scan(&barcode.id, &actor, ScanType::Pickup, Some("PK9A00".into()), json!({}))
        .await
        .unwrap();
    assert!(replay.deduplicated, "L3_IDEM_FAULT: replay not collapsed");
    assert_eq!(replay.event.id, first.event.id, "L3_IDEM_FAULT: distinct event forged");
    assert_eq!(replay.barcode_status, BarcodeStatus::InTransit);

    // 3. EFECTOS IDÉNTICOS A UNA SOLA APLICACIÓN: diario y contador.
    let trace = barcode_repository.get_trace(&barcode.id).await.unwrap();
    let pickup_events = trace.iter().filter(|e| e.scan_type == ScanType::Pickup).count();
    assert_eq!(pickup_events, 1, "L3_IDEM_FAULT: journal duplicated");

    let row = barcode_repository.find(&barcode.id).await.unwrap();
    assert_eq!(row.scan_count, 2, "bind + pickup only; replay must not count");

    // 4. OTRO ACTOR dentro del mismo minuto NO deduplica (clave
    // distinta), pero la guardia de estado rechaza el pickup repetido.
    let other_actor = ActorContext {
        user_id: "courier-10".into(),
        role: UserRole::CourierL2,
        school_code: "PK".into(),
        managed_prefix: Some("PK".into()),
    };
    let other_result = barcode_repository
        .scan(&barcode.id, &other_actor, ScanType::Pickup, None, json!({}))
        .await;
    assert!(other_result.is_err(), "L3_IDEM_FAULT: state guard bypassed");

    println!("   ✅ [SUCCESS]: Minute-bucket idempotency certified bit-perfect.");
}
