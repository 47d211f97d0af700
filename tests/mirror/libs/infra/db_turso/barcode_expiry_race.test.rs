// [tests/mirror/libs/infra/db_turso/barcode_expiry_race.test.rs]
/**
 * =================================================================
 * APARATO: EXPIRY RACE TEST (V2.0 - EXCLUSIVE TRANSITION)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: bind vs. expire RESUELVE EN EXACTAMENTE UN GANADOR
 * =================================================================
 */

use chrono::{Duration, Utc};
use estafeta_domain_models::barcode::BarcodeStatus;
use estafeta_domain_models::identity::{ActorContext, UserRole};
use estafeta_domain_models::letter::LetterVisibility;
use estafeta_domain_models::opcode::OpCode;
use estafeta_infra_db::repositories::{BarcodeRepository, LetterRepository};
use estafeta_infra_db::{DbError, TursoClient};

fn admin_actor() -> ActorContext {
    ActorContext {
        user_id: "admin-1".into(),
        role: UserRole::PlatformAdmin,
        school_code: "PK".into(),
        managed_prefix: None,
    }
}

#[tokio::test]
async fn certify_sweeper_wins_then_bind_rejected() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing expiry-first ordering...");

    let client = TursoClient::connect("file:expiry_race_a?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let barcode_repository = BarcodeRepository::new(client.clone());
    let letter_repository = LetterRepository::new(client.clone());

    // TTL exactamente en la frontera: elegible en el mismo instante.
    let barcode = barcode_repository.create("BC-EXP-A", Some(0)).await.unwrap();

    let expired_count = barcode_repository
        .expire_sweep(Utc::now() + Duration::seconds(1), 50)
        .await
        .unwrap();
    assert_eq!(expired_count, 1, "L3_EXPIRY_FAULT: boundary candidate missed");

    let sealed = barcode_repository.find(&barcode.id).await.unwrap();
    assert_eq!(sealed.status, BarcodeStatus::Expired);

    // El bind tardío observa 'expired' y pierde limpiamente.
    let letter = letter_repository
        .create("author-x", "T", "C", LetterVisibility::Private, false, None)
        .await
        .unwrap();
    let late_bind = barcode_repository
        .bind(&barcode.id, &letter.id, "ENV-X", &OpCode::parse("PK0001").unwrap(), &admin_actor())
        .await;
    assert!(matches!(late_bind, Err(DbError::InvalidTransition(_))));

    println!("   ✅ [SUCCESS]: Sweeper victory sealed; late bind rejected.");
}

#[tokio::test]
async fn certify_bind_wins_then_sweeper_noops() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing bind-first ordering...");

    let client = TursoClient::connect("file:expiry_race_b?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let barcode_repository = BarcodeRepository::new(client.clone());
    let letter_repository = LetterRepository::new(client.clone());

    let barcode = barcode_repository.create("BC-EXP-B", Some(0)).await.unwrap();
    let letter = letter_repository
        .create("author-y", "T", "C", LetterVisibility::Private, false, None)
        .await
        .unwrap();

    // El bind gana la guardia primero.
    barcode_repository
        .bind(&barcode.id, &letter.id, "ENV-Y", &OpCode::parse("PK0002").unwrap(), &admin_actor())
        .await
        .unwrap();

    // El barrido concurrente observa 'bound' y hace no-op (cero filas).
    let expired_count = barcode_repository
        .expire_sweep(Utc::now() + Duration::seconds(1), 50)
        .await
        .unwrap();
    assert_eq!(expired_count, 0, "L3_EXPIRY_FAULT: sweeper double-fired");

    let still_bound = barcode_repository.find(&barcode.id).await.unwrap();
    assert_eq!(still_bound.status, BarcodeStatus::Bound, "never both transitions");

    println!("   ✅ [SUCCESS]: Exactly-one-winner exclusivity certified.");
}
