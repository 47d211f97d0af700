// [tests/mirror/libs/infra/db_turso/delay_queue.test.rs]
/**
 * =================================================================
 * APARATO: DELAY QUEUE TEST (V4.0 - CLAIM & REAPER)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: RECLAMO EXCLUSIVO, ARRENDAMIENTOS Y AGOTAMIENTO
 * =================================================================
 */

use chrono::{Duration, Utc};
use estafeta_domain_models::delay::{DelayStatus, DelayTaskKind};
use estafeta_infra_db::repositories::DelayQueueRepository;
use estafeta_infra_db::TursoClient;
use serde_json::json;

#[tokio::test]
async fn certify_claim_exclusivity_and_completion() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing claim exclusivity...");

    let client = TursoClient::connect("file:delay_claim?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let delay_repository = DelayQueueRepository::new(client.clone());

    let now = Utc::now();
    let record = delay_repository
        .enqueue(DelayTaskKind::AiMatch, json!({ "user_id": "u-1" }), now - Duration::seconds(1), 3)
        .await
        .unwrap();
    assert_eq!(record.status, DelayStatus::Pending);

    // 1. PRIMER RECLAMO: pending → processing con arrendamiento.
    let claimed = delay_repository.claim_next(now, 60).await.unwrap().unwrap();
    assert_eq!(claimed.id, record.id);
    assert_eq!(claimed.status, DelayStatus::Processing);
    assert!(claimed.lease_until.unwrap() > now);

    // 2. RECLAMO CONCURRENTE: la guardia deja exactamente un ganador.
    let second_claim = delay_repository.claim_next(now, 60).await.unwrap();
    assert!(second_claim.is_none(), "L3_CLAIM_FAULT: double ownership");

    // 3. SELLADO: processing → completed con metadatos de resultado.
    delay_repository
        .complete(&record.id, json!({ "matched": true }))
        .await
        .unwrap();
    let sealed = delay_repository.find(&record.id).await.unwrap();
    assert_eq!(sealed.status, DelayStatus::Completed);
    assert!(sealed.result_metadata.is_some());

    println!("   ✅ [SUCCESS]: Exclusive claim and completion certified.");
}

#[tokio::test]
async fn certify_time_ordering_and_cancellation() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing earliest-first ordering...");

    let client = TursoClient::connect("file:delay_order?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let delay_repository = DelayQueueRepository::new(client.clone());
    let now = Utc::now();

    // Futuro lejano, pasado temprano, pasado tardío.
    let future = delay_repository
        .enqueue(DelayTaskKind::AiReply, json!({}), now + Duration::hours(24), 3)
        .await
        .unwrap();
    let earliest = delay_repository
        .enqueue(DelayTaskKind::AiReply, json!({}), now - Duration::minutes(10), 3)
        .await
        .unwrap();
    let later = delay_repository
        .enqueue(DelayTaskKind::AiReply, json!({}), now - Duration::minutes(1), 3)
        .await
        .unwrap();

    // El worker toma la elegible MÁS temprana; la futura no aparece.
    let first_pick = delay_repository.claim_next(now, 60).await.unwrap().unwrap();
    assert_eq!(first_pick.id, earliest.id, "L3_ORDER_FAULT: earliest-first broken");

    let second_pick = delay_repository.claim_next(now, 60).await.unwrap().unwrap();
    assert_eq!(second_pick.id, later.id);

    assert!(delay_repository.claim_next(now, 60).await.unwrap().is_none());

    // pending → cancelled; una fila reclamada es inmune al cancel.
    assert!(delay_repository.cancel(&future.id).await.unwrap());
    assert!(!delay_repository.cancel(&earliest.id).await.unwrap(), "claimed row cancelled");

    println!("   ✅ [SUCCESS]: Time ordering and cancellation certified.");
}

#[tokio::test]
async fn certify_reaper_recovers_expired_leases() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing lease reaper...");

    let client = TursoClient::connect("file:delay_reaper?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let delay_repository = DelayQueueRepository::new(client.clone());
    let now = Utc::now();

    let record = delay_repository
        .enqueue(DelayTaskKind::BarcodeExpireSweep, json!({}), now - Duration::seconds(5), 3)
        .await
        .unwrap();

    // Worker reclama con arrendamiento corto y colapsa (simulado).
    delay_repository.claim_next(now, 1).await.unwrap().unwrap();

    // El Reaper, pasada la frontera, devuelve la fila al pool con el
    // contador incrementado. Ninguna fila sobrevive en 'processing'.
    let (recovered, failed) = delay_repository
        .reap_expired_leases(now + Duration::seconds(5))
        .await
        .unwrap();
    assert_eq!((recovered, failed), (1, 0));

    let recovered_record = delay_repository.find(&record.id).await.unwrap();
    assert_eq!(recovered_record.status, DelayStatus::Pending);
    assert_eq!(recovered_record.attempts, 1);
    assert!(recovered_record.lease_until.is_none());

    // Con la escalera casi agotada, el Reaper sella 'failed' terminal.
    delay_repository.claim_next(now, 1).await.unwrap().unwrap();
    delay_repository
        .reap_expired_leases(now + Duration::seconds(10))
        .await
        .unwrap();
    delay_repository.claim_next(now, 1).await.unwrap().unwrap();
    let (_, terminal_failed) = delay_repository
        .reap_expired_leases(now + Duration::seconds(15))
        .await
        .unwrap();
    assert_eq!(terminal_failed, 1, "L3_REAPER_FAULT: exhausted lease not sealed");

    let final_record = delay_repository.find(&record.id).await.unwrap();
    assert_eq!(final_record.status, DelayStatus::Failed);
    assert!(final_record.attempts <= final_record.max_attempts, "attempts ceiling breached");

    println!("   ✅ [SUCCESS]: Reaper recovery and terminal seal certified.");
}

#[tokio::test]
async fn certify_backoff_reschedule_and_exhaustion() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing failure backoff ladder...");

    let client = TursoClient::connect("file:delay_backoff?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let delay_repository = DelayQueueRepository::new(client.clone());
    let now = Utc::now();

    let record = delay_repository
        .enqueue(DelayTaskKind::AiReply, json!({}), now - Duration::seconds(1), 2)
        .await
        .unwrap();

    // Intento 1 falla: re-programación futura con backoff.
    delay_repository.claim_next(now, 60).await.unwrap().unwrap();
    let after_first = delay_repository
        .fail_or_reschedule(&record.id, "provider timeout", 30)
        .await
        .unwrap();
    assert_eq!(after_first, DelayStatus::Pending);

    let rescheduled = delay_repository.find(&record.id).await.unwrap();
    assert_eq!(rescheduled.attempts, 1);
    assert!(rescheduled.delayed_until > now, "backoff must push into the future");

    // Intento 2 falla: escalera agotada, sellado terminal.
    delay_repository
        .claim_next(rescheduled.delayed_until + Duration::seconds(1), 60)
        .await
        .unwrap()
        .unwrap();
    let after_second = delay_repository
        .fail_or_reschedule(&record.id, "provider timeout", 30)
        .await
        .unwrap();
    assert_eq!(after_second, DelayStatus::Failed);

    let exhausted = delay_repository.find(&record.id).await.unwrap();
    assert_eq!(exhausted.attempts, 2);
    assert!(exhausted.attempts <= exhausted.max_attempts);

    println!("   ✅ [SUCCESS]: Backoff ladder and exhaustion certified.");
}
