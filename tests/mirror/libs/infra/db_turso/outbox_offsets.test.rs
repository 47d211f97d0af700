// [tests/mirror/libs/infra/db_turso/outbox_offsets.test.rs]
/**
 * =================================================================
 * APARATO: OUTBOX OFFSETS TEST (V2.0 - AT-LEAST-ONCE)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: SECUENCIA MONÓTONA Y OFFSETS INDEPENDIENTES
 * =================================================================
 */

use estafeta_domain_models::outbox::OutboxTopic;
use estafeta_infra_db::repositories::outbox::append_within;
use estafeta_infra_db::repositories::OutboxRepository;
use estafeta_infra_db::TursoClient;
use serde_json::json;

#[tokio::test]
async fn certify_monotone_sequence_and_independent_offsets() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing outbox sequence discipline...");

    let client = TursoClient::connect("file:outbox_seq?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let outbox_repository = OutboxRepository::new(client.clone());
    let connection = client.get_connection().unwrap();

    // 1. TRES EVENTOS EN SECUENCIA.
    for sequence_index in 0..3 {
        append_within(
            &connection,
            OutboxTopic::Notification,
            &json!({ "sequence": sequence_index }),
        )
        .await
        .unwrap();
    }

    // 2. SUSCRIPTOR FRESCO: observa la secuencia completa, en orden.
    let full_batch = outbox_repository.fetch_after("subscriber-a", 10).await.unwrap();
    assert_eq!(full_batch.len(), 3);
    assert!(full_batch.windows(2).all(|pair| pair[0].event_id < pair[1].event_id),
        "L3_OUTBOX_FAULT: sequence not monotone");

    // 3. COMMIT PARCIAL: el offset ancla la reanudación exacta.
    outbox_repository
        .commit_offset("subscriber-a", full_batch[1].event_id)
        .await
        .unwrap();
    let resumed = outbox_repository.fetch_after("subscriber-a", 10).await.unwrap();
    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0].event_id, full_batch[2].event_id);

    // 4. INDEPENDENCIA: otro suscriptor replaya desde cero (at-least-once).
    let replay_batch = outbox_repository.fetch_after("subscriber-b", 10).await.unwrap();
    assert_eq!(replay_batch.len(), 3, "L3_OUTBOX_FAULT: offsets leaked across subscribers");

    // 5. OFFSET AL DÍA: sin eventos nuevos no hay re-entrega.
    outbox_repository
        .commit_offset("subscriber-a", full_batch[2].event_id)
        .await
        .unwrap();
    assert!(outbox_repository.fetch_after("subscriber-a", 10).await.unwrap().is_empty());

    println!("   ✅ [SUCCESS]: Monotone sequence and per-subscriber offsets certified.");
}
