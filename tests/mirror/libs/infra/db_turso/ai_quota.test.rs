// [tests/mirror/libs/infra/db_turso/ai_quota.test.rs]
/**
 * =================================================================
 * APARATO: AI QUOTA TEST (V3.0 - ROTATION & ATOMICITY)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: CAÍDA AL SIGUIENTE PROVEEDOR Y CUOTA ATÓMICA
 * =================================================================
 */

use chrono::{Duration, Utc};
use estafeta_domain_ai_cortex::{order_eligible_providers, quota_window_next_boundary};
use estafeta_domain_models::ai::{AiProviderConfig, AiTaskType};
use estafeta_infra_db::repositories::AiRepository;
use estafeta_infra_db::TursoClient;

fn forge_config(provider: &str, priority: u32, used: u64, quota: u64) -> AiProviderConfig {
    AiProviderConfig {
        provider: provider.to_string(),
        api_endpoint: format!("https://api.{}.example/v1/chat/completions", provider),
        model: format!("{}-scribe", provider),
        temperature: 0.7,
        max_tokens: 1024,
        priority,
        daily_quota: quota,
        used_quota: used,
        quota_reset_at: quota_window_next_boundary(Utc::now()),
        request_timeout_seconds: 30,
        active: true,
    }
}

#[tokio::test]
async fn certify_exhausted_provider_falls_to_next_priority() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing quota fallback (S4)...");

    let client = TursoClient::connect("file:ai_fallback?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let ai_repository = AiRepository::new(client.clone());

    // P1 agotado exacto (used == quota); P2 fresco en prioridad 2.
    ai_repository.upsert_config(&forge_config("p1", 1, 1000, 1000)).await.unwrap();
    ai_repository.upsert_config(&forge_config("p2", 2, 0, 1000)).await.unwrap();

    let now = Utc::now();
    let snapshot = ai_repository.fetch_rotation_snapshot(now).await.unwrap();
    let rotation = order_eligible_providers(snapshot, None, now);

    assert_eq!(rotation.first().map(|c| c.provider.as_str()), Some("p2"),
        "L3_ROTATION_FAULT: exhausted provider not skipped");

    // El éxito por P2 asienta su uso; el contador de P1 NO se mueve.
    ai_repository
        .record_success("p2", "p2-scribe", AiTaskType::Reply, "task-s4", 120, 380, 900)
        .await
        .unwrap();

    let p1 = ai_repository.find_config("p1").await.unwrap().unwrap();
    let p2 = ai_repository.find_config("p2").await.unwrap().unwrap();
    assert_eq!(p1.used_quota, 1000, "L3_QUOTA_FAULT: wrong provider charged");
    assert_eq!(p2.used_quota, 500, "L3_QUOTA_FAULT: counter delta != logged tokens");

    let usage = ai_repository.fetch_usage_for_task("task-s4").await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].provider, "p2");
    assert_eq!(usage[0].input_tokens + usage[0].output_tokens, 500);

    println!("   ✅ [SUCCESS]: Priority fallback and atomic charging certified.");
}

#[tokio::test]
async fn certify_stale_window_resets_atomically() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing UTC-midnight window reset...");

    let client = TursoClient::connect("file:ai_reset?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let ai_repository = AiRepository::new(client.clone());

    // Ventana caduca: el reinicio debe ocurrir dentro de la selección.
    let mut stale = forge_config("p-stale", 1, 999, 1000);
    stale.quota_reset_at = Utc::now() - Duration::hours(2);
    ai_repository.upsert_config(&stale).await.unwrap();

    let now = Utc::now();
    let snapshot = ai_repository.fetch_rotation_snapshot(now).await.unwrap();
    let refreshed = snapshot.iter().find(|c| c.provider == "p-stale").unwrap();

    assert_eq!(refreshed.used_quota, 0, "L3_RESET_FAULT: stale window not zeroed");
    assert!(refreshed.quota_reset_at > now, "L3_RESET_FAULT: boundary not advanced");
    assert_eq!(refreshed.quota_reset_at, quota_window_next_boundary(now));

    println!("   ✅ [SUCCESS]: Atomic window reset certified.");
}

#[tokio::test]
async fn certify_failure_budget_accounting() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing 4xx failure budget...");

    let client = TursoClient::connect("file:ai_budget?mode=memory&cache=shared", None)
        .await
        .unwrap();
    let ai_repository = AiRepository::new(client.clone());
    ai_repository.upsert_config(&forge_config("p-budget", 1, 0, 1000)).await.unwrap();

    // El 4xx asienta el fallo y cuenta contra el presupuesto; la cuota
    // de tokens permanece intacta.
    ai_repository
        .record_failure(
            "p-budget",
            "p-budget-scribe",
            AiTaskType::Reply,
            "task-4xx",
            250,
            estafeta_domain_models::ai::AiCallStatus::Failed,
            true,
        )
        .await
        .unwrap();

    let config = ai_repository.find_config("p-budget").await.unwrap().unwrap();
    assert_eq!(config.used_quota, 0, "L3_BUDGET_FAULT: failure charged token quota");

    let conn = client.get_connection().unwrap();
    let mut budget_rows = conn
        .query("SELECT failure_count FROM ai_configs WHERE provider = 'p-budget'", ())
        .await
        .unwrap();
    let failure_count: i64 = budget_rows.next().await.unwrap().unwrap().get(0).unwrap();
    assert_eq!(failure_count, 1);

    println!("   ✅ [SUCCESS]: Failure budget accounting certified.");
}
