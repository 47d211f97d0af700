// [apps/orchestrator/src/bin/seed.rs]
/*!
 * =================================================================
 * APARATO: SEED BINARY (V3.0 - LOCAL BRING-UP)
 * CLASIFICACIÓN: OPERATIONS TOOL (ESTRATO L0)
 * RESPONSABILIDAD: PROVISIÓN DE REGLAS, PROVEEDORES Y ÁRBOL DEMO
 *
 * Hidrata un Ledger recién creado con las reglas de crédito núcleo,
 * dos proveedores IA y un árbol de carteros de cuatro niveles para el
 * arranque local.
 * =================================================================
 */

use chrono::Utc;
use dotenvy::dotenv;
use estafeta_domain_ai_cortex::quota_window_next_boundary;
use estafeta_domain_models::ai::AiProviderConfig;
use estafeta_domain_models::courier::{Courier, CourierStatus};
use estafeta_domain_models::credit::{CreditRule, RuleConstraints};
use estafeta_domain_models::identity::{User, UserRole};
use estafeta_domain_models::opcode::OpCode;
use estafeta_infra_db::repositories::{AiRepository, CourierRepository, CreditRepository, UserRepository};
use estafeta_infra_db::TursoClient;
use estafeta_orchestrator::prelude::EstafetaConfig;
use estafeta_shared_heimdall::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing("estafeta_seed");

    let config = EstafetaConfig::from_env();
    let client = TursoClient::connect(&config.database_url, config.database_token.clone()).await?;

    seed_credit_rules(&CreditRepository::new(client.clone())).await?;
    seed_ai_providers(&AiRepository::new(client.clone())).await?;
    seed_demo_corps(&client).await?;

    info!("🌱 [SEED_COMPLETE]: Ledger hydrated for local bring-up.");
    Ok(())
}

/// Reglas núcleo del motor de puntos.
async fn seed_credit_rules(credit_repository: &CreditRepository) -> anyhow::Result<()> {
    let rules = [
        CreditRule {
            task_type: "letter_created".into(),
            base_points: 10,
            daily_cap: 3,
            weekly_cap: 0,
            auto_execute: true,
            enabled: true,
            constraints: RuleConstraints::default(),
        },
        CreditRule {
            task_type: "letter_delivered".into(),
            base_points: 15,
            daily_cap: 0,
            weekly_cap: 0,
            auto_execute: true,
            enabled: true,
            constraints: RuleConstraints::default(),
        },
        CreditRule {
            task_type: "courier_delivery".into(),
            base_points: 20,
            daily_cap: 0,
            weekly_cap: 0,
            auto_execute: true,
            enabled: true,
            constraints: RuleConstraints {
                // Solo el cuerpo de carteros acredita entregas.
                min_role_level: 2,
                ..RuleConstraints::default()
            },
        },
        CreditRule {
            task_type: "ai_interaction".into(),
            base_points: 5,
            daily_cap: 10,
            weekly_cap: 0,
            auto_execute: true,
            enabled: true,
            constraints: RuleConstraints::default(),
        },
    ];

    for rule in &rules {
        credit_repository.upsert_rule(rule).await?;
    }
    info!("🌱 [SEED_RULES]: {} credit rules sealed.", rules.len());
    Ok(())
}

/// Dos proveedores con prioridades escalonadas para la rotación.
async fn seed_ai_providers(ai_repository: &AiRepository) -> anyhow::Result<()> {
    let now = Utc::now();
    let providers = [
        AiProviderConfig {
            provider: "lumen".into(),
            api_endpoint: "https://api.lumen.example/v1/chat/completions".into(),
            model: "lumen-epistle-2".into(),
            temperature: 0.7,
            max_tokens: 1024,
            priority: 1,
            daily_quota: 200_000,
            used_quota: 0,
            quota_reset_at: quota_window_next_boundary(now),
            request_timeout_seconds: 30,
            active: true,
        },
        AiProviderConfig {
            provider: "paperink".into(),
            api_endpoint: "https://api.paperink.example/v1/chat/completions".into(),
            model: "paperink-scribe".into(),
            temperature: 0.8,
            max_tokens: 1024,
            priority: 2,
            daily_quota: 100_000,
            used_quota: 0,
            quota_reset_at: quota_window_next_boundary(now),
            request_timeout_seconds: 30,
            active: true,
        },
    ];

    for provider in &providers {
        ai_repository.upsert_config(provider).await?;
    }
    info!("🌱 [SEED_AI]: {} providers staged for rotation.", providers.len());
    Ok(())
}

/// Árbol demo de cuatro niveles sobre la escuela 'PK'.
async fn seed_demo_corps(client: &TursoClient) -> anyhow::Result<()> {
    let user_repository = UserRepository::new(client.clone());
    let courier_repository = CourierRepository::new(client.clone());
    let now = Utc::now();

    let corps_blueprint = [
        ("seed-city", UserRole::CourierL4, 4u8, "", None),
        ("seed-school", UserRole::CourierL3, 3u8, "PK", Some("courier-seed-city")),
        ("seed-zone", UserRole::CourierL2, 2u8, "PK5F", Some("courier-seed-school")),
        ("seed-building", UserRole::CourierL1, 1u8, "PK5F3D", Some("courier-seed-zone")),
    ];

    for (user_id, role, level, prefix, parent) in corps_blueprint {
        user_repository
            .create(&User {
                id: user_id.to_string(),
                nickname: format!("Demo {}", user_id),
                role,
                school_code: "PK".into(),
                op_code: OpCode::parse("PK5F3D").ok(),
                created_at: now,
            })
            .await?;

        courier_repository
            .register(&Courier {
                id: format!("courier-{}", user_id),
                user_id: user_id.to_string(),
                level,
                managed_prefix: prefix.to_string(),
                parent_courier_id: parent.map(|p| p.to_string()),
                status: CourierStatus::Approved,
                current_task_count: 0,
                max_daily_tasks: 20,
                success_rate: 1.0,
                approved_at: Some(now),
                created_at: now,
            })
            .await?;
    }

    info!("🌱 [SEED_CORPS]: Four-level demo courier tree planted over 'PK'.");
    Ok(())
}
