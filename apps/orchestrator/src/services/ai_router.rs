// [apps/orchestrator/src/services/ai_router.rs]
/*!
 * =================================================================
 * APARATO: AI ROUTER SERVICE (V7.0 - ROTATION MASTER)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: ROTACIÓN DE PROVEEDORES, PLAZOS Y MODERACIÓN
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. DEADLINE CASCADE: plazo por intento = min(plazo del llamador
 *    restante, timeout del proveedor); transporte/5xx/timeout rotan
 *    al siguiente; el 4xx también rota y cuenta contra el presupuesto
 *    de fallos del proveedor.
 * 2. QUOTA ATOMICITY: el éxito incrementa used_quota en la MISMA
 *    transacción que el asiento de uso (repositorio L3).
 * 3. MODERATION GATE: los tipos de contenido pasan el filtro local;
 *    la retención sella 'moderation.flagged' en el Outbox para la
 *    cola de revisión humana (colaborador externo).
 * =================================================================
 */

use crate::state::AppState;
use chrono::Utc;
use estafeta_domain_ai_cortex::{moderation_score, order_eligible_providers};
use estafeta_domain_models::ai::{AiCallStatus, AiProviderConfig, AiTaskType, GeneratedArtifact};
use estafeta_domain_models::faults::CoreFault;
use estafeta_domain_models::outbox::OutboxTopic;
use estafeta_infra_db::repositories::outbox::append_within;
use reqwest::Client;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Orden de generación que viaja del llamador al enrutador.
#[derive(Debug, Clone)]
pub struct GenerateDirective {
    pub task_type: AiTaskType,
    /// Id de la tarea origen (registro diferido, curaduría, etc.).
    pub task_id: String,
    pub user_id: String,
    /// Proveedor fijado por el llamador (rotación general si None).
    pub pinned_provider: Option<String>,
    pub prompt: String,
    /// Plazo total del llamador para la operación completa.
    pub deadline: Duration,
}

pub struct AiRouterService {
    application_state: AppState,
    network_client: Client,
}

impl AiRouterService {
    pub fn new(application_state: AppState) -> Self {
        let network_client = Client::builder()
            .timeout(Duration::from_secs(
                application_state.config.ai_request_timeout_seconds,
            ))
            .user_agent("Estafeta-AI-Router/V7")
            .build()
            .expect("FATAL: Failed to initialize AI uplink client.");

        Self {
            application_state,
            network_client,
        }
    }

    /**
     * OPERACIÓN GENERATE: produce texto rotando proveedores elegibles.
     *
     * # Errors:
     * - `CoreFault::RateLimited`: cubeta (usuario, proveedor, tipo) drenada.
     * - `CoreFault::Moderation`: contenido retenido por la compuerta.
     * - `CoreFault::Unavailable`: todos los proveedores agotados.
     * - `CoreFault::Timeout`: plazo del llamador vencido.
     */
    #[instrument(skip(self, directive), fields(task = %directive.task_type.as_str()))]
    pub async fn generate(&self, directive: GenerateDirective) -> Result<GeneratedArtifact, CoreFault> {
        let state = &self.application_state;
        let operation_started_at = Instant::now();

        // 1. ROTACIÓN ELEGIBLE (reinicio atómico de ventanas caducas incluido)
        let rotation_snapshot = state
            .ai_repository
            .fetch_rotation_snapshot(Utc::now())
            .await
            .map_err(CoreFault::from)?;

        let pinned = directive
            .pinned_provider
            .as_deref()
            .or(state.config.ai_default_provider.as_deref());
        let attack_order = order_eligible_providers(rotation_snapshot, pinned, Utc::now());

        if attack_order.is_empty() {
            return Err(CoreFault::Unavailable(
                "NO_ELIGIBLE_PROVIDERS: rotation exhausted".into(),
            ));
        }

        // 2. ITERACIÓN DE PROVEEDORES CON CASCADA DE PLAZOS
        for provider_config in &attack_order {
            let elapsed = operation_started_at.elapsed();
            if elapsed >= directive.deadline {
                return Err(CoreFault::Timeout(format!(
                    "CALLER_DEADLINE_EXCEEDED after {:?}",
                    elapsed
                )));
            }

            // La cubeta se evalúa por proveedor concreto del intento.
            state.token_buckets.admit(
                &directive.user_id,
                &provider_config.provider,
                directive.task_type,
                Utc::now(),
            )?;

            let attempt_budget = directive
                .deadline
                .saturating_sub(elapsed)
                .min(Duration::from_secs(provider_config.request_timeout_seconds));

            let attempt_started_at = Instant::now();
            match self.invoke_provider(provider_config, &directive, attempt_budget).await {
                Ok(artifact) => {
                    let response_time_ms = attempt_started_at.elapsed().as_millis() as u64;

                    // 3. COMPUERTA DE MODERACIÓN (tipos de contenido)
                    if directive.task_type.requires_moderation() {
                        let verdict = moderation_score(
                            &artifact.text,
                            state.config.ai_moderation_threshold,
                        );
                        if verdict.flagged {
                            state
                                .ai_repository
                                .record_failure(
                                    &provider_config.provider,
                                    &provider_config.model,
                                    directive.task_type,
                                    &directive.task_id,
                                    response_time_ms,
                                    AiCallStatus::Moderated,
                                    false,
                                )
                                .await
                                .map_err(CoreFault::from)?;

                            self.emit_moderation_flag(&directive, &verdict.matched_terms, verdict.score)
                                .await?;

                            return Err(CoreFault::Moderation(format!(
                                "CONTENT_HELD: score {:.2} over terms {:?}",
                                verdict.score, verdict.matched_terms
                            )));
                        }
                    }

                    // 4. SELLADO ATÓMICO: cuota + asiento de uso
                    state
                        .ai_repository
                        .record_success(
                            &provider_config.provider,
                            &provider_config.model,
                            directive.task_type,
                            &directive.task_id,
                            artifact.input_tokens,
                            artifact.output_tokens,
                            response_time_ms,
                        )
                        .await
                        .map_err(CoreFault::from)?;

                    info!(
                        "🤖 [AI_GENERATED]: '{}' via [{}] ({} tokens, {} ms).",
                        directive.task_type.as_str(),
                        provider_config.provider,
                        artifact.total_tokens(),
                        response_time_ms
                    );
                    return Ok(artifact);
                }
                Err(attempt_fault) => {
                    let response_time_ms = attempt_started_at.elapsed().as_millis() as u64;
                    // El 4xx cuenta contra el presupuesto de fallos del proveedor.
                    let counts_against_budget =
                        matches!(attempt_fault, CoreFault::InvalidInput(_) | CoreFault::QuotaExceeded(_));

                    state
                        .ai_repository
                        .record_failure(
                            &provider_config.provider,
                            &provider_config.model,
                            directive.task_type,
                            &directive.task_id,
                            response_time_ms,
                            AiCallStatus::Failed,
                            counts_against_budget,
                        )
                        .await
                        .map_err(CoreFault::from)?;

                    warn!(
                        "⤵️  [AI_ROTATE]: Provider [{}] dropped ({}); trying next.",
                        provider_config.provider, attempt_fault
                    );
                }
            }
        }

        Err(CoreFault::Unavailable(format!(
            "ALL_PROVIDERS_EXHAUSTED: {} attempted",
            attack_order.len()
        )))
    }

    /**
     * Invocación física de UN proveedor (contrato chat-completions).
     */
    async fn invoke_provider(
        &self,
        provider_config: &AiProviderConfig,
        directive: &GenerateDirective,
        attempt_budget: Duration,
    ) -> Result<GeneratedArtifact, CoreFault> {
        let api_key_variable = format!(
            "AI_PROVIDER_{}_KEY",
            provider_config.provider.to_uppercase().replace('-', "_")
        );
        let api_key = std::env::var(&api_key_variable).unwrap_or_default();

        let request_body = json!({
            "model": provider_config.model,
            "messages": [{ "role": "user", "content": directive.prompt }],
            "temperature": provider_config.temperature,
            "max_tokens": provider_config.max_tokens,
        });

        let network_response = self
            .network_client
            .post(&provider_config.api_endpoint)
            .bearer_auth(api_key)
            .json(&request_body)
            .timeout(attempt_budget)
            .send()
            .await
            .map_err(|network_fault| {
                if network_fault.is_timeout() {
                    CoreFault::Timeout(format!("PROVIDER_TIMEOUT: {}", network_fault))
                } else {
                    CoreFault::Unavailable(format!("PROVIDER_LINK_SEVERED: {}", network_fault))
                }
            })?;

        let http_status = network_response.status();
        if http_status.is_server_error() {
            return Err(CoreFault::Unavailable(format!("PROVIDER_5XX: {}", http_status)));
        }
        if http_status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreFault::QuotaExceeded(format!("PROVIDER_429: {}", http_status)));
        }
        if http_status.is_client_error() {
            return Err(CoreFault::InvalidInput(format!("PROVIDER_4XX: {}", http_status)));
        }

        let response_payload: serde_json::Value = network_response
            .json()
            .await
            .map_err(|decode_fault| CoreFault::Unavailable(format!("PROVIDER_DECODE: {}", decode_fault)))?;

        let generated_text = response_payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| CoreFault::Unavailable("PROVIDER_SHAPE_DRIFT: empty choices".into()))?
            .to_string();

        let input_tokens = response_payload["usage"]["prompt_tokens"].as_u64().unwrap_or(0);
        let output_tokens = response_payload["usage"]["completion_tokens"].as_u64().unwrap_or(0);

        debug!(
            "📨 [AI_RESPONSE]: [{}] answered with {} chars.",
            provider_config.provider,
            generated_text.len()
        );

        Ok(GeneratedArtifact {
            text: generated_text,
            input_tokens,
            output_tokens,
            provider_used: provider_config.provider.clone(),
            model_used: provider_config.model.clone(),
        })
    }

    /// Sella la retención en el Outbox para la revisión humana.
    async fn emit_moderation_flag(
        &self,
        directive: &GenerateDirective,
        matched_terms: &[String],
        score: f64,
    ) -> Result<(), CoreFault> {
        let connection = self
            .application_state
            .database_client
            .get_connection()
            .map_err(CoreFault::from)?;

        append_within(
            &connection,
            OutboxTopic::ModerationFlagged,
            &json!({
                "task_id": directive.task_id,
                "task_type": directive.task_type.as_str(),
                "user_id": directive.user_id,
                "matched_terms": matched_terms,
                "score": score,
            }),
        )
        .await
        .map_err(CoreFault::from)?;

        error!(
            "🚨 [MODERATION_FLAG]: Task [{}] held for human review (score {:.2}).",
            directive.task_id, score
        );
        Ok(())
    }
}
