// [apps/orchestrator/src/config.rs]
/*!
 * =================================================================
 * APARATO: ORCHESTRATOR CONFIGURATION (V3.0 - RECOGNIZED OPTIONS)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L4)
 * RESPONSABILIDAD: CAPTURA DE ENTORNO CON DEFAULTS SELLADOS
 *
 * Las opciones reconocidas del núcleo (delay_queue.*, ai.*, credit.*,
 * hub.*, courier.*) se capturan desde variables de entorno en forma
 * SCREAMING (delay_queue.workers -> DELAY_QUEUE_WORKERS). Cualquier
 * variable ausente cae a su default sellado.
 * =================================================================
 */

use std::env;

/// Configuración soberana del Orquestador.
#[derive(Debug, Clone)]
pub struct EstafetaConfig {
    // --- RED ---
    pub database_url: String,
    pub database_token: Option<String>,
    pub listening_port: u16,

    // --- DELAY QUEUE ---
    pub delay_queue_workers: usize,
    pub delay_queue_lease_seconds: u64,
    pub delay_queue_backoff_base_seconds: u64,

    // --- ENRUTADOR IA ---
    pub ai_default_provider: Option<String>,
    pub ai_request_timeout_seconds: u64,
    pub ai_moderation_threshold: f64,

    // --- MOTOR DE CRÉDITOS ---
    pub credit_max_attempts: u32,
    pub credit_daily_window_hours: i64,

    // --- HUB REALTIME ---
    pub hub_ping_period_seconds: u64,
    pub hub_pong_wait_seconds: u64,
    pub hub_send_buffer: usize,

    // --- DESPACHO DE CARTEROS ---
    pub courier_reassignment_interval_seconds: u64,
    pub courier_escalation_timeout_hours: i64,
}

impl EstafetaConfig {
    /// Hidrata la configuración desde el espacio de nombres del proceso.
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "file:estafeta.db".into()),
            database_token: env::var("TURSO_AUTH_TOKEN").ok(),
            listening_port: parse_env("PORT", 3000u16),

            delay_queue_workers: parse_env("DELAY_QUEUE_WORKERS", 4usize),
            delay_queue_lease_seconds: parse_env("DELAY_QUEUE_LEASE_SECONDS", 60u64),
            delay_queue_backoff_base_seconds: parse_env("DELAY_QUEUE_BACKOFF_BASE_SECONDS", 30u64),

            ai_default_provider: env::var("AI_DEFAULT_PROVIDER").ok(),
            ai_request_timeout_seconds: parse_env("AI_REQUEST_TIMEOUT_SECONDS", 30u64),
            ai_moderation_threshold: parse_env("AI_MODERATION_THRESHOLD", 0.8f64),

            credit_max_attempts: parse_env("CREDIT_MAX_ATTEMPTS", 3u32),
            credit_daily_window_hours: parse_env("CREDIT_DAILY_WINDOW_HOURS", 24i64),

            hub_ping_period_seconds: parse_env("HUB_PING_PERIOD_SECONDS", 54u64),
            hub_pong_wait_seconds: parse_env("HUB_PONG_WAIT_SECONDS", 60u64),
            hub_send_buffer: parse_env("HUB_SEND_BUFFER", 256usize),

            courier_reassignment_interval_seconds: parse_env(
                "COURIER_REASSIGNMENT_INTERVAL_SECONDS",
                60u64,
            ),
            courier_escalation_timeout_hours: parse_env("COURIER_ESCALATION_TIMEOUT_HOURS", 24i64),
        }
    }
}

fn parse_env<T: std::str::FromStr>(variable_name: &str, default_value: T) -> T {
    env::var(variable_name)
        .ok()
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default_value)
}
