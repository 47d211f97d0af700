// [libs/domain/models/src/ai.rs]
/*!
 * =================================================================
 * APARATO: AI DISPATCH MODELS (V3.4 - PROVIDER ROTATION)
 * CLASIFICACIÓN: DOMAIN ENTITIES (ESTRATO L2)
 * RESPONSABILIDAD: CONFIGURACIÓN DE PROVEEDORES Y RASTRO DE USO
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Tipología de tareas que el enrutador IA atiende.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AiTaskType {
    /// Redacción de respuesta en nombre de una persona (cloud letter).
    Reply,
    /// Emparejamiento de pen-pals.
    Match,
    /// Sugerencias de inspiración para redactar.
    Inspiration,
    /// Curaduría de cartas para el museo.
    Curate,
}

impl AiTaskType {
    /// Los tipos de contenido pasan por la compuerta de moderación.
    pub fn requires_moderation(&self) -> bool {
        matches!(
            self,
            AiTaskType::Reply | AiTaskType::Inspiration | AiTaskType::Curate
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AiTaskType::Reply => "reply",
            AiTaskType::Match => "match",
            AiTaskType::Inspiration => "inspiration",
            AiTaskType::Curate => "curate",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "reply" => Some(AiTaskType::Reply),
            "match" => Some(AiTaskType::Match),
            "inspiration" => Some(AiTaskType::Inspiration),
            "curate" => Some(AiTaskType::Curate),
            _ => None,
        }
    }
}

/// Configuración soberana de un proveedor IA.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiProviderConfig {
    pub provider: String,
    pub api_endpoint: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Menor = preferido en la rotación.
    pub priority: u32,
    pub daily_quota: u64,
    pub used_quota: u64,
    /// Frontera del próximo reinicio de cuota (medianoche UTC).
    pub quota_reset_at: DateTime<Utc>,
    pub request_timeout_seconds: u64,
    pub active: bool,
}

impl AiProviderConfig {
    /// Cuota disponible en la ventana vigente.
    pub fn has_quota(&self) -> bool {
        self.used_quota < self.daily_quota
    }

    /// La ventana caducó y exige reinicio atómico antes de usarse.
    pub fn quota_window_is_stale(&self, now: DateTime<Utc>) -> bool {
        self.quota_reset_at <= now
    }
}

/// Resultado semántico de una invocación al proveedor.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AiCallStatus {
    Success,
    Failed,
    Moderated,
}

impl AiCallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiCallStatus::Success => "success",
            AiCallStatus::Failed => "failed",
            AiCallStatus::Moderated => "moderated",
        }
    }
}

/// Asiento append-only del consumo de cada llamada.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiUsageLog {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub task_type: AiTaskType,
    pub task_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub response_time_ms: u64,
    pub status: AiCallStatus,
    pub recorded_at: DateTime<Utc>,
}

/// Texto generado junto a su evidencia de consumo.
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub provider_used: String,
    pub model_used: String,
}

impl GeneratedArtifact {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}
