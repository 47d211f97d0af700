// [libs/domain/models/src/outbox.rs]
/*!
 * =================================================================
 * APARATO: OUTBOX EVENT ENVELOPE (V3.0 - AT-LEAST-ONCE)
 * CLASIFICACIÓN: DOMAIN ENTITIES (ESTRATO L2)
 * RESPONSABILIDAD: SOBRE PERSISTIDO DEL PATRÓN OUTBOX
 *
 * # Mathematical Proof (Replay Safety):
 * El Outbox se escribe en la MISMA transacción que la mutación de
 * dominio; los suscriptores avanzan offsets propios sobre la secuencia
 * monótona de event_id. Re-entrega tras colapso es segura porque cada
 * consumidor es idempotente sobre (event_id, subscriber_id).
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tópicos reconocidos de la secuencia del Outbox.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutboxTopic {
    LetterStatusUpdate,
    LetterCreated,
    NewTaskAssignment,
    TaskStatusUpdate,
    TaskEscalated,
    CreditTaskCompleted,
    CreditTaskFailed,
    ModerationFlagged,
    Notification,
}

impl OutboxTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxTopic::LetterStatusUpdate => "letter.status_update",
            OutboxTopic::LetterCreated => "letter.created",
            OutboxTopic::NewTaskAssignment => "task.assignment",
            OutboxTopic::TaskStatusUpdate => "task.status_update",
            OutboxTopic::TaskEscalated => "task.escalated",
            OutboxTopic::CreditTaskCompleted => "credit.completed",
            OutboxTopic::CreditTaskFailed => "credit.failed",
            OutboxTopic::ModerationFlagged => "moderation.flagged",
            OutboxTopic::Notification => "notification",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "letter.status_update" => Some(OutboxTopic::LetterStatusUpdate),
            "letter.created" => Some(OutboxTopic::LetterCreated),
            "task.assignment" => Some(OutboxTopic::NewTaskAssignment),
            "task.status_update" => Some(OutboxTopic::TaskStatusUpdate),
            "task.escalated" => Some(OutboxTopic::TaskEscalated),
            "credit.completed" => Some(OutboxTopic::CreditTaskCompleted),
            "credit.failed" => Some(OutboxTopic::CreditTaskFailed),
            "moderation.flagged" => Some(OutboxTopic::ModerationFlagged),
            "notification" => Some(OutboxTopic::Notification),
        _ => None,
        }
    }
}

/// Fila cristalizada de la secuencia del Outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Secuencia monótona asignada por el Ledger (rowid).
    pub event_id: i64,
    pub topic: OutboxTopic,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
