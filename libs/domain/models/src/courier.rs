// [libs/domain/models/src/courier.rs]
/*!
 * =================================================================
 * APARATO: COURIER CORPS MODELS (V4.2 - HIERARCHY DTO)
 * CLASIFICACIÓN: DOMAIN ENTITIES (ESTRATO L2)
 * RESPONSABILIDAD: ÁRBOL DE CARTEROS Y TAREAS DE RELEVO FÍSICO
 *
 * # Mathematical Proof (Tree Depth Bound):
 * level(child) = level(parent) - 1 con level ∈ {1..4} y el nivel 4
 * sin padre implica profundidad máxima 4; el invariante de prefijo
 * (prefix(child) extiende prefix(parent)) preserva el retículo de
 * autoridad en cada arista del árbol.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Estado administrativo de un cartero dentro del cuerpo.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CourierStatus {
    Pending,
    Approved,
    Suspended,
    Retired,
}

impl CourierStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourierStatus::Pending => "pending",
            CourierStatus::Approved => "approved",
            CourierStatus::Suspended => "suspended",
            CourierStatus::Retired => "retired",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(CourierStatus::Pending),
            "approved" => Some(CourierStatus::Approved),
            "suspended" => Some(CourierStatus::Suspended),
            "retired" => Some(CourierStatus::Retired),
            _ => None,
        }
    }
}

/// Nodo del árbol jerárquico de carteros (1:1 con un User).
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: String,
    pub user_id: String,
    /// Nivel organizativo: 1 edificio, 2 zona, 3 escuela, 4 ciudad.
    pub level: u8,
    /// Prefijo OP gestionado; más largo = autoridad más estrecha.
    pub managed_prefix: String,
    /// Enlace al padre; None únicamente para nivel 4.
    pub parent_courier_id: Option<String>,
    pub status: CourierStatus,
    pub current_task_count: u32,
    pub max_daily_tasks: u32,
    /// Ratio histórico de entregas exitosas [0.0, 1.0].
    pub success_rate: f64,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Prioridad de una tarea, heredada de la bandera urgente de la carta.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Normal,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Normal => "normal",
            TaskPriority::Urgent => "urgent",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "normal" => Some(TaskPriority::Normal),
            "urgent" => Some(TaskPriority::Urgent),
            _ => None,
        }
    }
}

/// Estados de la tarea; SOLO los escaneos del barcode los mueven.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Collected,
    InTransit,
    Delivered,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Collected => "collected",
            TaskStatus::InTransit => "in_transit",
            TaskStatus::Delivered => "delivered",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(TaskStatus::Pending),
            "collected" => Some(TaskStatus::Collected),
            "in_transit" => Some(TaskStatus::InTransit),
            "delivered" => Some(TaskStatus::Delivered),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

/// Orden de relevo físico de una carta vinculada.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierTask {
    pub id: String,
    /// None mientras ningún cartero elegible exista (cola de reintento).
    pub assigned_courier_id: Option<String>,
    pub barcode_id: String,
    pub letter_id: Option<String>,
    pub pickup_op_code: Option<String>,
    pub delivery_op_code: String,
    pub current_op_code: Option<String>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub deadline: Option<DateTime<Utc>>,
    pub reward_points: i64,
    /// Sello del primer intento de asignación (ancla de escalada 24h).
    pub created_at: DateTime<Utc>,
    /// Prefijo de escalada vigente; se acorta al escalar de nivel.
    pub escalation_prefix: Option<String>,
    pub escalated_at: Option<DateTime<Utc>>,
}
