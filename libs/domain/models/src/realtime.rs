// [libs/domain/models/src/realtime.rs]
/*!
 * =================================================================
 * APARATO: REALTIME WIRE CONTRACT (V5.0 - HUB GRAMMAR)
 * CLASIFICACIÓN: DOMAIN ENTITIES (ESTRATO L2)
 * RESPONSABILIDAD: GRAMÁTICA INMUTABLE DE TRAMAS DEL HUB
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CONTRACT SOVEREIGNTY: Una trama JSON por frame WebSocket; el
 *    Dashboard y las apps móviles comparten este contrato vía typeshare.
 * 2. ROOM DETERMINISM: La membresía de salas se deriva de la identidad
 *    de la conexión (usuario, rol, escuela); jamás del cliente.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;
use uuid::Uuid;

use crate::identity::UserRole;

/// Tipología de eventos que el núcleo emite hacia los suscriptores.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    LetterStatusUpdate,
    NewTaskAssignment,
    TaskStatusUpdate,
    CourierOnline,
    CourierOffline,
    Notification,
    Heartbeat,
    Connected,
    Disconnected,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::LetterStatusUpdate => "LETTER_STATUS_UPDATE",
            EventType::NewTaskAssignment => "NEW_TASK_ASSIGNMENT",
            EventType::TaskStatusUpdate => "TASK_STATUS_UPDATE",
            EventType::CourierOnline => "COURIER_ONLINE",
            EventType::CourierOffline => "COURIER_OFFLINE",
            EventType::Notification => "NOTIFICATION",
            EventType::Heartbeat => "HEARTBEAT",
            EventType::Connected => "CONNECTED",
            EventType::Disconnected => "DISCONNECTED",
            EventType::Error => "ERROR",
        }
    }
}

/// Trama soberana del enlace realtime: un mensaje por frame.
///
/// El ruteo del Publish respeta tres niveles estrictos de prioridad:
/// conexión concreta (target_connection_id) → sala → difusión global.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeFrame {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Entrega dirigida a UNA conexión (un usuario puede sostener
    /// varias pestañas/dispositivos a la vez); prioridad máxima.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_connection_id: Option<String>,
}

impl RealtimeFrame {
    /// Forja una trama con identificador y sello temporal frescos.
    pub fn new(event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            data,
            timestamp: Utc::now(),
            user_id: None,
            room: None,
            target_connection_id: None,
        }
    }

    /// Dirige la trama a una sala concreta.
    pub fn for_room(mut self, room_name: impl Into<String>) -> Self {
        self.room = Some(room_name.into());
        self
    }

    /// Dirige la trama al buzón personal de un usuario (todas sus
    /// conexiones vivas).
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Dirige la trama a UNA conexión concreta; domina sobre cualquier
    /// dirección de sala o usuario presente en la trama.
    pub fn for_connection(mut self, connection_id: impl Into<String>) -> Self {
        self.target_connection_id = Some(connection_id.into());
        self
    }
}

// --- NOMENCLATURA DETERMINISTA DE SALAS ---

/// Sala global; toda conexión pertenece a ella.
pub const ROOM_GLOBAL: &str = "global";
/// Sala agregada del cuerpo de carteros.
pub const ROOM_COURIERS: &str = "couriers";
/// Sala agregada de administradores.
pub const ROOM_ADMINS: &str = "admins";
/// Sala agregada de usuarios estándar.
pub const ROOM_USERS: &str = "users";

/// Sala de escuela derivada del código de dos caracteres.
pub fn school_room(school_code: &str) -> String {
    format!("school:{}", school_code)
}

/// Buzón personal de un usuario.
pub fn user_room(user_id: &str) -> String {
    format!("user:{}", user_id)
}

/// Sala agregada derivada del rol de la conexión.
pub fn role_room(role: UserRole) -> &'static str {
    if role.is_admin() {
        ROOM_ADMINS
    } else if role.courier_level().is_some() {
        ROOM_COURIERS
    } else {
        ROOM_USERS
    }
}
