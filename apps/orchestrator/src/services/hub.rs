// [apps/orchestrator/src/services/hub.rs]
/*!
 * =================================================================
 * APARATO: REALTIME FAN-OUT HUB (V9.0 - ISOLATION CERTIFIED)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: REGISTRO DE CONEXIONES, SALAS Y MULTIDIFUSIÓN
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SLOW-CONSUMER ISOLATION: Publish solo encola en el buffer acotado
 *    de cada conexión; el pump de escritura es el único drenador. Dos
 *    conexiones jamás se bloquean entre sí.
 * 2. DROP-OLDEST POLICY: Buffer lleno descarta el mensaje más antiguo
 *    que no sea heartbeat e incrementa el contador de descartes.
 * 3. DETERMINISTIC ROOMS: global, school:<code>, user:<id> y la sala
 *    de rol se unen atómicamente en el registro.
 * =================================================================
 */

use estafeta_domain_models::identity::UserRole;
use estafeta_domain_models::realtime::{
    role_room, school_room, user_room, EventType, RealtimeFrame, ROOM_GLOBAL,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

/**
 * Buffer de salida acotado de UNA conexión.
 * El Publish encola sin esperar; el pump de escritura drena en orden.
 */
pub struct ConnectionBuffer {
    frames: Mutex<VecDeque<RealtimeFrame>>,
    capacity: usize,
    dropped_messages: AtomicU64,
    closed: AtomicBool,
    wakeup: Notify,
}

impl ConnectionBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            dropped_messages: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            wakeup: Notify::new(),
        }
    }

    /**
     * Encola una trama. Buffer lleno: descarta el mensaje más antiguo
     * que no sea HEARTBEAT (o el más antiguo a secas) e incrementa el
     * contador de descartes. Jamás bloquea al publicador.
     */
    pub fn push(&self, frame: RealtimeFrame) {
        {
            let mut frames_guard = match self.frames.lock() {
                Ok(guard) => guard,
                Err(poisoned_lock) => poisoned_lock.into_inner(),
            };

            if frames_guard.len() >= self.capacity {
                let victim_index = frames_guard
                    .iter()
                    .position(|buffered| buffered.event_type != EventType::Heartbeat)
                    .unwrap_or(0);
                frames_guard.remove(victim_index);
                self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            }

            frames_guard.push_back(frame);
        }
        self.wakeup.notify_one();
    }

    /// Drena la siguiente trama; None cuando la conexión cerró y vació.
    pub async fn pop_wait(&self) -> Option<RealtimeFrame> {
        loop {
            let pending_wakeup = self.wakeup.notified();

            {
                let mut frames_guard = match self.frames.lock() {
                    Ok(guard) => guard,
                    Err(poisoned_lock) => poisoned_lock.into_inner(),
                };
                if let Some(frame) = frames_guard.pop_front() {
                    return Some(frame);
                }
            }

            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            pending_wakeup.await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.wakeup.notify_waiters();
    }

    /// Contador de descartes (estrictamente creciente bajo overflow).
    pub fn dropped_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }
}

/// Asiento de una conexión viva en el registro del Hub.
struct ConnectionSeat {
    user_id: String,
    role: UserRole,
    school_code: String,
    buffer: Arc<ConnectionBuffer>,
}

/// Identidad de la conexión devuelta al handler del socket.
#[derive(Clone)]
pub struct HubRegistration {
    pub connection_id: String,
    pub buffer: Arc<ConnectionBuffer>,
}

/**
 * El Hub soberano: conexiones, salas y ruteo de publicación.
 * Se comparte como valor con ciclo de vida explícito (jamás singleton
 * de paquete); los cerrojos internos solo guardan mapas en RAM y
 * ninguna operación suspende mientras los sostiene.
 */
pub struct RealtimeHub {
    send_buffer_capacity: usize,
    connections: RwLock<HashMap<String, ConnectionSeat>>,
    rooms: RwLock<HashMap<String, HashSet<String>>>,
}

impl RealtimeHub {
    pub fn new(send_buffer_capacity: usize) -> Self {
        Self {
            send_buffer_capacity,
            connections: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /**
     * Registra una conexión y la une atómicamente a sus salas
     * deterministas: global, school:<code>, user:<id> y la de rol.
     */
    pub fn register(&self, user_id: &str, role: UserRole, school_code: &str) -> HubRegistration {
        let connection_id = Uuid::new_v4().to_string();
        let buffer = Arc::new(ConnectionBuffer::new(self.send_buffer_capacity));

        {
            let mut connections_guard = self.connections.write().expect("hub connections poisoned");
            connections_guard.insert(
                connection_id.clone(),
                ConnectionSeat {
                    user_id: user_id.to_string(),
                    role,
                    school_code: school_code.to_string(),
                    buffer: buffer.clone(),
                },
            );
        }

        for room_name in [
            ROOM_GLOBAL.to_string(),
            school_room(school_code),
            user_room(user_id),
            role_room(role).to_string(),
        ] {
            self.join(&connection_id, &room_name);
        }

        info!(
            "⚡ [HUB_REGISTER]: Connection [{}] seated for user [{}] ({}).",
            connection_id,
            user_id,
            role.as_str()
        );

        HubRegistration { connection_id, buffer }
    }

    /// Desregistra la conexión, abandona sus salas y cierra el buffer.
    pub fn unregister(&self, connection_id: &str) {
        let removed_seat = {
            let mut connections_guard = self.connections.write().expect("hub connections poisoned");
            connections_guard.remove(connection_id)
        };

        {
            let mut rooms_guard = self.rooms.write().expect("hub rooms poisoned");
            for members in rooms_guard.values_mut() {
                members.remove(connection_id);
            }
            rooms_guard.retain(|_, members| !members.is_empty());
        }

        if let Some(seat) = removed_seat {
            seat.buffer.close();
            debug!("💀 [HUB_UNREGISTER]: Connection [{}] released.", connection_id);
        }
    }

    pub fn join(&self, connection_id: &str, room_name: &str) {
        let mut rooms_guard = self.rooms.write().expect("hub rooms poisoned");
        rooms_guard
            .entry(room_name.to_string())
            .or_default()
            .insert(connection_id.to_string());
    }

    pub fn leave(&self, connection_id: &str, room_name: &str) {
        let mut rooms_guard = self.rooms.write().expect("hub rooms poisoned");
        if let Some(members) = rooms_guard.get_mut(room_name) {
            members.remove(connection_id);
            if members.is_empty() {
                rooms_guard.remove(room_name);
            }
        }
    }

    /**
     * PUBLISH: ruteo determinista de la trama en tres niveles.
     * 1. target_connection_id presente → SOLO esa conexión (un usuario
     *    con varias pestañas no recibe réplicas en las demás).
     * 2. room presente → cada conexión de la sala; user_id dirige al
     *    buzón personal (todas las conexiones vivas del usuario).
     * 3. sin dirección → difusión global.
     * Retorna el número de buffers alcanzados; jamás espera a un
     * consumidor lento.
     */
    pub fn publish(&self, frame: RealtimeFrame) -> usize {
        if let Some(connection_id) = frame.target_connection_id.clone() {
            return usize::from(self.publish_to_connection(&connection_id, frame));
        }

        let target_room = if let Some(user_id) = &frame.user_id {
            user_room(user_id)
        } else if let Some(room_name) = &frame.room {
            room_name.clone()
        } else {
            ROOM_GLOBAL.to_string()
        };

        self.publish_to_room(&target_room, frame)
    }

    fn publish_to_room(&self, room_name: &str, frame: RealtimeFrame) -> usize {
        let member_ids: Vec<String> = {
            let rooms_guard = self.rooms.read().expect("hub rooms poisoned");
            rooms_guard
                .get(room_name)
                .map(|members| members.iter().cloned().collect())
                .unwrap_or_default()
        };

        if member_ids.is_empty() {
            return 0;
        }

        let connections_guard = self.connections.read().expect("hub connections poisoned");
        let mut reached_buffers = 0usize;
        for member_id in member_ids {
            if let Some(seat) = connections_guard.get(&member_id) {
                seat.buffer.push(frame.clone());
                reached_buffers += 1;
            }
        }

        debug!("📢 [HUB_PUBLISH]: '{}' fanned to {} buffers in [{}].",
            frame.event_type.as_str(), reached_buffers, room_name);
        reached_buffers
    }

    /// Entrega dirigida a UNA conexión concreta.
    pub fn publish_to_connection(&self, connection_id: &str, frame: RealtimeFrame) -> bool {
        let connections_guard = self.connections.read().expect("hub connections poisoned");
        match connections_guard.get(connection_id) {
            Some(seat) => {
                seat.buffer.push(frame);
                true
            }
            None => {
                warn!("🕳️  [HUB_MISS]: Connection [{}] vanished before delivery.", connection_id);
                false
            }
        }
    }

    /// Descartes acumulados de una conexión (vigilancia de congestión).
    pub fn dropped_count(&self, connection_id: &str) -> Option<u64> {
        let connections_guard = self.connections.read().expect("hub connections poisoned");
        connections_guard
            .get(connection_id)
            .map(|seat| seat.buffer.dropped_count())
    }

    /// Identidad de sala de una conexión viva (para presencia).
    pub fn seat_identity(&self, connection_id: &str) -> Option<(String, UserRole, String)> {
        let connections_guard = self.connections.read().expect("hub connections poisoned");
        connections_guard.get(connection_id).map(|seat| {
            (seat.user_id.clone(), seat.role, seat.school_code.clone())
        })
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().expect("hub connections poisoned").len()
    }
}
