// [apps/orchestrator/src/handlers/stream.rs]
/*!
 * =================================================================
 * APARATO: REALTIME STREAM SOCKET (V8.0 - DUAL PUMP)
 * CLASIFICACIÓN: API HANDLER (ESTRATO L4)
 * RESPONSABILIDAD: ENLACE FULL-DUPLEX ENTRE EL HUB Y CADA CLIENTE
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. DUAL PUMP: Downstream drena el buffer acotado de la conexión;
 *    Upstream ingesta HEARTBEAT y posición. Cualquier otra trama
 *    entrante se rechaza con ERROR (contrato §realtime).
 * 2. PING/PONG WATCHDOG: ping cada hub.ping_period; un pong ausente
 *    por más de hub.pong_wait corta la conexión.
 * 3. PRESENCE: el registro publica COURIER_ONLINE a la sala de la
 *    escuela; la desconexión publica COURIER_OFFLINE y purga la
 *    posición reportada.
 * =================================================================
 */

use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use estafeta_domain_models::realtime::{school_room, EventType, RealtimeFrame};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

/// Identidad afirmada por el gateway colaborador; el núcleo re-verifica
/// contra el Ledger antes de sentar la conexión.
#[derive(Debug, Deserialize)]
pub struct StreamIdentity {
    pub user_id: String,
}

/**
 * Punto de entrada para la negociación del enlace realtime.
 * Realiza la transición de protocolo HTTP a WebSocket (RFC 6455).
 */
#[instrument(skip(websocket_upgrade, application_state))]
pub async fn establish_stream_link(
    websocket_upgrade: WebSocketUpgrade,
    Query(identity): Query<StreamIdentity>,
    State(application_state): State<AppState>,
) -> impl IntoResponse {
    debug!("🔌 [SOCKET_UPGRADE]: Negotiating protocol transition for [{}]...", identity.user_id);
    websocket_upgrade
        .on_upgrade(move |socket| handle_active_stream(socket, application_state, identity.user_id))
}

/// Orquestador de la sesión WebSocket con arquitectura de doble pump.
async fn handle_active_stream(socket: WebSocket, application_state: AppState, user_id: String) {
    // 1. RE-VERIFICACIÓN DE IDENTIDAD CONTRA EL LEDGER
    let user = match application_state.user_repository.find(&user_id).await {
        Ok(user) => user,
        Err(lookup_fault) => {
            warn!("⛔ [STREAM_REJECTED]: Unknown identity [{}]: {}", user_id, lookup_fault);
            let mut rejected_socket = socket;
            let rejection_frame = RealtimeFrame::new(
                EventType::Error,
                json!({ "code": "not_found", "message": "unknown identity" }),
            );
            if let Ok(serialized) = serde_json::to_string(&rejection_frame) {
                let _ = rejected_socket.send(Message::Text(serialized)).await;
            }
            return;
        }
    };

    // 2. ASIENTO EN EL HUB (salas deterministas unidas atómicamente)
    let registration = application_state
        .hub
        .register(&user.id, user.role, &user.school_code);
    let connection_id = registration.connection_id.clone();
    let connection_buffer = registration.buffer.clone();

    info!("⚡ [STREAM_OPEN]: Session [{}] seated for user [{}].", connection_id, user.id);

    // Trama de bienvenida dirigida a ESTA conexión (ruteo nivel 1:
    // otras pestañas del mismo usuario no reciben el eco).
    application_state.hub.publish(
        RealtimeFrame::new(
            EventType::Connected,
            json!({ "connection_id": connection_id, "user_id": user.id }),
        )
        .for_connection(connection_id.clone()),
    );

    // Presencia del cuerpo de carteros.
    let is_courier = user.role.courier_level().is_some();
    if is_courier {
        application_state.hub.publish(
            RealtimeFrame::new(EventType::CourierOnline, json!({ "user_id": user.id }))
                .for_room(school_room(&user.school_code)),
        );
    }

    let (mut socket_sender, mut socket_receiver) = socket.split();
    let last_pong_seen = Arc::new(Mutex::new(Instant::now()));

    // --- PUMP 1: DOWNSTREAM (buffer → cliente) + WATCHDOG ---
    let ping_period = Duration::from_secs(application_state.config.hub_ping_period_seconds);
    let pong_wait = Duration::from_secs(application_state.config.hub_pong_wait_seconds);
    let downstream_pong_view = last_pong_seen.clone();
    let downstream_buffer = connection_buffer.clone();
    let downstream_session_id = connection_id.clone();

    let mut downstream_pump = tokio::spawn(async move {
        let mut keepalive_ticker = interval(ping_period);

        loop {
            tokio::select! {
                // Brazo 1: drenaje del buffer acotado.
                pending_frame = downstream_buffer.pop_wait() => {
                    let Some(frame) = pending_frame else { break };
                    match serde_json::to_string(&frame) {
                        Ok(serialized_frame) => {
                            if socket_sender.send(Message::Text(serialized_frame)).await.is_err() {
                                warn!("⚠️ [STREAM_SEVERED]: Session [{}] lost downstream.", downstream_session_id);
                                break;
                            }
                        }
                        Err(serialize_fault) => {
                            error!("❌ [STREAM_ENCODE]: Frame dropped: {}", serialize_fault);
                        }
                    }
                },

                // Brazo 2: pulso físico + vigilancia del pong.
                _ = keepalive_ticker.tick() => {
                    let pong_age = downstream_pong_view
                        .lock()
                        .map(|seen| seen.elapsed())
                        .unwrap_or(pong_wait);
                    if pong_age > pong_wait {
                        warn!("💔 [STREAM_STALE]: Session [{}] missed pong window.", downstream_session_id);
                        break;
                    }
                    if socket_sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                },
            }
        }
    });

    // --- PUMP 2: UPSTREAM (cliente → núcleo) ---
    let upstream_state = application_state.clone();
    let upstream_buffer = connection_buffer.clone();
    let upstream_pong_mark = last_pong_seen.clone();
    let upstream_user_id = user.id.clone();
    let upstream_session_id = connection_id.clone();

    let mut upstream_pump = tokio::spawn(async move {
        while let Some(network_read_result) = socket_receiver.next().await {
            match network_read_result {
                Ok(Message::Text(raw_frame_json)) => {
                    ingest_client_frame(
                        &upstream_state,
                        &upstream_buffer,
                        &upstream_pong_mark,
                        &upstream_user_id,
                        &raw_frame_json,
                    );
                }
                Ok(Message::Pong(_)) => {
                    if let Ok(mut pong_guard) = upstream_pong_mark.lock() {
                        *pong_guard = Instant::now();
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("🔌 [STREAM_CLOSE]: Session [{}] closed by remote.", upstream_session_id);
                    break;
                }
                Err(physical_layer_fault) => {
                    warn!("❌ [STREAM_FAULT]: Session [{}] network error: {}", upstream_session_id, physical_layer_fault);
                    break;
                }
                _ => {} // Binary y Ping entrantes se descartan en este estrato.
            }
        }
    });

    // --- COLAPSO CONTROLADO: el primer pump en terminar corta el otro ---
    tokio::select! {
        _ = (&mut downstream_pump) => { upstream_pump.abort(); },
        _ = (&mut upstream_pump) => { downstream_pump.abort(); },
    };

    // 3. LIBERACIÓN DE RECURSOS Y PRESENCIA
    application_state.hub.unregister(&connection_id);
    application_state.hub.publish(
        RealtimeFrame::new(
            EventType::Disconnected,
            json!({ "connection_id": connection_id, "user_id": user.id }),
        )
        .for_room(school_room(&user.school_code)),
    );
    if is_courier {
        application_state.clear_courier_presence(&user.id);
        application_state.hub.publish(
            RealtimeFrame::new(EventType::CourierOffline, json!({ "user_id": user.id }))
                .for_room(school_room(&user.school_code)),
        );
    }

    info!("💀 [STREAM_TERMINATED]: Session [{}] resources released.", connection_id);
}

/**
 * Ingesta de tramas del cliente. El contrato admite HEARTBEAT (con
 * posición opcional en data.location); cualquier otra trama se
 * rechaza con ERROR hacia el propio buffer.
 */
fn ingest_client_frame(
    state: &AppState,
    own_buffer: &crate::services::hub::ConnectionBuffer,
    pong_mark: &Mutex<Instant>,
    user_id: &str,
    raw_frame_json: &str,
) {
    let parsed_frame: Result<RealtimeFrame, _> = serde_json::from_str(raw_frame_json);

    match parsed_frame {
        Ok(frame) if frame.event_type == EventType::Heartbeat => {
            if let Ok(mut pong_guard) = pong_mark.lock() {
                *pong_guard = Instant::now();
            }
            // Actualización de posición del cartero (op code o coordenadas).
            if let Some(reported_location) = frame.data["location"].as_str() {
                state.report_courier_location(user_id, reported_location);
            }
            own_buffer.push(RealtimeFrame::new(EventType::Heartbeat, json!({ "ack": true })));
        }
        Ok(unexpected_frame) => {
            own_buffer.push(RealtimeFrame::new(
                EventType::Error,
                json!({
                    "code": "invalid_input",
                    "message": format!("inbound '{}' frames are rejected", unexpected_frame.event_type.as_str()),
                }),
            ));
        }
        Err(decode_fault) => {
            own_buffer.push(RealtimeFrame::new(
                EventType::Error,
                json!({ "code": "invalid_input", "message": format!("frame decode failed: {}", decode_fault) }),
            ));
        }
    }
}
