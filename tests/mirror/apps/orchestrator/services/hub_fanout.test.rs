// [tests/mirror/apps/orchestrator/services/hub_fanout.test.rs]
/**
 * =================================================================
 * APARATO: HUB FANOUT TEST (V3.0 - SLOW CONSUMER ISOLATION)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: RUTEO DE SALAS, DESCARTES Y AISLAMIENTO (S6)
 * =================================================================
 */

use estafeta_domain_models::identity::UserRole;
use estafeta_domain_models::realtime::{school_room, EventType, RealtimeFrame};
use estafeta_orchestrator::services::hub::RealtimeHub;
use serde_json::json;
use std::time::Duration;

async fn drain_frames(
    buffer: &estafeta_orchestrator::services::hub::ConnectionBuffer,
) -> Vec<RealtimeFrame> {
    let mut drained = Vec::new();
    while let Ok(Some(frame)) =
        tokio::time::timeout(Duration::from_millis(100), buffer.pop_wait()).await
    {
        drained.push(frame);
    }
    drained
}

#[tokio::test]
async fn certify_deterministic_rooms_and_routing() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing hub room routing...");

    let hub = RealtimeHub::new(64);

    let courier_seat = hub.register("courier-u1", UserRole::CourierL1, "PK");
    let student_seat = hub.register("student-u2", UserRole::User, "PK");
    let foreign_seat = hub.register("student-u3", UserRole::User, "QH");

    // 1. SALA DE ESCUELA: solo el campus 'PK' recibe.
    let reached = hub.publish(
        RealtimeFrame::new(EventType::Notification, json!({ "n": 1 })).for_room(school_room("PK")),
    );
    assert_eq!(reached, 2, "L4_HUB_FAULT: school room membership drift");

    // 2. BUZÓN PERSONAL: entrega dirigida a un usuario concreto.
    hub.publish(
        RealtimeFrame::new(EventType::NewTaskAssignment, json!({ "t": 1 })).for_user("courier-u1"),
    );

    // 3. SALA DE ROL: 'couriers' agrupa solo al cuerpo.
    let couriers_reached =
        hub.publish(RealtimeFrame::new(EventType::TaskStatusUpdate, json!({})).for_room("couriers"));
    assert_eq!(couriers_reached, 1);

    // 4. DIFUSIÓN GLOBAL sin dirección explícita.
    let global_reached = hub.publish(RealtimeFrame::new(EventType::Heartbeat, json!({})));
    assert_eq!(global_reached, 3);

    let courier_frames = drain_frames(&courier_seat.buffer).await;
    let courier_types: Vec<EventType> = courier_frames.iter().map(|f| f.event_type).collect();
    assert!(courier_types.contains(&EventType::Notification));
    assert!(courier_types.contains(&EventType::NewTaskAssignment));
    assert!(courier_types.contains(&EventType::TaskStatusUpdate));

    let foreign_frames = drain_frames(&foreign_seat.buffer).await;
    assert!(
        foreign_frames.iter().all(|f| f.event_type == EventType::Heartbeat),
        "L4_HUB_FAULT: foreign school leaked frames"
    );

    let _ = student_seat;
    println!("   ✅ [SUCCESS]: Deterministic rooms and routing certified.");
}

#[tokio::test]
async fn certify_slow_consumer_isolation_and_drop_counter() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing slow consumer policy (S6)...");

    // Capacidad mínima para forzar el desborde del consumidor lento.
    let hub = RealtimeHub::new(2);

    let slow_seat = hub.register("slow-user", UserRole::User, "PK");
    let healthy_seat = hub.register("healthy-user", UserRole::User, "PK");

    // Ráfaga de 5 tramas a la sala compartida; nadie drena al lento.
    for burst_index in 0..5 {
        let reached = hub.publish(
            RealtimeFrame::new(EventType::Notification, json!({ "i": burst_index }))
                .for_room(school_room("PK")),
        );
        // Publish retorna de inmediato habiendo alcanzado ambos buffers.
        assert_eq!(reached, 2);
    }

    // 1. EL SANO recibe íntegro (capacidad no excedida al drenar).
    let healthy_frames = drain_frames(&healthy_seat.buffer).await;
    assert_eq!(healthy_frames.len(), 2, "healthy buffer also bounded at capacity");

    // 2. EL LENTO descartó los más antiguos; el contador crece estricto.
    let dropped = hub.dropped_count(&slow_seat.connection_id).unwrap();
    assert_eq!(dropped, 3, "L4_HUB_FAULT: drop counter drift");

    // 3. Lo retenido por el lento son las tramas MÁS RECIENTES.
    let slow_frames = drain_frames(&slow_seat.buffer).await;
    assert_eq!(slow_frames.len(), 2);
    assert_eq!(slow_frames[0].data["i"], 3);
    assert_eq!(slow_frames[1].data["i"], 4);

    println!("   ✅ [SUCCESS]: Isolation and strict drop accounting certified.");
}

#[tokio::test]
async fn certify_heartbeats_survive_overflow_preference() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing drop-oldest-non-heartbeat...");

    let hub = RealtimeHub::new(2);
    let seat = hub.register("hb-user", UserRole::User, "PK");

    // HEARTBEAT primero, luego dos notificaciones: el desborde debe
    // sacrificar la notificación más antigua, no el heartbeat.
    hub.publish_to_connection(&seat.connection_id, RealtimeFrame::new(EventType::Heartbeat, json!({})));
    hub.publish_to_connection(&seat.connection_id, RealtimeFrame::new(EventType::Notification, json!({ "n": 1 })));
    hub.publish_to_connection(&seat.connection_id, RealtimeFrame::new(EventType::Notification, json!({ "n": 2 })));

    let frames = drain_frames(&seat.buffer).await;
    let kinds: Vec<EventType> = frames.iter().map(|f| f.event_type).collect();
    assert_eq!(kinds, vec![EventType::Heartbeat, EventType::Notification]);
    assert_eq!(frames[1].data["n"], 2, "oldest non-heartbeat must be the victim");

    println!("   ✅ [SUCCESS]: Heartbeat preservation certified.");
}

#[tokio::test]
async fn certify_connection_targeting_dominates_routing() {
    println!("\n🧪 [PROVING_GROUNDS]: Auditing tier-1 connection routing...");

    let hub = RealtimeHub::new(16);

    // El MISMO usuario sostiene dos pestañas simultáneas.
    let first_tab = hub.register("multi-tab", UserRole::User, "PK");
    let second_tab = hub.register("multi-tab", UserRole::User, "PK");

    // Nivel 1 domina: aunque la trama porte sala Y usuario, la entrega
    // aterriza SOLO en la conexión objetivo.
    let reached = hub.publish(
        RealtimeFrame::new(EventType::Connected, json!({ "tab": 1 }))
            .for_room(school_room("PK"))
            .for_user("multi-tab")
            .for_connection(first_tab.connection_id.clone()),
    );
    assert_eq!(reached, 1, "L4_HUB_FAULT: tier-1 fanned beyond the target");

    let first_frames = drain_frames(&first_tab.buffer).await;
    assert_eq!(first_frames.len(), 1);
    assert_eq!(first_frames[0].data["tab"], 1);

    let second_frames = drain_frames(&second_tab.buffer).await;
    assert!(second_frames.is_empty(), "L4_HUB_FAULT: sibling tab received the echo");

    // Nivel 2 (buzón de usuario) sigue alcanzando TODAS las pestañas.
    let user_reached = hub.publish(
        RealtimeFrame::new(EventType::Notification, json!({})).for_user("multi-tab"),
    );
    assert_eq!(user_reached, 2);

    // Conexión objetivo desaparecida: entrega nula, sin pánico.
    hub.unregister(&first_tab.connection_id);
    let ghost_reached = hub.publish(
        RealtimeFrame::new(EventType::Notification, json!({}))
            .for_connection(first_tab.connection_id.clone()),
    );
    assert_eq!(ghost_reached, 0);

    println!("   ✅ [SUCCESS]: Three-tier routing priority certified.");
}

#[tokio::test]
async fn certify_unregister_releases_rooms() {
    let hub = RealtimeHub::new(8);
    let seat = hub.register("bye-user", UserRole::User, "PK");
    assert_eq!(hub.connection_count(), 1);

    hub.unregister(&seat.connection_id);
    assert_eq!(hub.connection_count(), 0);

    // Publicar tras la liberación no alcanza buffers fantasma.
    let reached = hub.publish(RealtimeFrame::new(EventType::Notification, json!({})).for_user("bye-user"));
    assert_eq!(reached, 0);
}
