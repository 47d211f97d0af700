// [libs/domain/models/src/tests_serialization.rs]
/**
 * =================================================================
 * APARATO: DOMAIN SERIALIZATION TEST (V3.0 - WIRE PARITY)
 * CLASIFICACIÓN: TRINITY EVIDENCE (ESTRATO L2-MODELS)
 * RESPONSABILIDAD: CERTIFICACIÓN DE PARIDAD JSON DEL CONTRATO REALTIME
 *
 * # Mathematical Proof (Frame Grammar):
 * El Dashboard reconoce exactamente los discriminadores SCREAMING_SNAKE
 * del contrato §realtime; cualquier deriva de serde rompería todos los
 * clientes a la vez. Este aparato congela la gramática.
 * =================================================================
 */

#[cfg(test)]
mod tests {
    use crate::barcode::{BarcodeStatus, ScanType};
    use crate::realtime::{school_room, EventType, RealtimeFrame};
    use serde_json::json;

    /**
     * CERTIFICACIÓN: una trama por frame con discriminador SCREAMING.
     */
    #[test]
    fn certify_realtime_frame_wire_grammar() {
        println!("\n🧪 [PROVING_GROUNDS]: Validating realtime frame grammar...");

        let frame = RealtimeFrame::new(
            EventType::LetterStatusUpdate,
            json!({ "barcode_id": "B-001", "new_status": "in_transit" }),
        )
        .for_room(school_room("PK"));

        let serialized_frame = serde_json::to_string(&frame).expect("frame serialization collapsed");

        // 1. DISCRIMINADOR DE PROTOCOLO
        assert!(serialized_frame.contains("\"type\":\"LETTER_STATUS_UPDATE\""));
        // 2. DIRECCIONAMIENTO DE SALA
        assert!(serialized_frame.contains("\"room\":\"school:PK\""));
        // 3. CAMPOS OPCIONALES AUSENTES NO VIAJAN
        assert!(!serialized_frame.contains("user_id"));
        assert!(!serialized_frame.contains("target_connection_id"));

        // 4. DIRECCIONAMIENTO DE CONEXIÓN (ruteo nivel 1) SÍ VIAJA
        let targeted_frame = RealtimeFrame::new(EventType::Connected, json!({}))
            .for_connection("conn-77");
        let serialized_targeted = serde_json::to_string(&targeted_frame).expect("frame collapsed");
        assert!(serialized_targeted.contains("\"target_connection_id\":\"conn-77\""));

        let recovered: RealtimeFrame =
            serde_json::from_str(&serialized_frame).expect("frame deserialization collapsed");
        assert_eq!(recovered.event_type, EventType::LetterStatusUpdate);

        println!("   ✅ [SUCCESS]: Wire grammar frozen bit-perfect.");
    }

    /**
     * CERTIFICACIÓN: las formas persistidas de estados son estables.
     */
    #[test]
    fn certify_persisted_status_labels() {
        for (status, label) in [
            (BarcodeStatus::Unactivated, "unactivated"),
            (BarcodeStatus::Bound, "bound"),
            (BarcodeStatus::InTransit, "in_transit"),
            (BarcodeStatus::Delivered, "delivered"),
            (BarcodeStatus::Expired, "expired"),
            (BarcodeStatus::Cancelled, "cancelled"),
        ] {
            assert_eq!(status.as_str(), label);
            assert_eq!(BarcodeStatus::parse(label), Some(status));
        }

        assert_eq!(ScanType::Pickup.as_str(), "pickup");
        assert_eq!(ScanType::parse("delivery"), Some(ScanType::Delivery));
    }
}
