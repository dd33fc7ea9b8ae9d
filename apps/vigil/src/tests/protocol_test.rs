use crate::protocol::{
    AlertNotice, ChangeAction, ClientMessage, Envelope, MessageKind, ResourceChange, ResourceKind,
};

#[test]
fn test_envelope_decode() {
    let envelope =
        Envelope::decode(r#"{"type":"sensor_changed","data":{"id":3,"action":"created"}}"#)
            .unwrap();
    assert_eq!(envelope.kind, "sensor_changed");
    assert_eq!(envelope.message_kind(), Some(MessageKind::SensorChanged));

    let change: ResourceChange = serde_json::from_value(envelope.data).unwrap();
    assert_eq!(change.id, 3);
    assert_eq!(change.action, ChangeAction::Created);
}

#[test]
fn test_envelope_data_defaults_to_null() {
    let envelope = Envelope::decode(r#"{"type":"ping"}"#).unwrap();
    assert_eq!(envelope.message_kind(), Some(MessageKind::Ping));
    assert!(envelope.data.is_null());
}

#[test]
fn test_unknown_kind_is_not_a_message() {
    let envelope = Envelope::decode(r#"{"type":"espresso_ready","data":{}}"#).unwrap();
    assert_eq!(envelope.message_kind(), None);
}

#[test]
fn test_malformed_frame_is_an_error() {
    assert!(Envelope::decode("{nope").is_err());
    assert!(Envelope::decode(r#"{"data":{}}"#).is_err());
}

#[test]
fn test_changed_kinds_map_to_resources() {
    assert_eq!(
        MessageKind::MachineChanged.resource(),
        Some(ResourceKind::Machines)
    );
    assert_eq!(
        MessageKind::SensorChanged.resource(),
        Some(ResourceKind::Sensors)
    );
    assert_eq!(
        MessageKind::ModelChanged.resource(),
        Some(ResourceKind::Models)
    );
    assert_eq!(MessageKind::Alert.resource(), None);
}

#[test]
fn test_request_initial_data_wire_shape() {
    let request = ClientMessage::RequestInitialData {
        client_id: "client-1".to_string(),
        resources: ResourceKind::ALL.to_vec(),
    };
    let value: serde_json::Value = serde_json::from_str(&request.encode().unwrap()).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "type": "request_initial_data",
            "client_id": "client-1",
            "resources": ["machines", "sensors", "models"]
        })
    );
}

#[test]
fn test_alert_severity_labels() {
    let alert: AlertNotice = serde_json::from_value(serde_json::json!({
        "log_id": 42,
        "sensor_id": 7,
        "error_type": 3,
        "data_id": 1001,
        "timestamp": "2026-08-06T10:00:00Z"
    }))
    .unwrap();
    assert_eq!(alert.severity_label(), "software");

    let unknown = AlertNotice {
        error_type: None,
        ..alert
    };
    assert_eq!(unknown.severity_label(), "unknown");
}
