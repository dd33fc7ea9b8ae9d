//! Wire protocol for the live-update channel.
//!
//! The server pushes JSON envelopes tagged with a `type` discriminator; the
//! client sends a single `request_initial_data` directive after each
//! successful connection. Everything else flows over REST.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Decoded inbound message: a type tag plus whatever payload came with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// The known message kind, if the tag is one we understand.
    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::from_tag(&self.kind)
    }
}

/// The fixed set of inbound message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    MachineChanged,
    SensorChanged,
    ModelChanged,
    VibrationData,
    Alert,
    Ping,
    ResyncAll,
}

impl MessageKind {
    /// Kinds subject to the trailing-edge throttle.
    pub const THROTTLED: [MessageKind; 4] = [
        MessageKind::MachineChanged,
        MessageKind::SensorChanged,
        MessageKind::ModelChanged,
        MessageKind::VibrationData,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "machine_changed" => Some(MessageKind::MachineChanged),
            "sensor_changed" => Some(MessageKind::SensorChanged),
            "model_changed" => Some(MessageKind::ModelChanged),
            "vibration_data" => Some(MessageKind::VibrationData),
            "alert" => Some(MessageKind::Alert),
            "ping" => Some(MessageKind::Ping),
            "resync_all" => Some(MessageKind::ResyncAll),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            MessageKind::MachineChanged => "machine_changed",
            MessageKind::SensorChanged => "sensor_changed",
            MessageKind::ModelChanged => "model_changed",
            MessageKind::VibrationData => "vibration_data",
            MessageKind::Alert => "alert",
            MessageKind::Ping => "ping",
            MessageKind::ResyncAll => "resync_all",
        }
    }

    /// The tracked resource a change notification refers to.
    pub fn resource(self) -> Option<ResourceKind> {
        match self {
            MessageKind::MachineChanged => Some(ResourceKind::Machines),
            MessageKind::SensorChanged => Some(ResourceKind::Sensors),
            MessageKind::ModelChanged => Some(ResourceKind::Models),
            _ => None,
        }
    }
}

/// The resource kinds the client tracks, polls, and refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Machines,
    Sensors,
    Models,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Machines,
        ResourceKind::Sensors,
        ResourceKind::Models,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Machines => "machines",
            ResourceKind::Sensors => "sensors",
            ResourceKind::Models => "models",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `*_changed` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceChange {
    pub id: i64,
    pub action: ChangeAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

/// Payload of a `vibration_data` push: one sample from a sensor.
/// Severity: 0 normal, 1 minor, 2 serious.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub data_id: i64,
    pub sensor_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub acceleration_x: Option<f64>,
    pub acceleration_y: Option<f64>,
    pub acceleration_z: Option<f64>,
    #[serde(default)]
    pub severity: i32,
    #[serde(default)]
    pub is_anomaly: i32,
}

/// Payload of an `alert` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertNotice {
    pub log_id: i64,
    pub sensor_id: i64,
    /// 1 minor, 2 serious, 3 software fault
    pub error_type: Option<i32>,
    pub data_id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl AlertNotice {
    pub fn severity_label(&self) -> &'static str {
        match self.error_type {
            Some(1) => "minor",
            Some(2) => "serious",
            Some(3) => "software",
            _ => "unknown",
        }
    }
}

/// Messages the client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for a bulk snapshot push of the tracked resources. Sent once per
    /// successful connection.
    RequestInitialData {
        client_id: String,
        resources: Vec<ResourceKind>,
    },
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
