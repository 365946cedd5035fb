//! Envelope and payload types for the realtime protocol
//!
//! Every frame on the wire is an [`Envelope`]: `{"type", "data", "timestamp"}`.
//! Inbound envelopes are validated into an [`Update`], with one variant per
//! recognized [`Topic`], before they reach any subscriber.

use crate::error::{ChannelError, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Envelope type used to present a credential after connecting
pub const AUTH_TOPIC: &str = "auth";

/// The fixed three-field wrapper around every realtime message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Topic discriminator
    #[serde(rename = "type")]
    pub kind: String,

    /// Payload, shaped per topic
    pub data: serde_json::Value,

    /// Creation time of the envelope
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Wrap a payload, stamping it with the current time
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// Envelope carrying an auth token
    pub fn auth(token: &str) -> Self {
        Self::new(AUTH_TOPIC, serde_json::json!({ "token": token }))
    }
}

/// Recognized realtime topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    SensorUpdate,
    DroneUpdate,
    SecurityAlert,
    LeafDetection,
    SystemAlert,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::SensorUpdate,
        Topic::DroneUpdate,
        Topic::SecurityAlert,
        Topic::LeafDetection,
        Topic::SystemAlert,
    ];

    /// Wire name used in the envelope `type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::SensorUpdate => "sensor_update",
            Topic::DroneUpdate => "drone_update",
            Topic::SecurityAlert => "security_alert",
            Topic::LeafDetection => "leaf_detection",
            Topic::SystemAlert => "system_alert",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| ChannelError::UnknownTopic(s.to_string()))
    }
}

/// Geographic position of a field asset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    Humidity,
    SoilMoisture,
    Ph,
    Light,
}

/// A single field sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub id: String,
    pub sensor_id: String,
    #[serde(rename = "type")]
    pub kind: SensorKind,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DroneState {
    Active,
    Idle,
    Charging,
    Maintenance,
}

/// Live status of one drone in the fleet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneStatus {
    pub id: String,
    pub name: String,
    pub status: DroneState,
    /// Battery charge, percent
    pub battery: u8,
    /// Link quality, percent
    pub signal: u8,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityAlertKind {
    Intrusion,
    Motion,
    Animal,
    EquipmentIssue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityAlertStatus {
    Active,
    Resolved,
    Investigating,
}

/// Camera-raised security event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAlert {
    pub id: String,
    pub camera_id: String,
    pub alert_type: SecurityAlertKind,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub location: Location,
    pub status: SecurityAlertStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
    pub class: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    Pending,
    Analyzed,
    Processed,
}

/// Result of a leaf detection pass over one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafDetection {
    pub id: String,
    pub image_url: String,
    pub leaf_count: u32,
    pub confidence: f64,
    pub location: Location,
    pub timestamp: DateTime<Utc>,
    pub status: DetectionStatus,
    #[serde(default)]
    pub bounding_boxes: Vec<BoundingBox>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Alert,
    Info,
    Success,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Drone,
    Sensor,
    Security,
    System,
    Harvest,
}

/// Operator-facing notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemAlert {
    pub id: String,
    #[serde(rename = "type")]
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub priority: Priority,
    pub category: AlertCategory,
}

/// A validated inbound update, one variant per topic
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    SensorUpdate(SensorReading),
    DroneUpdate(DroneStatus),
    SecurityAlert(SecurityAlert),
    LeafDetection(LeafDetection),
    SystemAlert(SystemAlert),
}

impl Update {
    pub fn topic(&self) -> Topic {
        match self {
            Update::SensorUpdate(_) => Topic::SensorUpdate,
            Update::DroneUpdate(_) => Topic::DroneUpdate,
            Update::SecurityAlert(_) => Topic::SecurityAlert,
            Update::LeafDetection(_) => Topic::LeafDetection,
            Update::SystemAlert(_) => Topic::SystemAlert,
        }
    }

    /// Validate an envelope's payload against the schema of its topic
    pub fn from_envelope(envelope: Envelope) -> Result<Self> {
        let topic: Topic = envelope.kind.parse()?;
        let invalid = |source: serde_json::Error| ChannelError::InvalidPayload {
            topic: topic.to_string(),
            source,
        };

        let data = envelope.data;
        let update = match topic {
            Topic::SensorUpdate => {
                Update::SensorUpdate(serde_json::from_value(data).map_err(invalid)?)
            }
            Topic::DroneUpdate => {
                Update::DroneUpdate(serde_json::from_value(data).map_err(invalid)?)
            }
            Topic::SecurityAlert => {
                Update::SecurityAlert(serde_json::from_value(data).map_err(invalid)?)
            }
            Topic::LeafDetection => {
                Update::LeafDetection(serde_json::from_value(data).map_err(invalid)?)
            }
            Topic::SystemAlert => {
                Update::SystemAlert(serde_json::from_value(data).map_err(invalid)?)
            }
        };

        Ok(update)
    }

    /// Wrap this update in a freshly stamped envelope
    pub fn to_envelope(&self) -> Result<Envelope> {
        let data = match self {
            Update::SensorUpdate(p) => serde_json::to_value(p)?,
            Update::DroneUpdate(p) => serde_json::to_value(p)?,
            Update::SecurityAlert(p) => serde_json::to_value(p)?,
            Update::LeafDetection(p) => serde_json::to_value(p)?,
            Update::SystemAlert(p) => serde_json::to_value(p)?,
        };
        Ok(Envelope::new(self.topic().as_str(), data))
    }
}
