//! Simulated field telemetry for the development server
//!
//! One update per tick, cycling through every topic in [`Topic::ALL`] order.
//! Drones keep state between ticks so battery and position drift plausibly.

use chrono::Utc;
use harvest_client::{
    AlertCategory, AlertLevel, BoundingBox, DetectionStatus, DroneState, DroneStatus, Envelope,
    LeafDetection, Location, Priority, SecurityAlert, SecurityAlertKind, SecurityAlertStatus,
    SensorKind, SensorReading, SystemAlert, Topic, Update,
};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Center of the simulated field
const FIELD_CENTER: Location = Location {
    lat: 36.1627,
    lng: -86.7816,
};

const CAMERAS: [&str; 4] = ["CAM-001", "CAM-002", "CAM-003", "CAM-004"];

/// Produces a deterministic topic sequence with random contents
pub struct FeedGenerator {
    drones: Vec<DroneStatus>,
    step: usize,
}

impl FeedGenerator {
    pub fn new() -> Self {
        Self {
            drones: vec![
                DroneStatus {
                    id: "DH-001".to_string(),
                    name: "Harvester Alpha".to_string(),
                    status: DroneState::Active,
                    battery: 85,
                    signal: 95,
                    location: Location { lat: 36.1627, lng: -86.7816 },
                    current_task: Some("Harvesting Field A".to_string()),
                },
                DroneStatus {
                    id: "DH-002".to_string(),
                    name: "Harvester Beta".to_string(),
                    status: DroneState::Idle,
                    battery: 92,
                    signal: 88,
                    location: Location { lat: 36.1647, lng: -86.7796 },
                    current_task: None,
                },
                DroneStatus {
                    id: "DH-003".to_string(),
                    name: "Harvester Gamma".to_string(),
                    status: DroneState::Charging,
                    battery: 45,
                    signal: 0,
                    location: Location { lat: 36.1607, lng: -86.7836 },
                    current_task: None,
                },
            ],
            step: 0,
        }
    }

    pub fn next_update<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Update {
        let topic = Topic::ALL[self.step % Topic::ALL.len()];
        self.step += 1;

        match topic {
            Topic::SensorUpdate => Update::SensorUpdate(sensor_reading(rng)),
            Topic::DroneUpdate => Update::DroneUpdate(self.advance_drone(rng)),
            Topic::SecurityAlert => Update::SecurityAlert(security_alert(rng)),
            Topic::LeafDetection => Update::LeafDetection(leaf_detection(rng)),
            Topic::SystemAlert => Update::SystemAlert(system_alert(rng)),
        }
    }

    fn advance_drone<R: Rng + ?Sized>(&mut self, rng: &mut R) -> DroneStatus {
        let index = rng.random_range(0..self.drones.len());
        let drone = &mut self.drones[index];

        match drone.status {
            DroneState::Active => {
                drone.battery = drone.battery.saturating_sub(rng.random_range(0..=2));
                drone.location.lat += rng.random_range(-0.0005..0.0005);
                drone.location.lng += rng.random_range(-0.0005..0.0005);
                if drone.battery < 20 {
                    drone.status = DroneState::Charging;
                    drone.current_task = None;
                    drone.signal = 0;
                }
            }
            DroneState::Charging => {
                drone.battery = (drone.battery + rng.random_range(1..=5)).min(100);
                if drone.battery == 100 {
                    drone.status = DroneState::Idle;
                    drone.signal = rng.random_range(80..=100);
                }
            }
            DroneState::Idle | DroneState::Maintenance => {
                drone.signal = rng.random_range(70..=100);
            }
        }

        drone.clone()
    }
}

impl Default for FeedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn near_field<R: Rng + ?Sized>(rng: &mut R) -> Location {
    Location {
        lat: FIELD_CENTER.lat + rng.random_range(-0.005..0.005),
        lng: FIELD_CENTER.lng + rng.random_range(-0.005..0.005),
    }
}

fn sensor_reading<R: Rng + ?Sized>(rng: &mut R) -> SensorReading {
    let (kind, value, unit) = match rng.random_range(0..5) {
        0 => (SensorKind::Temperature, rng.random_range(18.0..34.0), "°C"),
        1 => (SensorKind::Humidity, rng.random_range(40.0..90.0), "%"),
        2 => (SensorKind::SoilMoisture, rng.random_range(20.0..60.0), "%"),
        3 => (SensorKind::Ph, rng.random_range(5.5..7.0), "pH"),
        _ => (SensorKind::Light, rng.random_range(10_000.0..80_000.0), "lux"),
    };

    SensorReading {
        id: Uuid::new_v4().to_string(),
        sensor_id: format!("SENSOR-{:03}", rng.random_range(1..=12)),
        kind,
        value: (value * 10.0_f64).round() / 10.0,
        unit: unit.to_string(),
        timestamp: Utc::now(),
        location: near_field(rng),
    }
}

fn security_alert<R: Rng + ?Sized>(rng: &mut R) -> SecurityAlert {
    let kinds = [
        SecurityAlertKind::Motion,
        SecurityAlertKind::Animal,
        SecurityAlertKind::Intrusion,
        SecurityAlertKind::EquipmentIssue,
    ];

    SecurityAlert {
        id: Uuid::new_v4().to_string(),
        camera_id: CAMERAS.choose(rng).copied().unwrap_or(CAMERAS[0]).to_string(),
        alert_type: kinds.choose(rng).copied().unwrap_or(SecurityAlertKind::Motion),
        confidence: rng.random_range(0.6..0.99),
        timestamp: Utc::now(),
        image_url: None,
        location: near_field(rng),
        status: SecurityAlertStatus::Active,
    }
}

fn leaf_detection<R: Rng + ?Sized>(rng: &mut R) -> LeafDetection {
    let boxes = (0..rng.random_range(1..=4))
        .map(|_| BoundingBox {
            x: rng.random_range(0.0..0.8),
            y: rng.random_range(0.0..0.8),
            width: rng.random_range(0.05..0.2),
            height: rng.random_range(0.05..0.2),
            confidence: rng.random_range(0.7..0.99),
            class: "tobacco_leaf".to_string(),
        })
        .collect::<Vec<_>>();

    LeafDetection {
        id: Uuid::new_v4().to_string(),
        image_url: format!("/captures/{}.jpg", Uuid::new_v4()),
        leaf_count: rng.random_range(40..400),
        confidence: rng.random_range(0.75..0.98),
        location: near_field(rng),
        timestamp: Utc::now(),
        status: DetectionStatus::Analyzed,
        bounding_boxes: boxes,
    }
}

fn system_alert<R: Rng + ?Sized>(rng: &mut R) -> SystemAlert {
    let (level, priority, category, title, message) = match rng.random_range(0..4) {
        0 => (
            AlertLevel::Warning,
            Priority::High,
            AlertCategory::Drone,
            "Low battery",
            "A harvester dropped below 20% battery",
        ),
        1 => (
            AlertLevel::Info,
            Priority::Low,
            AlertCategory::Sensor,
            "Sensor sync",
            "Field sensors reported on schedule",
        ),
        2 => (
            AlertLevel::Success,
            Priority::Medium,
            AlertCategory::Harvest,
            "Harvest complete",
            "Field A harvesting task finished",
        ),
        _ => (
            AlertLevel::Alert,
            Priority::High,
            AlertCategory::Security,
            "Perimeter breach",
            "Motion detected outside the fence line",
        ),
    };

    SystemAlert {
        id: Uuid::new_v4().to_string(),
        level,
        title: title.to_string(),
        message: message.to_string(),
        timestamp: Utc::now(),
        priority,
        category,
    }
}

/// Publish one simulated envelope per tick; runs until the task is aborted
pub async fn run_feed(tx: broadcast::Sender<Envelope>, tick: Duration) {
    let mut generator = FeedGenerator::new();
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        let update = generator.next_update(&mut rand::rng());
        let envelope = match update.to_envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Failed to encode simulated update");
                continue;
            }
        };

        // No receivers is normal between clients
        if let Ok(receivers) = tx.send(envelope) {
            debug!(topic = %update.topic(), receivers, "Published simulated update");
        }
    }
}
