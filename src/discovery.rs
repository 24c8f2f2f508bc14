//! Home Assistant MQTT discovery.

use crate::config::Settings;
use crate::error::AppError;
use crate::metrics::{DeviceClass, MetricDefinition, BINARY_OFF, BINARY_ON, METRICS, VALVE_STATES};
use crate::mqtt::{MessagePublisher, OFFLINE, ONLINE};
use serde::Serialize;
use tracing::{error, info};

const DISCOVERY_PREFIX: &str = "homeassistant";
const DEVICE_IDENTIFIER: &str = "econet_mqtt_publisher";
const UNIQUE_ID_PREFIX: &str = "econet_";
/// Sensors go unavailable after this many missed polls.
const EXPIRE_AFTER_POLLS: u64 = 4;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Device {
    pub identifiers: Vec<String>,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiscoveryConfig {
    pub name: String,
    pub unique_id: String,
    pub state_topic: String,
    pub device: Device,
    pub icon: String,
    pub availability_topic: String,
    pub payload_available: String,
    pub payload_not_available: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_off: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// A retained config message for one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryMessage {
    pub topic: String,
    pub config: DiscoveryConfig,
}

fn component(metric: &MetricDefinition) -> &'static str {
    if metric.device_class.is_binary() {
        "binary_sensor"
    } else {
        "sensor"
    }
}

pub fn device(settings: &Settings) -> Device {
    Device {
        identifiers: vec![DEVICE_IDENTIFIER.to_string()],
        name: settings.discovery.device_name.clone(),
        model: "Heat Pump Controller".to_string(),
        manufacturer: "Econet".to_string(),
    }
}

pub fn message_for(settings: &Settings, metric: &MetricDefinition) -> DiscoveryMessage {
    let unique_id = format!("{UNIQUE_ID_PREFIX}{}", metric.topic);
    let binary = metric.device_class.is_binary();

    let config = DiscoveryConfig {
        name: metric.label.to_string(),
        unique_id: unique_id.clone(),
        state_topic: settings.state_topic(metric.topic),
        device: device(settings),
        icon: metric.icon.to_string(),
        availability_topic: settings.availability_topic(),
        payload_available: ONLINE.to_string(),
        payload_not_available: OFFLINE.to_string(),
        device_class: metric.device_class.as_ha().map(str::to_string),
        unit_of_measurement: metric.unit.map(str::to_string),
        // Enum sensors cannot carry a state class.
        state_class: match metric.device_class {
            DeviceClass::Enum => None,
            _ => Some("measurement".to_string()),
        },
        expire_after: (!binary).then(|| settings.poll_interval.as_secs() * EXPIRE_AFTER_POLLS),
        payload_on: binary.then(|| BINARY_ON.to_string()),
        payload_off: binary.then(|| BINARY_OFF.to_string()),
        options: (metric.device_class == DeviceClass::Enum)
            .then(|| VALVE_STATES.iter().map(|s| s.to_string()).collect()),
    };

    DiscoveryMessage {
        topic: format!("{DISCOVERY_PREFIX}/{}/{unique_id}/config", component(metric)),
        config,
    }
}

/// One discovery message per metric, in table order.
pub fn messages(settings: &Settings) -> Vec<DiscoveryMessage> {
    METRICS.iter().map(|m| message_for(settings, m)).collect()
}

/// Publish retained discovery configs when enabled. Returns how many were
/// accepted by the bus; individual failures are logged, not fatal.
pub async fn publish_discovery<P>(settings: &Settings, publisher: &P) -> Result<usize, AppError>
where
    P: MessagePublisher + ?Sized,
{
    if !settings.discovery.enabled {
        info!("Home Assistant discovery disabled");
        return Ok(0);
    }

    info!(device = %settings.discovery.device_name, "publishing Home Assistant discovery messages");
    let mut published = 0;
    for msg in messages(settings) {
        let payload = serde_json::to_vec(&msg.config)?;
        match publisher.publish(&msg.topic, payload, true).await {
            Ok(()) => published += 1,
            Err(e) => error!(
                topic = %msg.topic,
                metric = %msg.config.unique_id,
                error = %e,
                "failed to publish discovery config"
            ),
        }
    }
    info!(published, "Home Assistant discovery messages published");
    Ok(published)
}
