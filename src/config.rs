use crate::error::ConfigError;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_MQTT_HOST: &str = "localhost";
const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_TOPIC_PREFIX: &str = "econet/";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;
const DEFAULT_DISCOVERY_NAME: &str = "Grant R290";
const DEFAULT_ECONET_CREDENTIAL: &str = "admin";

/// Immutable runtime settings, built once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mqtt: MqttSettings,
    pub econet: EconetSettings,
    pub poll_interval: Duration,
    pub discovery: DiscoverySettings,
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// `None` connects anonymously.
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    /// Always ends with `/`.
    pub topic_prefix: String,
}

#[derive(Debug, Clone)]
pub struct EconetSettings {
    /// `host` or `host:port` of the controller, without scheme.
    pub endpoint: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub enabled: bool,
    pub device_name: String,
}

impl Settings {
    /// Load settings from the process environment, honouring a `.env` file
    /// in the working directory if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup. Empty values are
    /// treated the same as unset ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let endpoint = get("ECONET_ENDPOINT").ok_or(ConfigError::Missing("ECONET_ENDPOINT"))?;

        let port: u16 = parse_or("MQTT_PORT", get("MQTT_PORT"), DEFAULT_MQTT_PORT)?;
        if port == 0 {
            return Err(invalid("MQTT_PORT", "0", "port must be non-zero"));
        }

        let interval_secs: u64 = parse_or(
            "POLLING_INTERVAL",
            get("POLLING_INTERVAL"),
            DEFAULT_POLL_INTERVAL_SECS,
        )?;
        if interval_secs == 0 {
            return Err(invalid(
                "POLLING_INTERVAL",
                "0",
                "interval must be greater than zero",
            ));
        }

        let keep_alive_secs = parse_or(
            "MQTT_KEEP_ALIVE_SECS",
            get("MQTT_KEEP_ALIVE_SECS"),
            DEFAULT_KEEP_ALIVE_SECS,
        )?;

        let discovery_enabled = match get("HA_DISCOVERY_MESSAGES") {
            Some(raw) => parse_bool("HA_DISCOVERY_MESSAGES", &raw)?,
            None => true,
        };

        let mut topic_prefix = get("MQTT_TOPIC_PREFIX").unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.into());
        if !topic_prefix.ends_with('/') {
            topic_prefix.push('/');
        }

        Ok(Settings {
            mqtt: MqttSettings {
                host: get("MQTT_HOST").unwrap_or_else(|| DEFAULT_MQTT_HOST.into()),
                port,
                client_id: get("MQTT_CLIENT_ID")
                    .unwrap_or_else(|| format!("econet-mqtt-{}", Uuid::new_v4())),
                username: get("MQTT_USERNAME"),
                password: get("MQTT_PASSWORD"),
                keep_alive_secs,
                topic_prefix,
            },
            econet: EconetSettings {
                endpoint,
                username: get("ECONET_USERNAME")
                    .unwrap_or_else(|| DEFAULT_ECONET_CREDENTIAL.into()),
                password: get("ECONET_PASSWORD")
                    .unwrap_or_else(|| DEFAULT_ECONET_CREDENTIAL.into()),
            },
            poll_interval: Duration::from_secs(interval_secs),
            discovery: DiscoverySettings {
                enabled: discovery_enabled,
                device_name: get("HA_DISCOVERY_NAME")
                    .unwrap_or_else(|| DEFAULT_DISCOVERY_NAME.into()),
            },
        })
    }

    /// State topic for a metric, e.g. `econet/ashp_flow_temp`.
    pub fn state_topic(&self, suffix: &str) -> String {
        format!("{}{}", self.mqtt.topic_prefix, suffix)
    }

    pub fn availability_topic(&self) -> String {
        self.state_topic("availability")
    }

    /// Status URL polled on the controller.
    pub fn econet_url(&self) -> String {
        format!("http://{}/econet/regParams", self.econet.endpoint)
    }
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| invalid(var, &raw, &e.to_string())),
        None => Ok(default),
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, raw, "expected true or false")),
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
