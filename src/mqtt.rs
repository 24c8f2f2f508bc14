use crate::config::Settings;
use crate::error::AppError;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS, Transport};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Requests buffered between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 64;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub const ONLINE: &str = "online";
pub const OFFLINE: &str = "offline";

/// Everything goes out at QoS 0, the transport default.
pub const PUBLISH_QOS: QoS = QoS::AtMostOnce;

/// Outbound side of the bus, as seen by the poll loop and discovery.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), AppError>;
}

pub fn build_options(settings: &Settings) -> MqttOptions {
    let mqtt = &settings.mqtt;
    let mut opts = MqttOptions::new(mqtt.client_id.clone(), mqtt.host.clone(), mqtt.port);
    opts.set_keep_alive(Duration::from_secs(mqtt.keep_alive_secs));
    opts.set_clean_session(true);
    opts.set_last_will(LastWill::new(
        settings.availability_topic(),
        OFFLINE,
        PUBLISH_QOS,
        true,
    ));
    if let Some(username) = &mqtt.username {
        opts.set_credentials(username.clone(), mqtt.password.clone().unwrap_or_default());
    }
    if mqtt.port == 8883 {
        opts.set_transport(Transport::tls_with_default_config());
    }
    opts
}

/// The single broker connection. Dropping it without [`close`](Self::close)
/// leaves the broker to fire the last will.
pub struct MqttConnection {
    client: AsyncClient,
    driver: JoinHandle<()>,
    availability_topic: String,
    stopping: CancellationToken,
}

impl MqttConnection {
    /// Connect and wait for the broker's CONNACK. Failing here is fatal; once
    /// connected, dropped connections are retried by the background driver.
    pub async fn connect(settings: &Settings) -> Result<Self, AppError> {
        let broker = format!("{}:{}", settings.mqtt.host, settings.mqtt.port);
        let (client, mut eventloop) = AsyncClient::new(build_options(settings), REQUEST_CAPACITY);

        tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| {
                AppError::Connection(format!(
                    "no CONNACK from {broker} within {}s",
                    CONNECT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| AppError::Connection(format!("{broker}: {e}")))?;
        info!(broker = %broker, "connected to MQTT broker");

        let availability_topic = settings.availability_topic();
        announce(&client, &availability_topic);

        let stopping = CancellationToken::new();
        let driver = tokio::spawn(drive(
            eventloop,
            client.clone(),
            availability_topic.clone(),
            stopping.clone(),
        ));

        Ok(Self {
            client,
            driver,
            availability_topic,
            stopping,
        })
    }

    /// Mark the bridge offline, disconnect and wait for the driver to finish.
    pub async fn close(self) {
        self.stopping.cancel();

        if let Err(e) = self
            .client
            .try_publish(&self.availability_topic, PUBLISH_QOS, true, OFFLINE)
        {
            warn!(topic = %self.availability_topic, error = %e, "failed to publish offline status");
        }
        if let Err(e) = self.client.try_disconnect() {
            warn!(error = %e, "failed to request MQTT disconnect");
        }

        let abort = self.driver.abort_handle();
        match tokio::time::timeout(DISCONNECT_TIMEOUT, self.driver).await {
            Ok(_) => info!("disconnected from MQTT broker"),
            Err(_) => {
                warn!("MQTT disconnect timed out; dropping connection");
                abort.abort();
            }
        }
    }
}

#[async_trait]
impl MessagePublisher for MqttConnection {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), AppError> {
        self.client
            .try_publish(topic, PUBLISH_QOS, retain, payload)
            .map_err(|e| AppError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), AppError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => continue,
            Err(e) => return Err(AppError::Mqtt(e.to_string())),
        }
    }
}

fn announce(client: &AsyncClient, availability_topic: &str) {
    if let Err(e) = client.try_publish(availability_topic, PUBLISH_QOS, true, ONLINE) {
        warn!(topic = %availability_topic, error = %e, "failed to publish online status");
    }
}

/// Polls the event loop until a disconnect goes out. Polling after an error
/// makes rumqttc reconnect, so errors are retried after a fixed delay.
async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    availability_topic: String,
    stopping: CancellationToken,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("reconnected to MQTT broker");
                announce(&client, &availability_topic);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if stopping.is_cancelled() {
                    break;
                }
                warn!(
                    error = %e,
                    "MQTT connection error; retrying in {}s",
                    RECONNECT_DELAY.as_secs()
                );
                tokio::select! {
                    _ = stopping.cancelled() => break,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        Settings::from_lookup(|name| map.get(name).map(|v| v.to_string())).unwrap()
    }

    #[test]
    fn options_carry_broker_and_last_will() {
        let s = settings(&[
            ("ECONET_ENDPOINT", "hp"),
            ("MQTT_HOST", "broker.local"),
            ("MQTT_PORT", "1884"),
            ("MQTT_CLIENT_ID", "bridge-1"),
        ]);
        let opts = build_options(&s);
        assert_eq!(opts.broker_address(), ("broker.local".to_string(), 1884));
        assert_eq!(opts.client_id(), "bridge-1");
        assert_eq!(opts.keep_alive(), Duration::from_secs(60));
        assert_eq!(opts.credentials(), None);

        let will = opts.last_will().unwrap();
        assert_eq!(will.topic, "econet/availability");
        assert_eq!(&will.message[..], OFFLINE.as_bytes());
        assert!(will.retain);
    }

    #[test]
    fn credentials_are_set_when_username_present() {
        let s = settings(&[
            ("ECONET_ENDPOINT", "hp"),
            ("MQTT_USERNAME", "bridge"),
            ("MQTT_PASSWORD", "secret"),
        ]);
        let opts = build_options(&s);
        assert_eq!(
            opts.credentials(),
            Some(("bridge".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn username_without_password_uses_empty_password() {
        let s = settings(&[("ECONET_ENDPOINT", "hp"), ("MQTT_USERNAME", "bridge")]);
        assert_eq!(
            build_options(&s).credentials(),
            Some(("bridge".to_string(), String::new()))
        );
    }
}
