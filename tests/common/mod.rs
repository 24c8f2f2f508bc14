#![allow(dead_code)]

use async_trait::async_trait;
use econet_mqtt::mqtt::MessagePublisher;
use econet_mqtt::{AppError, Settings};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A message captured by [`Recorder`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// In-memory bus that records everything published to it.
#[derive(Default)]
pub struct Recorder {
    pub sent: Mutex<Vec<Sent>>,
}

impl Recorder {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagePublisher for Recorder {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(Sent {
            topic: topic.to_string(),
            payload: String::from_utf8(payload).unwrap(),
            retain,
        });
        Ok(())
    }
}

pub fn settings(vars: &[(&str, &str)]) -> Settings {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Settings::from_lookup(|name| map.get(name).cloned()).unwrap()
}

/// A `regParams` document as returned by the controller.
pub fn regparams() -> Value {
    let mut tiles = vec![Value::Null; 80];
    tiles[3] = json!([[["650", 1, 0]]]);
    tiles[29] = json!([[["24.0", 1, 0]]]);
    tiles[76] = json!([[["1.6", 1, 0]]]);

    json!({
        "settings": { "uid": "1234" },
        "curr": {
            "AxenOutdoorTemp": 7.5,
            "AxenCompressorFreq": 42,
            "AxenOutgoingTemp": 45.2,
            "AxenUpperPump": true,
            "AxenReturnTemp": 39.8,
            "HeatSourceCalcPresetTemp": 46.5,
            "AxenWorkState": 1,
            "Circuit1thermostat": 20.5,
            "TempCWU": 48.1,
            "TempWthr": 6.9,
            "flapValveStates": 0
        },
        "tilesParams": tiles
    })
}

pub fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Serves `response` to every connection and records the raw requests.
pub async fn spawn_http(response: String) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));

    let seen = requests.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let response = response.clone();
            let seen = seen.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                    if request.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                seen.lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&request).into_owned());
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, requests)
}

/// Accepts connections and drops them without answering.
pub async fn spawn_hangup() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });
    addr
}

/// What a client sent to [`spawn_broker`] after connecting.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerPacket {
    Publish(Sent),
    Disconnect,
}

async fn read_packet(socket: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let header = socket.read_u8().await.ok()?;
    let mut len = 0usize;
    let mut shift = 0;
    loop {
        let byte = socket.read_u8().await.ok()?;
        len |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    let mut body = vec![0u8; len];
    socket.read_exact(&mut body).await.ok()?;
    Some((header, body))
}

fn decode_publish(header: u8, body: &[u8]) -> Sent {
    let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
    let topic = String::from_utf8_lossy(&body[2..2 + topic_len]).into_owned();
    let qos = (header >> 1) & 0x03;
    let payload_start = 2 + topic_len + if qos > 0 { 2 } else { 0 };
    Sent {
        topic,
        payload: String::from_utf8_lossy(&body[payload_start..]).into_owned(),
        retain: header & 0x01 == 0x01,
    }
}

/// Minimal MQTT 3.1.1 broker: accepts every CONNECT, answers pings and
/// records QoS 0 publishes and disconnects in arrival order.
pub async fn spawn_broker() -> (SocketAddr, Arc<Mutex<Vec<BrokerPacket>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let packets = Arc::new(Mutex::new(Vec::new()));

    let seen = packets.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let seen = seen.clone();
            tokio::spawn(async move {
                while let Some((header, body)) = read_packet(&mut socket).await {
                    match header >> 4 {
                        // CONNECT -> CONNACK, session not present, accepted
                        1 => {
                            let _ = socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await;
                        }
                        3 => seen
                            .lock()
                            .unwrap()
                            .push(BrokerPacket::Publish(decode_publish(header, &body))),
                        // PINGREQ -> PINGRESP
                        12 => {
                            let _ = socket.write_all(&[0xd0, 0x00]).await;
                        }
                        14 => {
                            seen.lock().unwrap().push(BrokerPacket::Disconnect);
                            break;
                        }
                        _ => {}
                    }
                }
            });
        }
    });

    (addr, packets)
}
