//! Client for the ecoNET controller's `regParams` status document.

use crate::config::Settings;
use crate::error::{AppError, FetchError};
use crate::metrics::{valve_state_label, MetricReading, MetricValue, Source, METRICS};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{error::Category, Number, Value};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Produces one reading per entry of [`METRICS`], or nothing at all.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<MetricReading>, FetchError>;

    /// Where readings come from, for log context.
    fn describe(&self) -> String;
}

/// The subset of the controller response the bridge relies on.
#[derive(Debug, Clone, Deserialize)]
pub struct RegParams {
    pub curr: CurrentParams,
    #[serde(rename = "tilesParams", default)]
    pub tiles_params: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentParams {
    #[serde(rename = "AxenOutdoorTemp")]
    pub outdoor_unit_ambient_temp: Number,
    #[serde(rename = "AxenCompressorFreq")]
    pub compressor_freq: Number,
    #[serde(rename = "AxenOutgoingTemp")]
    pub flow_temp: Number,
    #[serde(rename = "AxenUpperPump")]
    pub upper_pump: Scalar,
    #[serde(rename = "AxenReturnTemp")]
    pub return_temp: Number,
    #[serde(rename = "HeatSourceCalcPresetTemp")]
    pub calculated_preset_temp: Number,
    #[serde(rename = "AxenWorkState")]
    pub work_state: Scalar,
    #[serde(rename = "Circuit1thermostat")]
    pub circuit1_thermostat: Number,
    #[serde(rename = "TempCWU")]
    pub cylinder_temp: Number,
    #[serde(rename = "TempWthr")]
    pub weather_sensor_temp: Number,
    #[serde(rename = "flapValveStates")]
    pub flap_valve_states: Number,
}

/// State fields arrive as JSON booleans, numeric codes or text depending on
/// the controller firmware.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(Number),
    Text(String),
}

impl Scalar {
    fn to_value(&self) -> MetricValue {
        match self {
            Scalar::Bool(on) => MetricValue::Binary(*on),
            Scalar::Number(n) => MetricValue::Number(n.clone()),
            Scalar::Text(s) => MetricValue::State(s.clone()),
        }
    }
}

impl RegParams {
    /// Parse a response body, separating malformed JSON from JSON of the
    /// wrong shape.
    pub fn from_slice(body: &[u8]) -> Result<Self, FetchError> {
        serde_json::from_slice(body).map_err(|e| match e.classify() {
            Category::Data => FetchError::Schema(e.to_string()),
            _ => FetchError::Body(e),
        })
    }

    /// Map the document onto the metric table, in table order.
    pub fn readings(&self) -> Result<Vec<MetricReading>, FetchError> {
        METRICS
            .iter()
            .map(|metric| {
                self.value_of(metric.source)
                    .map(|value| MetricReading { metric, value })
            })
            .collect()
    }

    fn value_of(&self, source: Source) -> Result<MetricValue, FetchError> {
        let c = &self.curr;
        let number = |n: &Number| MetricValue::Number(n.clone());
        let value = match source {
            Source::OutdoorUnitAmbientTemp => number(&c.outdoor_unit_ambient_temp),
            Source::CompressorFrequency => number(&c.compressor_freq),
            Source::FlowTemp => number(&c.flow_temp),
            Source::UpperPump => c.upper_pump.to_value(),
            Source::ReturnTemp => number(&c.return_temp),
            Source::CalculatedPresetTemp => number(&c.calculated_preset_temp),
            Source::WorkState => c.work_state.to_value(),
            Source::Circuit1Thermostat => number(&c.circuit1_thermostat),
            Source::CylinderTemp => number(&c.cylinder_temp),
            Source::WeatherSensorTemp => number(&c.weather_sensor_temp),
            Source::FlapValveState => MetricValue::State(valve_state_label(&c.flap_valve_states)),
            Source::Tile(index) => tile_value(&self.tiles_params, index)?,
        };
        Ok(value)
    }
}

/// `tilesParams[index][0][0]`, which is usually a list such as
/// `["24.0", 1, 0]` whose first element is the value. Numeric strings are
/// published as received, so `"1.60"` stays `1.60`.
fn tile_value(tiles: &[Value], index: usize) -> Result<MetricValue, FetchError> {
    let missing = || FetchError::Schema(format!("tilesParams[{index}][0][0] is missing"));

    let mut raw = tiles
        .get(index)
        .and_then(|tile| tile.pointer("/0/0"))
        .ok_or_else(missing)?;
    if let Value::Array(items) = raw {
        raw = items.first().ok_or_else(missing)?;
    }

    match raw {
        Value::Number(n) => Ok(MetricValue::Number(n.clone())),
        Value::String(s) if is_numeric(s) => Ok(MetricValue::State(s.trim().to_string())),
        Value::String(s) => Err(FetchError::Schema(format!(
            "tilesParams[{index}] value {s:?} is not numeric"
        ))),
        other => Err(FetchError::Schema(format!(
            "tilesParams[{index}] holds {other}, expected a number"
        ))),
    }
}

fn is_numeric(raw: &str) -> bool {
    raw.trim().parse::<f64>().is_ok_and(f64::is_finite)
}

/// HTTP client for one controller.
#[derive(Debug, Clone)]
pub struct EconetClient {
    http: reqwest::Client,
    url: String,
    username: String,
    password: String,
}

impl EconetClient {
    pub fn new(settings: &Settings) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Other(e.into()))?;
        Ok(Self {
            http,
            url: settings.econet_url(),
            username: settings.econet.username.clone(),
            password: settings.econet.password.clone(),
        })
    }

    pub async fn fetch_params(&self) -> Result<RegParams, FetchError> {
        let request_error = |source| FetchError::Request {
            url: self.url.clone(),
            source,
        };

        let resp = self
            .http
            .get(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(request_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status,
            });
        }

        let body = resp.bytes().await.map_err(request_error)?;
        debug!(url = %self.url, bytes = body.len(), "fetched regParams");
        RegParams::from_slice(&body)
    }
}

#[async_trait]
impl MetricSource for EconetClient {
    async fn fetch(&self) -> Result<Vec<MetricReading>, FetchError> {
        self.fetch_params().await?.readings()
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
