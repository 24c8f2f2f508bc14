//! The fixed metric table and the values read for it each cycle.
//!
//! Topic suffixes, labels and Home Assistant metadata are compiled in; adding
//! a metric means adding a row to [`METRICS`] and a matching [`Source`].

use serde_json::Number;
use std::fmt;

/// Where a metric's raw value lives in the controller's `regParams` document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    OutdoorUnitAmbientTemp,
    CompressorFrequency,
    FlowTemp,
    UpperPump,
    ReturnTemp,
    CalculatedPresetTemp,
    WorkState,
    Circuit1Thermostat,
    CylinderTemp,
    WeatherSensorTemp,
    FlapValveState,
    /// `tilesParams[i][0][0]`
    Tile(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Temperature,
    Pressure,
    Frequency,
    Speed,
    Running,
    Enum,
}

impl DeviceClass {
    /// Device class as understood by Home Assistant. Its `speed` class only
    /// accepts linear units, so rpm readings go out without one.
    pub fn as_ha(&self) -> Option<&'static str> {
        match self {
            DeviceClass::Temperature => Some("temperature"),
            DeviceClass::Pressure => Some("pressure"),
            DeviceClass::Frequency => Some("frequency"),
            DeviceClass::Speed => None,
            DeviceClass::Running => Some("running"),
            DeviceClass::Enum => Some("enum"),
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, DeviceClass::Running)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDefinition {
    pub topic: &'static str,
    pub label: &'static str,
    pub unit: Option<&'static str>,
    pub device_class: DeviceClass,
    pub icon: &'static str,
    pub source: Source,
}

impl PartialEq for MetricDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.topic == other.topic
    }
}

const fn metric(
    topic: &'static str,
    label: &'static str,
    unit: Option<&'static str>,
    device_class: DeviceClass,
    icon: &'static str,
    source: Source,
) -> MetricDefinition {
    MetricDefinition {
        topic,
        label,
        unit,
        device_class,
        icon,
        source,
    }
}

const CELSIUS: Option<&str> = Some("°C");

/// Published in this order every cycle.
#[rustfmt::skip]
pub static METRICS: &[MetricDefinition] = &[
    metric("ashp_ambient_air_temp", "ASHP Ambient Air Temperature", CELSIUS, DeviceClass::Temperature, "mdi:thermometer", Source::OutdoorUnitAmbientTemp),
    metric("ashp_circuit1_calculated_set_temp", "ASHP Circuit 1 Calculated Set Temperature", CELSIUS, DeviceClass::Temperature, "mdi:thermometer", Source::Tile(29)),
    metric("ashp_compressor_freq", "ASHP Compressor Frequency", Some("Hz"), DeviceClass::Frequency, "mdi:sine-wave", Source::CompressorFrequency),
    metric("ashp_fan_speed", "ASHP Fan Speed", Some("rpm"), DeviceClass::Speed, "mdi:fan", Source::Tile(3)),
    metric("ashp_flow_temp", "ASHP Flow Temperature", CELSIUS, DeviceClass::Temperature, "mdi:thermometer-chevron-up", Source::FlowTemp),
    metric("ashp_outlet_water_pressure", "ASHP Outlet Water Pressure", Some("bar"), DeviceClass::Pressure, "mdi:gauge", Source::Tile(76)),
    metric("ashp_pump_active", "ASHP Pump", None, DeviceClass::Running, "mdi:pump", Source::UpperPump),
    metric("ashp_return_temp", "ASHP Return Temperature", CELSIUS, DeviceClass::Temperature, "mdi:thermometer-chevron-down", Source::ReturnTemp),
    metric("ashp_target_temp", "ASHP Target Temperature", CELSIUS, DeviceClass::Temperature, "mdi:thermometer", Source::CalculatedPresetTemp),
    metric("ashp_work_state", "ASHP Work State", None, DeviceClass::Running, "mdi:state-machine", Source::WorkState),
    metric("circuit1_thermostat", "Circuit 1 Thermostat Temperature", CELSIUS, DeviceClass::Temperature, "mdi:thermostat", Source::Circuit1Thermostat),
    metric("dhw_temp", "Cylinder Temperature", CELSIUS, DeviceClass::Temperature, "mdi:water-thermometer", Source::CylinderTemp),
    metric("outdoor_temp", "Outdoor Sensor Temperature", CELSIUS, DeviceClass::Temperature, "mdi:thermometer", Source::WeatherSensorTemp),
    metric("three_way_valve_state", "Three Way Valve State", None, DeviceClass::Enum, "mdi:valve", Source::FlapValveState),
];

/// Payloads a binary sensor reports for on and off.
pub const BINARY_ON: &str = "1";
pub const BINARY_OFF: &str = "0";

/// Options advertised for the valve enum sensor.
pub const VALVE_STATES: &[&str] = &["CH", "DHW"];

/// Maps the controller's flap valve code to a label. Codes compare by value,
/// so `3.0` is `DHW`; unknown codes are passed through as received.
pub fn valve_state_label(code: &Number) -> String {
    let integral = code
        .as_i64()
        .or_else(|| code.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64));
    match integral {
        Some(0) => "CH".to_string(),
        Some(3) => "DHW".to_string(),
        _ => code.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// Kept as the JSON number so integers and floats print as received.
    Number(Number),
    Binary(bool),
    State(String),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{n}"),
            MetricValue::Binary(true) => f.write_str(BINARY_ON),
            MetricValue::Binary(false) => f.write_str(BINARY_OFF),
            MetricValue::State(s) => f.write_str(s),
        }
    }
}

/// One value read during a poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricReading {
    pub metric: &'static MetricDefinition,
    pub value: MetricValue,
}

impl MetricReading {
    pub fn name(&self) -> &'static str {
        self.metric.topic
    }

    pub fn payload(&self) -> String {
        self.value.to_string()
    }
}
