use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::registry::SensorRegistry;
use crate::devices::{ReaderCounters, Reading, Sensor, SensorKind};
use crate::utils::error::SensorError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSnapshot {
    pub id: String,
    pub name: String,
    pub kind: SensorKind,
    pub value: f64,
    pub unit: String,
    pub reading: Reading,
}

/// Every sensor's value at one instant. Building one never touches hardware.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub readings: Vec<SensorSnapshot>,
}

impl Snapshot {
    pub fn get(&self, id: &str) -> Option<&SensorSnapshot> {
        self.readings.iter().find(|r| r.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEntry {
    pub id: String,
    pub name: String,
    pub label: String,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub taken_at: DateTime<Utc>,
    pub entries: Vec<StatusEntry>,
}

impl StatusView {
    pub fn get(&self, id: &str) -> Option<&StatusEntry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    ResetMax,
    LaserOn,
    LaserOff,
}

impl DeviceAction {
    /// Parses the `item`/`command` pair of an API request, e.g. `("laser", Some("on"))`.
    pub fn from_request(item: &str, command: Option<&str>) -> Result<Self, SensorError> {
        match (item, command) {
            ("laser", Some("on")) => Ok(DeviceAction::LaserOn),
            ("laser", Some(_)) => Ok(DeviceAction::LaserOff),
            ("laser", None) => Err(SensorError::InvalidData("laser needs a command of on or off".to_string())),
            (other, _) => other.parse(),
        }
    }
}

impl FromStr for DeviceAction {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reset-max" | "resetmax" => Ok(DeviceAction::ResetMax),
            "laser-on" => Ok(DeviceAction::LaserOn),
            "laser-off" => Ok(DeviceAction::LaserOff),
            _ => Err(SensorError::InvalidData(format!("Unknown action '{}'", s))),
        }
    }
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceAction::ResetMax => write!(f, "reset-max"),
            DeviceAction::LaserOn => write!(f, "laser-on"),
            DeviceAction::LaserOff => write!(f, "laser-off"),
        }
    }
}

/// Human-readable state of one sensor, as shown on the status page.
pub fn status_label(kind: SensorKind, reading: Reading) -> String {
    match (kind, reading) {
        (_, Reading::NotReady) => "Port not available".to_string(),
        (SensorKind::Pyrometer, Reading::NotConnected) => "Pyrometer not connected".to_string(),
        (_, Reading::NotConnected) => "Pump not connected".to_string(),
        (_, Reading::Absent) => "Reader not connected".to_string(),
        (SensorKind::Analog, Reading::Value(v)) => format!("{:.2}", v),
        (SensorKind::Gauge | SensorKind::Pyrometer, Reading::Value(v)) => v.to_string(),
    }
}

/// Read-only view over the registry for the presentation layer, plus the
/// pyrometer's on-demand commands.
#[derive(Clone)]
pub struct Aggregator {
    registry: Arc<SensorRegistry>,
}

impl Aggregator {
    pub fn new(registry: Arc<SensorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SensorRegistry> {
        &self.registry
    }

    pub fn snapshot(&self) -> Snapshot {
        let readings = self
            .registry
            .sensors()
            .iter()
            .map(|sensor| Self::sensor_snapshot(sensor.as_ref()))
            .collect();

        Snapshot {
            taken_at: Utc::now(),
            readings,
        }
    }

    pub fn status_view(&self) -> StatusView {
        let entries = self
            .registry
            .sensors()
            .iter()
            .map(|sensor| StatusEntry {
                id: sensor.id().to_string(),
                name: sensor.name().to_string(),
                label: status_label(sensor.kind(), sensor.reading()),
                unit: sensor.units().to_string(),
            })
            .collect();

        StatusView {
            taken_at: Utc::now(),
            entries,
        }
    }

    pub fn temperature(&self) -> Result<SensorSnapshot, SensorError> {
        let pyrometer = self
            .registry
            .pyrometer()
            .ok_or_else(|| SensorError::DeviceNotFound("pyrometer".to_string()))?;
        Ok(Self::sensor_snapshot(pyrometer.as_ref()))
    }

    pub fn counters(&self) -> BTreeMap<String, ReaderCounters> {
        self.registry
            .sensors()
            .iter()
            .map(|sensor| (sensor.id().to_string(), sensor.counters()))
            .collect()
    }

    /// Routes an on-demand action to `device_id`. Only the pyrometer accepts actions.
    pub async fn command(&self, device_id: &str, action: DeviceAction) -> Result<(), SensorError> {
        let Some(device) = self.registry.gauge(device_id) else {
            if self.registry.analog().id() == device_id {
                return Err(SensorError::UnsupportedCommand {
                    device: device_id.to_string(),
                    action: action.to_string(),
                });
            }
            return Err(SensorError::DeviceNotFound(device_id.to_string()));
        };

        if !device.is_pyrometer() {
            return Err(SensorError::UnsupportedCommand {
                device: device_id.to_string(),
                action: action.to_string(),
            });
        }

        info!("🎛️  {} requested on {}", action, device_id);
        match action {
            DeviceAction::ResetMax => device.reset_max().await,
            DeviceAction::LaserOn => device.laser_control(true).await,
            DeviceAction::LaserOff => device.laser_control(false).await,
        }
    }

    pub async fn reset_max(&self) -> Result<(), SensorError> {
        let id = self.pyrometer_id()?;
        self.command(&id, DeviceAction::ResetMax).await
    }

    pub async fn laser_control(&self, on: bool) -> Result<(), SensorError> {
        let id = self.pyrometer_id()?;
        let action = if on { DeviceAction::LaserOn } else { DeviceAction::LaserOff };
        self.command(&id, action).await
    }

    fn pyrometer_id(&self) -> Result<String, SensorError> {
        self.registry
            .pyrometer()
            .map(|p| p.config().id.clone())
            .ok_or_else(|| SensorError::DeviceNotFound("pyrometer".to_string()))
    }

    fn sensor_snapshot(sensor: &dyn Sensor) -> SensorSnapshot {
        let reading = sensor.reading();
        SensorSnapshot {
            id: sensor.id().to_string(),
            name: sensor.name().to_string(),
            kind: sensor.kind(),
            value: reading.numeric(),
            unit: sensor.units().to_string(),
            reading,
        }
    }
}
