use clap::ArgMatches;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::devices::analog::{Calibration, SENTINEL_ABSENT};
use crate::utils::error::SensorError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app_name: String,
    pub version: String,

    // Poll timing shared by every reader
    pub polling: PollingConfig,

    // Serial devices (gauges and the pyrometer)
    pub devices: Vec<DeviceConfig>,

    // Analog pressure transducer
    pub analog: AnalogConfig,

    // JSON API
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub first_poll_delay_ms: u64,
    pub settle_ms: u64,
    pub read_timeout_ms: u64,
    pub read_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Gauge,
    Pyrometer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseEncoding {
    /// Decimal text at a fixed character window.
    Ascii,
    /// Big-endian u16 at the window start, value = (raw - 1000) / 10.
    OffsetTenths,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,                          // Key used by the API and snapshots
    pub name: String,                        // Display name
    #[serde(default = "default_kind")]
    pub kind: DeviceKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub port: String,                        // e.g. /dev/ttyUSB0
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    pub start: usize,                        // Window offset into the response
    pub length: usize,                       // Window length
    pub command: String,                     // base64 primary command
    #[serde(default)]
    pub secondary_command: Option<String>,   // base64, written after the settle delay
    #[serde(default = "default_encoding")]
    pub encoding: ResponseEncoding,
    #[serde(default = "default_units")]
    pub units: String,
    #[serde(default)]
    pub pyrometer: Option<PyrometerCommands>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PyrometerCommands {
    pub laser_on: String,            // base64
    pub laser_off: String,           // base64
    #[serde(default)]
    pub reset_max: Option<String>,   // base64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalogConfig {
    pub id: String,
    pub name: String,
    pub units: String,
    /// IIO raw channel file; the reader runs without a controller when missing.
    pub controller_path: Option<PathBuf>,
    pub reference_volts: f64,
    pub full_scale: f64,
    pub min_volt: f64,
    pub max_volt: f64,
    pub min_units: f64,
    pub max_units: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

/// Command bytes for one serial device, decoded from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaugeCommands {
    pub primary: Vec<u8>,
    pub secondary: Option<Vec<u8>>,
}

/// On-demand pyrometer command bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyrometerCommandBytes {
    pub laser_on: Vec<u8>,
    pub laser_off: Vec<u8>,
    pub reset_max: Option<Vec<u8>>,
}

fn default_kind() -> DeviceKind {
    DeviceKind::Gauge
}

fn default_enabled() -> bool {
    true
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_encoding() -> ResponseEncoding {
    ResponseEncoding::Ascii
}

fn default_units() -> String {
    "mbar".to_string()
}

pub fn decode_command(encoded: &str) -> Result<Vec<u8>, SensorError> {
    let bytes = base64::decode(encoded.trim())?;
    if bytes.is_empty() {
        return Err(SensorError::ConfigError("Command sequence is empty".to_string()));
    }
    Ok(bytes)
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            first_poll_delay_ms: 1000,
            settle_ms: 500,
            read_timeout_ms: 1000,
            read_size: 100,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn first_poll_delay(&self) -> Duration {
        Duration::from_millis(self.first_poll_delay_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for AnalogConfig {
    fn default() -> Self {
        Self {
            id: "gas".to_string(),
            name: "Gas Pressure".to_string(),
            units: "psi".to_string(),
            controller_path: Some(PathBuf::from("/sys/bus/iio/devices/iio:device0/in_voltage0_raw")),
            reference_volts: 5.174,
            full_scale: 65536.0,
            min_volt: 0.5,
            max_volt: 4.5,
            min_units: 0.0,
            max_units: 150.0,
        }
    }
}

impl AnalogConfig {
    pub fn calibration(&self) -> Calibration {
        Calibration {
            min_volt: self.min_volt,
            max_volt: self.max_volt,
            min_units: self.min_units,
            max_units: self.max_units,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl DeviceConfig {
    pub fn gauge(id: &str, name: &str, port: &str, start: usize, command: &str, secondary: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: DeviceKind::Gauge,
            enabled: true,
            port: port.to_string(),
            baud_rate: 9600,
            start,
            length: 16,
            command: command.to_string(),
            secondary_command: secondary.map(str::to_string),
            encoding: ResponseEncoding::Ascii,
            units: default_units(),
            pyrometer: None,
        }
    }

    pub fn decode_commands(&self) -> Result<GaugeCommands, SensorError> {
        let primary = decode_command(&self.command)
            .map_err(|e| SensorError::ConfigError(format!("{}: primary command: {}", self.id, e)))?;
        let secondary = match &self.secondary_command {
            Some(encoded) => Some(
                decode_command(encoded)
                    .map_err(|e| SensorError::ConfigError(format!("{}: secondary command: {}", self.id, e)))?,
            ),
            None => None,
        };
        Ok(GaugeCommands { primary, secondary })
    }

    pub fn decode_pyrometer_commands(&self) -> Result<Option<PyrometerCommandBytes>, SensorError> {
        let Some(commands) = &self.pyrometer else {
            return Ok(None);
        };
        let wrap = |what: &str, e: SensorError| SensorError::ConfigError(format!("{}: {}: {}", self.id, what, e));

        let laser_on = decode_command(&commands.laser_on).map_err(|e| wrap("laser_on", e))?;
        let laser_off = decode_command(&commands.laser_off).map_err(|e| wrap("laser_off", e))?;
        let reset_max = match &commands.reset_max {
            Some(encoded) => Some(decode_command(encoded).map_err(|e| wrap("reset_max", e))?),
            None => None,
        };
        Ok(Some(PyrometerCommandBytes { laser_on, laser_off, reset_max }))
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut pyrometer = DeviceConfig::gauge("pyro", "Pyrometer", "/dev/ttyUSB3", 0, "AQ==", None);
        pyrometer.kind = DeviceKind::Pyrometer;
        pyrometer.baud_rate = 115200;
        pyrometer.length = 2;
        pyrometer.encoding = ResponseEncoding::OffsetTenths;
        pyrometer.units = "°C".to_string();
        pyrometer.pyrometer = Some(PyrometerCommands {
            laser_on: "pQGk".to_string(),
            laser_off: "pQCl".to_string(),
            reset_max: None,
        });

        Self {
            app_name: "Pumpreader".to_string(),
            version: crate::VERSION.to_string(),
            polling: PollingConfig::default(),
            devices: vec![
                DeviceConfig::gauge("turbo", "Turbo Pump", "/dev/ttyUSB0", 5, "UFIxDQ==", Some("BQ==")),
                DeviceConfig::gauge("tank", "Tank Pump", "/dev/ttyUSB1", 5, "UFIxDQ==", Some("BQ==")),
                DeviceConfig::gauge("ion", "Ion Pump", "/dev/ttyUSB2", 9, "fiAwNSAwQiAwMA0=", None),
                pyrometer,
            ],
            analog: AnalogConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Config {
    /// Loads the file named by `--config` when given, then applies command line overrides.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, SensorError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => {
                info!("📄 No configuration file given, using built-in defaults");
                Self::default()
            }
        };

        if let Some(interval) = matches.get_one::<String>("interval") {
            let seconds: u64 = interval
                .parse()
                .map_err(|e| SensorError::ConfigError(format!("Invalid interval '{}': {}", interval, e)))?;
            config.polling.interval_ms = seconds
                .checked_mul(1000)
                .ok_or_else(|| SensorError::ConfigError(format!("Interval '{}' is too large", interval)))?;
        }

        if let Some(port) = matches.get_one::<String>("api-port") {
            config.api.port = port
                .parse()
                .map_err(|e| SensorError::ConfigError(format!("Invalid API port '{}': {}", port, e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SensorError> {
        let path = path.as_ref();
        info!("📄 Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)
            .map_err(|e| SensorError::ConfigError(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SensorError> {
        let mut config: Config = toml::from_str(content)?;

        if config.version.is_empty() {
            config.version = crate::VERSION.to_string();
        }

        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, SensorError> {
        toml::to_string(self).map_err(|e| SensorError::SerializationError(format!("TOML error: {}", e)))
    }

    pub fn validate(&self) -> Result<(), SensorError> {
        let mut ids = HashSet::new();
        let mut pyrometers = 0;

        for device in &self.devices {
            if device.id.is_empty() {
                return Err(SensorError::ConfigError(format!("Device '{}' has an empty id", device.name)));
            }
            if !ids.insert(device.id.as_str()) {
                return Err(SensorError::ConfigError(format!("Duplicate device id '{}'", device.id)));
            }
            if device.baud_rate == 0 {
                return Err(SensorError::ConfigError(format!("{}: baud rate must be positive", device.id)));
            }
            if device.length == 0 {
                return Err(SensorError::ConfigError(format!("{}: window length must be positive", device.id)));
            }
            if device.encoding == ResponseEncoding::OffsetTenths && device.length < 2 {
                return Err(SensorError::ConfigError(format!(
                    "{}: offset_tenths needs a window of at least 2 bytes",
                    device.id
                )));
            }
            device.decode_commands()?;

            match (device.kind, device.decode_pyrometer_commands()?) {
                (DeviceKind::Pyrometer, Some(_)) => pyrometers += 1,
                (DeviceKind::Pyrometer, None) => {
                    return Err(SensorError::ConfigError(format!("{}: pyrometer commands missing", device.id)));
                }
                (DeviceKind::Gauge, Some(_)) => {
                    warn!("⚠️  {}: pyrometer commands ignored on a gauge", device.id);
                }
                (DeviceKind::Gauge, None) => {}
            }
        }

        if pyrometers > 1 {
            return Err(SensorError::ConfigError("At most one pyrometer may be configured".to_string()));
        }

        if !ids.insert(self.analog.id.as_str()) {
            return Err(SensorError::ConfigError(format!("Analog id '{}' clashes with a device", self.analog.id)));
        }

        let analog = &self.analog;
        if analog.max_volt <= analog.min_volt {
            return Err(SensorError::ConfigError("max_volt must be greater than min_volt".to_string()));
        }
        if analog.full_scale <= 0.0 || analog.reference_volts <= 0.0 {
            return Err(SensorError::ConfigError("ADC reference and full scale must be positive".to_string()));
        }
        if (analog.min_units..=analog.max_units).contains(&SENTINEL_ABSENT) {
            warn!(
                "⚠️  Calibration range {}..{} {} includes the no-controller value {}",
                analog.min_units, analog.max_units, analog.units, SENTINEL_ABSENT
            );
        }

        if self.polling.interval_ms == 0 {
            return Err(SensorError::ConfigError("Poll interval must be positive".to_string()));
        }

        Ok(())
    }

    pub fn get_device_by_id(&self, id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.devices.len(), 4);
        assert_eq!(config.polling.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_default_commands_decode() {
        let config = Config::default();
        let turbo = config.get_device_by_id("turbo").unwrap().decode_commands().unwrap();
        assert_eq!(turbo.primary, b"PR1\r".to_vec());
        assert_eq!(turbo.secondary, Some(vec![0x05]));

        let ion = config.get_device_by_id("ion").unwrap().decode_commands().unwrap();
        assert_eq!(ion.primary, b"~ 05 0B 00\r".to_vec());
        assert!(ion.secondary.is_none());

        let pyro = config.get_device_by_id("pyro").unwrap();
        let commands = pyro.decode_pyrometer_commands().unwrap().unwrap();
        assert_eq!(commands.laser_on, vec![0xA5, 0x01, 0xA4]);
        assert_eq!(commands.laser_off, vec![0xA5, 0x00, 0xA5]);
        assert!(commands.reset_max.is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let content = r#"
            [polling]
            interval_ms = 2000

            [[devices]]
            id = "turbo"
            name = "Turbo Pump"
            port = "/dev/ttyS4"
            start = 5
            length = 16
            command = "UFIxDQ=="
            secondary_command = "BQ=="

            [analog]
            min_units = 10.0
        "#;
        let config = Config::from_toml(content).unwrap();
        assert_eq!(config.polling.interval_ms, 2000);
        assert_eq!(config.polling.settle_ms, 500);
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].baud_rate, 9600);
        assert_eq!(config.devices[0].kind, DeviceKind::Gauge);
        assert_eq!(config.analog.min_units, 10.0);
        assert_eq!(config.analog.max_volt, 4.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_base64() {
        let mut config = Config::default();
        config.devices[0].command = "not base64!".to_string();
        assert!(matches!(config.validate(), Err(SensorError::ConfigError(_))));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let mut config = Config::default();
        config.devices[1].id = "turbo".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_pyrometer_without_commands() {
        let mut config = Config::default();
        config.devices[3].pyrometer = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_survives_toml() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        let parsed = Config::from_toml(&text).unwrap();
        assert_eq!(parsed.devices.len(), config.devices.len());
        assert_eq!(parsed.devices[3].encoding, ResponseEncoding::OffsetTenths);
    }
}
