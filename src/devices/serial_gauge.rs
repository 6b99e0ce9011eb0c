use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use super::frame::{extract_value, parse_leading_number};
use super::traits::{ReaderCounters, ReaderStats, Reading, Sensor, SensorKind};
use crate::config::{DeviceConfig, DeviceKind, GaugeCommands, PollingConfig, PyrometerCommandBytes};
use crate::serial::{open_serial, Transport};
use crate::utils::error::SensorError;

type SharedPort = Arc<Mutex<Box<dyn Transport>>>;

#[derive(Debug, Clone, PartialEq)]
enum Sample {
    /// Nothing came back, or the port is not available.
    Empty,
    Text(String),
    /// The last cycle failed.
    Fault,
}

/// One serial device polled on its own cadence: a vacuum gauge, or the pyrometer.
///
/// The port is opened once. If that fails the reader stays "not ready" for the
/// life of the process and every poll just clears the value.
pub struct SerialGaugeReader {
    config: DeviceConfig,
    commands: GaugeCommands,
    pyrometer: Option<PyrometerCommandBytes>,
    // Held for a whole write-settle-read exchange, so on-demand commands never
    // land in the middle of a poll.
    port: Option<SharedPort>,
    sample: RwLock<Sample>,
    stats: ReaderStats,
    settle: Duration,
    read_size: usize,
}

impl SerialGaugeReader {
    pub fn open(config: &DeviceConfig, polling: &PollingConfig) -> Result<Self, SensorError> {
        info!("🔧 Initialising {} on port {}", config.name, config.port);

        let transport = match open_serial(config, polling.read_timeout()) {
            Ok(transport) => Some(transport),
            Err(e) => {
                error!("❌ {} error opening port {}: {}", config.name, config.port, e);
                None
            }
        };

        Self::with_transport(config, polling, transport)
    }

    /// Builds a reader over an already opened link; `None` means the port could not be opened.
    pub fn with_transport(
        config: &DeviceConfig,
        polling: &PollingConfig,
        transport: Option<Box<dyn Transport>>,
    ) -> Result<Self, SensorError> {
        let commands = config.decode_commands()?;
        let pyrometer = match config.kind {
            DeviceKind::Pyrometer => config.decode_pyrometer_commands()?,
            DeviceKind::Gauge => None,
        };

        Ok(Self {
            config: config.clone(),
            commands,
            pyrometer,
            port: transport.map(|t| Arc::new(Mutex::new(t))),
            sample: RwLock::new(Sample::Empty),
            stats: ReaderStats::default(),
            settle: polling.settle(),
            read_size: polling.read_size,
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.port.is_some()
    }

    pub fn is_pyrometer(&self) -> bool {
        self.pyrometer.is_some()
    }

    /// The current window text as the device sent it; empty when there is none.
    pub fn raw_value(&self) -> String {
        match &*self.sample.read().unwrap_or_else(|p| p.into_inner()) {
            Sample::Empty => String::new(),
            Sample::Text(text) => text.clone(),
            Sample::Fault => "0".to_string(),
        }
    }

    fn store(&self, sample: Sample) {
        *self.sample.write().unwrap_or_else(|p| p.into_inner()) = sample;
    }

    /// Writes a one-off command outside the poll cadence, then drops the device's reply.
    pub async fn send_command(&self, action: &str, bytes: Vec<u8>) -> Result<(), SensorError> {
        let port = self
            .port
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| SensorError::DeviceNotReady(self.config.id.clone()))?;
        let settle = self.settle;

        debug!("📤 {} command '{}': {}", self.config.name, action, hex::encode(&bytes));
        tokio::task::spawn_blocking(move || -> Result<(), SensorError> {
            let mut port = port.lock().map_err(|_| SensorError::LockError)?;
            port.write_all(&bytes)?;
            port.flush()?;
            thread::sleep(settle);
            port.discard_input()
        })
        .await??;

        info!("✅ {} command '{}' sent", self.config.name, action);
        Ok(())
    }

    pub async fn laser_control(&self, on: bool) -> Result<(), SensorError> {
        let commands = self.pyrometer_commands(if on { "laser-on" } else { "laser-off" })?;
        let bytes = if on { commands.laser_on.clone() } else { commands.laser_off.clone() };
        self.send_command(if on { "laser-on" } else { "laser-off" }, bytes).await
    }

    pub async fn reset_max(&self) -> Result<(), SensorError> {
        let bytes = self
            .pyrometer_commands("reset-max")?
            .reset_max
            .clone()
            .ok_or_else(|| SensorError::UnsupportedCommand {
                device: self.config.id.clone(),
                action: "reset-max".to_string(),
            })?;
        self.send_command("reset-max", bytes).await
    }

    fn pyrometer_commands(&self, action: &str) -> Result<&PyrometerCommandBytes, SensorError> {
        self.pyrometer.as_ref().ok_or_else(|| SensorError::UnsupportedCommand {
            device: self.config.id.clone(),
            action: action.to_string(),
        })
    }
}

fn transact(
    port: &Mutex<Box<dyn Transport>>,
    commands: &GaugeCommands,
    settle: Duration,
    read_size: usize,
) -> Result<Vec<u8>, SensorError> {
    let mut port = port.lock().map_err(|_| SensorError::LockError)?;

    port.write_all(&commands.primary)?;
    port.flush()?;
    thread::sleep(settle);

    if let Some(secondary) = &commands.secondary {
        port.write_all(secondary)?;
        port.flush()?;
    }

    port.read_up_to(read_size)
}

#[async_trait]
impl Sensor for SerialGaugeReader {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn units(&self) -> &str {
        &self.config.units
    }

    fn kind(&self) -> SensorKind {
        match self.config.kind {
            DeviceKind::Gauge => SensorKind::Gauge,
            DeviceKind::Pyrometer => SensorKind::Pyrometer,
        }
    }

    fn reading(&self) -> Reading {
        if !self.is_ready() {
            return Reading::NotReady;
        }
        match &*self.sample.read().unwrap_or_else(|p| p.into_inner()) {
            Sample::Empty => Reading::NotConnected,
            Sample::Text(text) => Reading::Value(parse_leading_number(text).unwrap_or(0.0)),
            Sample::Fault => Reading::Value(0.0),
        }
    }

    fn counters(&self) -> ReaderCounters {
        self.stats.snapshot()
    }

    async fn poll_once(&self) {
        self.stats.record_poll();

        let Some(port) = self.port.as_ref().map(Arc::clone) else {
            self.store(Sample::Empty);
            return;
        };

        let commands = self.commands.clone();
        let settle = self.settle;
        let read_size = self.read_size;
        let result = tokio::task::spawn_blocking(move || transact(&port, &commands, settle, read_size))
            .await
            .map_err(SensorError::from)
            .and_then(|r| r)
            .and_then(|bytes| extract_value(&bytes, self.config.start, self.config.length, self.config.encoding));

        match result {
            Ok(text) if text.is_empty() => {
                debug!("📭 {} returned nothing", self.config.name);
                self.store(Sample::Empty);
            }
            Ok(text) => {
                debug!("📊 {} returned \"{}\"", self.config.name, text.escape_debug());
                if parse_leading_number(&text).is_none() {
                    self.stats.record_parse_failure();
                    warn!("⚠️  {} value \"{}\" is not numeric", self.config.name, text.escape_debug());
                }
                self.store(Sample::Text(text));
            }
            Err(e) => {
                self.stats.record_fault();
                error!("❌ Error polling {}: {}", self.config.name, e);
                self.store(Sample::Fault);
            }
        }
    }
}
