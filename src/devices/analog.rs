use async_trait::async_trait;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use super::traits::{ReaderCounters, ReaderStats, Reading, Sensor, SensorKind};
use crate::config::AnalogConfig;
use crate::utils::error::SensorError;

/// Value reported while no analog controller is attached.
pub const SENTINEL_ABSENT: f64 = 1000.0;

/// Linear volts-to-units mapping with clamping at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub min_volt: f64,
    pub max_volt: f64,
    pub min_units: f64,
    pub max_units: f64,
}

impl Calibration {
    /// Converts a voltage, rounded to the nearest quarter unit.
    pub fn convert(&self, volts: f64) -> f64 {
        let value = if volts <= self.min_volt {
            self.min_units
        } else if volts >= self.max_volt {
            self.max_units
        } else {
            (volts - self.min_volt) * (self.max_units - self.min_units) / (self.max_volt - self.min_volt)
                + self.min_units
        };
        round_to_quarter(value)
    }
}

pub fn round_to_quarter(value: f64) -> f64 {
    (value * 4.0).round() / 4.0
}

pub fn raw_to_volts(raw: u32, reference_volts: f64, full_scale: f64) -> f64 {
    raw as f64 * reference_volts / full_scale
}

/// A single ADC input.
pub trait AdcChannel: Send {
    fn describe(&self) -> String;
    fn read_raw(&mut self) -> Result<u32, SensorError>;
}

/// Linux IIO channel exposed through sysfs, e.g. `.../iio:device0/in_voltage0_raw`.
pub struct SysfsAdc {
    path: PathBuf,
}

impl SysfsAdc {
    /// Returns the channel if its sysfs file exists.
    pub fn detect(path: &Path) -> Option<Self> {
        path.exists().then(|| Self { path: path.to_path_buf() })
    }
}

impl AdcChannel for SysfsAdc {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read_raw(&mut self) -> Result<u32, SensorError> {
        let content = std::fs::read_to_string(&self.path)?;
        content
            .trim()
            .parse::<u32>()
            .map_err(|e| SensorError::InvalidData(format!("ADC value '{}': {}", content.trim(), e)))
    }
}

pub struct AnalogPressureReader {
    config: AnalogConfig,
    calibration: Calibration,
    adc: Option<Arc<Mutex<Box<dyn AdcChannel>>>>,
    value: RwLock<f64>,
    stats: ReaderStats,
}

impl AnalogPressureReader {
    pub fn open(config: &AnalogConfig) -> Self {
        let adc = config
            .controller_path
            .as_deref()
            .and_then(SysfsAdc::detect)
            .map(|adc| Box::new(adc) as Box<dyn AdcChannel>);
        Self::with_adc(config, adc)
    }

    pub fn with_adc(config: &AnalogConfig, adc: Option<Box<dyn AdcChannel>>) -> Self {
        let initial = match &adc {
            Some(adc) => {
                info!("🔧 {} controller is {}", config.name, adc.describe());
                0.0
            }
            None => {
                error!("❌ {} reader not connected", config.name);
                SENTINEL_ABSENT
            }
        };

        Self {
            config: config.clone(),
            calibration: config.calibration(),
            adc: adc.map(|adc| Arc::new(Mutex::new(adc))),
            value: RwLock::new(initial),
            stats: ReaderStats::default(),
        }
    }

    pub fn has_controller(&self) -> bool {
        self.adc.is_some()
    }

    pub fn config(&self) -> &AnalogConfig {
        &self.config
    }

    /// Stored value as last polled: 1000 without a controller.
    pub fn value(&self) -> f64 {
        *self.value.read().unwrap_or_else(|p| p.into_inner())
    }

    fn store(&self, value: f64) {
        *self.value.write().unwrap_or_else(|p| p.into_inner()) = value;
    }
}

#[async_trait]
impl Sensor for AnalogPressureReader {
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
        SensorKind::Analog
    }

    fn reading(&self) -> Reading {
        if self.has_controller() {
            Reading::Value(self.value())
        } else {
            Reading::Absent
        }
    }

    fn read(&self) -> f64 {
        self.value()
    }

    fn counters(&self) -> ReaderCounters {
        self.stats.snapshot()
    }

    async fn poll_once(&self) {
        self.stats.record_poll();

        let Some(adc) = self.adc.as_ref().map(Arc::clone) else {
            self.store(SENTINEL_ABSENT);
            return;
        };

        let result = tokio::task::spawn_blocking(move || {
            let mut adc = adc.lock().map_err(|_| SensorError::LockError)?;
            adc.read_raw()
        })
        .await
        .map_err(SensorError::from)
        .and_then(|r| r);

        match result {
            Ok(raw) => {
                let volts = raw_to_volts(raw, self.config.reference_volts, self.config.full_scale);
                let value = self.calibration.convert(volts);
                debug!("🔋 {} raw {} is {:.3} V, {} {}", self.config.name, raw, volts, value, self.config.units);
                self.store(value);
            }
            Err(e) => {
                // Keeps the previous value.
                self.stats.record_fault();
                error!("❌ Error reading {}: {}", self.config.name, e);
            }
        }
    }
}
