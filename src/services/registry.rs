use log::{info, warn};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{Config, PollingConfig};
use crate::devices::{spawn_poller, AnalogPressureReader, Sensor, SerialGaugeReader};
use crate::utils::error::SensorError;

/// Every reader in the system, built once at startup.
pub struct SensorRegistry {
    gauges: Vec<Arc<SerialGaugeReader>>,
    analog: Arc<AnalogPressureReader>,
    polling: PollingConfig,
    stop_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SensorRegistry {
    /// Opens every enabled device. Ports that fail to open leave their reader
    /// "not ready"; only configuration errors are returned.
    pub fn open(config: &Config) -> Result<Self, SensorError> {
        info!("🚀 Initialising sensor registry for {} {}", config.app_name, config.version);

        let mut gauges = Vec::new();
        for device in &config.devices {
            if !device.enabled {
                info!("⏸️  Device '{}' on {} is disabled", device.name, device.port);
                continue;
            }
            gauges.push(SerialGaugeReader::open(device, &config.polling)?);
        }

        let analog = AnalogPressureReader::open(&config.analog);

        let registry = Self::from_readers(gauges, analog, &config.polling);
        let ready = registry.gauges.iter().filter(|g| g.is_ready()).count();
        info!("📡 {} of {} serial devices ready", ready, registry.gauges.len());
        if !registry.analog.has_controller() {
            warn!("⚠️  {} has no controller", registry.analog.name());
        }
        Ok(registry)
    }

    pub fn from_readers(gauges: Vec<SerialGaugeReader>, analog: AnalogPressureReader, polling: &PollingConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            gauges: gauges.into_iter().map(Arc::new).collect(),
            analog: Arc::new(analog),
            polling: polling.clone(),
            stop_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns one poll loop per reader. Calling it again does nothing.
    pub fn start(&self) {
        let mut handles = self.handles.lock().unwrap_or_else(|p| p.into_inner());
        if !handles.is_empty() {
            warn!("⚠️  Pollers already running");
            return;
        }

        for sensor in self.sensors() {
            handles.push(spawn_poller(sensor, &self.polling, self.stop_tx.subscribe()));
        }
        info!("✅ Started {} pollers", handles.len());
    }

    pub fn is_running(&self) -> bool {
        !self.handles.lock().unwrap_or_else(|p| p.into_inner()).is_empty()
    }

    /// Polls every reader once, in place of the background loops. Used by
    /// one-shot commands that never call [`start`](Self::start).
    pub async fn refresh_once(&self) -> Result<(), SensorError> {
        if self.is_running() {
            return Err(SensorError::ServiceNotAvailable("pollers are running".to_string()));
        }
        for sensor in self.sensors() {
            sensor.poll_once().await;
        }
        Ok(())
    }

    /// Signals every poller to stop and waits for them.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut handles = self.handles.lock().unwrap_or_else(|p| p.into_inner());
            handles.drain(..).collect()
        };
        if handles.is_empty() {
            return;
        }

        info!("🛑 Stopping {} pollers", handles.len());
        self.stop_tx.send_replace(true);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("⚠️  Poller ended abnormally: {}", e);
            }
        }
    }

    /// Serial readers followed by the analog reader, in configuration order.
    pub fn sensors(&self) -> Vec<Arc<dyn Sensor>> {
        let mut sensors: Vec<Arc<dyn Sensor>> = self
            .gauges
            .iter()
            .map(|g| Arc::clone(g) as Arc<dyn Sensor>)
            .collect();
        sensors.push(Arc::clone(&self.analog) as Arc<dyn Sensor>);
        sensors
    }

    pub fn gauges(&self) -> &[Arc<SerialGaugeReader>] {
        &self.gauges
    }

    pub fn gauge(&self, id: &str) -> Option<&Arc<SerialGaugeReader>> {
        self.gauges.iter().find(|g| g.config().id == id)
    }

    pub fn analog(&self) -> &Arc<AnalogPressureReader> {
        &self.analog
    }

    pub fn pyrometer(&self) -> Option<&Arc<SerialGaugeReader>> {
        self.gauges.iter().find(|g| g.is_pyrometer())
    }
}
