use async_trait::async_trait;
use log::info;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::analog::SENTINEL_ABSENT;
use crate::config::PollingConfig;

/// What a reader currently knows about its device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Reading {
    Value(f64),
    /// The port never opened.
    NotReady,
    /// The port is open but the device sent nothing.
    NotConnected,
    /// No analog controller is present.
    Absent,
}

impl Reading {
    /// Legacy numeric form used by the pressure list: 0 for the serial
    /// fault states, 1000 for a missing analog controller.
    pub fn numeric(&self) -> f64 {
        match self {
            Reading::Value(v) => *v,
            Reading::NotReady | Reading::NotConnected => 0.0,
            Reading::Absent => SENTINEL_ABSENT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Gauge,
    Pyrometer,
    Analog,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReaderCounters {
    pub polls: u64,
    pub faults: u64,
    pub parse_failures: u64,
}

#[derive(Debug, Default)]
pub struct ReaderStats {
    polls: AtomicU64,
    faults: AtomicU64,
    parse_failures: AtomicU64,
}

impl ReaderStats {
    pub fn record_poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReaderCounters {
        ReaderCounters {
            polls: self.polls.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
pub trait Sensor: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn units(&self) -> &str;
    fn kind(&self) -> SensorKind;

    fn reading(&self) -> Reading;
    fn counters(&self) -> ReaderCounters;

    /// Runs one refresh cycle. Faults are absorbed and counted, never returned.
    async fn poll_once(&self);

    fn read(&self) -> f64 {
        self.reading().numeric()
    }
}

/// Starts the background loop for one sensor. It polls after `first_poll_delay`,
/// then every `interval`, until `stop` turns true or its sender is dropped.
pub fn spawn_poller(
    sensor: Arc<dyn Sensor>,
    polling: &PollingConfig,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let first_delay = polling.first_poll_delay();
    let interval = polling.interval();

    tokio::spawn(async move {
        info!("🔄 Poller for {} started", sensor.name());

        if !stopped_during(first_delay, &mut stop).await {
            loop {
                sensor.poll_once().await;
                if stopped_during(interval, &mut stop).await {
                    break;
                }
            }
        }

        info!("🛑 Poller for {} stopped", sensor.name());
    })
}

async fn stopped_during(delay: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    if *stop.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = stop.changed() => changed.is_err() || *stop.borrow(),
    }
}
