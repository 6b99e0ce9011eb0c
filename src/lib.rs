//! Vacuum pump and pyrometer reader.
//!
//! Every serial gauge, the pyrometer and the analog gas-pressure channel is
//! polled by its own background task. The presentation layer (CLI, JSON API)
//! only ever reads the values those tasks last stored.

pub mod cli;
pub mod config;
pub mod devices;
pub mod output;
pub mod serial;
pub mod services;
pub mod utils;

pub use config::Config;
pub use devices::{AnalogPressureReader, Reading, Sensor, SerialGaugeReader};
pub use output::{ConsoleFormatter, CsvFormatter, JsonFormatter, SnapshotFormatter};
pub use services::{Aggregator, SensorRegistry, Snapshot, StatusView};
pub use utils::error::SensorError;

pub const VERSION: &str = "2.0.2";
