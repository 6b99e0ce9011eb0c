pub mod aggregator;
#[cfg(feature = "api")]
pub mod api_service;
pub mod registry;

pub use aggregator::{status_label, Aggregator, DeviceAction, SensorSnapshot, Snapshot, StatusEntry, StatusView};
#[cfg(feature = "api")]
pub use api_service::ApiService;
pub use registry::SensorRegistry;
