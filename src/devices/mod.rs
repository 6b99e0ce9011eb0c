pub mod analog;
pub mod frame;
pub mod serial_gauge;
pub mod traits;

pub use analog::{AdcChannel, AnalogPressureReader, Calibration, SysfsAdc, SENTINEL_ABSENT};
pub use serial_gauge::SerialGaugeReader;
pub use traits::{spawn_poller, ReaderCounters, Reading, Sensor, SensorKind};
