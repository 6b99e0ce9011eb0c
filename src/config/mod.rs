pub mod settings;

pub use settings::{
    decode_command,
    AnalogConfig,
    ApiConfig,
    Config,
    DeviceConfig,
    DeviceKind,
    GaugeCommands,
    PollingConfig,
    PyrometerCommandBytes,
    PyrometerCommands,
    ResponseEncoding,
};
