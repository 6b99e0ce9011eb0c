use thiserror::Error;

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Command '{action}' is not supported by device '{device}'")]
    UnsupportedCommand { device: String, action: String },

    #[error("Device not ready: {0}")]
    DeviceNotReady(String),

    #[error("Lock acquisition failed")]
    LockError,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Service not available: {0}")]
    ServiceNotAvailable(String),
}

impl From<std::io::Error> for SensorError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            return SensorError::Timeout;
        }
        SensorError::CommunicationError(format!("IO error: {}", err))
    }
}

impl From<serialport::Error> for SensorError {
    fn from(err: serialport::Error) -> Self {
        SensorError::ConnectionError(format!("Serial port error: {}", err))
    }
}

impl From<base64::DecodeError> for SensorError {
    fn from(err: base64::DecodeError) -> Self {
        SensorError::ConfigError(format!("Invalid base64 command: {}", err))
    }
}

impl From<std::str::Utf8Error> for SensorError {
    fn from(err: std::str::Utf8Error) -> Self {
        SensorError::InvalidData(format!("Response is not valid text: {}", err))
    }
}

impl From<serde_json::Error> for SensorError {
    fn from(err: serde_json::Error) -> Self {
        SensorError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for SensorError {
    fn from(err: toml::de::Error) -> Self {
        SensorError::ConfigError(format!("TOML error: {}", err))
    }
}

impl From<tokio::task::JoinError> for SensorError {
    fn from(err: tokio::task::JoinError) -> Self {
        SensorError::CommunicationError(format!("I/O task failed: {}", err))
    }
}
