use log::{debug, error, info};
use serialport::{ClearBuffer, SerialPort};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use crate::config::DeviceConfig;
use crate::utils::error::SensorError;

/// Byte-level link to one device.
pub trait Transport: Send {
    fn write_all(&mut self, data: &[u8]) -> Result<(), SensorError>;

    fn flush(&mut self) -> Result<(), SensorError>;

    /// Reads until `max` bytes arrived or the read timeout expired. A short or
    /// empty buffer is not an error.
    fn read_up_to(&mut self, max: usize) -> Result<Vec<u8>, SensorError>;

    /// Drops anything waiting in the receive buffer.
    fn discard_input(&mut self) -> Result<(), SensorError>;
}

/// Opens a serial port with the fixed gauge framing: 8 data bits, no parity, 1 stop bit.
pub fn open_serial(config: &DeviceConfig, read_timeout: Duration) -> Result<Box<dyn Transport>, SensorError> {
    info!("🔌 Opening {} on {}", config.name, config.port);
    info!("⚙️  Configuration: {} baud, no parity, 8 data bits, 1 stop bit", config.baud_rate);

    let port = serialport::new(config.port.as_str(), config.baud_rate)
        .timeout(read_timeout)
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .open()
        .map_err(|e| {
            error!("❌ Failed to open serial port {} for {}: {}", config.port, config.name, e);
            SensorError::ConnectionError(format!("Failed to open port {}: {}", config.port, e))
        })?;

    info!("✅ {} port {} ok", config.name, config.port);
    Ok(Box::new(SerialTransport::new(port, read_timeout)))
}

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    read_timeout: Duration,
}

impl SerialTransport {
    pub fn new(port: Box<dyn SerialPort>, read_timeout: Duration) -> Self {
        Self { port, read_timeout }
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, data: &[u8]) -> Result<(), SensorError> {
        debug!("📤 Sending frame: {}", hex::encode(data));
        self.port
            .write_all(data)
            .map_err(|e| SensorError::CommunicationError(format!("Write failed: {}", e)))
    }

    fn flush(&mut self) -> Result<(), SensorError> {
        self.port
            .flush()
            .map_err(|e| SensorError::CommunicationError(format!("Flush failed: {}", e)))
    }

    fn read_up_to(&mut self, max: usize) -> Result<Vec<u8>, SensorError> {
        let mut response = Vec::with_capacity(max);
        let mut buffer = [0u8; 64];
        let deadline = Instant::now() + self.read_timeout;

        while response.len() < max && Instant::now() < deadline {
            let want = (max - response.len()).min(buffer.len());
            match self.port.read(&mut buffer[..want]) {
                Ok(0) => break,
                Ok(n) => response.extend_from_slice(&buffer[..n]),
                Err(ref e) if e.kind() == ErrorKind::TimedOut => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(SensorError::CommunicationError(format!("Read failed: {}", e))),
            }
        }

        debug!("📥 Received {} bytes: {}", response.len(), hex::encode(&response));
        Ok(response)
    }

    fn discard_input(&mut self) -> Result<(), SensorError> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| SensorError::CommunicationError(format!("Clear failed: {}", e)))
    }
}

/// Lists the serial ports visible to the OS.
pub fn list_serial_ports() -> Result<Vec<String>, SensorError> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|port| match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => format!(
                "{} (USB {:04x}:{:04x}{})",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.map(|p| format!(", {}", p)).unwrap_or_default()
            ),
            _ => port.port_name,
        })
        .collect())
}
