pub mod port;
#[cfg(test)]
pub(crate) mod mock;

pub use port::{list_serial_ports, open_serial, SerialTransport, Transport};
