//! Serial device adapter over the `serialport` crate.

use std::io::{self, Read, Write};

use thiserror::Error;
use tracing::info;

use serial_bridge_core::SerialPeer;

use crate::domain::config::{DataBits, FlowControl, Parity, SerialConfig, StopBits};

/// The serial device could not be opened or configured.
#[derive(Debug, Error)]
#[error("failed to open serial device {device}: {source}")]
pub struct SerialOpenError {
    pub device: String,
    #[source]
    pub source: serialport::Error,
}

/// A system serial port implementing [`SerialPeer`].
pub struct SystemSerialPort {
    port: Box<dyn serialport::SerialPort>,
}

impl SystemSerialPort {
    /// Opens `config.device` with the configured line settings.
    ///
    /// # Errors
    ///
    /// Returns [`SerialOpenError`] if the device does not exist, is busy, or
    /// rejects the settings.
    pub fn open(config: &SerialConfig) -> Result<Self, SerialOpenError> {
        let port = serialport::new(config.device.as_str(), config.baud_rate)
            .data_bits(data_bits(config.data_bits))
            .parity(parity(config.parity))
            .stop_bits(stop_bits(config.stop_bits))
            .flow_control(flow_control(config.flow_control))
            .timeout(config.timeout())
            .open()
            .map_err(|source| SerialOpenError {
                device: config.device.clone(),
                source,
            })?;

        info!("opened serial device {} ({config})", config.device);
        Ok(Self { port })
    }
}

impl SerialPeer for SystemSerialPort {
    fn available(&mut self) -> io::Result<usize> {
        let pending = self.port.bytes_to_read().map_err(io::Error::from)?;
        Ok(pending as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.port.write(buf) {
            // A write timeout means the UART took nothing this time.
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            other => other,
        }
    }
}

// ── Setting conversions ───────────────────────────────────────────────────────

fn data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

fn parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}

fn stop_bits(bits: StopBits) -> serialport::StopBits {
    match bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}

fn flow_control(flow: FlowControl) -> serialport::FlowControl {
    match flow {
        FlowControl::None => serialport::FlowControl::None,
        FlowControl::Software => serialport::FlowControl::Software,
        FlowControl::Hardware => serialport::FlowControl::Hardware,
    }
}
