//! Serial port byte source

use super::{ByteSource, TransportError, TransportStats};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Serial port flow control type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SerialFlowControl {
    /// No flow control
    #[default]
    None,
    /// Hardware flow control (RTS/CTS)
    Hardware,
    /// Software flow control (XON/XOFF)
    Software,
}

impl std::str::FromStr for SerialFlowControl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "hw" | "hardware" | "rtscts" => Ok(Self::Hardware),
            "sw" | "software" | "xonxoff" => Ok(Self::Software),
            other => Err(format!("unknown flow control '{}'", other)),
        }
    }
}

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

impl std::str::FromStr for SerialParity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "n" => Ok(Self::None),
            "odd" | "o" => Ok(Self::Odd),
            "even" | "e" => Ok(Self::Even),
            other => Err(format!("unknown parity '{}'", other)),
        }
    }
}

/// Serial port configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name (e.g., COM6, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Flow control
    pub flow_control: SerialFlowControl,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

impl SerialConfig {
    /// Create a new serial configuration with default settings
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: SerialFlowControl::None,
            timeout_ms: 100,
        }
    }

    /// Set data bits
    #[must_use]
    pub fn data_bits(mut self, bits: u8) -> Self {
        self.data_bits = bits;
        self
    }

    /// Set stop bits
    #[must_use]
    pub fn stop_bits(mut self, bits: u8) -> Self {
        self.stop_bits = bits;
        self
    }

    /// Set parity
    #[must_use]
    pub fn parity(mut self, parity: SerialParity) -> Self {
        self.parity = parity;
        self
    }

    /// Set flow control
    #[must_use]
    pub fn flow_control(mut self, flow: SerialFlowControl) -> Self {
        self.flow_control = flow;
        self
    }

    /// Check settings before opening the port
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.port.is_empty() {
            return Err(TransportError::InvalidConfiguration(
                "no serial port given".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(TransportError::InvalidConfiguration(
                "baud rate must be non-zero".to_string(),
            ));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(TransportError::InvalidConfiguration(format!(
                "unsupported data bits: {}",
                self.data_bits
            )));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(TransportError::InvalidConfiguration(format!(
                "unsupported stop bits: {}",
                self.stop_bits
            )));
        }
        Ok(())
    }

    /// Short description, e.g. `COM6 @ 115200 baud (8N1)`
    pub fn summary(&self) -> String {
        format!(
            "{} @ {} baud ({}{}{})",
            self.port,
            self.baud_rate,
            self.data_bits,
            match self.parity {
                SerialParity::None => "N",
                SerialParity::Odd => "O",
                SerialParity::Even => "E",
            },
            self.stop_bits,
        )
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("COM6", 115200)
    }
}

/// Serial port byte source
pub struct SerialSource {
    config: SerialConfig,
    port: Box<dyn SerialPort>,
    stats: TransportStats,
    connected_at: Instant,
}

impl SerialSource {
    /// Open the configured port
    pub fn open(config: SerialConfig) -> Result<Self, TransportError> {
        config.validate()?;

        let data_bits = match config.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };

        let stop_bits = match config.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        };

        let parity = match config.parity {
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
            SerialParity::None => Parity::None,
        };

        let flow_control = match config.flow_control {
            SerialFlowControl::Hardware => FlowControl::Hardware,
            SerialFlowControl::Software => FlowControl::Software,
            SerialFlowControl::None => FlowControl::None,
        };

        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(flow_control)
            .timeout(Duration::from_millis(config.timeout_ms))
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::PortNotFound(config.port.clone()),
                serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                    TransportError::PortNotFound(config.port.clone())
                }
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied(config.port.clone())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            })?;

        info!("Opened {}", config.summary());

        Ok(Self {
            config,
            port,
            stats: TransportStats::default(),
            connected_at: Instant::now(),
        })
    }

    /// Write raw bytes to the port
    pub fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        debug!("Sent {} bytes to {}", data.len(), self.config.port);
        Ok(data.len())
    }

    /// Port configuration
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

#[async_trait]
impl ByteSource for SerialSource {
    async fn read_available(&mut self) -> Result<Bytes, TransportError> {
        let waiting = self
            .port
            .bytes_to_read()
            .map_err(|e| TransportError::IoError(e.into()))?;

        if waiting == 0 {
            return Ok(Bytes::new());
        }

        let mut buffer = vec![0u8; waiting as usize];

        match self.port.read(&mut buffer) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => {
                buffer.truncate(n);
                self.stats.bytes_received += n as u64;
                self.stats.reads += 1;
                Ok(Bytes::from(buffer))
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                // No data available, return empty
                Ok(Bytes::new())
            }
            Err(e) => {
                self.stats.errors += 1;
                Err(TransportError::IoError(e))
            }
        }
    }

    fn describe(&self) -> String {
        self.config.summary()
    }

    fn stats(&self) -> TransportStats {
        let mut stats = self.stats.clone();
        stats.uptime_secs = self.connected_at.elapsed().as_secs();
        stats
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::IoError(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_host_script() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.summary(), "COM6 @ 115200 baud (8N1)");
    }

    #[test]
    fn test_validate() {
        assert!(SerialConfig::new("/dev/ttyUSB0", 9600).validate().is_ok());
        assert!(SerialConfig::new("", 9600).validate().is_err());
        assert!(SerialConfig::new("COM1", 0).validate().is_err());
        assert!(SerialConfig::new("COM1", 9600).data_bits(9).validate().is_err());
        assert!(SerialConfig::new("COM1", 9600).stop_bits(3).validate().is_err());
    }

    #[test]
    fn test_parse_parity_and_flow() {
        assert_eq!("e".parse::<SerialParity>(), Ok(SerialParity::Even));
        assert!("mark".parse::<SerialParity>().is_err());
        assert_eq!("hw".parse::<SerialFlowControl>(), Ok(SerialFlowControl::Hardware));
    }

    #[test]
    fn test_builder() {
        let config = SerialConfig::new("COM3", 57600)
            .parity(SerialParity::Odd)
            .stop_bits(2)
            .flow_control(SerialFlowControl::Software);
        assert_eq!(config.summary(), "COM3 @ 57600 baud (8O2)");
        assert_eq!(config.flow_control, SerialFlowControl::Software);
    }
}
