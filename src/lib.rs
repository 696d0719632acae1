//! # Serialframe Core Library
//!
//! Decoder for a framed binary telemetry stream sent by a microcontroller
//! over a serial link:
//!
//! ```text
//! DE AB | timestamp u16 | payload_size u16 | payload | CRC-16/Modbus u16
//! ```
//!
//! All integers are little-endian. The checksum covers everything before it.
//!
//! ## Features
//!
//! - Resynchronizing frame decoder over a growing byte buffer
//! - Payload variants: date, time, ADC sample, text, button, temperature
//! - Packed and naturally aligned payload layouts
//! - Serial port and capture replay sources
//! - CSV / JSON lines record logging
//! - CLI with exit codes
//!
//! ## Example
//!
//! ```rust
//! use serialframe_core::{DecodeEvent, PayloadRecord, StreamDecoder, WireFormat};
//!
//! let bytes = [0xDE, 0xAB, 0x64, 0x00, 0x03, 0x00, 0x06, 0x64, 0x00, 0x3B, 0x99];
//! let mut decoder = StreamDecoder::new(WireFormat::Packed);
//!
//! for event in decoder.push(&bytes) {
//!     if let DecodeEvent::Decoded(decoded) = event {
//!         assert_eq!(decoded.record, PayloadRecord::Temperature { celsius: 100 });
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ConfigError};
pub use crate::core::logger::{LogError, LogFormat, RecordLogger};
pub use crate::core::protocol::{
    crc16_modbus, decode_payload, encode_frame, Frame, FrameDecoder, PayloadKind, PayloadRecord,
    ProtocolError, WireFormat,
};
pub use crate::core::session::{
    DecodeEvent, DecodedFrame, DecoderStats, FrameSink, Session, SessionConfig, SessionState,
    StreamDecoder,
};
pub use crate::core::transport::{
    ByteSource, ReaderSource, SerialConfig, SerialFlowControl, SerialParity, SerialSource,
    TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
