//! Wire protocol
//!
//! Provides the three layers of the telemetry link:
//! - Checksum (CRC-16/Modbus)
//! - Frame synchronization and extraction (`DE AB` header, length-delimited)
//! - Payload variants (date, time, ADC, text, button, temperature)

pub mod checksum;
pub mod frame;
pub mod payload;

pub use checksum::crc16_modbus;
pub use frame::{
    encode_frame, frame_len, try_decode_frame, Extract, Frame, FrameDecoder, CHECKSUM_SIZE,
    HEADER, HEADER_SIZE, MAX_PAYLOAD_SIZE, MIN_FRAME_SIZE,
};
pub use payload::{decode_payload, PayloadKind, PayloadRecord, Unrecognized, WireFormat};

use thiserror::Error;

/// Errors raised while building frames or payloads for transmission.
///
/// Decoding never fails; malformed input is reported through the decode results instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload exceeds what the sender accepts
    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Requested payload size
        size: usize,
        /// Largest accepted payload size
        max: usize,
    },

    /// Record has no wire representation
    #[error("Record cannot be encoded: {0}")]
    NotEncodable(String),
}
