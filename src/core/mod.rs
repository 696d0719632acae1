//! Core module containing the decoding pipeline
//!
//! This module provides:
//! - Frame protocol: checksum, frame synchronizer, payload variants
//! - Byte sources (serial ports, replayed captures)
//! - Decode sessions driving a source through the decoder
//! - Record logger (CSV / JSON lines)

pub mod logger;
pub mod protocol;
pub mod session;
pub mod transport;
