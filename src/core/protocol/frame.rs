//! Frame synchronization
//!
//! Frame layout (little-endian):
//!
//! ```text
//! offset 0         : 2 bytes  header = DE AB
//! offset 2         : 2 bytes  timestamp (ms, wraps at 65536)
//! offset 4         : 2 bytes  payload size N
//! offset 6         : N bytes  payload
//! offset 6 + N     : 2 bytes  CRC-16/Modbus over bytes [0, 6 + N)
//! ```
//!
//! Extraction is one frame per call. Bytes ahead of a recovered header are
//! dropped for good, so callers must loop until no frame is returned.

use bytes::{Buf, Bytes, BytesMut};

use super::checksum::crc16_modbus;
use super::ProtocolError;

/// Frame header sentinel
pub const HEADER: [u8; 2] = [0xDE, 0xAB];

/// Header, timestamp and payload size
pub const HEADER_SIZE: usize = 6;

/// Trailing CRC
pub const CHECKSUM_SIZE: usize = 2;

/// Smallest possible frame (empty payload)
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + CHECKSUM_SIZE;

/// Largest payload the firmware sends
pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// Total on-wire length of a frame carrying `payload_size` bytes
pub fn frame_len(payload_size: u16) -> usize {
    HEADER_SIZE + usize::from(payload_size) + CHECKSUM_SIZE
}

/// A frame cut from the stream.
///
/// Built only once every declared byte has arrived; never modified afterwards.
/// Checksum failures still produce a frame, with `valid` cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Header bytes (always [`HEADER`])
    pub header: [u8; 2],
    /// Sender clock in milliseconds
    pub timestamp: u16,
    /// Declared payload length
    pub payload_size: u16,
    /// Raw payload
    pub payload: Bytes,
    /// Checksum read from the wire
    pub checksum: u16,
    /// Checksum computed over header and payload
    pub computed_checksum: u16,
    /// `checksum == computed_checksum`
    pub valid: bool,
}

impl Frame {
    /// On-wire length of this frame
    pub fn total_len(&self) -> usize {
        frame_len(self.payload_size)
    }

    /// Payload as lowercase hex
    pub fn payload_hex(&self) -> String {
        hex::encode(&self.payload)
    }

    /// Payload as a string of bits, eight per byte
    pub fn payload_bin(&self) -> String {
        self.payload.iter().map(|b| format!("{:08b}", b)).collect()
    }
}

/// Outcome of a single extraction attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extract {
    /// Frame, if a complete one was at the front of the buffer
    pub frame: Option<Frame>,
    /// Bytes dropped while searching for a header
    pub discarded: usize,
}

/// Extract at most one frame from the front of `buffer`.
///
/// Consumed and discarded bytes are removed from `buffer`; anything after the
/// frame stays for the next call. A buffer starting with `DE` but not `DE AB`
/// is not a candidate, so the header search starts at offset 1 and a stray
/// `DE` can never hold the stream up.
pub fn extract_frame(buffer: &mut BytesMut) -> Extract {
    if buffer.len() < MIN_FRAME_SIZE {
        return Extract::default();
    }

    let mut discarded = 0;

    if buffer[..2] != HEADER {
        match buffer[1..].iter().position(|&b| b == HEADER[0]) {
            None => {
                discarded = buffer.len();
                buffer.clear();
                return Extract { frame: None, discarded };
            }
            Some(offset) => {
                discarded = offset + 1;
                buffer.advance(discarded);
            }
        }

        if buffer.len() < MIN_FRAME_SIZE || buffer[..2] != HEADER {
            return Extract { frame: None, discarded };
        }
    }

    let timestamp = u16::from_le_bytes([buffer[2], buffer[3]]);
    let payload_size = u16::from_le_bytes([buffer[4], buffer[5]]);
    let total = frame_len(payload_size);

    if buffer.len() < total {
        return Extract { frame: None, discarded };
    }

    let raw = buffer.split_to(total).freeze();
    let body_len = HEADER_SIZE + usize::from(payload_size);
    let checksum = u16::from_le_bytes([raw[body_len], raw[body_len + 1]]);
    let computed_checksum = crc16_modbus(&raw[..body_len]);

    let frame = Frame {
        header: HEADER,
        timestamp,
        payload_size,
        payload: raw.slice(HEADER_SIZE..body_len),
        checksum,
        computed_checksum,
        valid: checksum == computed_checksum,
    };

    Extract {
        frame: Some(frame),
        discarded,
    }
}

/// Functional form of [`extract_frame`]: takes the buffer, hands back the remainder
pub fn try_decode_frame(mut buffer: BytesMut) -> (Option<Frame>, BytesMut) {
    let extract = extract_frame(&mut buffer);
    (extract.frame, buffer)
}

/// Build a complete frame around `payload`
pub fn encode_frame(timestamp: u16, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    // Bounded by MAX_PAYLOAD_SIZE above
    let size = payload.len() as u16;

    let mut result = Vec::with_capacity(frame_len(size));
    result.extend_from_slice(&HEADER);
    result.extend_from_slice(&timestamp.to_le_bytes());
    result.extend_from_slice(&size.to_le_bytes());
    result.extend_from_slice(payload);

    let crc = crc16_modbus(&result);
    result.extend_from_slice(&crc.to_le_bytes());
    Ok(result)
}

/// Streaming frame decoder that owns the receive buffer
pub struct FrameDecoder {
    buffer: BytesMut,
    discarded: u64,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create new decoder
    pub fn new() -> Self {
        Self::with_capacity(4096)
    }

    /// Create decoder with a preallocated buffer
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            discarded: 0,
        }
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to take the next frame off the buffer
    pub fn next_frame(&mut self) -> Extract {
        let extract = extract_frame(&mut self.buffer);
        self.discarded += extract.discarded as u64;
        extract
    }

    /// Bytes waiting for more data
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes dropped during resynchronization
    pub fn total_discarded(&self) -> u64 {
        self.discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temperature_frame() -> Vec<u8> {
        encode_frame(0x1234, &[0x06, 0x64, 0x00]).unwrap()
    }

    #[test]
    fn test_encode_layout() {
        let frame = temperature_frame();
        assert_eq!(&frame[..6], &[0xDE, 0xAB, 0x34, 0x12, 0x03, 0x00]);
        assert_eq!(&frame[6..9], &[0x06, 0x64, 0x00]);
        let crc = crc16_modbus(&frame[..9]);
        assert_eq!(&frame[9..], &crc.to_le_bytes());
    }

    #[test]
    fn test_decode_valid_frame_keeps_trailing_bytes() {
        let mut input = temperature_frame();
        input.extend_from_slice(&[0xDE, 0xAB, 0x01]);

        let (frame, rest) = try_decode_frame(BytesMut::from(&input[..]));
        let frame = frame.expect("frame");
        assert!(frame.valid);
        assert_eq!(frame.header, HEADER);
        assert_eq!(frame.timestamp, 0x1234);
        assert_eq!(frame.payload_size, 3);
        assert_eq!(&frame.payload[..], &[0x06, 0x64, 0x00]);
        assert_eq!(frame.checksum, frame.computed_checksum);
        assert_eq!(&rest[..], &[0xDE, 0xAB, 0x01]);
    }

    #[test]
    fn test_short_buffer_is_untouched() {
        let input = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
        let (frame, rest) = try_decode_frame(BytesMut::from(&input[..]));
        assert!(frame.is_none());
        assert_eq!(&rest[..], &input[..]);
    }

    #[test]
    fn test_one_byte_short_is_idempotent() {
        let full = temperature_frame();
        let partial = &full[..full.len() - 1];

        let (frame, rest) = try_decode_frame(BytesMut::from(partial));
        assert!(frame.is_none());
        assert_eq!(&rest[..], partial);

        let (frame, again) = try_decode_frame(rest);
        assert!(frame.is_none());
        assert_eq!(&again[..], partial);
    }

    #[test]
    fn test_flipped_checksum_is_invalid() {
        let mut input = temperature_frame();
        let last = input.len() - 1;
        input[last] ^= 0xFF;

        let (frame, rest) = try_decode_frame(BytesMut::from(&input[..]));
        let frame = frame.expect("frame");
        assert!(!frame.valid);
        assert_ne!(frame.checksum, frame.computed_checksum);
        assert_eq!(&frame.payload[..], &[0x06, 0x64, 0x00]);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_noise_without_header_is_dropped() {
        let input = [0x01u8; 12];
        let mut buffer = BytesMut::from(&input[..]);
        let extract = extract_frame(&mut buffer);
        assert!(extract.frame.is_none());
        assert_eq!(extract.discarded, 12);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_resync_then_decode_in_one_call() {
        let mut input = vec![0x00, 0x01, 0x02];
        input.extend_from_slice(&temperature_frame());

        let mut buffer = BytesMut::from(&input[..]);
        let extract = extract_frame(&mut buffer);
        assert_eq!(extract.discarded, 3);
        assert!(extract.frame.expect("frame").valid);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_resync_waits_on_partial_candidate() {
        let input = [0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0xDE];
        let mut buffer = BytesMut::from(&input[..]);
        let extract = extract_frame(&mut buffer);
        assert!(extract.frame.is_none());
        assert_eq!(extract.discarded, 7);
        assert_eq!(&buffer[..], &[0xDE]);
    }

    #[test]
    fn test_stray_header_byte_does_not_stall() {
        let mut input = vec![0xDE, 0x00, 0xDE, 0x01];
        input.extend_from_slice(&temperature_frame());

        let mut decoder = FrameDecoder::new();
        decoder.push(&input);

        let mut frames = Vec::new();
        for _ in 0..input.len() {
            if let Some(frame) = decoder.next_frame().frame {
                frames.push(frame);
                break;
            }
        }

        assert_eq!(frames.len(), 1);
        assert!(frames[0].valid);
        assert_eq!(decoder.total_discarded(), 4);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_empty_payload_frame() {
        let input = encode_frame(7, &[]).unwrap();
        assert_eq!(input.len(), MIN_FRAME_SIZE);

        let (frame, rest) = try_decode_frame(BytesMut::from(&input[..]));
        let frame = frame.expect("frame");
        assert!(frame.valid);
        assert_eq!(frame.payload_size, 0);
        assert!(frame.payload.is_empty());
        assert!(rest.is_empty());
    }

    #[test]
    fn test_decoder_chunked_input() {
        let input = temperature_frame();
        let mut decoder = FrameDecoder::new();

        for &byte in &input[..input.len() - 1] {
            decoder.push(&[byte]);
            assert!(decoder.next_frame().frame.is_none());
        }

        decoder.push(&input[input.len() - 1..]);
        let frame = decoder.next_frame().frame.expect("frame");
        assert_eq!(frame.timestamp, 0x1234);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        assert_eq!(
            encode_frame(0, &payload),
            Err(ProtocolError::PayloadTooLarge {
                size: MAX_PAYLOAD_SIZE + 1,
                max: MAX_PAYLOAD_SIZE,
            })
        );
    }

    #[test]
    fn test_payload_views() {
        let (frame, _) = try_decode_frame(BytesMut::from(&temperature_frame()[..]));
        let frame = frame.unwrap();
        assert_eq!(frame.payload_hex(), "066400");
        assert_eq!(frame.payload_bin(), "000001100110010000000000");
        assert_eq!(frame.total_len(), 11);
    }
}
