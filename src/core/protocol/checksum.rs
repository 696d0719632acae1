//! Frame checksum
//!
//! Frames are protected by CRC-16/Modbus computed over the header, timestamp,
//! size and payload fields. The checksum travels little-endian after the payload.

/// CRC-16/Modbus seed, also the checksum of an empty span
pub const CRC16_MODBUS_INIT: u16 = 0xFFFF;

/// Reflected form of polynomial 0x8005
pub const CRC16_MODBUS_POLY: u16 = 0xA001;

/// CRC-16/Modbus
/// Polynomial: 0x8005, Init: 0xFFFF, RefIn: true, RefOut: true, XorOut: 0x0000
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = CRC16_MODBUS_INIT;

    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ CRC16_MODBUS_POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_modbus_check_value() {
        // Test vector: "123456789" should give 0x4B37
        assert_eq!(crc16_modbus(b"123456789"), 0x4B37);
    }

    #[test]
    fn test_empty_input_is_seed() {
        assert_eq!(crc16_modbus(&[]), CRC16_MODBUS_INIT);
    }

    #[test]
    fn test_deterministic() {
        let data = [0xDE, 0xAB, 0x10, 0x00, 0x03, 0x00, 0x06, 0x64, 0x00];
        assert_eq!(crc16_modbus(&data), crc16_modbus(&data));
    }

    #[test]
    fn test_order_sensitive() {
        assert_ne!(crc16_modbus(&[0x01, 0x02, 0x03]), crc16_modbus(&[0x03, 0x02, 0x01]));
        assert_ne!(crc16_modbus(b"ab"), crc16_modbus(b"ba"));
    }

    #[test]
    fn test_modbus_request_vector() {
        // Read holding registers, slave 1, addr 0, count 10: CRC bytes on the wire are C5 CD
        let request = [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A];
        assert_eq!(crc16_modbus(&request).to_le_bytes(), [0xC5, 0xCD]);
    }
}
