//! Payload variants
//!
//! The first field of every payload is a type tag selecting the record layout.
//! Two firmware revisions put different layouts on the wire, so the layout is
//! always chosen explicitly through [`WireFormat`]:
//!
//! - `Packed`: 1-byte tag, fields packed back to back
//! - `Aligned`: 4-byte tag, each field aligned to its own width, fixed records
//!   padded to a multiple of 4 (the firmware's unpacked C structs)
//!
//! All integers are little-endian and unsigned.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::frame::MAX_PAYLOAD_SIZE;
use super::ProtocolError;

/// Payload layout revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// 1-byte tag, byte-packed fields
    #[default]
    Packed,
    /// 4-byte tag, naturally aligned fields
    Aligned,
}

impl WireFormat {
    /// Get all formats
    pub fn all() -> &'static [WireFormat] {
        &[WireFormat::Packed, WireFormat::Aligned]
    }

    /// Get name of format
    pub fn name(&self) -> &'static str {
        match self {
            WireFormat::Packed => "packed",
            WireFormat::Aligned => "aligned",
        }
    }

    /// Width of the leading tag in bytes
    pub fn tag_width(&self) -> usize {
        match self {
            WireFormat::Packed => 1,
            WireFormat::Aligned => 4,
        }
    }

    fn align(&self, pos: usize, width: usize) -> usize {
        match self {
            WireFormat::Packed => pos,
            WireFormat::Aligned => pos.next_multiple_of(width),
        }
    }

    /// Field offsets and length of a record of `kind`.
    ///
    /// For text records `len` covers the header only (tag and length prefix).
    pub fn layout(&self, kind: PayloadKind) -> Layout {
        let fields = kind.fields();
        let mut offsets = [0usize; MAX_FIELDS];
        let mut pos = self.tag_width();

        for (slot, field) in offsets.iter_mut().zip(fields) {
            pos = self.align(pos, field.width());
            *slot = pos;
            pos += field.width();
        }

        let len = if kind.is_variable() {
            pos
        } else {
            self.align(pos, self.tag_width())
        };

        Layout {
            offsets,
            fields: fields.len(),
            len,
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "packed" | "v1" | "1" => Ok(Self::Packed),
            "aligned" | "v2" | "4" => Ok(Self::Aligned),
            other => Err(format!("unknown wire format '{}' (expected packed or aligned)", other)),
        }
    }
}

const MAX_FIELDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldWidth {
    U8,
    U16,
    U32,
}

impl FieldWidth {
    fn width(self) -> usize {
        match self {
            FieldWidth::U8 => 1,
            FieldWidth::U16 => 2,
            FieldWidth::U32 => 4,
        }
    }
}

/// Byte offsets of a record's fields for one wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    offsets: [usize; MAX_FIELDS],
    fields: usize,
    /// Exact payload length (header length for text records)
    pub len: usize,
}

impl Layout {
    /// Offsets of the fields following the tag, in declaration order
    pub fn offsets(&self) -> &[usize] {
        &self.offsets[..self.fields]
    }
}

/// Known payload types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// Calendar date
    Date,
    /// Time of day
    Time,
    /// ADC reading
    AdcSample,
    /// Length-prefixed text
    Text,
    /// Button state change
    Button,
    /// MCU temperature
    Temperature,
}

impl PayloadKind {
    /// Get all kinds
    pub fn all() -> &'static [PayloadKind] {
        &[
            PayloadKind::Date,
            PayloadKind::Time,
            PayloadKind::AdcSample,
            PayloadKind::Text,
            PayloadKind::Button,
            PayloadKind::Temperature,
        ]
    }

    /// Wire tag
    pub fn tag(&self) -> u32 {
        match self {
            PayloadKind::Date => 1,
            PayloadKind::Time => 2,
            PayloadKind::AdcSample => 3,
            PayloadKind::Text => 4,
            PayloadKind::Button => 5,
            PayloadKind::Temperature => 6,
        }
    }

    /// Look up a kind by wire tag
    pub fn from_tag(tag: u32) -> Option<Self> {
        Self::all().iter().copied().find(|kind| kind.tag() == tag)
    }

    /// Get name of kind
    pub fn name(&self) -> &'static str {
        match self {
            PayloadKind::Date => "date",
            PayloadKind::Time => "time",
            PayloadKind::AdcSample => "adc",
            PayloadKind::Text => "text",
            PayloadKind::Button => "button",
            PayloadKind::Temperature => "temperature",
        }
    }

    /// Text records carry their own length
    pub fn is_variable(&self) -> bool {
        matches!(self, PayloadKind::Text)
    }

    /// Exact payload length for fixed-size kinds
    pub fn expected_len(&self, format: WireFormat) -> Option<usize> {
        (!self.is_variable()).then(|| format.layout(*self).len)
    }

    fn fields(&self) -> &'static [FieldWidth] {
        use FieldWidth::{U16, U32, U8};

        match self {
            PayloadKind::Date => &[U32, U32, U32],
            PayloadKind::Time => &[U8, U16, U16],
            PayloadKind::AdcSample => &[U32, U16],
            PayloadKind::Text => &[U16],
            PayloadKind::Button => &[U8, U16],
            PayloadKind::Temperature => &[U16],
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a payload could not be interpreted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unrecognized {
    /// Payload shorter than the tag
    Truncated {
        /// Payload length
        len: usize,
    },
    /// Tag outside the known set
    UnknownTag {
        /// Tag value
        tag: u32,
    },
    /// Length does not match the layout of the tagged kind
    SizeMismatch {
        /// Kind named by the tag
        kind: PayloadKind,
        /// Length the layout requires
        expected: usize,
        /// Length received
        actual: usize,
    },
}

impl fmt::Display for Unrecognized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unrecognized::Truncated { len } => {
                write!(f, "payload of {} bytes has no room for a tag", len)
            }
            Unrecognized::UnknownTag { tag } => write!(f, "unknown data tag {}", tag),
            Unrecognized::SizeMismatch {
                kind,
                expected,
                actual,
            } => write!(
                f,
                "expected {} byte payload for {} data, got {}",
                expected, kind, actual
            ),
        }
    }
}

/// A decoded payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayloadRecord {
    /// Calendar date
    Date {
        /// Day of month
        days: u32,
        /// Month
        month: u32,
        /// Year
        year: u32,
    },
    /// Time of day
    Time {
        /// Hour
        hour: u8,
        /// Minute
        minute: u16,
        /// Second
        second: u16,
    },
    /// ADC reading
    AdcSample {
        /// Running sample counter
        sample_count: u32,
        /// Raw converter value
        value: u16,
    },
    /// String message
    Text {
        /// Message text, invalid UTF-8 replaced
        text: String,
    },
    /// Button state change
    Button {
        /// Button number
        button_id: u8,
        /// Button state
        button_state: u16,
    },
    /// MCU temperature
    Temperature {
        /// Degrees Celsius
        celsius: u16,
    },
    /// Anything that does not match a known layout
    Unrecognized {
        /// What went wrong
        #[serde(flatten)]
        reason: Unrecognized,
    },
}

impl PayloadRecord {
    /// Kind of the record, `None` for unrecognized payloads
    pub fn kind(&self) -> Option<PayloadKind> {
        match self {
            PayloadRecord::Date { .. } => Some(PayloadKind::Date),
            PayloadRecord::Time { .. } => Some(PayloadKind::Time),
            PayloadRecord::AdcSample { .. } => Some(PayloadKind::AdcSample),
            PayloadRecord::Text { .. } => Some(PayloadKind::Text),
            PayloadRecord::Button { .. } => Some(PayloadKind::Button),
            PayloadRecord::Temperature { .. } => Some(PayloadKind::Temperature),
            PayloadRecord::Unrecognized { .. } => None,
        }
    }

    /// Short type name used in logs and tables
    pub fn kind_name(&self) -> &'static str {
        self.kind().map_or("unrecognized", |kind| kind.name())
    }

    /// Is this an unrecognized payload?
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, PayloadRecord::Unrecognized { .. })
    }

    /// Named field values for display
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            PayloadRecord::Date { days, month, year } => vec![
                ("days", days.to_string()),
                ("month", month.to_string()),
                ("year", year.to_string()),
            ],
            PayloadRecord::Time {
                hour,
                minute,
                second,
            } => vec![
                ("hour", hour.to_string()),
                ("minute", minute.to_string()),
                ("second", second.to_string()),
            ],
            PayloadRecord::AdcSample {
                sample_count,
                value,
            } => vec![
                ("sample_count", sample_count.to_string()),
                ("value", value.to_string()),
            ],
            PayloadRecord::Text { text } => vec![
                ("length", text.len().to_string()),
                ("text", text.clone()),
            ],
            PayloadRecord::Button {
                button_id,
                button_state,
            } => vec![
                ("button_id", button_id.to_string()),
                ("button_state", button_state.to_string()),
            ],
            PayloadRecord::Temperature { celsius } => {
                vec![("temperature_c", celsius.to_string())]
            }
            PayloadRecord::Unrecognized { reason } => vec![("reason", reason.to_string())],
        }
    }

    /// Serialize the record as a payload in `format`
    pub fn encode(&self, format: WireFormat) -> Result<Vec<u8>, ProtocolError> {
        let Some(kind) = self.kind() else {
            return Err(ProtocolError::NotEncodable(self.to_string()));
        };
        let layout = format.layout(kind);
        let at = layout.offsets();

        let mut out = vec![0u8; layout.len];
        put(&mut out, 0, &kind.tag().to_le_bytes()[..format.tag_width()]);

        match self {
            PayloadRecord::Date { days, month, year } => {
                put(&mut out, at[0], &days.to_le_bytes());
                put(&mut out, at[1], &month.to_le_bytes());
                put(&mut out, at[2], &year.to_le_bytes());
            }
            PayloadRecord::Time {
                hour,
                minute,
                second,
            } => {
                put(&mut out, at[0], &[*hour]);
                put(&mut out, at[1], &minute.to_le_bytes());
                put(&mut out, at[2], &second.to_le_bytes());
            }
            PayloadRecord::AdcSample {
                sample_count,
                value,
            } => {
                put(&mut out, at[0], &sample_count.to_le_bytes());
                put(&mut out, at[1], &value.to_le_bytes());
            }
            PayloadRecord::Text { text } => {
                let size = layout.len + text.len();
                if size > MAX_PAYLOAD_SIZE {
                    return Err(ProtocolError::PayloadTooLarge {
                        size,
                        max: MAX_PAYLOAD_SIZE,
                    });
                }
                // Bounded by MAX_PAYLOAD_SIZE above
                put(&mut out, at[0], &(text.len() as u16).to_le_bytes());
                out.extend_from_slice(text.as_bytes());
            }
            PayloadRecord::Button {
                button_id,
                button_state,
            } => {
                put(&mut out, at[0], &[*button_id]);
                put(&mut out, at[1], &button_state.to_le_bytes());
            }
            PayloadRecord::Temperature { celsius } => {
                put(&mut out, at[0], &celsius.to_le_bytes());
            }
            PayloadRecord::Unrecognized { reason } => {
                return Err(ProtocolError::NotEncodable(reason.to_string()));
            }
        }

        Ok(out)
    }
}

impl fmt::Display for PayloadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self
            .fields()
            .into_iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        write!(f, "{} {}", self.kind_name(), fields.join(" "))
    }
}

fn put(out: &mut [u8], offset: usize, bytes: &[u8]) {
    out[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn read_u8(data: &[u8], offset: usize) -> u8 {
    data[offset]
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn read_tag(data: &[u8], format: WireFormat) -> u32 {
    match format {
        WireFormat::Packed => u32::from(read_u8(data, 0)),
        WireFormat::Aligned => read_u32(data, 0),
    }
}

fn mismatch(kind: PayloadKind, expected: usize, actual: usize) -> PayloadRecord {
    PayloadRecord::Unrecognized {
        reason: Unrecognized::SizeMismatch {
            kind,
            expected,
            actual,
        },
    }
}

/// Interpret a frame payload.
///
/// Never fails: short, oversized and unknown payloads come back as
/// [`PayloadRecord::Unrecognized`].
pub fn decode_payload(payload: &[u8], format: WireFormat) -> PayloadRecord {
    if payload.len() < format.tag_width() {
        return PayloadRecord::Unrecognized {
            reason: Unrecognized::Truncated { len: payload.len() },
        };
    }

    let tag = read_tag(payload, format);
    let Some(kind) = PayloadKind::from_tag(tag) else {
        return PayloadRecord::Unrecognized {
            reason: Unrecognized::UnknownTag { tag },
        };
    };

    let layout = format.layout(kind);
    let at = layout.offsets();

    if kind.is_variable() {
        if payload.len() < layout.len {
            return mismatch(kind, layout.len, payload.len());
        }
        let text_len = usize::from(read_u16(payload, at[0]));
        let expected = layout.len + text_len;
        if payload.len() != expected {
            return mismatch(kind, expected, payload.len());
        }
        return PayloadRecord::Text {
            text: String::from_utf8_lossy(&payload[layout.len..]).into_owned(),
        };
    }

    if payload.len() != layout.len {
        return mismatch(kind, layout.len, payload.len());
    }

    match kind {
        PayloadKind::Date => PayloadRecord::Date {
            days: read_u32(payload, at[0]),
            month: read_u32(payload, at[1]),
            year: read_u32(payload, at[2]),
        },
        PayloadKind::Time => PayloadRecord::Time {
            hour: read_u8(payload, at[0]),
            minute: read_u16(payload, at[1]),
            second: read_u16(payload, at[2]),
        },
        PayloadKind::AdcSample => PayloadRecord::AdcSample {
            sample_count: read_u32(payload, at[0]),
            value: read_u16(payload, at[1]),
        },
        PayloadKind::Button => PayloadRecord::Button {
            button_id: read_u8(payload, at[0]),
            button_state: read_u16(payload, at[1]),
        },
        PayloadKind::Temperature => PayloadRecord::Temperature {
            celsius: read_u16(payload, at[0]),
        },
        PayloadKind::Text => unreachable!("handled above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_lengths() {
        let lens: Vec<_> = PayloadKind::all()
            .iter()
            .map(|kind| WireFormat::Packed.layout(*kind).len)
            .collect();
        assert_eq!(lens, vec![13, 6, 7, 3, 4, 3]);
    }

    #[test]
    fn test_aligned_layouts() {
        let time = WireFormat::Aligned.layout(PayloadKind::Time);
        assert_eq!(time.offsets(), &[4, 6, 8]);
        assert_eq!(time.len, 12);

        let adc = WireFormat::Aligned.layout(PayloadKind::AdcSample);
        assert_eq!(adc.offsets(), &[4, 8]);
        assert_eq!(adc.len, 12);

        let button = WireFormat::Aligned.layout(PayloadKind::Button);
        assert_eq!(button.offsets(), &[4, 6]);
        assert_eq!(button.len, 8);

        assert_eq!(WireFormat::Aligned.layout(PayloadKind::Date).len, 16);
        assert_eq!(WireFormat::Aligned.layout(PayloadKind::Temperature).len, 8);
        assert_eq!(WireFormat::Aligned.layout(PayloadKind::Text).len, 6);
    }

    #[test]
    fn test_temperature() {
        let record = decode_payload(&[6, 0x64, 0x00], WireFormat::Packed);
        assert_eq!(record, PayloadRecord::Temperature { celsius: 100 });
    }

    #[test]
    fn test_text() {
        let record = decode_payload(&[4, 0x03, 0x00, b'h', b'i', b'!'], WireFormat::Packed);
        assert_eq!(
            record,
            PayloadRecord::Text {
                text: "hi!".to_string()
            }
        );
    }

    #[test]
    fn test_text_invalid_utf8_is_replaced() {
        let record = decode_payload(&[4, 0x02, 0x00, 0xFF, b'a'], WireFormat::Packed);
        assert_eq!(
            record,
            PayloadRecord::Text {
                text: "\u{FFFD}a".to_string()
            }
        );
    }

    #[test]
    fn test_text_length_mismatch() {
        let record = decode_payload(&[4, 0x05, 0x00, b'h', b'i'], WireFormat::Packed);
        assert_eq!(
            record,
            PayloadRecord::Unrecognized {
                reason: Unrecognized::SizeMismatch {
                    kind: PayloadKind::Text,
                    expected: 8,
                    actual: 5,
                }
            }
        );

        let record = decode_payload(&[4, 0x00], WireFormat::Packed);
        assert!(matches!(
            record,
            PayloadRecord::Unrecognized {
                reason: Unrecognized::SizeMismatch { expected: 3, actual: 2, .. }
            }
        ));
    }

    #[test]
    fn test_date_time_adc_button() {
        let mut date = vec![1];
        date.extend_from_slice(&18u32.to_le_bytes());
        date.extend_from_slice(&3u32.to_le_bytes());
        date.extend_from_slice(&2025u32.to_le_bytes());
        assert_eq!(
            decode_payload(&date, WireFormat::Packed),
            PayloadRecord::Date {
                days: 18,
                month: 3,
                year: 2025
            }
        );

        assert_eq!(
            decode_payload(&[2, 13, 45, 0, 30, 0], WireFormat::Packed),
            PayloadRecord::Time {
                hour: 13,
                minute: 45,
                second: 30
            }
        );

        assert_eq!(
            decode_payload(&[3, 0x10, 0x27, 0, 0, 0xFF, 0x0F], WireFormat::Packed),
            PayloadRecord::AdcSample {
                sample_count: 10_000,
                value: 4095
            }
        );

        assert_eq!(
            decode_payload(&[5, 2, 1, 0], WireFormat::Packed),
            PayloadRecord::Button {
                button_id: 2,
                button_state: 1
            }
        );
    }

    #[test]
    fn test_fixed_size_mismatch() {
        let record = decode_payload(&[6, 0x64, 0x00, 0x00], WireFormat::Packed);
        assert_eq!(
            record,
            PayloadRecord::Unrecognized {
                reason: Unrecognized::SizeMismatch {
                    kind: PayloadKind::Temperature,
                    expected: 3,
                    actual: 4,
                }
            }
        );
    }

    #[test]
    fn test_unknown_tag_and_empty() {
        assert_eq!(
            decode_payload(&[9, 0, 0], WireFormat::Packed),
            PayloadRecord::Unrecognized {
                reason: Unrecognized::UnknownTag { tag: 9 }
            }
        );
        assert_eq!(
            decode_payload(&[], WireFormat::Packed),
            PayloadRecord::Unrecognized {
                reason: Unrecognized::Truncated { len: 0 }
            }
        );
        assert_eq!(
            decode_payload(&[6, 0, 0], WireFormat::Aligned),
            PayloadRecord::Unrecognized {
                reason: Unrecognized::Truncated { len: 3 }
            }
        );
    }

    #[test]
    fn test_aligned_time() {
        let payload = [2, 0, 0, 0, 23, 0xAA, 59, 0, 58, 0, 0, 0];
        assert_eq!(
            decode_payload(&payload, WireFormat::Aligned),
            PayloadRecord::Time {
                hour: 23,
                minute: 59,
                second: 58
            }
        );
    }

    #[test]
    fn test_packed_payload_rejected_by_aligned_reader() {
        // Packed temperature read with a 4-byte tag
        let record = decode_payload(&[6, 0x64, 0x00, 0x00], WireFormat::Aligned);
        assert_eq!(
            record,
            PayloadRecord::Unrecognized {
                reason: Unrecognized::UnknownTag { tag: 0x6406 }
            }
        );
    }

    #[test]
    fn test_encode_matches_decode_in_both_formats() {
        let records = [
            PayloadRecord::Date {
                days: 1,
                month: 12,
                year: 2024,
            },
            PayloadRecord::AdcSample {
                sample_count: 7,
                value: 512,
            },
            PayloadRecord::Text {
                text: "Hello World".to_string(),
            },
            PayloadRecord::Button {
                button_id: 1,
                button_state: 0,
            },
        ];

        for format in WireFormat::all() {
            for record in &records {
                let payload = record.encode(*format).unwrap();
                assert_eq!(&decode_payload(&payload, *format), record, "{}", format);
            }
        }
    }

    #[test]
    fn test_encode_aligned_temperature_bytes() {
        let payload = PayloadRecord::Temperature { celsius: 36 }
            .encode(WireFormat::Aligned)
            .unwrap();
        assert_eq!(payload, vec![6, 0, 0, 0, 36, 0, 0, 0]);
    }

    #[test]
    fn test_encode_rejects_unrecognized_and_long_text() {
        let unrecognized = PayloadRecord::Unrecognized {
            reason: Unrecognized::UnknownTag { tag: 42 },
        };
        assert!(matches!(
            unrecognized.encode(WireFormat::Packed),
            Err(ProtocolError::NotEncodable(_))
        ));

        let long = PayloadRecord::Text {
            text: "x".repeat(MAX_PAYLOAD_SIZE),
        };
        assert!(matches!(
            long.encode(WireFormat::Packed),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_wire_format_from_str() {
        assert_eq!("packed".parse::<WireFormat>(), Ok(WireFormat::Packed));
        assert_eq!("Aligned".parse::<WireFormat>(), Ok(WireFormat::Aligned));
        assert!("padded".parse::<WireFormat>().is_err());
    }

    #[test]
    fn test_display() {
        let record = PayloadRecord::Temperature { celsius: 21 };
        assert_eq!(record.to_string(), "temperature temperature_c=21");
        assert_eq!(record.kind_name(), "temperature");
    }
}
