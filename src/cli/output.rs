//! Console output for decode events
//!
//! Prints one line per event as text or JSON, for terminals and pipes.

use crate::core::protocol::{Frame, PayloadRecord};
use crate::core::session::{DecodeEvent, DecoderStats, FrameSink};
use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, Write};

/// CLI output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON lines for scripting
    Json,
}

/// Format one event as a text line
pub fn format_text(event: &DecodeEvent, show_frames: bool) -> String {
    match event {
        DecodeEvent::Decoded(decoded) => {
            let interval = decoded
                .interval_ms
                .map(|ms| format!("+{}ms", ms))
                .unwrap_or_else(|| "-".to_string());
            let mut line = format!(
                "{} ts={:>5} {:>8}  {}",
                decoded.received_at.format("%H:%M:%S%.3f"),
                decoded.frame.timestamp,
                interval,
                decoded.record
            );
            if show_frames {
                let frame = &decoded.frame;
                line.push_str(&format!(
                    "  [header={} size={} crc={:#06x} computed={:#06x} valid={} payload={} bits={}]",
                    hex::encode(frame.header),
                    frame.payload_size,
                    frame.checksum,
                    frame.computed_checksum,
                    frame.valid,
                    frame.payload_hex(),
                    frame.payload_bin()
                ));
            }
            line
        }
        DecodeEvent::InvalidChecksum(frame) => format!(
            "INVALID ts={} size={} crc={:#06x} expected={:#06x} payload={}",
            frame.timestamp,
            frame.payload_size,
            frame.checksum,
            frame.computed_checksum,
            frame.payload_hex()
        ),
        DecodeEvent::Desync { discarded } => format!("DESYNC discarded {} bytes", discarded),
    }
}

/// Raw frame fields shown with `--show-frames`
#[derive(Serialize)]
struct RawFrame {
    header: String,
    computed_checksum: u16,
    valid: bool,
    payload: String,
    payload_bin: String,
}

impl RawFrame {
    fn new(frame: &Frame) -> Self {
        Self {
            header: hex::encode(frame.header),
            computed_checksum: frame.computed_checksum,
            valid: frame.valid,
            payload: frame.payload_hex(),
            payload_bin: frame.payload_bin(),
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum JsonEvent<'a> {
    Frame {
        timestamp_ms: u16,
        interval_ms: Option<u16>,
        payload_size: u16,
        checksum: u16,
        record: &'a PayloadRecord,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<RawFrame>,
    },
    InvalidChecksum {
        timestamp_ms: u16,
        payload_size: u16,
        checksum: u16,
        computed_checksum: u16,
        payload: String,
    },
    Desync {
        discarded: usize,
    },
}

/// Format one event as a JSON object; `show_frames` adds a `raw` object to frames
pub fn format_json(event: &DecodeEvent, show_frames: bool) -> serde_json::Result<String> {
    let json = match event {
        DecodeEvent::Decoded(decoded) => JsonEvent::Frame {
            timestamp_ms: decoded.frame.timestamp,
            interval_ms: decoded.interval_ms,
            payload_size: decoded.frame.payload_size,
            checksum: decoded.frame.checksum,
            record: &decoded.record,
            raw: show_frames.then(|| RawFrame::new(&decoded.frame)),
        },
        DecodeEvent::InvalidChecksum(frame) => JsonEvent::InvalidChecksum {
            timestamp_ms: frame.timestamp,
            payload_size: frame.payload_size,
            checksum: frame.checksum,
            computed_checksum: frame.computed_checksum,
            payload: frame.payload_hex(),
        },
        DecodeEvent::Desync { discarded } => JsonEvent::Desync {
            discarded: *discarded,
        },
    };
    serde_json::to_string(&json)
}

/// Writes events to stdout
pub struct ConsolePrinter {
    format: OutputFormat,
    show_frames: bool,
    quiet: bool,
}

impl ConsolePrinter {
    /// Create printer
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            show_frames: false,
            quiet: false,
        }
    }

    /// Append raw frame details to text lines
    #[must_use]
    pub fn show_frames(mut self, show: bool) -> Self {
        self.show_frames = show;
        self
    }

    /// Only print problems (invalid frames, desyncs)
    #[must_use]
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    fn line(&self, event: &DecodeEvent) -> anyhow::Result<Option<String>> {
        if self.quiet && matches!(event, DecodeEvent::Decoded(_)) {
            return Ok(None);
        }
        let line = match self.format {
            OutputFormat::Text => format_text(event, self.show_frames),
            OutputFormat::Json => format_json(event, self.show_frames)?,
        };
        Ok(Some(line))
    }
}

impl FrameSink for ConsolePrinter {
    fn handle(&mut self, event: &DecodeEvent) -> anyhow::Result<()> {
        if let Some(line) = self.line(event)? {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", line)?;
            stdout.flush()?;
        }
        Ok(())
    }

    fn finish(&mut self, stats: &DecoderStats) -> anyhow::Result<()> {
        if self.quiet {
            return Ok(());
        }
        match self.format {
            OutputFormat::Text => eprintln!(
                "{} frames ({} unrecognized), {} checksum failures, {} bytes discarded, {} bytes pending",
                stats.frames_decoded,
                stats.unrecognized,
                stats.checksum_failures,
                stats.bytes_discarded,
                stats.bytes_pending
            ),
            OutputFormat::Json => eprintln!(
                "{}",
                serde_json::json!({
                    "frames_decoded": stats.frames_decoded,
                    "unrecognized": stats.unrecognized,
                    "checksum_failures": stats.checksum_failures,
                    "desync_events": stats.desync_events,
                    "bytes_discarded": stats.bytes_discarded,
                    "bytes_pending": stats.bytes_pending,
                })
            ),
        }
        Ok(())
    }
}
