//! Record logging
//!
//! Persists one row per decoded frame as CSV or JSON lines.

use super::protocol::PayloadRecord;
use super::session::{DecodeEvent, DecodedFrame, DecoderStats, FrameSink};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// CSV with one column per field
    #[default]
    Csv,
    /// JSON lines
    JsonLines,
}

impl LogFormat {
    /// Get file extension for format
    pub fn extension(&self) -> &'static str {
        match self {
            LogFormat::Csv => "csv",
            LogFormat::JsonLines => "jsonl",
        }
    }

    /// Get all formats
    pub fn all() -> &'static [LogFormat] {
        &[LogFormat::Csv, LogFormat::JsonLines]
    }

    /// Get name
    pub fn name(&self) -> &'static str {
        match self {
            LogFormat::Csv => "CSV",
            LogFormat::JsonLines => "JSON Lines",
        }
    }

    /// Pick a format from a file extension, defaulting to CSV
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jsonl") | Some("json") => LogFormat::JsonLines,
            _ => LogFormat::Csv,
        }
    }
}

/// Record logger errors
#[derive(Error, Debug)]
pub enum LogError {
    /// Could not open the log file
    #[error("Failed to open log file {path}: {source}")]
    Open {
        /// Log file path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Write failed
    #[error("Failed to write log: {0}")]
    Write(#[from] std::io::Error),

    /// JSON encoding failed
    #[error("Failed to encode record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Columns after the common prefix; each record fills its own
const FIELD_COLUMNS: &[&str] = &[
    "days",
    "month",
    "year",
    "hour",
    "minute",
    "second",
    "sample_count",
    "value",
    "text",
    "button_id",
    "button_state",
    "temperature_c",
    "reason",
];

/// CSV header line
pub fn csv_header() -> String {
    let mut columns = vec!["host_time", "timestamp_ms", "interval_ms", "type"];
    columns.extend_from_slice(FIELD_COLUMNS);
    columns.join(",")
}

fn csv_quote(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Format one decoded frame as a CSV row
pub fn csv_row(decoded: &DecodedFrame) -> String {
    let fields = decoded.record.fields();
    let mut row = vec![
        decoded
            .received_at
            .format("%Y-%m-%d %H:%M:%S%.3f")
            .to_string(),
        decoded.frame.timestamp.to_string(),
        decoded
            .interval_ms
            .map(|ms| ms.to_string())
            .unwrap_or_default(),
        decoded.record.kind_name().to_string(),
    ];

    for column in FIELD_COLUMNS {
        let value = fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| csv_quote(value))
            .unwrap_or_default();
        row.push(value);
    }

    row.join(",")
}

#[derive(Serialize)]
struct JsonRow<'a> {
    host_time: String,
    timestamp_ms: u16,
    interval_ms: Option<u16>,
    valid: bool,
    #[serde(flatten)]
    record: &'a PayloadRecord,
}

/// Format one decoded frame as a JSON line
pub fn json_row(decoded: &DecodedFrame) -> Result<String, LogError> {
    let row = JsonRow {
        host_time: decoded.received_at.to_rfc3339(),
        timestamp_ms: decoded.frame.timestamp,
        interval_ms: decoded.interval_ms,
        valid: decoded.frame.valid,
        record: &decoded.record,
    };
    Ok(serde_json::to_string(&row)?)
}

/// Appends decoded frames to a file
pub struct RecordLogger {
    file: BufWriter<File>,
    format: LogFormat,
    path: PathBuf,
    rows: usize,
    include_unrecognized: bool,
}

impl RecordLogger {
    /// Open (or create) `path` for appending
    pub fn open(path: impl Into<PathBuf>, format: LogFormat) -> Result<Self, LogError> {
        let path = path.into();
        let is_new = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LogError::Open {
                path: path.clone(),
                source,
            })?;

        let mut file = BufWriter::new(file);

        // Write header for new CSV files only
        if format == LogFormat::Csv && is_new {
            writeln!(file, "{}", csv_header())?;
        }

        info!("Logging records to {} ({})", path.display(), format.name());

        Ok(Self {
            file,
            format,
            path,
            rows: 0,
            include_unrecognized: true,
        })
    }

    /// Skip frames whose payload was not recognized
    #[must_use]
    pub fn skip_unrecognized(mut self, skip: bool) -> Self {
        self.include_unrecognized = !skip;
        self
    }

    /// Get log path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Append one decoded frame
    pub fn log(&mut self, decoded: &DecodedFrame) -> Result<(), LogError> {
        if decoded.record.is_unrecognized() && !self.include_unrecognized {
            return Ok(());
        }

        let line = match self.format {
            LogFormat::Csv => csv_row(decoded),
            LogFormat::JsonLines => json_row(decoded)?,
        };

        writeln!(self.file, "{}", line)?;
        self.rows += 1;

        // Flush periodically
        if self.rows % 100 == 0 {
            self.file.flush()?;
        }

        Ok(())
    }

    /// Flush to disk
    pub fn flush(&mut self) -> Result<(), LogError> {
        self.file.flush()?;
        Ok(())
    }
}

impl FrameSink for RecordLogger {
    fn handle(&mut self, event: &DecodeEvent) -> anyhow::Result<()> {
        if let DecodeEvent::Decoded(decoded) = event {
            self.log(decoded)?;
        }
        Ok(())
    }

    fn finish(&mut self, _stats: &DecoderStats) -> anyhow::Result<()> {
        self.flush()?;
        info!("Wrote {} rows to {}", self.rows, self.path.display());
        Ok(())
    }
}

impl Drop for RecordLogger {
    fn drop(&mut self) {
        let _ = self.file.flush();
    }
}

/// Generate log filename with timestamp
pub fn generate_log_filename(prefix: &str, format: LogFormat) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("{}_{}.{}", prefix, timestamp, format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::{Frame, HEADER};
    use bytes::Bytes;

    fn decoded(record: PayloadRecord, timestamp: u16, interval_ms: Option<u16>) -> DecodedFrame {
        DecodedFrame {
            received_at: Local::now(),
            frame: Frame {
                header: HEADER,
                timestamp,
                payload_size: 0,
                payload: Bytes::new(),
                checksum: 0,
                computed_checksum: 0,
                valid: true,
            },
            record,
            interval_ms,
        }
    }

    #[test]
    fn test_format_follows_extension() {
        for format in LogFormat::all() {
            let path = Path::new("capture").with_extension(format.extension());
            assert_eq!(LogFormat::from_path(&path), *format, "{}", format.name());
        }
        assert_eq!(LogFormat::from_path(Path::new("capture.txt")), LogFormat::Csv);
    }

    #[test]
    fn test_csv_row_fills_variant_columns() {
        let row = csv_row(&decoded(
            PayloadRecord::Button {
                button_id: 3,
                button_state: 1,
            },
            500,
            Some(20),
        ));
        let cells: Vec<&str> = row.split(',').collect();
        assert_eq!(cells.len(), 4 + FIELD_COLUMNS.len());
        assert_eq!(&cells[1..4], &["500", "20", "button"]);
        assert_eq!(cells[4 + 9], "3");
        assert_eq!(cells[4 + 10], "1");
        assert_eq!(cells[4], "");
    }

    #[test]
    fn test_csv_quotes_text() {
        let row = csv_row(&decoded(
            PayloadRecord::Text {
                text: "a,\"b\"".to_string(),
            },
            1,
            None,
        ));
        assert!(row.contains("\"a,\"\"b\"\"\""));
        assert!(row.contains(",1,,text,"));
    }

    #[test]
    fn test_json_row() {
        let line = json_row(&decoded(PayloadRecord::Temperature { celsius: 42 }, 7, None)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "temperature");
        assert_eq!(value["celsius"], 42);
        assert_eq!(value["timestamp_ms"], 7);
        assert!(value["interval_ms"].is_null());
    }

    #[test]
    fn test_logger_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.csv");

        {
            let mut logger = RecordLogger::open(&path, LogFormat::Csv).unwrap();
            logger
                .log(&decoded(PayloadRecord::Temperature { celsius: 30 }, 1, None))
                .unwrap();
        }
        {
            let mut logger = RecordLogger::open(&path, LogFormat::Csv).unwrap();
            logger
                .log(&decoded(PayloadRecord::Temperature { celsius: 31 }, 2, Some(1)))
                .unwrap();
            assert_eq!(logger.rows(), 1);
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], csv_header());
        assert!(lines[2].contains(",2,1,temperature,"));
    }

    #[test]
    fn test_logger_skips_unrecognized_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.jsonl");

        let mut logger = RecordLogger::open(&path, LogFormat::JsonLines)
            .unwrap()
            .skip_unrecognized(true);
        let unknown = PayloadRecord::Unrecognized {
            reason: crate::core::protocol::Unrecognized::UnknownTag { tag: 99 },
        };
        logger.log(&decoded(unknown, 1, None)).unwrap();
        assert_eq!(logger.rows(), 0);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(LogFormat::from_path(Path::new("x.jsonl")), LogFormat::JsonLines);
        assert_eq!(LogFormat::from_path(Path::new("x.csv")), LogFormat::Csv);
        assert_eq!(LogFormat::from_path(Path::new("x")), LogFormat::Csv);
    }

    #[test]
    fn test_generate_log_filename() {
        let name = generate_log_filename("frames", LogFormat::Csv);
        assert!(name.starts_with("frames_"));
        assert!(name.ends_with(".csv"));
    }
}
