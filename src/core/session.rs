//! Decode sessions
//!
//! A [`StreamDecoder`] turns raw bytes into [`DecodeEvent`]s. A [`Session`]
//! drives one from a [`ByteSource`], polling at a fixed interval and handing
//! every event to a [`FrameSink`].

use super::protocol::{decode_payload, Frame, FrameDecoder, PayloadRecord, WireFormat};
use super::transport::{ByteSource, TransportError};
use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// A valid frame with its interpreted payload
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Host time the frame was extracted
    pub received_at: DateTime<Local>,
    /// The frame
    pub frame: Frame,
    /// Interpreted payload
    pub record: PayloadRecord,
    /// Milliseconds since the previous valid frame (sender clock, wrapping)
    pub interval_ms: Option<u16>,
}

/// Everything a consumer can be told about the stream
#[derive(Debug, Clone)]
pub enum DecodeEvent {
    /// Checksum matched, payload interpreted
    Decoded(DecodedFrame),
    /// Frame complete but checksum failed; payload not interpreted
    InvalidChecksum(Frame),
    /// Bytes dropped while hunting for a header
    Desync {
        /// Number of bytes dropped
        discarded: usize,
    },
}

/// Decoder statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Bytes fed in
    pub bytes_received: u64,
    /// Frames with a valid checksum
    pub frames_decoded: u64,
    /// Frames rejected by checksum
    pub checksum_failures: u64,
    /// Valid frames whose payload was not recognized
    pub unrecognized: u64,
    /// Resynchronizations
    pub desync_events: u64,
    /// Bytes dropped during resynchronization
    pub bytes_discarded: u64,
    /// Bytes still waiting for the rest of a frame
    pub bytes_pending: u64,
}

/// Byte stream to event pipeline
pub struct StreamDecoder {
    decoder: FrameDecoder,
    format: WireFormat,
    last_timestamp: Option<u16>,
    stats: DecoderStats,
}

impl StreamDecoder {
    /// Create decoder for the given payload layout
    pub fn new(format: WireFormat) -> Self {
        Self {
            decoder: FrameDecoder::new(),
            format,
            last_timestamp: None,
            stats: DecoderStats::default(),
        }
    }

    /// Payload layout in use
    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Feed bytes and collect every event they complete
    pub fn push(&mut self, data: &[u8]) -> Vec<DecodeEvent> {
        self.decoder.push(data);
        self.stats.bytes_received += data.len() as u64;

        let mut events = Vec::new();

        loop {
            let extract = self.decoder.next_frame();

            if extract.discarded > 0 {
                warn!("Desync: discarded {} bytes before header", extract.discarded);
                self.stats.desync_events += 1;
                self.stats.bytes_discarded = self.decoder.total_discarded();
                events.push(DecodeEvent::Desync {
                    discarded: extract.discarded,
                });
            }

            match extract.frame {
                Some(frame) => events.push(self.interpret(frame)),
                // Resync made progress, the new front may be a header
                None if extract.discarded > 0 => continue,
                None => break,
            }
        }

        self.stats.bytes_pending = self.decoder.buffered() as u64;
        trace!("{} bytes pending", self.stats.bytes_pending);
        events
    }

    fn interpret(&mut self, frame: Frame) -> DecodeEvent {
        if !frame.valid {
            warn!(
                "Checksum mismatch: ts={} size={} got {:#06x} expected {:#06x}",
                frame.timestamp, frame.payload_size, frame.checksum, frame.computed_checksum
            );
            self.stats.checksum_failures += 1;
            return DecodeEvent::InvalidChecksum(frame);
        }

        let record = decode_payload(&frame.payload, self.format);
        let interval_ms = self
            .last_timestamp
            .map(|previous| frame.timestamp.wrapping_sub(previous));
        self.last_timestamp = Some(frame.timestamp);
        self.stats.frames_decoded += 1;

        if let PayloadRecord::Unrecognized { reason } = &record {
            warn!("Unrecognized payload (ts={}): {}", frame.timestamp, reason);
            self.stats.unrecognized += 1;
        } else {
            debug!("Frame ts={} {}", frame.timestamp, record);
        }

        DecodeEvent::Decoded(DecodedFrame {
            received_at: Local::now(),
            frame,
            record,
            interval_ms,
        })
    }

    /// Get statistics
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }
}

/// Consumer of decode events
pub trait FrameSink {
    /// Handle one event
    fn handle(&mut self, event: &DecodeEvent) -> anyhow::Result<()>;

    /// Called once when the session ends
    fn finish(&mut self, _stats: &DecoderStats) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<F> FrameSink for F
where
    F: FnMut(&DecodeEvent) -> anyhow::Result<()>,
{
    fn handle(&mut self, event: &DecodeEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Fan events out to several sinks
#[derive(Default)]
pub struct SinkSet<'a> {
    sinks: Vec<&'a mut dyn FrameSink>,
}

impl<'a> SinkSet<'a> {
    /// Create empty set
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Add a sink
    pub fn add(&mut self, sink: &'a mut dyn FrameSink) {
        self.sinks.push(sink);
    }
}

impl FrameSink for SinkSet<'_> {
    fn handle(&mut self, event: &DecodeEvent) -> anyhow::Result<()> {
        for sink in &mut self.sinks {
            sink.handle(event)?;
        }
        Ok(())
    }

    fn finish(&mut self, stats: &DecoderStats) -> anyhow::Result<()> {
        for sink in &mut self.sinks {
            sink.finish(stats)?;
        }
        Ok(())
    }
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not polled yet
    Idle,
    /// Polling the source
    Running,
    /// Source closed or stop requested
    Stopped,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Payload layout
    pub wire_format: WireFormat,
    /// Sleep between polls; zero only yields
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            wire_format: WireFormat::Packed,
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// A byte source bound to a stream decoder
pub struct Session<S> {
    source: S,
    decoder: StreamDecoder,
    config: SessionConfig,
    state: SessionState,
}

impl<S: ByteSource> Session<S> {
    /// Create session
    pub fn new(source: S, config: SessionConfig) -> Self {
        Self {
            source,
            decoder: StreamDecoder::new(config.wire_format),
            config,
            state: SessionState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Decoder statistics so far
    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    /// Read once and deliver the resulting events.
    ///
    /// Returns `false` once the source has disconnected.
    pub async fn poll_once(&mut self, sink: &mut dyn FrameSink) -> anyhow::Result<bool> {
        let data = match self.source.read_available().await {
            Ok(data) => data,
            Err(TransportError::Disconnected) => {
                self.state = SessionState::Stopped;
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        if !data.is_empty() {
            for event in self.decoder.push(&data) {
                sink.handle(&event)?;
            }
        }

        Ok(true)
    }

    /// Poll until the source disconnects or `stop` is set.
    ///
    /// `sink.finish` runs on every exit, including a transport error.
    pub async fn run(
        &mut self,
        sink: &mut dyn FrameSink,
        stop: &AtomicBool,
    ) -> anyhow::Result<DecoderStats> {
        info!(
            "Decoding {} ({} payloads)",
            self.source.describe(),
            self.decoder.format()
        );
        self.state = SessionState::Running;

        let outcome = self.poll_until_stopped(sink, stop).await;
        self.state = SessionState::Stopped;

        let stats = self.decoder.stats();
        if stats.bytes_pending > 0 {
            debug!("{} bytes left without a complete frame", stats.bytes_pending);
        }
        let source_stats = self.source.stats();
        info!(
            "Session finished: {} frames, {} checksum failures, {} bytes discarded; source: {} bytes in {} reads, {} errors",
            stats.frames_decoded,
            stats.checksum_failures,
            stats.bytes_discarded,
            source_stats.bytes_received,
            source_stats.reads,
            source_stats.errors
        );

        if let Err(e) = outcome {
            if let Err(finish_err) = sink.finish(&stats) {
                warn!("Sink failed to finish after error: {:#}", finish_err);
            }
            return Err(e);
        }

        sink.finish(&stats)?;
        Ok(stats)
    }

    async fn poll_until_stopped(
        &mut self,
        sink: &mut dyn FrameSink,
        stop: &AtomicBool,
    ) -> anyhow::Result<()> {
        while !stop.load(Ordering::SeqCst) {
            // A read that waits for input is abandoned once stop is raised
            let more = tokio::select! {
                polled = self.poll_once(sink) => polled?,
                () = stop_requested(stop) => break,
            };
            if !more {
                break;
            }

            if self.config.poll_interval.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }
        Ok(())
    }
}

/// How often a pending read checks the stop flag
const STOP_CHECK: Duration = Duration::from_millis(100);

async fn stop_requested(stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        tokio::time::sleep(STOP_CHECK).await;
    }
}
