//! Replay of captured byte streams

use super::{ByteSource, TransportError, TransportStats};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::{self, Read};

/// Default replay chunk size
const DEFAULT_CHUNK: usize = 4096;

/// Feeds bytes from any reader, one chunk per read.
///
/// Small chunk sizes reproduce the way bytes trickle in from a UART.
/// Reads run on tokio's blocking pool, so a reader that waits for input
/// (stdin fed from a live pipe) never stalls the runtime.
pub struct ReaderSource<R> {
    /// Parked here between reads, moved onto the blocking pool during one
    reader: Option<R>,
    name: String,
    chunk_size: usize,
    stats: TransportStats,
}

impl<R: Read + Send + 'static> ReaderSource<R> {
    /// Create a new reader source
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader: Some(reader),
            name: name.into(),
            chunk_size: DEFAULT_CHUNK,
            stats: TransportStats::default(),
        }
    }

    /// Set chunk size
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }
}

fn read_chunk<R: Read>(reader: &mut R, chunk_size: usize) -> io::Result<Vec<u8>> {
    let mut buffer = vec![0u8; chunk_size];
    loop {
        match reader.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                return Ok(buffer);
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

#[async_trait]
impl<R: Read + Send + 'static> ByteSource for ReaderSource<R> {
    async fn read_available(&mut self) -> Result<Bytes, TransportError> {
        // A read abandoned mid-flight keeps the reader on the blocking pool
        let mut reader = self.reader.take().ok_or(TransportError::NotConnected)?;
        let chunk_size = self.chunk_size;

        let (reader, result) = tokio::task::spawn_blocking(move || {
            let result = read_chunk(&mut reader, chunk_size);
            (reader, result)
        })
        .await
        .map_err(|e| TransportError::IoError(io::Error::new(io::ErrorKind::Other, e)))?;
        self.reader = Some(reader);

        match result {
            Ok(buffer) if buffer.is_empty() => Err(TransportError::Disconnected),
            Ok(buffer) => {
                self.stats.bytes_received += buffer.len() as u64;
                self.stats.reads += 1;
                Ok(Bytes::from(buffer))
            }
            Err(e) => {
                self.stats.errors += 1;
                Err(TransportError::IoError(e))
            }
        }
    }

    fn describe(&self) -> String {
        format!("{} (replay, {} byte chunks)", self.name, self.chunk_size)
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
