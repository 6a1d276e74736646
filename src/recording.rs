//! Recorded transport streams and the async chunk sources that feed a session
//!
//! Live transports, stdin and recorded fixtures all implement [`ChunkSource`]
//! so the driver processes them identically.

use crate::streaming::Utf8Carry;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Delay between chunks in fast playback, roughly one frame
const FAST_PLAYBACK_DELAY: Duration = Duration::from_millis(17);

const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Single recorded chunk with timing info
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RecordedChunk {
    /// Raw transport text of the chunk
    pub data: String,
    /// Milliseconds since recording start
    pub timestamp_ms: u64,
}

/// A captured transport stream
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RecordedStream {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub chunks: Vec<RecordedChunk>,
}

impl RecordedStream {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read recording {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse recording {}", path.display()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write recording {}", path.display()))
    }
}

/// Captures chunks as they pass through the driver
pub struct StreamRecorder {
    stream: RecordedStream,
    start_time: Instant,
    /// Bytes of a character split across chunks
    utf8: Utf8Carry,
}

impl Default for StreamRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamRecorder {
    pub fn new() -> Self {
        Self {
            stream: RecordedStream {
                session_id: None,
                recorded_at: Utc::now(),
                chunks: Vec::new(),
            },
            start_time: Instant::now(),
            utf8: Utf8Carry::default(),
        }
    }

    pub fn set_session_id(&mut self, session_id: Option<String>) {
        self.stream.session_id = session_id;
    }

    /// Record an incoming chunk. A character split across chunks is stored
    /// whole in the chunk that completes it.
    pub fn record_chunk(&mut self, data: &[u8]) {
        let timestamp_ms = self.start_time.elapsed().as_millis() as u64;
        let data = self.utf8.decode(data);
        if data.is_empty() {
            return;
        }
        self.stream.chunks.push(RecordedChunk { data, timestamp_ms });
    }

    pub fn chunk_count(&self) -> usize {
        self.stream.chunks.len()
    }

    pub fn into_stream(mut self) -> RecordedStream {
        self.flush_pending();
        self.stream
    }

    /// Write everything recorded so far to `path`
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.flush_pending();
        debug!("Saving {} recorded chunks", self.stream.chunks.len());
        self.stream.save(path)
    }

    /// The stream ended inside a character
    fn flush_pending(&mut self) {
        let tail = self.utf8.finish();
        if !tail.is_empty() {
            let timestamp_ms = self.start_time.elapsed().as_millis() as u64;
            self.stream.chunks.push(RecordedChunk {
                data: tail,
                timestamp_ms,
            });
        }
    }
}

/// Anything that yields transport chunks
#[async_trait]
pub trait ChunkSource: Send {
    /// The next chunk, or `None` once the transport has closed normally
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Recorded chunk stream for playback
pub struct PlaybackChunkStream {
    chunks: Vec<RecordedChunk>,
    current_index: usize,
    start_time: Option<Instant>,
    fast_mode: bool,
}

impl PlaybackChunkStream {
    pub fn new(stream: RecordedStream, fast_mode: bool) -> Self {
        Self {
            chunks: stream.chunks,
            current_index: 0,
            start_time: None,
            fast_mode,
        }
    }
}

#[async_trait]
impl ChunkSource for PlaybackChunkStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.current_index >= self.chunks.len() {
            return Ok(None);
        }

        let start_time = *self.start_time.get_or_insert_with(Instant::now);
        let chunk = &self.chunks[self.current_index];

        // Either keep the recorded timing or play at a fixed cadence
        if self.fast_mode {
            tokio::time::sleep(FAST_PLAYBACK_DELAY).await;
        } else {
            let elapsed = start_time.elapsed();
            let expected_time = Duration::from_millis(chunk.timestamp_ms);
            if elapsed < expected_time {
                tokio::time::sleep(expected_time - elapsed).await;
            }
        }

        let data = chunk.data.clone().into_bytes();
        self.current_index += 1;
        Ok(Some(data))
    }
}

/// Reads a byte stream (e.g. stdin) in fixed-size blocks
pub struct ReaderChunkStream<R> {
    reader: R,
    block_size: usize,
}

impl<R: AsyncRead + Unpin + Send> ReaderChunkStream<R> {
    pub fn new(reader: R) -> Self {
        Self::with_block_size(reader, DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(reader: R, block_size: usize) -> Self {
        Self {
            reader,
            block_size: block_size.max(1),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ChunkSource for ReaderChunkStream<R> {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut block = vec![0u8; self.block_size];
        let read = self
            .reader
            .read(&mut block)
            .await
            .context("Failed to read from input")?;
        if read == 0 {
            return Ok(None);
        }
        block.truncate(read);
        Ok(Some(block))
    }
}
