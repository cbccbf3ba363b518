//! Bounded in-memory byte conduit between the multipart producer and the
//! HTTP request body.
//!
//! At most `max_buffered_chunks` chunks of at most `max_chunk_bytes` bytes are
//! unread at any moment. A writer that finds the conduit full waits for the
//! reader, and every such wait is counted in [`ConduitStats::stalls`].

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};

pub const DEFAULT_MAX_BUFFERED_CHUNKS: usize = 16;
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConduitConfig {
    pub max_buffered_chunks: usize,
    pub max_chunk_bytes: usize,
}

impl Default for ConduitConfig {
    fn default() -> Self {
        Self {
            max_buffered_chunks: DEFAULT_MAX_BUFFERED_CHUNKS,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
        }
    }
}

/// Counters shared by both ends of a conduit.
#[derive(Debug, Clone, Default)]
pub struct ConduitStats {
    stalls: Arc<AtomicU64>,
    bytes_written: Arc<AtomicU64>,
}

impl ConduitStats {
    /// Times the writer found the conduit full and had to wait.
    pub fn stalls(&self) -> u64 {
        self.stalls.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }
}

pub struct ConduitWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    max_chunk_bytes: usize,
    stats: ConduitStats,
}

pub struct ConduitReader {
    rx: mpsc::Receiver<io::Result<Bytes>>,
}

pub fn conduit(config: ConduitConfig) -> (ConduitWriter, ConduitReader) {
    let (tx, rx) = mpsc::channel(config.max_buffered_chunks.max(1));
    (
        ConduitWriter {
            tx,
            max_chunk_bytes: config.max_chunk_bytes.max(1),
            stats: ConduitStats::default(),
        },
        ConduitReader { rx },
    )
}

fn reader_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "conduit reader dropped")
}

impl ConduitWriter {
    pub fn stats(&self) -> ConduitStats {
        self.stats.clone()
    }

    /// Write `data`, split into chunks no larger than `max_chunk_bytes`.
    /// Fails with `BrokenPipe` once the reader is gone.
    pub async fn write(&mut self, mut data: Bytes) -> io::Result<()> {
        while !data.is_empty() {
            let chunk = data.split_to(data.len().min(self.max_chunk_bytes));
            let len = chunk.len() as u64;
            self.send(Ok(chunk)).await?;
            self.stats.bytes_written.fetch_add(len, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Hand `error` to the reader, which surfaces it as a body failure.
    pub async fn abort(self, error: io::Error) {
        let _ = self.tx.send(Err(error)).await;
    }

    async fn send(&self, item: io::Result<Bytes>) -> io::Result<()> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(item)) => {
                self.stats.stalls.fetch_add(1, Ordering::Relaxed);
                self.tx.send(item).await.map_err(|_| reader_gone())
            }
            Err(TrySendError::Closed(_)) => Err(reader_gone()),
        }
    }
}

impl Stream for ConduitReader {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
