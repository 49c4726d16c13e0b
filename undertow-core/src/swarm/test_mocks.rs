//! Mock swarm engine for testing the lifecycle manager and HTTP layer.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{
    SwarmContents, SwarmEngine, SwarmError, SwarmEvent, SwarmFile, SwarmHandle, SwarmTorrent,
};
use crate::streaming::{ByteRange, ByteStream};

/// Torrent handle that records `destroy` calls.
#[derive(Debug, Default)]
pub struct MockTorrent {
    destroyed: AtomicUsize,
}

impl MockTorrent {
    pub fn is_destroyed(&self) -> bool {
        self.destroy_count() > 0
    }

    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl SwarmTorrent for MockTorrent {
    fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MockEngineState {
    add_calls: HashMap<String, usize>,
    /// Latest download per identifier
    downloads: HashMap<String, (Arc<MockTorrent>, mpsc::UnboundedSender<SwarmEvent>)>,
    /// Contents announced as soon as the identifier is added
    seeded: HashMap<String, SwarmContents>,
    add_failure: Option<String>,
}

/// Swarm engine whose downloads only progress when the test says so.
///
/// Unseeded identifiers stay pending until `emit_ready` or `emit_error`.
#[derive(Clone, Default)]
pub struct MockSwarmEngine {
    state: Arc<Mutex<MockEngineState>>,
}

impl MockSwarmEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `identifier` become ready right after it is added.
    pub fn seed_ready(&self, identifier: &str, name: &str, files: Vec<MockFile>) {
        self.state
            .lock()
            .seeded
            .insert(identifier.to_string(), contents(name, files));
    }

    /// Makes every subsequent `add` fail.
    pub fn fail_adds(&self, reason: &str) {
        self.state.lock().add_failure = Some(reason.to_string());
    }

    /// Reports metadata for the latest download of `identifier`.
    pub fn emit_ready(&self, identifier: &str, name: &str, files: Vec<MockFile>) -> bool {
        self.emit(identifier, SwarmEvent::Ready(contents(name, files)))
    }

    pub fn emit_error(&self, identifier: &str, reason: &str) -> bool {
        self.emit(
            identifier,
            SwarmEvent::Error(SwarmError::Backend {
                reason: reason.to_string(),
            }),
        )
    }

    pub fn emit_done(&self, identifier: &str) -> bool {
        self.emit(identifier, SwarmEvent::Done)
    }

    /// How many times `add` was called for `identifier`.
    pub fn add_count(&self, identifier: &str) -> usize {
        self.state
            .lock()
            .add_calls
            .get(identifier)
            .copied()
            .unwrap_or(0)
    }

    /// Whether the latest download of `identifier` was destroyed.
    pub fn is_destroyed(&self, identifier: &str) -> bool {
        self.state
            .lock()
            .downloads
            .get(identifier)
            .is_some_and(|(torrent, _)| torrent.is_destroyed())
    }

    fn emit(&self, identifier: &str, event: SwarmEvent) -> bool {
        self.state
            .lock()
            .downloads
            .get(identifier)
            .is_some_and(|(_, sender)| sender.send(event).is_ok())
    }
}

impl SwarmEngine for MockSwarmEngine {
    fn add(&self, identifier: &str) -> Result<SwarmHandle, SwarmError> {
        let mut state = self.state.lock();
        *state.add_calls.entry(identifier.to_string()).or_default() += 1;

        if let Some(reason) = &state.add_failure {
            return Err(SwarmError::Backend {
                reason: reason.clone(),
            });
        }

        let (sender, events) = mpsc::unbounded_channel();
        if let Some(contents) = state.seeded.get(identifier) {
            let _ = sender.send(SwarmEvent::Ready(contents.clone()));
        }

        let torrent = Arc::new(MockTorrent::default());
        state
            .downloads
            .insert(identifier.to_string(), (torrent.clone(), sender));

        Ok(SwarmHandle { torrent, events })
    }
}

fn contents(name: &str, files: Vec<MockFile>) -> SwarmContents {
    SwarmContents {
        name: name.to_string(),
        files: files
            .into_iter()
            .map(|file| Arc::new(file) as Arc<dyn SwarmFile>)
            .collect(),
    }
}

/// Counters shared between a [`MockFile`] and the streams it opened.
#[derive(Debug, Default)]
pub struct StreamStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    ranges: Mutex<Vec<Option<ByteRange>>>,
}

impl StreamStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Streams dropped so far, whether finished or abandoned
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn ranges(&self) -> Vec<Option<ByteRange>> {
        self.ranges.lock().clone()
    }
}

/// In-memory file with failure and stall injection.
#[derive(Clone)]
pub struct MockFile {
    name: String,
    data: Bytes,
    chunk_size: usize,
    fail_at: Option<u64>,
    stall_after_chunks: Option<usize>,
    stats: Arc<StreamStats>,
}

impl MockFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            chunk_size: 100,
            fail_at: None,
            stall_after_chunks: None,
            stats: Arc::new(StreamStats::default()),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Yields an I/O error once the read reaches absolute `offset`.
    pub fn failing_at(mut self, offset: u64) -> Self {
        self.fail_at = Some(offset);
        self
    }

    /// Stops yielding (without ending) after `chunks` chunks, like a piece
    /// that never arrives.
    pub fn stalling_after(mut self, chunks: usize) -> Self {
        self.stall_after_chunks = Some(chunks);
        self
    }

    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.stats)
    }
}

impl SwarmFile for MockFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    fn open(&self, range: Option<ByteRange>) -> Result<ByteStream, SwarmError> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        self.stats.ranges.lock().push(range);

        let (position, end) = match range {
            Some(range) => (range.start, range.end + 1),
            None => (0, self.length()),
        };

        Ok(Box::pin(MockStream {
            data: self.data.clone(),
            position,
            end: end.min(self.length()),
            chunk_size: self.chunk_size as u64,
            fail_at: self.fail_at,
            stall_after_chunks: self.stall_after_chunks,
            chunks_sent: 0,
            failed: false,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct MockStream {
    data: Bytes,
    position: u64,
    end: u64,
    chunk_size: u64,
    fail_at: Option<u64>,
    stall_after_chunks: Option<usize>,
    chunks_sent: usize,
    failed: bool,
    stats: Arc<StreamStats>,
}

impl Stream for MockStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.failed || self.position >= self.end {
            return Poll::Ready(None);
        }

        if self.stall_after_chunks == Some(self.chunks_sent) {
            return Poll::Pending;
        }

        let mut chunk_end = (self.position + self.chunk_size).min(self.end);
        if let Some(fail_at) = self.fail_at {
            if self.position >= fail_at {
                self.failed = true;
                return Poll::Ready(Some(Err(std::io::Error::other(
                    "piece data unavailable",
                ))));
            }
            chunk_end = chunk_end.min(fail_at);
        }

        let chunk = self
            .data
            .slice(self.position as usize..chunk_end as usize);
        self.position = chunk_end;
        self.chunks_sent += 1;
        Poll::Ready(Some(Ok(chunk)))
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
    }
}
