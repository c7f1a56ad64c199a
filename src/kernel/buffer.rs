//! Thread-safe chunk queue between token generation and speech.
//!
//! One producer appends chunks and completes the buffer once; any number
//! of consumers pull chunks through their own [`Chunks`] cursor. A single
//! mutex guards the state and one condition variable broadcasts every
//! change, so a blocked consumer wakes on a new chunk, on completion, and
//! on [`StreamingTextBuffer::clear`].
//!
//! Growth is unbounded: the producer never waits for a consumer.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Default)]
struct BufferState {
    chunks: Vec<String>,
    complete: bool,
    cancelled: bool,
}

#[derive(Debug, Default)]
pub struct StreamingTextBuffer {
    state: Mutex<BufferState>,
    signal: Condvar,
}

impl StreamingTextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation leaves the state consistent, so a poisoned lock is
    // still safe to read.
    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a chunk. Returns false if the buffer was already completed;
    /// the chunk is discarded in that case.
    pub fn add_chunk(&self, chunk: impl Into<String>) -> bool {
        let mut state = self.lock();
        if state.complete {
            debug!("chunk added after completion, discarding");
            return false;
        }
        state.chunks.push(chunk.into());
        self.signal.notify_all();
        true
    }

    /// Signals that no more chunks will arrive. Idempotent.
    pub fn complete(&self) {
        let mut state = self.lock();
        if !state.complete {
            state.complete = true;
            self.signal.notify_all();
        }
    }

    /// Cancels the buffer: no chunk is yielded afterwards, pending or not,
    /// and every blocked consumer returns. Permanent and idempotent.
    pub fn clear(&self) {
        let mut state = self.lock();
        if !state.cancelled {
            state.cancelled = true;
            debug!(chunks = state.chunks.len(), "streaming buffer cleared");
        }
        self.signal.notify_all();
    }

    pub fn is_complete(&self) -> bool {
        self.lock().complete
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    pub fn len(&self) -> usize {
        self.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The whole chunk log joined in order, without consuming anything.
    pub fn snapshot(&self) -> String {
        self.lock().chunks.concat()
    }

    /// A fresh consumer cursor starting at the first chunk.
    pub fn chunks(&self) -> Chunks<'_> {
        Chunks {
            buffer: self,
            offset: 0,
        }
    }
}

/// Blocking, per-consumer iterator over a [`StreamingTextBuffer`].
///
/// `next` blocks while the buffer is neither complete nor cancelled and no
/// unread chunk exists.
#[derive(Debug)]
pub struct Chunks<'a> {
    buffer: &'a StreamingTextBuffer,
    offset: usize,
}

impl Chunks<'_> {
    /// Number of chunks this consumer has read so far.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for Chunks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let mut state = self.buffer.lock();
        loop {
            if state.cancelled {
                return None;
            }
            if let Some(chunk) = state.chunks.get(self.offset) {
                self.offset += 1;
                return Some(chunk.clone());
            }
            if state.complete {
                return None;
            }
            state = self
                .buffer
                .signal
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
