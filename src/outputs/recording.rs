use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::speech::{FlushBuffer, SpeechSink};
use crate::kernel::error::SinkError;

/// Sink that keeps everything it was sent. Optionally refuses to flush,
/// or rejects text containing a marker.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<String>>,
    flushes: AtomicUsize,
    flushable: bool,
    reject: Option<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            flushable: true,
            ..Self::default()
        }
    }

    /// A sink without boundary flushing.
    pub fn without_flush() -> Self {
        Self::default()
    }

    pub fn rejecting(mut self, marker: impl Into<String>) -> Self {
        self.reject = Some(marker.into());
        self
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sent(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub fn spoken(&self) -> String {
        self.lock().concat()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl SpeechSink for RecordingSink {
    fn send_text(&self, text: &str) -> Result<(), SinkError> {
        if let Some(marker) = &self.reject {
            if text.contains(marker.as_str()) {
                return Err(SinkError::Rejected(text.to_string()));
            }
        }
        self.lock().push(text.to_string());
        Ok(())
    }

    fn flusher(&self) -> Option<&dyn FlushBuffer> {
        if self.flushable {
            Some(self)
        } else {
            None
        }
    }
}

impl FlushBuffer for RecordingSink {
    fn flush_buffer(&self) -> Result<(), SinkError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
