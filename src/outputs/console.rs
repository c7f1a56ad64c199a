use std::io::Write;
use std::sync::{Mutex, PoisonError};

use super::speech::{FlushBuffer, SpeechSink};
use crate::kernel::error::SinkError;

/// Stands in for a synthesizer: collects text and prints it one sentence
/// at a time on flush.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    pending: Mutex<String>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SpeechSink for ConsoleSink {
    fn send_text(&self, text: &str) -> Result<(), SinkError> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(text);
        Ok(())
    }

    fn flusher(&self) -> Option<&dyn FlushBuffer> {
        Some(self)
    }
}

impl FlushBuffer for ConsoleSink {
    fn flush_buffer(&self) -> Result<(), SinkError> {
        let line = std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let mut out = std::io::stdout().lock();
        writeln!(out, "[speech] {}", line)?;
        out.flush()?;
        Ok(())
    }
}
