use crate::kernel::error::SinkError;

/// Speech-synthesis sink fed by the turn coordinator.
pub trait SpeechSink: Send + Sync {
    fn send_text(&self, text: &str) -> Result<(), SinkError>;

    /// Sinks that can flush at sentence boundaries expose it here.
    fn flusher(&self) -> Option<&dyn FlushBuffer> {
        None
    }
}

pub trait FlushBuffer: Send + Sync {
    fn flush_buffer(&self) -> Result<(), SinkError>;
}
