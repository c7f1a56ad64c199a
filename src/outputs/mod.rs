pub mod console;
pub mod recording;
pub mod speech;

pub use console::ConsoleSink;
pub use recording::RecordingSink;
pub use speech::{FlushBuffer, SpeechSink};
