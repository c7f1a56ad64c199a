pub mod config;
pub mod kernel;
pub mod outputs;

pub use config::Config;
pub use kernel::buffer::StreamingTextBuffer;
pub use kernel::conversation::{Conversation, Turn, TurnHandle};
pub use kernel::coordinator::{DrainHooks, TurnStreamCoordinator};
pub use kernel::pipeline::TriggerPipeline;
pub use kernel::reactor::Reactor;
pub use kernel::trigger::{Trigger, TriggerKind};
