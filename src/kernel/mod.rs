//! Interruption-aware turn kernel.
//!
//! Leaves first: `time`, `trigger`, `interruption` and `buffer` have no
//! internal dependencies; `conversation` builds on them; `resolver`,
//! `pipeline` and `coordinator` sit on top; `reactor` ties them together.

pub mod buffer;
pub mod classifier;
pub mod conversation;
pub mod coordinator;
pub mod error;
pub mod interruption;
pub mod pipeline;
pub mod reactor;
pub mod resolver;
pub mod time;
pub mod tools;
pub mod trigger;
