use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::ClassificationError;
use super::time::clock_reading;

/// Process-unique interruption identifier, taken from the high-resolution clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InterruptionId(pub u64);

impl InterruptionId {
    pub fn new() -> Self {
        Self(clock_reading())
    }
}

impl Default for InterruptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InterruptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "int-{}", self.0)
    }
}

/// The eight canonical interruption classes a classifier may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterruptionType {
    /// The user extended their previous request.
    Continuation,
    /// The user corrected or restated what they meant.
    Clarification,
    /// The user wants the agent to stop.
    Cancellation,
    Ignorable,
    Repetition,
    Noise,
    /// The user asked for a tool to be run.
    Action,
    /// Unrelated new request.
    NewPrompt,
}

impl InterruptionType {
    pub const ALL: [InterruptionType; 8] = [
        InterruptionType::Continuation,
        InterruptionType::Clarification,
        InterruptionType::Cancellation,
        InterruptionType::Ignorable,
        InterruptionType::Repetition,
        InterruptionType::Noise,
        InterruptionType::Action,
        InterruptionType::NewPrompt,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            InterruptionType::Continuation => "continuation",
            InterruptionType::Clarification => "clarification",
            InterruptionType::Cancellation => "cancellation",
            InterruptionType::Ignorable => "ignorable",
            InterruptionType::Repetition => "repetition",
            InterruptionType::Noise => "noise",
            InterruptionType::Action => "action",
            InterruptionType::NewPrompt => "new-prompt",
        }
    }

    /// Parse a classifier label. Case-insensitive; `-`, `_` and spaces are
    /// interchangeable ("New_Prompt" == "new prompt" == "new-prompt").
    pub fn from_label(label: &str) -> Result<Self, ClassificationError> {
        let normalized: String = label
            .trim()
            .chars()
            .map(|c| match c {
                '_' | ' ' => '-',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        Self::ALL
            .into_iter()
            .find(|kind| kind.label() == normalized)
            .ok_or_else(|| ClassificationError::UnknownLabel(label.to_string()))
    }
}

impl fmt::Display for InterruptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for InterruptionType {
    type Err = ClassificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s)
    }
}

/// An event that arrived while a turn was in flight.
///
/// `kind` is set once by classification, `resolved` flips once after the
/// follow-up triggers were emitted. Interruptions are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interruption {
    pub id: InterruptionId,
    pub kind: Option<InterruptionType>,
    pub source: String,
    /// The source was spoken, not typed.
    #[serde(default)]
    pub transcribed: bool,
    pub resolved: bool,
}

impl Interruption {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: InterruptionId::new(),
            kind: None,
            source: source.into(),
            transcribed: false,
            resolved: false,
        }
    }

    pub fn transcribed(mut self, transcribed: bool) -> Self {
        self.transcribed = transcribed;
        self
    }

    /// Returns false (and leaves the type untouched) if already classified.
    pub fn classify(&mut self, kind: InterruptionType) -> bool {
        if self.kind.is_some() {
            return false;
        }
        self.kind = Some(kind);
        true
    }

    pub fn mark_resolved(&mut self) {
        self.resolved = true;
    }
}
