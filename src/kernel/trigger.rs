use serde::{Deserialize, Serialize};
use std::fmt;

use super::interruption::{Interruption, InterruptionId, InterruptionType};
use super::time::Stamp;
use super::tools::ToolRequest;

/// Any discrete event flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub created_at: Stamp,
    pub kind: TriggerKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trigger", content = "data")]
pub enum TriggerKind {
    /// `continues` marks a prompt spliced onto an earlier one; applying it
    /// truncates history back to the original prompt.
    UserPrompt {
        text: String,
        transcribed: bool,
        continues: bool,
    },
    CallTool(ToolRequest),
    CancelTurn,
    PauseTurn,
    UnpauseTurn,
    SpeechStarted,
    SpeechEnded,
    Transcription { text: String },
    InterimTranscription { text: String },
    RecordInterruption(Interruption),
    ResolveInterruption {
        id: InterruptionId,
        kind: Option<InterruptionType>,
        resolved: bool,
    },
}

/// How the pipeline treats a trigger before any classification happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Dropped without output.
    Ignore,
    /// Re-emitted unchanged, never classified.
    Command,
    /// Candidate interruption when a turn is active.
    Classify,
}

impl Trigger {
    pub fn new(kind: TriggerKind) -> Self {
        Self { created_at: Stamp::now(), kind }
    }

    pub fn user_prompt(text: impl Into<String>) -> Self {
        Self::new(TriggerKind::UserPrompt {
            text: text.into(),
            transcribed: false,
            continues: false,
        })
    }

    pub fn transcribed_prompt(text: impl Into<String>) -> Self {
        Self::new(TriggerKind::UserPrompt {
            text: text.into(),
            transcribed: true,
            continues: false,
        })
    }

    pub fn continuation_prompt(text: impl Into<String>) -> Self {
        Self::new(TriggerKind::UserPrompt {
            text: text.into(),
            transcribed: false,
            continues: true,
        })
    }

    pub fn call_tool(request: ToolRequest) -> Self {
        Self::new(TriggerKind::CallTool(request))
    }

    pub fn call_tool_with_prompt(prompt: impl Into<String>) -> Self {
        Self::call_tool(ToolRequest::Prompt(prompt.into()))
    }

    pub fn cancel_turn() -> Self {
        Self::new(TriggerKind::CancelTurn)
    }

    pub fn pause_turn() -> Self {
        Self::new(TriggerKind::PauseTurn)
    }

    pub fn unpause_turn() -> Self {
        Self::new(TriggerKind::UnpauseTurn)
    }

    pub fn speech_started() -> Self {
        Self::new(TriggerKind::SpeechStarted)
    }

    pub fn speech_ended() -> Self {
        Self::new(TriggerKind::SpeechEnded)
    }

    pub fn transcription(text: impl Into<String>) -> Self {
        Self::new(TriggerKind::Transcription { text: text.into() })
    }

    pub fn interim_transcription(text: impl Into<String>) -> Self {
        Self::new(TriggerKind::InterimTranscription { text: text.into() })
    }

    pub fn record_interruption(interruption: Interruption) -> Self {
        Self::new(TriggerKind::RecordInterruption(interruption))
    }

    pub fn resolve_interruption(id: InterruptionId, kind: Option<InterruptionType>) -> Self {
        Self::new(TriggerKind::ResolveInterruption {
            id,
            kind,
            resolved: true,
        })
    }

    /// A raw transcription becomes a transcribed user prompt. The creation
    /// stamp is preserved so ordering reflects when the user spoke.
    pub fn normalize(self) -> Self {
        match self.kind {
            TriggerKind::Transcription { text } => Self {
                created_at: self.created_at,
                kind: TriggerKind::UserPrompt {
                    text,
                    transcribed: true,
                    continues: false,
                },
            },
            kind => Self {
                created_at: self.created_at,
                kind,
            },
        }
    }

    pub fn route(&self) -> Route {
        match &self.kind {
            TriggerKind::SpeechStarted
            | TriggerKind::SpeechEnded
            | TriggerKind::InterimTranscription { .. } => Route::Ignore,
            TriggerKind::CallTool(_)
            | TriggerKind::CancelTurn
            | TriggerKind::PauseTurn
            | TriggerKind::UnpauseTurn
            | TriggerKind::RecordInterruption(_)
            | TriggerKind::ResolveInterruption { .. } => Route::Command,
            TriggerKind::UserPrompt { .. } | TriggerKind::Transcription { .. } => Route::Classify,
        }
    }

    /// Prompt text if this is a user prompt.
    pub fn prompt_text(&self) -> Option<&str> {
        match &self.kind {
            TriggerKind::UserPrompt { text, .. } => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TriggerKind::UserPrompt { text, .. } => f.write_str(text),
            TriggerKind::Transcription { text } => f.write_str(text),
            TriggerKind::InterimTranscription { text } => write!(f, "{}...", text),
            TriggerKind::CallTool(request) => write!(f, "{}", request),
            TriggerKind::CancelTurn => f.write_str("cancel turn"),
            TriggerKind::PauseTurn => f.write_str("pause turn"),
            TriggerKind::UnpauseTurn => f.write_str("unpause turn"),
            TriggerKind::SpeechStarted => f.write_str("speech started"),
            TriggerKind::SpeechEnded => f.write_str("speech ended"),
            TriggerKind::RecordInterruption(interruption) => {
                write!(f, "record interruption {}: {}", interruption.id, interruption.source)
            }
            TriggerKind::ResolveInterruption { id, kind, .. } => match kind {
                Some(kind) => write!(f, "resolve interruption {} as {}", id, kind),
                None => write!(f, "resolve interruption {} unclassified", id),
            },
        }
    }
}
