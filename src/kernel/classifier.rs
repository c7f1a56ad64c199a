use async_trait::async_trait;

use super::conversation::Turn;
use super::error::ClassificationError;
use super::interruption::InterruptionType;
use super::tools::ToolDescriptor;

/// Everything a classifier gets to look at for one interruption.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationRequest<'a> {
    pub source: &'a str,
    /// Oldest first, with the in-flight turn last.
    pub history: &'a [Turn],
    pub tools: &'a [ToolDescriptor],
}

/// Maps an interruption to one of the eight canonical types.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        request: ClassificationRequest<'_>,
    ) -> Result<InterruptionType, ClassificationError>;
}

const CANCEL_PHRASES: &[&str] = &["stop", "cancel", "never mind", "nevermind", "be quiet", "shut up", "forget it"];
const FILLERS: &[&str] = &["um", "uh", "hmm", "mm", "erm", "ah"];
const ACKNOWLEDGEMENTS: &[&str] = &["ok", "okay", "yeah", "yes", "right", "sure", "thanks", "got it", "mhm"];
const CONTINUATION_PREFIXES: &[&str] = &["and ", "also ", "plus ", "as well as "];
const CLARIFICATION_PREFIXES: &[&str] = &["i mean", "no,", "no ", "actually", "what i meant", "sorry,", "i meant"];
const ACTION_PREFIXES: &[&str] = &["turn on", "turn off", "play ", "set ", "open ", "call ", "send "];

/// Offline heuristic classifier.
///
/// Keyword rules, checked in order:
/// - empty or filler only -> Noise
/// - cancel phrases -> Cancellation
/// - acknowledgements -> Ignorable
/// - same text as the last user prompt -> Repetition
/// - "and ...", "also ..." -> Continuation
/// - "I mean ...", "actually ..." -> Clarification
/// - "turn on ...", "play ..." -> Action
/// - anything else -> NewPrompt
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn assess(&self, source: &str, history: &[Turn]) -> InterruptionType {
        let text = source.trim().to_lowercase();
        let bare = text.trim_end_matches(|c: char| c.is_ascii_punctuation());

        if bare.is_empty() || bare.split_whitespace().all(|w| FILLERS.contains(&w)) {
            return InterruptionType::Noise;
        }
        if CANCEL_PHRASES.iter().any(|p| bare == *p || bare.starts_with(&format!("{} ", p))) {
            return InterruptionType::Cancellation;
        }
        if ACKNOWLEDGEMENTS.contains(&bare) {
            return InterruptionType::Ignorable;
        }

        let last_prompt = history.iter().rev().find_map(Turn::prompt_text);
        if last_prompt.is_some_and(|p| p.trim().eq_ignore_ascii_case(source.trim())) {
            return InterruptionType::Repetition;
        }

        if CONTINUATION_PREFIXES.iter().any(|p| text.starts_with(p)) {
            InterruptionType::Continuation
        } else if CLARIFICATION_PREFIXES.iter().any(|p| text.starts_with(p)) {
            InterruptionType::Clarification
        } else if ACTION_PREFIXES.iter().any(|p| text.starts_with(p)) {
            InterruptionType::Action
        } else {
            InterruptionType::NewPrompt
        }
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(
        &self,
        request: ClassificationRequest<'_>,
    ) -> Result<InterruptionType, ClassificationError> {
        Ok(self.assess(request.source, request.history))
    }
}
