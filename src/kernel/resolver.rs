//! Classified interruption -> follow-up triggers.
//!
//! | type                          | follow-ups                      |
//! |-------------------------------|---------------------------------|
//! | continuation                  | CancelTurn, UserPrompt(spliced) |
//! | clarification                 | CancelTurn, UserPrompt(source)  |
//! | cancellation                  | CancelTurn                      |
//! | ignorable, repetition, noise  | none                            |
//! | action                        | CallTool(source)                |
//! | new-prompt                    | UserPrompt(source)              |

use super::conversation::ConversationContext;
use super::error::ResolveError;
use super::interruption::{Interruption, InterruptionType};
use super::trigger::{Trigger, TriggerKind};

/// Follow-up triggers for a classified interruption, in emission order.
/// An unset type is a classifier contract violation.
pub fn resolve(
    kind: Option<InterruptionType>,
    interruption: &Interruption,
    context: &ConversationContext,
) -> Result<Vec<Trigger>, ResolveError> {
    let kind = kind.ok_or(ResolveError::UnknownInterruptionType(interruption.id))?;
    let source = &interruption.source;

    let follow_ups = match kind {
        InterruptionType::Continuation => vec![
            Trigger::cancel_turn(),
            prompt(interruption, continuation_prompt(source, context), true),
        ],
        InterruptionType::Clarification => {
            vec![Trigger::cancel_turn(), prompt(interruption, source.clone(), false)]
        }
        InterruptionType::Cancellation => vec![Trigger::cancel_turn()],
        InterruptionType::Ignorable | InterruptionType::Repetition | InterruptionType::Noise => {
            Vec::new()
        }
        InterruptionType::Action => vec![Trigger::call_tool_with_prompt(source.clone())],
        InterruptionType::NewPrompt => vec![prompt(interruption, source.clone(), false)],
    };
    Ok(follow_ups)
}

// Follow-up prompts stay marked as spoken when the interruption was.
fn prompt(interruption: &Interruption, text: String, continues: bool) -> Trigger {
    Trigger::new(TriggerKind::UserPrompt {
        text,
        transcribed: interruption.transcribed,
        continues,
    })
}

/// Reattaches `source` to the most recent user prompt: "turn on the lights"
/// + "and the fan too" -> "turn on the lights and the fan too". Without a
/// prior prompt the source is returned unchanged.
pub fn continuation_prompt(source: &str, context: &ConversationContext) -> String {
    match context.last_user_prompt() {
        Some(prompt) => format!("{} {}", prompt, source).trim().to_string(),
        None => source.to_string(),
    }
}
