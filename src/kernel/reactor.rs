use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::conversation::{Conversation, TurnHandle};
use super::error::{ReactorError, ToolError};
use super::pipeline::TriggerPipeline;
use super::trigger::{Trigger, TriggerKind};

/// The orchestration loop: owns the conversation, runs every incoming
/// trigger through the pipeline, and applies what comes out.
pub struct Reactor {
    pub conversation: Conversation,
    pipeline: TriggerPipeline,
    cancel: CancellationToken,
}

impl Reactor {
    pub fn new(conversation: Conversation, pipeline: TriggerPipeline) -> Self {
        Self {
            conversation,
            pipeline,
            cancel: CancellationToken::new(),
        }
    }

    /// Token handed to tool calls; cancelling it aborts in-flight tools.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs one trigger to completion and returns the applied triggers in
    /// order.
    ///
    /// A pipeline error stops processing after everything before it was
    /// applied. A tool failure does not: the remaining triggers (including
    /// the interruption's resolution) are applied first and the tool error
    /// is returned at the end.
    ///
    /// **ORDER LAW**: triggers are applied in exactly the order the pipeline
    /// emits them. Nothing is reordered or batched.
    pub async fn handle(&mut self, trigger: Trigger) -> Result<Vec<Trigger>, ReactorError> {
        self.conversation.commit_finished(); // A drained turn is history now
        debug!(trigger = %trigger, "handling trigger");

        let mut stream = self.pipeline.run(trigger, self.conversation.context());
        let mut applied = Vec::new();
        let mut tool_error: Option<ToolError> = None;

        while let Some(item) = stream.next().await {
            let trigger = item?;
            if let Err(err) = self.apply(&trigger).await {
                tool_error.get_or_insert(err);
            }
            applied.push(trigger);
        }

        match tool_error {
            Some(err) => Err(err.into()),
            None => Ok(applied),
        }
    }

    /// The single place emitted triggers turn into conversation mutations.
    async fn apply(&mut self, trigger: &Trigger) -> Result<(), ToolError> {
        match &trigger.kind {
            TriggerKind::UserPrompt { continues: true, .. } => {
                self.conversation.queue_continuation(trigger.clone());
            }
            TriggerKind::UserPrompt { .. } => {
                self.conversation.queue_trigger(trigger.clone());
            }
            // Only seen when a failed classification re-emits the raw trigger.
            TriggerKind::Transcription { .. } => {
                self.conversation.queue_trigger(trigger.clone().normalize());
            }
            TriggerKind::CallTool(request) => {
                self.conversation.call_tool(&self.cancel, request.clone()).await?;
            }
            TriggerKind::CancelTurn => {
                self.conversation.cancel_active_turn();
            }
            TriggerKind::PauseTurn => {
                info!("conversation paused");
                self.conversation.pause();
            }
            TriggerKind::UnpauseTurn => {
                info!("conversation unpaused");
                self.conversation.unpause();
            }
            TriggerKind::RecordInterruption(interruption) => {
                self.conversation.record_interruption(interruption.clone());
            }
            TriggerKind::ResolveInterruption { id, kind, .. } => {
                self.conversation.resolve_interruption(*id, *kind);
            }
            TriggerKind::SpeechStarted | TriggerKind::SpeechEnded | TriggerKind::InterimTranscription { .. } => {}
        }
        Ok(())
    }

    pub fn start_next_turn(&mut self) -> Option<TurnHandle> {
        self.conversation.start_next_turn()
    }
}
