//! Turns one incoming trigger into an ordered, cancelable sequence of
//! follow-up triggers.
//!
//! The output is a lazy stream. Nothing past the last polled element runs:
//! dropping the stream right after `RecordInterruption` means the
//! classifier is never called.

use async_stream::stream;
use futures::Stream;
use serde::Deserialize;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::classifier::{ClassificationRequest, Classifier};
use super::conversation::ConversationContext;
use super::error::PipelineError;
use super::interruption::Interruption;
use super::resolver::resolve;
use super::trigger::{Route, Trigger, TriggerKind};

pub type TriggerStream = Pin<Box<dyn Stream<Item = Result<Trigger, PipelineError>> + Send>>;

/// What happens to an interruption whose classification failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Leave it unresolved for later inspection.
    #[default]
    LeaveUnresolved,
    /// Emit an unclassified `ResolveInterruption` before the error.
    ForceResolve,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub on_classifier_failure: FailurePolicy,
}

#[derive(Clone)]
pub struct TriggerPipeline {
    classifier: Option<Arc<dyn Classifier>>,
    config: PipelineConfig,
}

impl TriggerPipeline {
    pub fn new(classifier: Option<Arc<dyn Classifier>>, config: PipelineConfig) -> Self {
        Self { classifier, config }
    }

    /// A pipeline that never classifies; every trigger passes through.
    pub fn passthrough() -> Self {
        Self::new(None, PipelineConfig::default())
    }

    pub fn run(&self, raw: Trigger, context: ConversationContext) -> TriggerStream {
        let classifier = self.classifier.clone();
        let policy = self.config.on_classifier_failure;

        Box::pin(stream! {
            // === 1. NORMALIZE & ROUTE ===
            let trigger = raw.clone().normalize();

            match trigger.route() {
                Route::Ignore => {
                    debug!(trigger = %trigger, "dropping ignorable trigger");
                    return;
                }
                Route::Command => {
                    yield Ok(trigger);
                    return;
                }
                Route::Classify => {}
            }

            // Nothing to interrupt, or nobody to ask.
            let classifier = match classifier {
                Some(classifier) if context.active.is_some() => classifier,
                _ => {
                    yield Ok(trigger);
                    return;
                }
            };

            // === 2. RECORD ===
            let spoken = matches!(trigger.kind, TriggerKind::UserPrompt { transcribed: true, .. });
            let mut interruption = Interruption::new(trigger.to_string()).transcribed(spoken);
            info!(id = %interruption.id, source = %interruption.source, "interruption recorded");
            yield Ok(Trigger::record_interruption(interruption.clone()));

            // === 3. CLASSIFY ===
            // Active turn counts as committed for the classifier.
            let history = context.classification_history();
            let request = ClassificationRequest {
                source: &interruption.source,
                history: &history,
                tools: &context.tools,
            };

            let classified = classifier.classify(request).await;
            let kind = match classified {
                Ok(kind) => kind,
                Err(err) => {
                    warn!(id = %interruption.id, error = %err, "classification failed, re-emitting trigger");
                    yield Ok(raw);
                    if policy == FailurePolicy::ForceResolve {
                        interruption.mark_resolved();
                        yield Ok(Trigger::resolve_interruption(interruption.id, None));
                    }
                    yield Err(PipelineError::from(err));
                    return;
                }
            };

            // === 4. RESOLVE ===
            interruption.classify(kind);
            info!(id = %interruption.id, kind = %kind, "interruption classified");

            let follow_ups = match resolve(interruption.kind, &interruption, &context) {
                Ok(follow_ups) => follow_ups,
                Err(err) => {
                    yield Err(PipelineError::from(err));
                    return;
                }
            };
            for follow_up in follow_ups {
                yield Ok(follow_up);
            }

            interruption.mark_resolved();
            yield Ok(Trigger::resolve_interruption(interruption.id, interruption.kind));
        })
    }
}
