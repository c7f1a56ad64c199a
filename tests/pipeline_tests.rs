use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use parley::kernel::classifier::{ClassificationRequest, Classifier};
use parley::kernel::conversation::{ConversationContext, Turn};
use parley::kernel::error::{ClassificationError, PipelineError};
use parley::kernel::interruption::InterruptionType;
use parley::kernel::pipeline::{FailurePolicy, PipelineConfig, TriggerPipeline};
use parley::kernel::tools::{ToolCall, ToolRequest};
use parley::kernel::trigger::{Trigger, TriggerKind};

/// Answers every request with the same outcome and counts calls.
struct ScriptedClassifier {
    outcome: Option<InterruptionType>,
    calls: AtomicUsize,
    seen_history: Mutex<Vec<usize>>,
}

impl ScriptedClassifier {
    fn answering(kind: InterruptionType) -> Arc<Self> {
        Arc::new(Self {
            outcome: Some(kind),
            calls: AtomicUsize::new(0),
            seen_history: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            outcome: None,
            calls: AtomicUsize::new(0),
            seen_history: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, request: ClassificationRequest<'_>) -> Result<InterruptionType, ClassificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_history.lock().unwrap().push(request.history.len());
        self.outcome
            .ok_or_else(|| ClassificationError::Transport("connection reset".to_string()))
    }
}

fn pipeline_with(classifier: Arc<ScriptedClassifier>) -> TriggerPipeline {
    TriggerPipeline::new(Some(classifier), PipelineConfig::default())
}

fn active_context() -> ConversationContext {
    let mut earlier = Turn::new(Trigger::user_prompt("what time is it"));
    earlier.is_finalised = true;
    ConversationContext {
        history: vec![earlier],
        active: Some(Turn::new(Trigger::user_prompt("turn on the lights"))),
        tools: Vec::new(),
    }
}

async fn collect(pipeline: &TriggerPipeline, trigger: Trigger, context: ConversationContext) -> Vec<Result<Trigger, PipelineError>> {
    pipeline.run(trigger, context).collect().await
}

fn ok_kinds(items: Vec<Result<Trigger, PipelineError>>) -> Vec<TriggerKind> {
    items.into_iter().map(|item| item.expect("unexpected error").kind).collect()
}

#[tokio::test]
async fn test_speech_markers_are_dropped() {
    let classifier = ScriptedClassifier::answering(InterruptionType::NewPrompt);
    let pipeline = pipeline_with(classifier.clone());

    for trigger in [
        Trigger::speech_started(),
        Trigger::speech_ended(),
        Trigger::interim_transcription("turn on the"),
    ] {
        let items = collect(&pipeline, trigger, active_context()).await;
        assert!(items.is_empty());
    }
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn test_commands_pass_through_unchanged() {
    let classifier = ScriptedClassifier::answering(InterruptionType::NewPrompt);
    let pipeline = pipeline_with(classifier.clone());

    for trigger in [
        Trigger::cancel_turn(),
        Trigger::pause_turn(),
        Trigger::unpause_turn(),
        Trigger::call_tool(ToolRequest::Prompt("dim the lights".to_string())),
        Trigger::call_tool(ToolRequest::Call(ToolCall {
            id: "call-7".to_string(),
            name: "lights".to_string(),
            arguments: serde_json::json!({ "level": 30 }),
        })),
    ] {
        let items = collect(&pipeline, trigger.clone(), active_context()).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items.into_iter().next().unwrap().unwrap(), trigger);
    }
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn test_transcription_without_active_turn_is_normalized() {
    let classifier = ScriptedClassifier::answering(InterruptionType::Continuation);
    let pipeline = pipeline_with(classifier.clone());
    let raw = Trigger::transcription("hello there");

    let items = collect(&pipeline, raw.clone(), ConversationContext::default()).await;

    assert_eq!(items.len(), 1);
    let emitted = items.into_iter().next().unwrap().unwrap();
    assert_eq!(emitted.created_at, raw.created_at, "normalization keeps the original stamp");
    assert_eq!(
        emitted.kind,
        TriggerKind::UserPrompt {
            text: "hello there".to_string(),
            transcribed: true,
            continues: false,
        }
    );
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn test_no_classifier_passes_prompt_through() {
    let pipeline = TriggerPipeline::passthrough();
    let prompt = Trigger::user_prompt("and the fan too");

    let items = collect(&pipeline, prompt.clone(), active_context()).await;
    assert_eq!(ok_kinds(items), vec![prompt.kind]);
}

#[tokio::test]
async fn test_continuation_sequence_is_ordered() {
    let classifier = ScriptedClassifier::answering(InterruptionType::Continuation);
    let pipeline = pipeline_with(classifier.clone());

    let items = collect(&pipeline, Trigger::transcription("and the fan too"), active_context()).await;
    let kinds = ok_kinds(items);

    assert_eq!(kinds.len(), 4);
    let id = match &kinds[0] {
        TriggerKind::RecordInterruption(interruption) => {
            assert_eq!(interruption.source, "and the fan too");
            assert_eq!(interruption.kind, None);
            assert!(!interruption.resolved);
            interruption.id
        }
        other => panic!("expected RecordInterruption first, got {:?}", other),
    };
    assert_eq!(kinds[1], TriggerKind::CancelTurn);
    assert_eq!(
        kinds[2],
        TriggerKind::UserPrompt {
            text: "turn on the lights and the fan too".to_string(),
            transcribed: true,
            continues: true,
        }
    );
    assert_eq!(
        kinds[3],
        TriggerKind::ResolveInterruption {
            id,
            kind: Some(InterruptionType::Continuation),
            resolved: true,
        }
    );
    assert_eq!(classifier.calls(), 1);
}

#[tokio::test]
async fn test_new_prompt_keeps_how_it_was_entered() {
    let classifier = ScriptedClassifier::answering(InterruptionType::NewPrompt);
    let pipeline = pipeline_with(classifier.clone());

    for (trigger, spoken) in [
        (Trigger::transcription("what is the weather"), true),
        (Trigger::user_prompt("what is the weather"), false),
    ] {
        let kinds = ok_kinds(collect(&pipeline, trigger, active_context()).await);
        assert_eq!(kinds.len(), 3);
        assert_eq!(
            kinds[1],
            TriggerKind::UserPrompt {
                text: "what is the weather".to_string(),
                transcribed: spoken,
                continues: false,
            }
        );
    }
    assert_eq!(classifier.calls(), 2);
}

#[tokio::test]
async fn test_classifier_sees_active_turn_as_committed() {
    let classifier = ScriptedClassifier::answering(InterruptionType::Noise);
    let pipeline = pipeline_with(classifier.clone());

    let kinds = ok_kinds(collect(&pipeline, Trigger::user_prompt("hmm"), active_context()).await);

    assert_eq!(kinds.len(), 2, "noise records and resolves only");
    assert_eq!(*classifier.seen_history.lock().unwrap(), vec![2]);
}

#[tokio::test]
async fn test_stopping_after_record_skips_classification() {
    let classifier = ScriptedClassifier::answering(InterruptionType::Cancellation);
    let pipeline = pipeline_with(classifier.clone());

    let mut stream = pipeline.run(Trigger::user_prompt("stop"), active_context());
    let first = stream.next().await.unwrap().unwrap();
    assert!(matches!(first.kind, TriggerKind::RecordInterruption(_)));
    drop(stream);

    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn test_stopping_early_suppresses_remaining_follow_ups() {
    let classifier = ScriptedClassifier::answering(InterruptionType::Clarification);
    let pipeline = pipeline_with(classifier.clone());

    let items: Vec<_> = pipeline
        .run(Trigger::user_prompt("I mean the kitchen"), active_context())
        .take(2)
        .collect()
        .await;
    let kinds = ok_kinds(items);

    assert!(matches!(kinds[0], TriggerKind::RecordInterruption(_)));
    assert_eq!(kinds[1], TriggerKind::CancelTurn);
    assert_eq!(kinds.len(), 2);
    assert_eq!(classifier.calls(), 1);
}

#[tokio::test]
async fn test_classifier_failure_reemits_raw_trigger() {
    let classifier = ScriptedClassifier::failing();
    let pipeline = pipeline_with(classifier.clone());
    let raw = Trigger::transcription("play something");

    let mut items = collect(&pipeline, raw.clone(), active_context()).await.into_iter();

    match items.next() {
        Some(Ok(Trigger { kind: TriggerKind::RecordInterruption(interruption), .. })) => {
            assert!(!interruption.resolved);
        }
        other => panic!("expected RecordInterruption, got {:?}", other),
    }
    assert_eq!(items.next().unwrap().unwrap(), raw, "the raw, un-normalized trigger comes back");
    assert!(matches!(
        items.next(),
        Some(Err(PipelineError::Classification(ClassificationError::Transport(_))))
    ));
    assert!(items.next().is_none());
}

#[tokio::test]
async fn test_force_resolve_policy_resolves_failed_classification() {
    let classifier = ScriptedClassifier::failing();
    let config = PipelineConfig {
        on_classifier_failure: FailurePolicy::ForceResolve,
    };
    let pipeline = TriggerPipeline::new(Some(classifier), config);

    let items = collect(&pipeline, Trigger::user_prompt("play something"), active_context()).await;

    assert_eq!(items.len(), 4);
    let id = match &items[0] {
        Ok(Trigger { kind: TriggerKind::RecordInterruption(interruption), .. }) => interruption.id,
        other => panic!("expected RecordInterruption, got {:?}", other),
    };
    assert!(matches!(&items[1], Ok(t) if t.prompt_text() == Some("play something")));
    assert!(matches!(
        &items[2],
        Ok(Trigger { kind: TriggerKind::ResolveInterruption { id: resolved, kind: None, resolved: true }, .. }) if *resolved == id
    ));
    assert!(items[3].is_err());
}
