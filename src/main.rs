use anyhow::Result;
use async_trait::async_trait;
use futures::future::OptionFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use parley::kernel::classifier::{Classifier, KeywordClassifier};
use parley::kernel::coordinator::DrainReport;
use parley::kernel::error::ToolError;
use parley::kernel::tools::{ToolCall, ToolDescriptor, ToolExecutor, ToolOutcome, ToolRequest};
use parley::outputs::{ConsoleSink, SpeechSink};
use parley::{Config, Conversation, DrainHooks, Reactor, Trigger, TriggerPipeline, TurnHandle, TurnStreamCoordinator};

/// Pretends to run home-automation commands.
struct HomeTool;

#[async_trait]
impl ToolExecutor for HomeTool {
    async fn execute(&self, _cancel: &CancellationToken, request: &ToolRequest) -> Result<ToolOutcome, ToolError> {
        let call = match request {
            ToolRequest::Call(call) => call.clone(),
            ToolRequest::Prompt(prompt) => ToolCall {
                id: Uuid::new_v4().to_string(),
                name: "home".to_string(),
                arguments: serde_json::json!({ "command": prompt }),
            },
        };
        let output = format!("done: {}", call.arguments);
        info!(tool = %call.name, "{}", output);
        Ok(ToolOutcome { call, output })
    }
}

enum DriverEvent {
    Line(Option<String>),
    Drained(Result<DrainReport, JoinError>),
}

fn parse_line(line: &str) -> Option<Trigger> {
    let line = line.trim();
    match line {
        "" => None,
        "/cancel" => Some(Trigger::cancel_turn()),
        "/pause" => Some(Trigger::pause_turn()),
        "/unpause" => Some(Trigger::unpause_turn()),
        _ => match line.strip_prefix("/tool ") {
            Some(prompt) => Some(Trigger::call_tool_with_prompt(prompt)),
            None => Some(Trigger::transcription(line)),
        },
    }
}

/// Stand-in for a language model: echoes the prompt a word at a time.
fn generate(turn: &TurnHandle, delay: Duration) {
    let buffer = turn.buffer().clone();
    let prompt = turn.snapshot().trigger.to_string();
    tokio::spawn(async move {
        let reply = format!("You said: {}. Anything else?", prompt);
        for word in reply.split_inclusive(' ') {
            tokio::time::sleep(delay).await;
            if buffer.is_cancelled() {
                return;
            }
            buffer.add_chunk(word);
        }
        buffer.complete();
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!("parley booting. Type to talk; /cancel, /pause, /unpause, /tool <text>.");

    let classifier: Arc<dyn Classifier> = Arc::new(KeywordClassifier::new());
    let conversation = Conversation::new()
        .with_tools(vec![ToolDescriptor::new("home", "Controls lights, fans and media")])
        .with_executor(Arc::new(HomeTool));
    let pipeline = TriggerPipeline::new(Some(classifier), config.pipeline.clone());
    let mut reactor = Reactor::new(conversation, pipeline);

    let coordinator = TurnStreamCoordinator::new(config.coordinator.clone());
    let sink: Arc<dyn SpeechSink> = Arc::new(ConsoleSink::new());
    let delay = Duration::from_millis(config.demo.chunk_delay_ms);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut drain: Option<JoinHandle<DrainReport>> = None;
    let mut stdin_open = true;

    loop {
        if drain.is_none() {
            if let Some(turn) = reactor.start_next_turn() {
                generate(&turn, delay);
                let coordinator = coordinator.clone();
                let hooks = DrainHooks::new()
                    .sink(sink.clone())
                    .on_response_end(|report| debug!(chunks = report.chunks, cancelled = report.cancelled, "response ended"));
                let cancel = reactor.cancel_token().child_token();
                drain = Some(tokio::spawn(async move { coordinator.drain(turn, hooks, cancel).await }));
            } else if !stdin_open {
                break;
            }
        }

        let event = tokio::select! {
            line = lines.next_line(), if stdin_open => DriverEvent::Line(line?),
            Some(joined) = OptionFuture::from(drain.as_mut()) => DriverEvent::Drained(joined),
            else => break,
        };

        match event {
            DriverEvent::Line(None) => stdin_open = false,
            DriverEvent::Line(Some(line)) => {
                let Some(trigger) = parse_line(&line) else {
                    continue;
                };
                match reactor.handle(trigger).await {
                    Ok(applied) => debug!(count = applied.len(), "trigger handled"),
                    Err(err) => warn!(error = %err, "trigger failed"),
                }
            }
            DriverEvent::Drained(joined) => {
                drain = None;
                match joined {
                    // The console sink speaks synchronously, so a drained turn is done.
                    Ok(report) if !report.cancelled => {
                        reactor.conversation.finalise_active_turn();
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "drain task failed"),
                }
            }
        }
    }

    reactor.cancel_token().cancel();
    info!(turns = reactor.conversation.history().len(), "parley shutting down");
    Ok(())
}
