//! Drains the active turn's buffer into the response callback and the
//! speech sink.
//!
//! The drain loop runs on a blocking thread because buffer reads block.
//! A watcher task clears the buffer when the external token fires, which
//! wakes the loop. Turn cancellation needs no watching: cancelling a turn
//! clears its buffer.

use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::conversation::{TurnHandle, TurnId};
use crate::outputs::SpeechSink;

pub type ResponseCallback = Box<dyn FnMut(&str) + Send>;
pub type ResponseEndCallback = Box<dyn FnOnce(&DrainReport) + Send>;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// A chunk containing any of these triggers a sink flush.
    pub flush_punctuation: Vec<char>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            flush_punctuation: vec!['.', '!', '?'],
        }
    }
}

/// Where drained chunks go. Every part is optional.
#[derive(Default)]
pub struct DrainHooks {
    pub on_response: Option<ResponseCallback>,
    /// Fires exactly once per drain, cancelled or not.
    pub on_response_end: Option<ResponseEndCallback>,
    pub sink: Option<Arc<dyn SpeechSink>>,
}

impl DrainHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_response(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_response = Some(Box::new(callback));
        self
    }

    pub fn on_response_end(mut self, callback: impl FnOnce(&DrainReport) + Send + 'static) -> Self {
        self.on_response_end = Some(Box::new(callback));
        self
    }

    pub fn sink(mut self, sink: Arc<dyn SpeechSink>) -> Self {
        self.sink = Some(sink);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub turn: TurnId,
    pub chunks: usize,
    pub cancelled: bool,
    pub sink_errors: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TurnStreamCoordinator {
    config: CoordinatorConfig,
}

impl TurnStreamCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config }
    }

    /// Drains `turn` until its buffer completes or is cancelled.
    ///
    /// On normal exhaustion the sink is flushed; without a sink the turn is
    /// finalised here instead. A cancelled drain leaves the turn finalised
    /// as cancelled, keeping whatever text was buffered.
    pub async fn drain(&self, turn: TurnHandle, hooks: DrainHooks, cancel: CancellationToken) -> DrainReport {
        let buffer = turn.buffer().clone();
        let finished = CancellationToken::new();

        let watcher = {
            let buffer = buffer.clone();
            let finished = finished.clone();
            let turn_id = turn.id();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(turn = %turn_id, "drain cancelled externally");
                        buffer.clear();
                    }
                    _ = finished.cancelled() => {}
                }
            })
        };

        info!(turn = %turn.id(), "drain started");
        let turn_id = turn.id();
        let handle = turn.clone();
        let punctuation = self.config.flush_punctuation.clone();
        let joined = tokio::task::spawn_blocking(move || drain_blocking(&turn, hooks, &punctuation)).await;

        finished.cancel(); // Release the watcher
        if let Err(err) = watcher.await {
            warn!(error = %err, "drain watcher failed");
        }

        match joined {
            Ok(report) => {
                info!(turn = %report.turn, chunks = report.chunks, cancelled = report.cancelled, "drain finished");
                report
            }
            Err(err) => {
                warn!(turn = %turn_id, error = %err, "drain task failed");
                handle.cancel();
                buffer.clear();
                DrainReport {
                    turn: turn_id,
                    chunks: 0,
                    cancelled: true,
                    sink_errors: 0,
                }
            }
        }
    }
}

fn drain_blocking(turn: &TurnHandle, mut hooks: DrainHooks, punctuation: &[char]) -> DrainReport {
    let buffer = turn.buffer();
    let mut report = DrainReport {
        turn: turn.id(),
        chunks: 0,
        cancelled: false,
        sink_errors: 0,
    };

    // === DRAIN ===
    // Blocks between chunks; returns once complete or cleared.
    for chunk in buffer.chunks() {
        report.chunks += 1;
        if let Some(on_response) = hooks.on_response.as_mut() {
            on_response(chunk.as_str());
        }

        let Some(sink) = hooks.sink.as_ref() else {
            continue;
        };
        if let Err(err) = sink.send_text(&chunk) {
            warn!(turn = %report.turn, error = %err, "speech sink rejected chunk");
            report.sink_errors += 1;
        }
        if chunk.contains(punctuation) {
            if let Some(flusher) = sink.flusher() {
                if let Err(err) = flusher.flush_buffer() {
                    warn!(turn = %report.turn, error = %err, "speech sink flush failed");
                    report.sink_errors += 1;
                }
            }
        }
    }

    // === SETTLE ===
    // An external cancel only cleared the buffer. Finalise the turn as
    // cancelled so the conversation can commit it and move on.
    if buffer.is_cancelled() && turn.cancel() {
        debug!(turn = %report.turn, "turn cancelled by drain");
    }
    report.cancelled = buffer.is_cancelled() || turn.is_cancelled();
    if !report.cancelled {
        match hooks.sink.as_ref() {
            Some(sink) => {
                if let Some(flusher) = sink.flusher() {
                    if let Err(err) = flusher.flush_buffer() {
                        warn!(turn = %report.turn, error = %err, "final speech flush failed");
                        report.sink_errors += 1;
                    }
                }
            }
            None => {
                if turn.finalise() {
                    debug!(turn = %report.turn, "turn finalised by drain");
                }
            }
        }
    }

    if let Some(on_response_end) = hooks.on_response_end.take() {
        on_response_end(&report);
    }
    report
}
