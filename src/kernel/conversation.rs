//! Turn and conversation state.
//!
//! [`Conversation`] is the only place conversation state mutates. It is
//! owned by one orchestration loop; the active turn is shared with the
//! drain task through a [`TurnHandle`], and cancellation reaches that task
//! only through the turn's [`StreamingTextBuffer`].

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::buffer::StreamingTextBuffer;
use super::error::ToolError;
use super::interruption::{Interruption, InterruptionId, InterruptionType};
use super::tools::{ToolCall, ToolDescriptor, ToolExecutor, ToolOutcome, ToolRequest};
use super::trigger::Trigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub Uuid);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub text: String,
    pub complete: bool,
}

impl Response {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn completed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            complete: true,
        }
    }
}

/// One exchange cycle: the originating trigger and everything produced for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub trigger: Trigger,
    pub responses: Vec<Response>,
    pub tool_calls: Vec<ToolCall>,
    pub interruptions: Vec<Interruption>,
    pub is_finalised: bool,
}

impl Turn {
    pub fn new(trigger: Trigger) -> Self {
        Self {
            id: TurnId::new(),
            trigger,
            responses: Vec::new(),
            tool_calls: Vec::new(),
            interruptions: Vec::new(),
            is_finalised: false,
        }
    }

    /// Finalised with at least one incomplete response.
    pub fn is_cancelled(&self) -> bool {
        self.is_finalised && self.responses.iter().any(|r| !r.complete)
    }

    pub fn prompt_text(&self) -> Option<&str> {
        self.trigger.prompt_text()
    }

    pub fn interruption_mut(&mut self, id: InterruptionId) -> Option<&mut Interruption> {
        self.interruptions.iter_mut().find(|i| i.id == id)
    }
}

/// Committed turns, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Turns(Vec<Turn>);

impl Turns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.0.push(turn);
    }

    /// Removes and returns the most recent turn.
    pub fn pop(&mut self) -> Option<Turn> {
        self.0.pop()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.0.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut Turn> {
        self.0.last_mut()
    }

    /// Oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.0.iter()
    }

    /// Most recent first.
    pub fn iter_recent(&self) -> std::iter::Rev<std::slice::Iter<'_, Turn>> {
        self.0.iter().rev()
    }

    pub fn as_slice(&self) -> &[Turn] {
        &self.0
    }

    fn interruption_mut(&mut self, id: InterruptionId) -> Option<&mut Interruption> {
        self.0.iter_mut().rev().find_map(|t| t.interruption_mut(id))
    }
}

impl From<Vec<Turn>> for Turns {
    fn from(turns: Vec<Turn>) -> Self {
        Self(turns)
    }
}

impl<'a> IntoIterator for &'a Turns {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Shared reference to the in-flight turn and its streaming buffer.
#[derive(Debug, Clone)]
pub struct TurnHandle {
    id: TurnId,
    turn: Arc<Mutex<Turn>>,
    buffer: Arc<StreamingTextBuffer>,
}

impl TurnHandle {
    pub fn new(turn: Turn) -> Self {
        Self {
            id: turn.id,
            turn: Arc::new(Mutex::new(turn)),
            buffer: Arc::new(StreamingTextBuffer::new()),
        }
    }

    // Lock order is always turn, then buffer.
    fn lock(&self) -> MutexGuard<'_, Turn> {
        self.turn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> TurnId {
        self.id
    }

    pub fn buffer(&self) -> &Arc<StreamingTextBuffer> {
        &self.buffer
    }

    pub fn snapshot(&self) -> Turn {
        self.lock().clone()
    }

    pub fn is_finalised(&self) -> bool {
        self.lock().is_finalised
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().is_cancelled()
    }

    /// Opens a pending response unless one is already pending.
    pub fn begin_response(&self) {
        let mut turn = self.lock();
        if turn.is_finalised || turn.responses.iter().any(|r| !r.complete) {
            return;
        }
        turn.responses.push(Response::pending());
    }

    /// Finalises the turn leaving its pending responses incomplete, then
    /// clears the buffer so any drain stops. Returns false if the turn was
    /// already finalised.
    pub fn cancel(&self) -> bool {
        let mut turn = self.lock();
        if turn.is_finalised {
            return false;
        }
        let partial = self.buffer.snapshot();
        if !turn.responses.iter().any(|r| !r.complete) {
            turn.responses.push(Response::pending());
        }
        for response in turn.responses.iter_mut().filter(|r| !r.complete) {
            response.text = partial.clone();
        }
        turn.is_finalised = true;
        self.buffer.clear();
        true
    }

    /// Marks pending responses complete with the buffered text. Does nothing
    /// (returns false) if the turn was finalised or its buffer cancelled.
    pub fn finalise(&self) -> bool {
        let mut turn = self.lock();
        if turn.is_finalised || self.buffer.is_cancelled() {
            return false;
        }
        let text = self.buffer.snapshot();
        for response in turn.responses.iter_mut().filter(|r| !r.complete) {
            response.text = text.clone();
            response.complete = true;
        }
        turn.is_finalised = true;
        true
    }

    pub fn record_interruption(&self, interruption: Interruption) {
        self.lock().interruptions.push(interruption);
    }

    pub fn record_tool_call(&self, call: ToolCall) {
        self.lock().tool_calls.push(call);
    }

    fn resolve_interruption(&self, id: InterruptionId, kind: Option<InterruptionType>) -> bool {
        let mut turn = self.lock();
        match turn.interruption_mut(id) {
            Some(interruption) => {
                apply_resolution(interruption, kind);
                true
            }
            None => false,
        }
    }
}

fn apply_resolution(interruption: &mut Interruption, kind: Option<InterruptionType>) {
    if let Some(kind) = kind {
        if !interruption.classify(kind) && interruption.kind != Some(kind) {
            warn!(id = %interruption.id, "interruption already classified, keeping first type");
        }
    }
    interruption.mark_resolved();
}

/// Read-only view handed to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    /// Committed turns, oldest first.
    pub history: Vec<Turn>,
    /// The in-flight, not yet committed turn.
    pub active: Option<Turn>,
    pub tools: Vec<ToolDescriptor>,
}

impl ConversationContext {
    /// Committed history with the active turn appended as if committed.
    pub fn classification_history(&self) -> Vec<Turn> {
        let mut turns = self.history.clone();
        turns.extend(self.active.iter().cloned());
        turns
    }

    /// The most recent user prompt. The active turn is strictly newer than
    /// anything in history, so its prompt wins.
    pub fn last_user_prompt(&self) -> Option<&str> {
        self.active
            .iter()
            .chain(self.history.iter().rev())
            .find_map(Turn::prompt_text)
    }
}

/// Conversation state: committed turns, the active turn, and queued prompts.
#[derive(Default)]
pub struct Conversation {
    turns: Turns,
    active: Option<TurnHandle>,
    queued: VecDeque<Turn>,
    paused: bool,
    tools: Vec<ToolDescriptor>,
    executor: Option<Arc<dyn ToolExecutor>>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// The in-flight turn, if one exists and is not yet finalised.
    pub fn active_turn(&self) -> Option<&TurnHandle> {
        self.active.as_ref().filter(|t| !t.is_finalised())
    }

    /// Committed turns, oldest first.
    pub fn history(&self) -> &Turns {
        &self.turns
    }

    pub fn queued(&self) -> impl Iterator<Item = &Turn> {
        self.queued.iter()
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn unpause(&mut self) {
        self.paused = false;
    }

    /// Moves a finished active turn into history.
    pub fn commit_finished(&mut self) {
        if self.active.as_ref().is_some_and(TurnHandle::is_finalised) {
            if let Some(handle) = self.active.take() {
                debug!(turn = %handle.id(), "committing finished turn");
                self.turns.push(handle.snapshot());
            }
        }
    }

    pub fn pop_most_recent(&mut self) -> Option<Turn> {
        self.commit_finished();
        self.turns.pop()
    }

    /// Cancels and commits the active turn. Returns its id if a live turn
    /// was cancelled.
    pub fn cancel_active_turn(&mut self) -> Option<TurnId> {
        let handle = self.active.take()?;
        let cancelled = handle.cancel();
        self.turns.push(handle.snapshot());
        if cancelled {
            info!(turn = %handle.id(), "turn cancelled");
            Some(handle.id())
        } else {
            None
        }
    }

    pub fn queue_prompt(&mut self, text: impl Into<String>) -> TurnId {
        self.queue_trigger(Trigger::user_prompt(text))
    }

    /// Queues a pending turn for the given trigger.
    pub fn queue_trigger(&mut self, trigger: Trigger) -> TurnId {
        let turn = Turn::new(trigger);
        let id = turn.id;
        debug!(turn = %id, "prompt queued");
        self.queued.push_back(turn);
        id
    }

    /// Queues a continuation prompt. The most recent turns, up to and
    /// including the one holding the original prompt, are removed first;
    /// their interruptions move onto the new turn.
    pub fn queue_continuation(&mut self, trigger: Trigger) -> TurnId {
        self.commit_finished();
        let mut turn = Turn::new(trigger);

        if self.turns.iter().any(|t| t.prompt_text().is_some()) {
            let mut removed = Vec::new();
            while let Some(popped) = self.turns.pop() {
                let is_prompt = popped.prompt_text().is_some();
                removed.push(popped);
                if is_prompt {
                    break;
                }
            }
            info!(removed = removed.len(), "history truncated for continuation");
            for popped in removed.into_iter().rev() {
                turn.interruptions.extend(popped.interruptions);
            }
        }

        let id = turn.id;
        self.queued.push_back(turn);
        id
    }

    /// Promotes the next queued turn to active. Nothing happens while
    /// paused or while another turn is in flight.
    pub fn start_next_turn(&mut self) -> Option<TurnHandle> {
        self.commit_finished();
        if self.paused || self.active.is_some() {
            return None;
        }
        let turn = self.queued.pop_front()?;
        let handle = TurnHandle::new(turn);
        handle.begin_response();
        info!(turn = %handle.id(), "turn started");
        self.active = Some(handle.clone());
        Some(handle)
    }

    /// Completes the active turn with whatever it buffered and commits it.
    /// A turn whose buffer was cleared is committed as cancelled instead.
    pub fn finalise_active_turn(&mut self) -> bool {
        let finalised = match self.active.as_ref() {
            Some(handle) if handle.buffer().is_cancelled() => {
                handle.cancel();
                false
            }
            Some(handle) => handle.finalise(),
            None => false,
        };
        self.commit_finished();
        finalised
    }

    /// Attaches an interruption to the active turn, or to the most recent
    /// turn when none is in flight.
    pub fn record_interruption(&mut self, interruption: Interruption) {
        if let Some(active) = self.active.as_ref() {
            active.record_interruption(interruption);
        } else if let Some(last) = self.turns.last_mut() {
            last.interruptions.push(interruption);
        } else if let Some(queued) = self.queued.back_mut() {
            queued.interruptions.push(interruption);
        } else {
            warn!(id = %interruption.id, "no turn to record interruption on");
        }
    }

    /// Marks a stored interruption resolved. Returns false if unknown.
    pub fn resolve_interruption(&mut self, id: InterruptionId, kind: Option<InterruptionType>) -> bool {
        if self.active.as_ref().is_some_and(|t| t.resolve_interruption(id, kind)) {
            return true;
        }
        if let Some(interruption) = self.queued.iter_mut().find_map(|t| t.interruption_mut(id)) {
            apply_resolution(interruption, kind);
            return true;
        }
        match self.turns.interruption_mut(id) {
            Some(interruption) => {
                apply_resolution(interruption, kind);
                true
            }
            None => {
                warn!(%id, "resolution for unknown interruption");
                false
            }
        }
    }

    /// Runs a tool through the configured executor and records the call on
    /// the active turn. Without an active turn the call gets its own
    /// finalised turn in history.
    pub async fn call_tool(
        &mut self,
        cancel: &CancellationToken,
        request: ToolRequest,
    ) -> Result<ToolOutcome, ToolError> {
        let executor = self.executor.clone().ok_or(ToolError::NotConfigured)?;
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        info!(request = %request, "calling tool");
        let outcome = match executor.execute(cancel, &request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "tool call failed");
                return Err(err);
            }
        };

        match self.active_turn() {
            Some(active) => active.record_tool_call(outcome.call.clone()),
            None => {
                let mut turn = Turn::new(Trigger::call_tool(request));
                turn.tool_calls.push(outcome.call.clone());
                turn.responses.push(Response::completed(outcome.output.clone()));
                turn.is_finalised = true;
                self.commit_finished();
                self.turns.push(turn);
            }
        }
        Ok(outcome)
    }

    /// Snapshot for one pipeline run.
    pub fn context(&self) -> ConversationContext {
        let mut history = self.turns.as_slice().to_vec();
        let mut active = None;
        if let Some(handle) = self.active.as_ref() {
            let turn = handle.snapshot();
            if turn.is_finalised {
                history.push(turn);
            } else {
                active = Some(turn);
            }
        }
        ConversationContext {
            history,
            active,
            tools: self.tools.clone(),
        }
    }
}
