//! Conversation state: message log, context set, progress, and the
//! turn lifecycle phase.
//!
//! All chunk application happens through [`ConversationState::apply`],
//! invoked once per decoded chunk in arrival order. The UI layer only
//! ever observes snapshots of this struct; it never mutates it.

use serde::{Deserialize, Serialize};

use kaiwa_wire::{Chunk, ContextItem, Timing};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    /// Unix millis at creation
    pub timestamp: i64,
}

impl Message {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Lifecycle phase of the current turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No turn in flight; Send is valid
    #[default]
    Idle,
    /// Request issued, no chunk received yet
    Sending,
    /// First chunk arrived; response streaming in
    Streaming,
    /// Turn finished with a Done chunk
    Completed,
    /// Turn cancelled by the user
    Aborted,
    /// Turn ended by a backend error or transport failure
    Failed,
}

impl Phase {
    /// Check if the turn has reached a terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Aborted | Phase::Failed)
    }

    /// Check if a turn is currently in flight
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Sending | Phase::Streaming)
    }
}

/// Canonical conversation state for one session.
///
/// Turn-scoped fields (progress, stage, timing, error) are reset when a
/// turn begins; the message log and the last retrieved context survive
/// across turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    /// Ordered conversation log
    pub messages: Vec<Message>,
    /// Index of the one assistant message currently accepting deltas
    pub streaming_index: Option<usize>,
    /// Retrieved context for the current turn, replaced wholesale
    pub context: Vec<ContextItem>,
    /// Current backend pipeline stage
    pub stage: Option<String>,
    /// Display message for the current stage
    pub status_message: Option<String>,
    /// Percent complete, 0-100
    pub progress: u8,
    /// Timing metadata from the last Done chunk
    pub timing: Timing,
    /// Follow-up query terms suggested on completion
    pub suggested_terms: Vec<String>,
    /// Failure reason for a Failed turn
    pub error: Option<String>,
    /// Elapsed display time maintained by the ticker, in millis
    pub elapsed_ms: u64,
    pub phase: Phase,
}

impl ConversationState {
    /// Create an empty, idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a turn: append the user message plus an empty assistant
    /// placeholder, clear turn-scoped fields, move to `Sending`.
    pub fn begin_turn(&mut self, text: impl Into<String>) {
        self.messages.push(Message::new(Role::User, text));
        self.messages.push(Message::new(Role::Assistant, ""));
        self.streaming_index = Some(self.messages.len() - 1);
        self.context.clear();
        self.stage = None;
        self.status_message = None;
        self.progress = 0;
        self.timing = Timing::default();
        self.suggested_terms.clear();
        self.error = None;
        self.elapsed_ms = 0;
        self.phase = Phase::Sending;
    }

    /// Apply one decoded chunk. The only mutator during streaming;
    /// chunks must arrive in wire order.
    pub fn apply(&mut self, chunk: Chunk) {
        // A terminal phase is final; a chunk still in flight when the
        // turn was aborted or failed must not rewrite it
        if self.phase.is_terminal() {
            return;
        }
        if self.phase == Phase::Sending {
            self.phase = Phase::Streaming;
        }

        match chunk {
            Chunk::Status {
                stage,
                message,
                progress,
            } => {
                // Replacement, not accumulation
                self.stage = Some(stage);
                self.status_message = message;
                self.progress = progress;
            }
            Chunk::Context { items } => {
                // A later context set fully supersedes an earlier one
                self.context = items;
            }
            Chunk::ContentDelta { text } => {
                if let Some(message) = self.active_message_mut() {
                    message.text.push_str(&text);
                }
            }
            Chunk::Done {
                timing,
                suggested_terms,
            } => {
                self.timing = timing;
                self.suggested_terms = suggested_terms;
                self.progress = 100;
                self.streaming_index = None;
                self.phase = Phase::Completed;
            }
            Chunk::Error { reason } => {
                // Accumulated assistant text stays; overlaying a notice
                // is the UI's call
                self.error = Some(reason);
                self.streaming_index = None;
                self.phase = Phase::Failed;
            }
        }
    }

    /// Record a transport-level failure for the current turn
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.error = Some(reason.into());
        self.streaming_index = None;
        self.phase = Phase::Failed;
    }

    /// Mark an in-flight turn as aborted; no-op once terminal
    pub fn abort(&mut self) {
        if self.phase.is_active() {
            self.streaming_index = None;
            self.phase = Phase::Aborted;
        }
    }

    /// Return to `Idle` after a terminal phase has been observed.
    ///
    /// Clears turn-scoped display fields but keeps the message log and
    /// the last context set. Caller-driven, never automatic.
    pub fn reset(&mut self) {
        if !self.phase.is_terminal() {
            return;
        }
        self.stage = None;
        self.status_message = None;
        self.progress = 0;
        self.error = None;
        self.elapsed_ms = 0;
        self.streaming_index = None;
        self.phase = Phase::Idle;
    }

    /// Text of the assistant message currently streaming, if any
    pub fn streaming_text(&self) -> Option<&str> {
        self.streaming_index
            .and_then(|i| self.messages.get(i))
            .map(|m| m.text.as_str())
    }

    fn active_message_mut(&mut self) -> Option<&mut Message> {
        self.streaming_index.and_then(|i| self.messages.get_mut(i))
    }
}
