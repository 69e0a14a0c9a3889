//! Streaming coach conversation.
//!
//! Turn lifecycle: `Idle -> Sending -> Streaming -> Settled | Errored`.
//! Only one exchange runs at a time. The log only grows by appending, except
//! that a failed user turn can be retried in place and a failed exchange
//! removes the assistant message it opened.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clients::{ChatTurn, CoachClient};
use crate::error::{SessionError, TransportError};
use crate::notify::ChangeNotifier;

/// Appended to a message while it is still streaming. Display only.
pub const PENDING_CURSOR: &str = "▌";

pub const COACH_SYSTEM_PROMPT: &str = "You are a patient, practical chess coach. \
Explain ideas in plain language, tie advice to concrete moves and plans, and keep \
answers short unless the student asks for depth. When a position or game is \
shared, point out the critical moment, the better alternative, and the idea \
behind it. Ask a follow-up question when the student's level or goal is unclear.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationMessage {
    /// Creation-ordered, unique within a session.
    pub id: u64,
    pub role: Role,
    pub content: String,
    /// Set on a user turn whose exchange failed.
    pub error: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Sending,
    Streaming,
    Settled,
    Errored,
}

impl TurnPhase {
    pub fn is_in_flight(self) -> bool {
        matches!(self, TurnPhase::Sending | TurnPhase::Streaming)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Settled { message_id: u64, content: String },
    /// `message_id` is the user turn that is now flagged.
    Failed { message_id: u64, error: TransportError },
}

#[derive(Debug)]
struct CoachState {
    messages: Vec<ConversationMessage>,
    next_id: u64,
    phase: TurnPhase,
    streaming_id: Option<u64>,
    last_error: Option<TransportError>,
}

impl CoachState {
    fn push(&mut self, role: Role, content: String) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.messages.push(ConversationMessage {
            id,
            role,
            content,
            error: false,
            created_at: Utc::now(),
        });
        id
    }

    fn find_mut(&mut self, id: u64) -> Option<&mut ConversationMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

#[derive(Clone)]
pub struct CoachSession {
    client: Arc<dyn CoachClient>,
    system_prompt: Arc<str>,
    state: Arc<Mutex<CoachState>>,
    notifier: ChangeNotifier,
}

impl CoachSession {
    pub fn new(client: Arc<dyn CoachClient>, notifier: ChangeNotifier) -> Self {
        Self {
            client,
            system_prompt: Arc::from(COACH_SYSTEM_PROMPT),
            state: Arc::new(Mutex::new(CoachState {
                messages: Vec::new(),
                next_id: 0,
                phase: TurnPhase::Idle,
                streaming_id: None,
                last_error: None,
            })),
            notifier,
        }
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = Arc::from(prompt);
        self
    }

    fn lock(&self) -> MutexGuard<'_, CoachState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn conversation_log(&self) -> Vec<ConversationMessage> {
        self.lock().messages.clone()
    }

    pub fn message(&self, id: u64) -> Option<ConversationMessage> {
        self.lock().messages.iter().find(|m| m.id == id).cloned()
    }

    pub fn phase(&self) -> TurnPhase {
        self.lock().phase
    }

    pub fn last_error(&self) -> Option<TransportError> {
        self.lock().last_error.clone()
    }

    /// Message text as it should be rendered: the streaming message gets
    /// the pending cursor appended.
    pub fn display_text(&self, id: u64) -> Option<String> {
        let st = self.lock();
        let msg = st.messages.iter().find(|m| m.id == id)?;
        if st.streaming_id == Some(id) {
            Some(format!("{}{PENDING_CURSOR}", msg.content))
        } else {
            Some(msg.content.clone())
        }
    }

    /// Drop the whole conversation. Refused while an exchange is running.
    pub fn reset(&self) -> Result<(), SessionError> {
        {
            let mut st = self.lock();
            if st.phase.is_in_flight() {
                return Err(SessionError::TurnInFlight);
            }
            st.messages.clear();
            st.phase = TurnPhase::Idle;
            st.last_error = None;
        }
        self.notifier.bump();
        Ok(())
    }

    /// Append a user turn and stream the coach's reply into a new assistant
    /// message. Rejected without any state change while another exchange
    /// is in flight.
    pub async fn submit_turn(&self, text: &str) -> Result<TurnOutcome, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyTurn);
        }

        let (user_id, payload) = {
            let mut st = self.lock();
            if st.phase.is_in_flight() {
                return Err(SessionError::TurnInFlight);
            }
            let id = st.push(Role::User, text.to_string());
            st.phase = TurnPhase::Sending;
            st.last_error = None;
            (id, self.payload(&st, id))
        };
        self.notifier.bump();
        info!(message_id = user_id, "Coach turn submitted");

        Ok(self.exchange(user_id, payload).await)
    }

    /// Resubmit a failed user turn. The message keeps its id and position;
    /// only its error flag is cleared. The reply is appended at the end.
    pub async fn retry_turn(&self, id: u64) -> Result<TurnOutcome, SessionError> {
        let payload = {
            let mut st = self.lock();
            if st.phase.is_in_flight() {
                return Err(SessionError::TurnInFlight);
            }
            let msg = st.find_mut(id).ok_or(SessionError::UnknownMessage(id))?;
            if msg.role != Role::User || !msg.error {
                return Err(SessionError::NotRetryable(id));
            }
            msg.error = false;
            st.phase = TurnPhase::Sending;
            st.last_error = None;
            self.payload(&st, id)
        };
        self.notifier.bump();
        info!(message_id = id, "Retrying coach turn");

        Ok(self.exchange(id, payload).await)
    }

    /// System preamble plus history up to and including `upto`, without
    /// failed turns.
    fn payload(&self, st: &CoachState, upto: u64) -> Vec<ChatTurn> {
        let mut turns = vec![ChatTurn {
            role: Role::System,
            content: self.system_prompt.to_string(),
        }];
        turns.extend(
            st.messages
                .iter()
                .filter(|m| m.id <= upto && !m.error && m.role != Role::System && !m.content.is_empty())
                .map(|m| ChatTurn {
                    role: m.role,
                    content: m.content.clone(),
                }),
        );
        turns
    }

    async fn exchange(&self, user_id: u64, payload: Vec<ChatTurn>) -> TurnOutcome {
        let mut guard = ExchangeGuard {
            session: self,
            user_id,
            assistant_id: None,
            finished: false,
        };

        let mut stream = match self.client.stream_reply(payload).await {
            Ok(stream) => stream,
            Err(e) => return guard.fail(e),
        };

        let assistant_id = {
            let mut st = self.lock();
            let id = st.push(Role::Assistant, String::new());
            st.phase = TurnPhase::Streaming;
            st.streaming_id = Some(id);
            id
        };
        guard.assistant_id = Some(assistant_id);
        self.notifier.bump();

        let mut fragments = 0usize;
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    if let Some(msg) = self.lock().find_mut(assistant_id) {
                        msg.content.push_str(&fragment);
                    }
                    fragments += 1;
                    self.notifier.bump();
                }
                Err(e) => return guard.fail(e),
            }
        }

        debug!(message_id = assistant_id, fragments, "Coach stream finished");
        guard.settle()
    }
}

/// Resolves the exchange exactly once. If the exchange future is dropped
/// mid-flight the turn is failed rather than left in `Streaming`.
struct ExchangeGuard<'a> {
    session: &'a CoachSession,
    user_id: u64,
    assistant_id: Option<u64>,
    finished: bool,
}

impl ExchangeGuard<'_> {
    fn fail(&mut self, error: TransportError) -> TurnOutcome {
        self.finished = true;
        warn!(message_id = self.user_id, error = %error, "Coach turn failed");
        {
            let mut st = self.session.lock();
            if let Some(assistant_id) = self.assistant_id {
                st.messages.retain(|m| m.id != assistant_id);
            }
            if let Some(msg) = st.find_mut(self.user_id) {
                msg.error = true;
            }
            st.phase = TurnPhase::Errored;
            st.streaming_id = None;
            st.last_error = Some(error.clone());
        }
        self.session.notifier.bump();
        TurnOutcome::Failed {
            message_id: self.user_id,
            error,
        }
    }

    fn settle(&mut self) -> TurnOutcome {
        self.finished = true;
        let outcome = {
            let mut st = self.session.lock();
            st.phase = TurnPhase::Settled;
            st.streaming_id = None;
            match self.assistant_id.and_then(|id| st.messages.iter().find(|m| m.id == id)) {
                Some(msg) => TurnOutcome::Settled {
                    message_id: msg.id,
                    content: msg.content.clone(),
                },
                None => TurnOutcome::Settled {
                    message_id: 0,
                    content: String::new(),
                },
            }
        };
        self.session.notifier.bump();
        outcome
    }
}

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.fail(TransportError::StreamClosed);
        }
    }
}
