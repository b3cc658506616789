//! Active conversation state and the optimistic send protocol
//!
//! The engine owns exactly one [`Conversation`] at a time. Sending appends
//! the user's turn before the network round-trip; the reply (or an inline
//! error, depending on [`SendFailurePolicy`]) is appended when the call
//! resolves. A single-flight guard keeps a second send from racing the
//! first — two overlapping sends against a conversation that has no
//! server-assigned id yet would create two divergent conversations from one
//! local session.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::{ApiClient, ChatPair, SendRequest};
use crate::credentials::{CredentialStore, KEY_HISTORY_ID};
use crate::error::{ConfabError, Result};
use crate::session::SessionHandle;
use crate::single_flight::SingleFlight;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    /// The local user
    User,
    /// The remote assistant (including synthetic error replies)
    Assistant,
}

/// One immutable turn in a conversation
///
/// `sequence_index` establishes chronological order independent of any
/// display ordering; ids are unique per message, never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id
    pub id: Uuid,
    /// Message text
    pub text: String,
    /// Author of the turn
    pub author: Author,
    /// Position in chronological order, starting at 0
    pub sequence_index: u64,
    /// Creation time (local clock)
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn new(author: Author, text: impl Into<String>, sequence_index: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            author,
            sequence_index,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// One conversation: a server-assigned id and its chronological messages
///
/// The id starts unset and is adopted exactly once; a new conversation
/// means a fresh instance with the id unset again.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    history_id: Option<i64>,
    messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation with no server-assigned id
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a conversation from stored user/assistant exchanges
    ///
    /// Each pair becomes two messages with consecutive sequence indices,
    /// user before assistant, in the order the pairs arrive.
    pub fn from_pairs(history_id: i64, pairs: &[ChatPair]) -> Self {
        let mut conversation = Self {
            history_id: Some(history_id),
            messages: Vec::with_capacity(pairs.len() * 2),
        };
        for pair in pairs {
            conversation.push(Author::User, &pair.user);
            conversation.push(Author::Assistant, &pair.ai);
        }
        conversation
    }

    /// The server-assigned id, if one has been adopted
    pub fn history_id(&self) -> Option<i64> {
        self.history_id
    }

    /// Messages in chronological order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Newest-first view over the chronological sequence
    ///
    /// A pure transform for display purposes; the stored order is always
    /// chronological.
    pub fn messages_newest_first(&self) -> Vec<&Message> {
        self.messages.iter().rev().collect()
    }

    fn next_sequence(&self) -> u64 {
        self.messages
            .last()
            .map(|message| message.sequence_index + 1)
            .unwrap_or(0)
    }

    fn push(&mut self, author: Author, text: &str) -> &Message {
        let message = Message::new(author, text, self.next_sequence());
        self.messages.push(message);
        self.messages.last().unwrap_or_else(|| unreachable!())
    }

    /// Adopt the server-assigned id; a no-op when one is already set
    fn adopt_history_id(&mut self, history_id: i64) {
        if self.history_id.is_none() {
            self.history_id = Some(history_id);
        }
    }

    /// Remove the message with `id` if it is the most recent one
    fn retract_last(&mut self, id: Uuid) {
        if self.messages.last().map(|message| message.id) == Some(id) {
            self.messages.pop();
        }
    }
}

// ---------------------------------------------------------------------------
// ConversationEngine
// ---------------------------------------------------------------------------

/// What happens to the optimistic user turn when a send fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendFailurePolicy {
    /// Keep the user turn and append the error text as an assistant reply;
    /// the send itself reports success and the conversation continues
    #[default]
    InlineError,
    /// Retract the optimistic user turn and surface the error to the caller
    Rollback,
}

/// Owner of the active conversation
///
/// All methods take `&self`; overlapping calls contend on the single-flight
/// guard instead of blocking, so a caller issuing a second send while one
/// is in flight gets [`ConfabError::Busy`] immediately. A network call that
/// never resolves leaves the engine busy until the HTTP timeout fires.
pub struct ConversationEngine {
    api: Arc<ApiClient>,
    session: SessionHandle,
    store: Arc<dyn CredentialStore>,
    conversation: RwLock<Conversation>,
    flight: SingleFlight,
    failure_policy: SendFailurePolicy,
}

impl ConversationEngine {
    /// Create an engine with an empty conversation and the default
    /// [`SendFailurePolicy::InlineError`]
    pub fn new(
        api: Arc<ApiClient>,
        session: SessionHandle,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self::with_failure_policy(api, session, store, SendFailurePolicy::default())
    }

    /// Create an engine with an explicit send-failure policy
    pub fn with_failure_policy(
        api: Arc<ApiClient>,
        session: SessionHandle,
        store: Arc<dyn CredentialStore>,
        failure_policy: SendFailurePolicy,
    ) -> Self {
        Self {
            api,
            session,
            store,
            conversation: RwLock::new(Conversation::new()),
            flight: SingleFlight::new(),
            failure_policy,
        }
    }

    /// Recover the active conversation id persisted by a previous run
    pub async fn restore(&self) -> Result<Option<i64>> {
        let Some(raw) = self.store.get(KEY_HISTORY_ID).await? else {
            return Ok(None);
        };

        match raw.trim().parse::<i64>() {
            Ok(history_id) => {
                self.write_conversation()?.adopt_history_id(history_id);
                tracing::info!(history_id, "Restored active conversation id");
                Ok(Some(history_id))
            }
            Err(_) => {
                tracing::warn!("Ignoring unparseable stored conversation id: {}", raw);
                Ok(None)
            }
        }
    }

    /// Send one user turn and wait for the assistant's reply
    ///
    /// Protocol:
    /// 1. Whitespace-only text is rejected with [`ConfabError::Validation`]
    ///    before any state change or network call.
    /// 2. A send already in flight is rejected with [`ConfabError::Busy`].
    /// 3. The user turn is appended optimistically, then the request goes
    ///    out with the current conversation id (or null) and the current
    ///    session username, both read through at call time.
    /// 4. On success the reply is appended; if the conversation had no id
    ///    yet, the server-assigned one is adopted and persisted before this
    ///    method returns.
    /// 5. On failure the [`SendFailurePolicy`] decides: inline error reply
    ///    (the optimistic turn is never retracted) or rollback.
    ///
    /// Returns the appended assistant message.
    pub async fn send(&self, text: &str) -> Result<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ConfabError::Validation("Message text is empty".to_string()).into());
        }

        let _guard = self.flight.try_begin("send")?;

        let username = self
            .session
            .user()
            .map(|user| user.username)
            .unwrap_or_default();

        let (history_id, user_message_id) = {
            let mut conversation = self.write_conversation()?;
            let message = conversation.push(Author::User, text);
            let id = message.id;
            (conversation.history_id(), id)
        };

        let request = SendRequest {
            message: text.to_string(),
            history_id,
            username,
        };

        match self.api.send_message(&request).await {
            Ok(response) => {
                let (adopted, message) = {
                    let mut conversation = self.write_conversation()?;
                    let adopted = conversation.history_id().is_none();
                    conversation.adopt_history_id(response.history_id);
                    let message = conversation.push(Author::Assistant, &response.response).clone();
                    (adopted, message)
                };

                if adopted {
                    // Persisted before returning so a restart immediately
                    // after this send recovers the same conversation.
                    self.store
                        .set(KEY_HISTORY_ID, &response.history_id.to_string())
                        .await?;
                    tracing::info!(history_id = response.history_id, "Adopted conversation id");
                }

                Ok(message)
            }
            Err(e) => match self.failure_policy {
                SendFailurePolicy::InlineError => {
                    tracing::warn!("Send failed, continuing with inline error reply: {}", e);
                    let mut conversation = self.write_conversation()?;
                    let message = conversation.push(Author::Assistant, &e.to_string()).clone();
                    Ok(message)
                }
                SendFailurePolicy::Rollback => {
                    tracing::warn!("Send failed, retracting optimistic turn: {}", e);
                    self.write_conversation()?.retract_last(user_message_id);
                    Err(e)
                }
            },
        }
    }

    /// Replace the active conversation with a fresh, id-less one
    ///
    /// Rejected with [`ConfabError::Busy`] while a send is in flight.
    pub async fn start_new_chat(&self) -> Result<()> {
        let _guard = self.flight.try_begin("start_new_chat")?;

        *self.write_conversation()? = Conversation::new();
        self.store.remove(KEY_HISTORY_ID).await?;
        tracing::info!("Started new conversation");
        Ok(())
    }

    /// Load a stored conversation and make it the active one
    ///
    /// The loaded id is persisted as the active conversation id. Returns
    /// the number of reconstructed messages.
    pub async fn load_existing(&self, history_id: i64) -> Result<usize> {
        let _guard = self.flight.try_begin("load_existing")?;

        let pairs = self.api.load_chat(history_id).await?;
        let loaded = Conversation::from_pairs(history_id, &pairs);
        let count = loaded.messages().len();

        *self.write_conversation()? = loaded;
        self.store
            .set(KEY_HISTORY_ID, &history_id.to_string())
            .await?;
        tracing::info!(history_id, messages = count, "Loaded stored conversation");
        Ok(count)
    }

    /// The active conversation's server-assigned id, if any
    pub fn history_id(&self) -> Option<i64> {
        self.conversation
            .read()
            .ok()
            .and_then(|conversation| conversation.history_id())
    }

    /// Messages in chronological order
    pub fn messages(&self) -> Vec<Message> {
        self.conversation
            .read()
            .map(|conversation| conversation.messages().to_vec())
            .unwrap_or_default()
    }

    /// Newest-first display view of the messages
    pub fn messages_newest_first(&self) -> Vec<Message> {
        let mut messages = self.messages();
        messages.reverse();
        messages
    }

    /// Whether a guarded operation is currently in flight
    pub fn is_busy(&self) -> bool {
        self.flight.is_busy()
    }

    fn write_conversation(&self) -> Result<std::sync::RwLockWriteGuard<'_, Conversation>> {
        self.conversation
            .write()
            .map_err(|_| ConfabError::Storage("Conversation lock poisoned".to_string()).into())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
