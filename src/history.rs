//! Index of stored conversations
//!
//! A read-only projection of the conversations the server holds for the
//! authenticated user. The index is refetched wholesale on every sync;
//! entries are only ever removed locally after the server confirms a
//! deletion, never optimistically.

use std::sync::{Arc, RwLock};

use crate::client::{ApiClient, ChatPair, HistoryEntryDto};
use crate::error::{ConfabError, Result};
use crate::single_flight::SingleFlight;

/// Display preview length for a conversation's first user turn
const PREVIEW_LEN: usize = 15;

/// One stored conversation as listed by the server
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Server-assigned conversation id
    pub history_id: i64,
    /// All exchanges, chronological
    pub pairs: Vec<ChatPair>,
}

impl HistoryEntry {
    /// The first user turn, used as the conversation's display title
    pub fn first_user_turn(&self) -> &str {
        self.pairs
            .first()
            .map(|pair| pair.user.as_str())
            .unwrap_or("")
    }

    /// Truncated preview of the first user turn
    pub fn preview(&self) -> String {
        let turn = self.first_user_turn();
        if turn.chars().count() > PREVIEW_LEN {
            let truncated: String = turn.chars().take(PREVIEW_LEN).collect();
            format!("{}...", truncated)
        } else {
            turn.to_string()
        }
    }
}

impl From<HistoryEntryDto> for HistoryEntry {
    fn from(dto: HistoryEntryDto) -> Self {
        Self {
            history_id: dto.history_id,
            pairs: dto.chat,
        }
    }
}

/// Local index over the server-held conversation list
pub struct HistoryIndex {
    api: Arc<ApiClient>,
    entries: RwLock<Vec<HistoryEntry>>,
    flight: SingleFlight,
}

impl HistoryIndex {
    /// Create an empty index
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            entries: RwLock::new(Vec::new()),
            flight: SingleFlight::new(),
        }
    }

    /// Fetch all stored conversations, replacing the local index wholesale
    ///
    /// Repeated calls are idempotent; a call while a fetch is outstanding
    /// is rejected with [`ConfabError::Busy`] rather than starting a second
    /// request.
    pub async fn list(&self) -> Result<Vec<HistoryEntry>> {
        let _guard = self.flight.try_begin("history list")?;

        let fetched: Vec<HistoryEntry> = self
            .api
            .list_history()
            .await?
            .into_iter()
            .map(HistoryEntry::from)
            .collect();

        tracing::debug!(count = fetched.len(), "Refreshed history index");
        *self.write_entries()? = fetched.clone();
        Ok(fetched)
    }

    /// Delete a stored conversation
    ///
    /// The entry is removed from the local index only when the server
    /// confirms the deletion; on any failure the index is untouched and the
    /// error is surfaced to the caller.
    pub async fn delete(&self, history_id: i64) -> Result<()> {
        let confirmed = self.api.delete_chat(history_id).await?;
        if !confirmed {
            return Err(ConfabError::Server {
                status: 200,
                message: format!("Server did not confirm deletion of conversation {}", history_id),
            }
            .into());
        }

        self.write_entries()?
            .retain(|entry| entry.history_id != history_id);
        tracing::info!(history_id, "Deleted stored conversation");
        Ok(())
    }

    /// Snapshot of the current index
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Whether a list fetch is currently outstanding
    pub fn is_busy(&self) -> bool {
        self.flight.is_busy()
    }

    fn write_entries(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<HistoryEntry>>> {
        self.entries
            .write()
            .map_err(|_| ConfabError::Storage("History index lock poisoned".to_string()).into())
    }
}
