//! Parley history crate - the past-conversations cache.
//!
//! Fetches the conversation list with a debounced, cancellation-safe fetch,
//! applies metadata patches optimistically with rollback on remote failure,
//! and deletes conversations remote-first. Includes a mock API for testing
//! without a server.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use parley_core::error::{ParleyError, Result};

pub mod cache;
pub mod http;

pub use cache::{FetchOutcome, HistoryCache};
pub use http::HttpHistoryApi;

// =============================================================================
// Types
// =============================================================================

/// One row of the conversation list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub starred: bool,
}

/// Partial metadata update for a conversation.
///
/// Only the set fields travel on the wire and touch the local record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetadataPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
}

impl MetadataPatch {
    /// Apply the set fields to a summary in place.
    pub fn apply_to(&self, summary: &mut ConversationSummary) {
        if let Some(ref title) = self.title {
            summary.title = title.clone();
        }
        if let Some(pinned) = self.pinned {
            summary.pinned = pinned;
        }
        if let Some(starred) = self.starred {
            summary.starred = starred;
        }
    }
}

// =============================================================================
// Trait
// =============================================================================

/// Remote operations on the conversation history.
pub trait HistoryApi: Send + Sync {
    fn list(&self) -> impl Future<Output = Result<Vec<ConversationSummary>>> + Send;

    fn patch(
        &self,
        conversation_id: &str,
        updates: &MetadataPatch,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete(&self, conversation_id: &str) -> impl Future<Output = Result<()>> + Send;
}

// =============================================================================
// Mock implementation
// =============================================================================

/// In-memory history API for testing.
///
/// An optional artificial delay before `list` lets tests hold a fetch in
/// flight while other calls arrive.
#[derive(Debug, Default)]
pub struct MockHistoryApi {
    conversations: Mutex<Vec<ConversationSummary>>,
    patches: Mutex<HashMap<String, usize>>,
    fail_mutations: Mutex<bool>,
    list_calls: Mutex<usize>,
    list_delay: Option<Duration>,
}

impl MockHistoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_list_delay(delay: Duration) -> Self {
        Self {
            list_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn seed(&self, id: &str, title: &str) {
        self.conversations
            .lock()
            .expect("mock mutex")
            .push(ConversationSummary {
                conversation_id: id.to_string(),
                title: title.to_string(),
                timestamp: "2025-01-11 10:00:00".to_string(),
                pinned: false,
                starred: false,
            });
    }

    pub fn fail_mutations(&self) {
        *self.fail_mutations.lock().expect("mock mutex") = true;
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().expect("mock mutex")
    }

    /// How many patches were applied to the given conversation.
    pub fn patches_for(&self, id: &str) -> usize {
        self.patches
            .lock()
            .expect("mock mutex")
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.lock().expect("mock mutex").len()
    }

    fn check_failure(&self) -> Result<()> {
        if *self.fail_mutations.lock().expect("mock mutex") {
            return Err(ParleyError::Remote("mock mutation failure".to_string()));
        }
        Ok(())
    }
}

impl HistoryApi for MockHistoryApi {
    async fn list(&self) -> Result<Vec<ConversationSummary>> {
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        *self.list_calls.lock().expect("mock mutex") += 1;
        Ok(self.conversations.lock().expect("mock mutex").clone())
    }

    async fn patch(&self, conversation_id: &str, updates: &MetadataPatch) -> Result<()> {
        self.check_failure()?;
        let mut conversations = self.conversations.lock().expect("mock mutex");
        let Some(summary) = conversations
            .iter_mut()
            .find(|c| c.conversation_id == conversation_id)
        else {
            return Err(ParleyError::Remote(format!(
                "conversation not found: {}",
                conversation_id
            )));
        };
        updates.apply_to(summary);
        *self
            .patches
            .lock()
            .expect("mock mutex")
            .entry(conversation_id.to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<()> {
        self.check_failure()?;
        let mut conversations = self.conversations.lock().expect("mock mutex");
        let before = conversations.len();
        conversations.retain(|c| c.conversation_id != conversation_id);
        if conversations.len() == before {
            return Err(ParleyError::Remote(format!(
                "conversation not found: {}",
                conversation_id
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
