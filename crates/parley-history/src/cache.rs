//! Debounced, cancellation-safe cache over the history API.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};

use parley_core::error::{ParleyError, Result};

use crate::{ConversationSummary, HistoryApi, MetadataPatch};

/// What happened to a `fetch` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The fetch ran; the cache now holds this many entries.
    Updated(usize),
    /// A newer fetch arrived during the quiet period and took over.
    Superseded,
    /// Another fetch was genuinely in flight; this call was dropped to
    /// avoid response races.
    Dropped,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: Vec<ConversationSummary>,
    /// Debounce generation; bumped by every fetch call.
    epoch: u64,
    /// True while a list request is on the wire.
    in_flight: bool,
}

/// Clears the in-flight flag when the owning fetch ends or is aborted.
struct InFlightGuard<'a> {
    state: &'a Mutex<CacheState>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.in_flight = false;
        }
    }
}

/// Cached view of past conversations.
///
/// The cache is the single owner of its entry list; every mutation goes
/// through [`fetch`](HistoryCache::fetch),
/// [`patch_metadata`](HistoryCache::patch_metadata), or
/// [`delete`](HistoryCache::delete).
pub struct HistoryCache<A: HistoryApi> {
    api: A,
    debounce: Duration,
    state: Mutex<CacheState>,
}

impl<A: HistoryApi> HistoryCache<A> {
    pub fn new(api: A, debounce: Duration) -> Self {
        Self {
            api,
            debounce,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// The current (possibly filtered) conversation list.
    pub fn entries(&self) -> Vec<ConversationSummary> {
        self.state.lock().expect("state mutex poisoned").entries.clone()
    }

    /// Fetch the conversation list, debounced.
    ///
    /// The call waits out a quiet period first; a newer call supersedes it.
    /// After the quiet period, a call that finds another fetch already on
    /// the wire is dropped, not queued. A non-empty `filter` keeps only
    /// conversations whose title contains it, case-insensitively.
    pub async fn fetch(&self, filter: Option<&str>) -> Result<FetchOutcome> {
        let my_epoch = {
            let mut state = self.state.lock().expect("state mutex poisoned");
            state.epoch += 1;
            state.epoch
        };

        tokio::time::sleep(self.debounce).await;

        let _guard = {
            let mut state = self.state.lock().expect("state mutex poisoned");
            if state.epoch != my_epoch {
                debug!("Fetch superseded during its quiet period");
                return Ok(FetchOutcome::Superseded);
            }
            if state.in_flight {
                debug!("Fetch dropped: another fetch is in flight");
                return Ok(FetchOutcome::Dropped);
            }
            state.in_flight = true;
            // Clears the flag even if this future is dropped mid-request,
            // so an aborted fetch never wedges the cache.
            InFlightGuard { state: &self.state }
        };

        let all = self.api.list().await?;

        let mut state = self.state.lock().expect("state mutex poisoned");

        let entries = match filter {
            Some(needle) if !needle.trim().is_empty() => {
                let needle = needle.trim().to_lowercase();
                all.into_iter()
                    .filter(|c| c.title.to_lowercase().contains(&needle))
                    .collect()
            }
            _ => all,
        };
        let count = entries.len();
        state.entries = entries;
        debug!(count, "History cache refreshed");
        Ok(FetchOutcome::Updated(count))
    }

    /// Patch conversation metadata, optimistically.
    ///
    /// The local record is updated immediately; a remote failure rolls it
    /// back to its prior value and surfaces the error. The next successful
    /// fetch overwrites whatever the optimistic state was.
    pub async fn patch_metadata(&self, id: &str, updates: MetadataPatch) -> Result<()> {
        let prior = {
            let mut state = self.state.lock().expect("state mutex poisoned");
            let Some(position) = state
                .entries
                .iter()
                .position(|c| c.conversation_id == id)
            else {
                return Err(ParleyError::Remote(format!(
                    "conversation not in cache: {}",
                    id
                )));
            };
            let prior = state.entries[position].clone();
            updates.apply_to(&mut state.entries[position]);
            prior
        };

        if let Err(e) = self.api.patch(id, &updates).await {
            warn!(id, error = %e, "Metadata patch failed; rolling back");
            let mut state = self.state.lock().expect("state mutex poisoned");
            if let Some(entry) = state
                .entries
                .iter_mut()
                .find(|c| c.conversation_id == id)
            {
                *entry = prior;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Delete a conversation remote-first.
    ///
    /// On failure the local list is untouched and the error is surfaced.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.api.delete(id).await?;
        let mut state = self.state.lock().expect("state mutex poisoned");
        state.entries.retain(|c| c.conversation_id != id);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
