//! Corpus lifecycle manager.
//!
//! Owns the local view of the corpus list and the active set feeding the
//! next query's `rags` field. Every remote mutation is serialized per
//! corpus name: a second call for a name with an in-flight mutation is
//! rejected with a busy error, never queued. Deletion is gated behind an
//! explicit confirmation.

use std::collections::{BTreeSet, HashSet};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use parley_core::error::{ParleyError, Result};
use parley_upload::{LocalFile, ObjectStore, StoredObject, UploadKind};

use crate::api::{BuildOutcome, Corpus, CorpusApi};
use crate::ConfirmationGate;

#[derive(Debug, Default)]
struct CorpusState {
    corpora: Vec<Corpus>,
    active: BTreeSet<String>,
    in_flight: HashSet<String>,
}

/// Releases a name's in-flight mark when the owning mutation ends or is
/// aborted mid-call.
struct MutationGuard<'a> {
    state: &'a Mutex<CorpusState>,
    name: String,
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.in_flight.remove(&self.name);
        }
    }
}

/// Manages corpus uploads, builds, activation, renames, and deletion.
pub struct CorpusManager<A: CorpusApi, S: ObjectStore> {
    api: A,
    store: S,
    state: Mutex<CorpusState>,
}

impl<A: CorpusApi, S: ObjectStore> CorpusManager<A, S> {
    pub fn new(api: A, store: S) -> Self {
        Self {
            api,
            store,
            state: Mutex::new(CorpusState::default()),
        }
    }

    /// The known corpora, as of the last refresh or build.
    pub fn corpora(&self) -> Vec<Corpus> {
        self.state.lock().expect("state mutex poisoned").corpora.clone()
    }

    /// Names currently selected to participate in the next query, sorted.
    pub fn active_set(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("state mutex poisoned")
            .active
            .iter()
            .cloned()
            .collect()
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.state
            .lock()
            .expect("state mutex poisoned")
            .active
            .contains(name)
    }

    /// Re-fetch the corpus list from the backend.
    ///
    /// The active set is left untouched: activation is independent of
    /// existence changes.
    pub async fn refresh(&self) -> Result<()> {
        let corpora = self.api.list().await?;
        debug!(count = corpora.len(), "Corpus list refreshed");
        self.state.lock().expect("state mutex poisoned").corpora = corpora;
        Ok(())
    }

    /// Stage raw source documents through the generic upload boundary.
    ///
    /// Returns the server objects; their paths are what `build` consumes.
    pub async fn upload(&self, files: Vec<LocalFile>) -> Result<Vec<StoredObject>> {
        self.store.upload(UploadKind::Files, files).await
    }

    /// Build (or adopt) the corpus `name` from uploaded document paths.
    ///
    /// Idempotent by name: when the backend reports the name already
    /// exists, the call is a success-with-skip. Either way the corpus ends
    /// up in the active set.
    pub async fn build(&self, name: &str, files: Vec<String>) -> Result<BuildOutcome> {
        let _guard = self.begin_mutation(name)?;
        let outcome = self.api.build(name, &files).await?;

        let mut state = self.state.lock().expect("state mutex poisoned");
        state.active.insert(name.to_string());
        if outcome.skipped {
            info!(name, "Corpus already exists; marked active");
        } else {
            info!(name, files = files.len(), "Corpus built and marked active");
            // Keep the local list coherent until the next refresh.
            if !state.corpora.iter().any(|c| c.name == name) {
                state.corpora.push(Corpus {
                    name: name.to_string(),
                    created_at: String::new(),
                    files: Vec::new(),
                });
            }
        }
        Ok(outcome)
    }

    /// Select a corpus for the next query.
    pub fn activate(&self, name: &str) {
        let mut state = self.state.lock().expect("state mutex poisoned");
        state.active.insert(name.to_string());
    }

    /// Deselect a corpus without touching its remote existence.
    pub fn deactivate(&self, name: &str) {
        let mut state = self.state.lock().expect("state mutex poisoned");
        state.active.remove(name);
    }

    /// Rename a corpus.
    ///
    /// For a built corpus this calls the backend and rewrites the local
    /// entry and the active set. Before first build it only relabels the
    /// pending name locally.
    pub async fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        let is_built = {
            let state = self.state.lock().expect("state mutex poisoned");
            state.corpora.iter().any(|c| c.name == old_name)
        };

        if !is_built {
            let mut state = self.state.lock().expect("state mutex poisoned");
            if state.active.remove(old_name) {
                state.active.insert(new_name.to_string());
            }
            debug!(old_name, new_name, "Relabeled pending corpus name locally");
            return Ok(());
        }

        let _guard = self.begin_mutation(old_name)?;
        self.api.rename(old_name, new_name).await?;

        let mut state = self.state.lock().expect("state mutex poisoned");
        if let Some(corpus) = state.corpora.iter_mut().find(|c| c.name == old_name) {
            corpus.name = new_name.to_string();
        }
        if state.active.remove(old_name) {
            state.active.insert(new_name.to_string());
        }
        info!(old_name, new_name, "Corpus renamed");
        Ok(())
    }

    /// Delete a corpus after an explicit confirmation.
    ///
    /// Returns `Ok(false)` when the gate declines (nothing happens). On
    /// remote failure local state is left unchanged and the error is
    /// surfaced.
    pub async fn delete(&self, name: &str, gate: &impl ConfirmationGate) -> Result<bool> {
        let prompt = format!("Delete corpus \"{}\"? This cannot be undone.", name);
        if !gate.confirm(&prompt).await {
            debug!(name, "Corpus deletion declined");
            return Ok(false);
        }

        let _guard = self.begin_mutation(name)?;
        if let Err(e) = self.api.delete(name).await {
            warn!(name, error = %e, "Corpus deletion failed; local state unchanged");
            return Err(e);
        }

        let mut state = self.state.lock().expect("state mutex poisoned");
        state.corpora.retain(|c| c.name != name);
        state.active.remove(name);
        info!(name, "Corpus deleted");
        Ok(true)
    }

    /// Mark `name` as having an in-flight mutation, or reject with busy.
    ///
    /// The returned guard releases the mark when dropped, so an aborted
    /// mutation never leaves its name permanently busy.
    fn begin_mutation(&self, name: &str) -> Result<MutationGuard<'_>> {
        let mut state = self.state.lock().expect("state mutex poisoned");
        if !state.in_flight.insert(name.to_string()) {
            return Err(ParleyError::Busy(format!(
                "a mutation for corpus \"{}\" is already in flight",
                name
            )));
        }
        Ok(MutationGuard {
            state: &self.state,
            name: name.to_string(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockCorpusApi;
    use crate::{AlwaysConfirm, AlwaysDeny};
    use parley_upload::MockObjectStore;
    use std::time::Duration;

    fn manager() -> CorpusManager<MockCorpusApi, MockObjectStore> {
        CorpusManager::new(MockCorpusApi::new(), MockObjectStore::new())
    }

    #[tokio::test]
    async fn test_build_marks_active() {
        let m = manager();
        let outcome = m.build("docs", vec!["files/a.pdf".to_string()]).await.unwrap();
        assert!(outcome.success);
        assert!(!outcome.skipped);
        assert!(m.is_active("docs"));
        assert_eq!(m.corpora().len(), 1);
    }

    // Scenario: building a pre-existing name is success-with-skip and the
    // corpus ends up active, with no duplicate created.
    #[tokio::test]
    async fn test_build_existing_name_skips_and_activates() {
        let m = manager();
        m.api.seed("docs", vec![]);
        m.refresh().await.unwrap();

        let outcome = m.build("docs", vec![]).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.skipped);
        assert!(m.is_active("docs"));
        assert_eq!(m.api.corpus_count(), 1);
        assert_eq!(m.corpora().len(), 1);
    }

    #[tokio::test]
    async fn test_build_failure_leaves_inactive() {
        let m = manager();
        m.api.fail_mutations();
        assert!(m.build("docs", vec![]).await.is_err());
        assert!(!m.is_active("docs"));
        // The name is free for a retry.
        m.api.fail_mutations(); // still failing, but not busy
        let err = m.build("docs", vec![]).await.unwrap_err();
        assert!(matches!(err, ParleyError::Remote(_)));
    }

    #[tokio::test]
    async fn test_concurrent_builds_same_name_rejected() {
        let api = MockCorpusApi::with_delay(Duration::from_millis(20));
        let m = CorpusManager::new(api, MockObjectStore::new());

        let (first, second) = tokio::join!(m.build("docs", vec![]), m.build("docs", vec![]));
        let busy = usize::from(matches!(first, Err(ParleyError::Busy(_))))
            + usize::from(matches!(second, Err(ParleyError::Busy(_))));
        assert_eq!(busy, 1);
        assert!(first.is_ok() || second.is_ok());
        assert_eq!(m.api.build_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_builds_different_names_allowed() {
        let api = MockCorpusApi::with_delay(Duration::from_millis(10));
        let m = CorpusManager::new(api, MockObjectStore::new());

        let (a, b) = tokio::join!(m.build("alpha", vec![]), m.build("beta", vec![]));
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(m.active_set(), vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[tokio::test]
    async fn test_activate_deactivate_toggle() {
        let m = manager();
        m.activate("docs");
        assert!(m.is_active("docs"));
        m.deactivate("docs");
        assert!(!m.is_active("docs"));
        // Toggling something that never existed remotely is fine.
        m.deactivate("ghost");
    }

    #[tokio::test]
    async fn test_active_set_is_sorted() {
        let m = manager();
        m.activate("zeta");
        m.activate("alpha");
        assert_eq!(m.active_set(), vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[tokio::test]
    async fn test_rename_built_corpus_updates_everything() {
        let m = manager();
        m.build("docs", vec![]).await.unwrap();
        m.rename("docs", "manuals").await.unwrap();

        assert!(m.is_active("manuals"));
        assert!(!m.is_active("docs"));
        assert!(m.corpora().iter().any(|c| c.name == "manuals"));
        assert_eq!(m.api.corpus_count(), 1);
    }

    #[tokio::test]
    async fn test_rename_before_build_is_local_relabel() {
        let m = manager();
        m.activate("draft");
        m.rename("draft", "docs").await.unwrap();

        assert!(m.is_active("docs"));
        assert!(!m.is_active("draft"));
        // Nothing was sent to the backend.
        assert_eq!(m.api.corpus_count(), 0);
    }

    #[tokio::test]
    async fn test_rename_failure_keeps_local_state() {
        let m = manager();
        m.build("docs", vec![]).await.unwrap();
        m.api.fail_mutations();

        assert!(m.rename("docs", "manuals").await.is_err());
        assert!(m.is_active("docs"));
        assert!(m.corpora().iter().any(|c| c.name == "docs"));
    }

    #[tokio::test]
    async fn test_delete_requires_confirmation() {
        let m = manager();
        m.build("docs", vec![]).await.unwrap();

        let deleted = m.delete("docs", &AlwaysDeny).await.unwrap();
        assert!(!deleted);
        assert!(m.is_active("docs"));
        assert_eq!(m.api.corpus_count(), 1);
    }

    #[tokio::test]
    async fn test_confirmed_delete_removes_from_active_set() {
        let m = manager();
        m.build("docs", vec![]).await.unwrap();

        let deleted = m.delete("docs", &AlwaysConfirm).await.unwrap();
        assert!(deleted);
        assert!(!m.is_active("docs"));
        assert_eq!(m.api.corpus_count(), 0);
        assert!(m.corpora().is_empty());
    }

    #[tokio::test]
    async fn test_delete_failure_leaves_local_state() {
        let m = manager();
        m.build("docs", vec![]).await.unwrap();
        m.api.fail_mutations();

        let err = m.delete("docs", &AlwaysConfirm).await.unwrap_err();
        assert!(matches!(err, ParleyError::Remote(_)));
        assert!(m.is_active("docs"));
        assert!(m.corpora().iter().any(|c| c.name == "docs"));
    }

    #[tokio::test]
    async fn test_upload_stages_documents() {
        let m = manager();
        let stored = m
            .upload(vec![LocalFile::new("spec.pdf", vec![1, 2, 3])])
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].path.starts_with("files/"));
    }

    #[tokio::test]
    async fn test_refresh_preserves_active_set() {
        let m = manager();
        m.activate("ghost");
        m.api.seed("docs", vec![]);
        m.refresh().await.unwrap();

        assert_eq!(m.corpora().len(), 1);
        // Active selection survives existence changes.
        assert!(m.is_active("ghost"));
    }
}
