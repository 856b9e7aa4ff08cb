//! Corpus types and the remote corpus API boundary.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use parley_core::error::{ParleyError, Result};

// =============================================================================
// Types
// =============================================================================

/// A source document inside a corpus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusFile {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub created_at: String,
}

/// A named, server-indexed document set usable for retrieval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corpus {
    pub name: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(rename = "files_info", default)]
    pub files: Vec<CorpusFile>,
}

/// Result of a build call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildOutcome {
    pub success: bool,
    /// The name already denoted an existing corpus; nothing was built.
    pub skipped: bool,
}

// =============================================================================
// Trait
// =============================================================================

/// Remote lifecycle operations for named corpora.
///
/// `build` is idempotent by name: building an existing name reports
/// `skipped` instead of erroring or duplicating.
pub trait CorpusApi: Send + Sync {
    fn list(&self) -> impl Future<Output = Result<Vec<Corpus>>> + Send;

    fn build(
        &self,
        name: &str,
        files: &[String],
    ) -> impl Future<Output = Result<BuildOutcome>> + Send;

    fn rename(&self, old_name: &str, new_name: &str) -> impl Future<Output = Result<()>> + Send;

    fn delete(&self, name: &str) -> impl Future<Output = Result<()>> + Send;
}

// =============================================================================
// Mock implementation
// =============================================================================

/// In-memory corpus API for testing.
///
/// Keeps corpora in a map keyed by name and honors build idempotence. An
/// optional artificial delay before each mutation lets tests exercise the
/// per-name serialization guard.
#[derive(Debug, Default)]
pub struct MockCorpusApi {
    corpora: Mutex<HashMap<String, Corpus>>,
    fail_mutations: Mutex<bool>,
    build_calls: Mutex<usize>,
    delay: Option<Duration>,
}

impl MockCorpusApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before each mutation, to hold operations in flight.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Pre-populate a corpus, as if built in an earlier session.
    pub fn seed(&self, name: &str, files: Vec<CorpusFile>) {
        self.corpora.lock().expect("mock mutex").insert(
            name.to_string(),
            Corpus {
                name: name.to_string(),
                created_at: "2025-01-11 00:00:00".to_string(),
                files,
            },
        );
    }

    /// Make every mutation fail from now on.
    pub fn fail_mutations(&self) {
        *self.fail_mutations.lock().expect("mock mutex") = true;
    }

    pub fn build_calls(&self) -> usize {
        *self.build_calls.lock().expect("mock mutex")
    }

    pub fn corpus_count(&self) -> usize {
        self.corpora.lock().expect("mock mutex").len()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_failure(&self) -> Result<()> {
        if *self.fail_mutations.lock().expect("mock mutex") {
            return Err(ParleyError::Remote("mock mutation failure".to_string()));
        }
        Ok(())
    }
}

impl CorpusApi for MockCorpusApi {
    async fn list(&self) -> Result<Vec<Corpus>> {
        let mut all: Vec<Corpus> = self
            .corpora
            .lock()
            .expect("mock mutex")
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn build(&self, name: &str, files: &[String]) -> Result<BuildOutcome> {
        self.pause().await;
        *self.build_calls.lock().expect("mock mutex") += 1;
        self.check_failure()?;

        let mut corpora = self.corpora.lock().expect("mock mutex");
        if corpora.contains_key(name) {
            return Ok(BuildOutcome {
                success: true,
                skipped: true,
            });
        }
        corpora.insert(
            name.to_string(),
            Corpus {
                name: name.to_string(),
                created_at: "2025-01-11 00:00:00".to_string(),
                files: files
                    .iter()
                    .map(|f| CorpusFile {
                        name: f.clone(),
                        size: 0,
                        created_at: String::new(),
                    })
                    .collect(),
            },
        );
        Ok(BuildOutcome {
            success: true,
            skipped: false,
        })
    }

    async fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.pause().await;
        self.check_failure()?;
        let mut corpora = self.corpora.lock().expect("mock mutex");
        let Some(mut corpus) = corpora.remove(old_name) else {
            return Err(ParleyError::Remote(format!(
                "corpus not found: {}",
                old_name
            )));
        };
        corpus.name = new_name.to_string();
        corpora.insert(new_name.to_string(), corpus);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.pause().await;
        self.check_failure()?;
        let mut corpora = self.corpora.lock().expect("mock mutex");
        if corpora.remove(name).is_none() {
            return Err(ParleyError::Remote(format!("corpus not found: {}", name)));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
