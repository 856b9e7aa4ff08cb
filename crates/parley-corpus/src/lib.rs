//! Parley corpus crate - retrieval-corpus lifecycle management.
//!
//! A corpus is a named, server-indexed set of documents usable for
//! retrieval-augmented answers. This crate uploads source documents, builds
//! and adopts corpora idempotently, toggles the active set feeding the next
//! query, and renames or deletes corpora with per-name serialization and a
//! confirmation gate in front of deletion. Includes a mock API for testing
//! without a server.

use std::future::Future;

pub mod api;
pub mod http;
pub mod manager;

pub use api::{BuildOutcome, Corpus, CorpusApi, CorpusFile, MockCorpusApi};
pub use http::HttpCorpusApi;
pub use manager::CorpusManager;

// =============================================================================
// Confirmation gate
// =============================================================================

/// Blocking yes/no gate in front of irreversible operations.
///
/// The manager asks the gate before deleting a corpus; a refusal aborts the
/// operation before any remote call.
pub trait ConfirmationGate: Send + Sync {
    fn confirm(&self, prompt: &str) -> impl Future<Output = bool> + Send;
}

/// Gate that approves everything. For tests and non-interactive callers
/// that have already confirmed elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl ConfirmationGate for AlwaysConfirm {
    async fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Gate that declines everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysDeny;

impl ConfirmationGate for AlwaysDeny {
    async fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}
