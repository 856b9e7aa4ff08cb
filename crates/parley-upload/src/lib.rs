//! Parley upload crate - staging of message attachments.
//!
//! Files attached to the next outgoing message are uploaded to the backend
//! first and tracked locally as slots pairing the original file name with
//! its server path and URL. Slots are capped per kind and mirror a remote
//! object while present; [`StagingArea::snapshot`] reads them into the next
//! send payload and [`StagingArea::drain`] consumes them once the send owns
//! the files. Includes a mock object store for testing without a server.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use parley_core::error::{ParleyError, Result};

pub mod http;

pub use http::HttpObjectStore;

// =============================================================================
// Types
// =============================================================================

/// A client-side file about to be uploaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Which staging bucket (and multipart field) a file belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadKind {
    Images,
    Files,
}

impl UploadKind {
    /// Multipart field name used by the generic upload endpoint.
    pub fn field_name(&self) -> &'static str {
        match self {
            UploadKind::Images => "images",
            UploadKind::Files => "files",
        }
    }
}

impl std::fmt::Display for UploadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field_name())
    }
}

/// A remote object created by an upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Original display name.
    pub name: String,
    /// Server-side path; the key used for deletion and the send payload.
    pub path: String,
    /// Fetchable URL.
    pub url: String,
}

/// The staged slots at send time, keyed by remote path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StagingSnapshot {
    pub image_paths: Vec<String>,
    pub file_paths: Vec<String>,
}

impl StagingSnapshot {
    pub fn is_empty(&self) -> bool {
        self.image_paths.is_empty() && self.file_paths.is_empty()
    }
}

// =============================================================================
// Object store boundary
// =============================================================================

/// Remote storage for uploaded attachments.
///
/// Implementations upload a batch of files (returning only the ones the
/// server accepted, in order) and delete single objects by server path.
pub trait ObjectStore: Send + Sync {
    /// Upload files under the given kind's field. Returns the accepted
    /// objects in arrival order; files the server rejected are absent.
    fn upload(
        &self,
        kind: UploadKind,
        files: Vec<LocalFile>,
    ) -> impl Future<Output = Result<Vec<StoredObject>>> + Send;

    /// Delete a remote object by its server path.
    fn delete(&self, path: &str) -> impl Future<Output = Result<()>> + Send;
}

// =============================================================================
// Staging area
// =============================================================================

/// Tracks attachments staged for the next outgoing message.
///
/// Slots exist from successful upload until send or explicit removal, and
/// always mirror a server-side object while present. Removal deletes the
/// remote object on a best-effort basis: a failed delete is logged, never
/// surfaced, and the local slot goes away regardless.
#[derive(Debug)]
pub struct StagingArea<S: ObjectStore> {
    store: S,
    max_images: usize,
    max_files: usize,
    images: Vec<StoredObject>,
    files: Vec<StoredObject>,
}

impl<S: ObjectStore> StagingArea<S> {
    /// Create a staging area with per-kind caps.
    pub fn new(store: S, max_images: usize, max_files: usize) -> Self {
        Self {
            store,
            max_images,
            max_files,
            images: Vec::new(),
            files: Vec::new(),
        }
    }

    /// The underlying object store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn slots(&self, kind: UploadKind) -> &[StoredObject] {
        match kind {
            UploadKind::Images => &self.images,
            UploadKind::Files => &self.files,
        }
    }

    pub fn count(&self, kind: UploadKind) -> usize {
        self.slots(kind).len()
    }

    fn cap(&self, kind: UploadKind) -> usize {
        match kind {
            UploadKind::Images => self.max_images,
            UploadKind::Files => self.max_files,
        }
    }

    /// Upload and stage files, preserving arrival order.
    ///
    /// Rejects with a quota error before any remote call when the bucket is
    /// already full. When a single call carries more files than the
    /// remaining room, the earliest entries up to the cap are kept and the
    /// excess is dropped with a warning. Only files the server accepted are
    /// staged. Returns the number of newly staged slots.
    pub async fn add(&mut self, kind: UploadKind, files: Vec<LocalFile>) -> Result<usize> {
        if files.is_empty() {
            return Ok(0);
        }

        let room = self.cap(kind).saturating_sub(self.count(kind));
        if room == 0 {
            return Err(ParleyError::Quota {
                kind: kind.to_string(),
                limit: self.cap(kind),
            });
        }

        let mut files = files;
        if files.len() > room {
            warn!(
                kind = %kind,
                dropped = files.len() - room,
                "Too many files in one add; keeping the earliest up to the cap"
            );
            files.truncate(room);
        }

        let stored = self.store.upload(kind, files).await?;
        let staged = stored.len();
        match kind {
            UploadKind::Images => self.images.extend(stored),
            UploadKind::Files => self.files.extend(stored),
        }
        debug!(kind = %kind, staged, total = self.count(kind), "Staged uploads");
        Ok(staged)
    }

    /// Remove the slot at `index`, deleting its remote object best-effort.
    pub async fn remove(&mut self, kind: UploadKind, index: usize) {
        let bucket = match kind {
            UploadKind::Images => &mut self.images,
            UploadKind::Files => &mut self.files,
        };
        if index >= bucket.len() {
            warn!(kind = %kind, index, "Ignoring removal of a slot that does not exist");
            return;
        }
        let slot = bucket.remove(index);
        if let Err(e) = self.store.delete(&slot.path).await {
            warn!(path = %slot.path, error = %e, "Remote delete failed; slot removed locally");
        }
    }

    /// Remove every slot, deleting remote objects best-effort.
    pub async fn clear(&mut self) {
        let all: Vec<StoredObject> = self.images.drain(..).chain(self.files.drain(..)).collect();
        for slot in all {
            if let Err(e) = self.store.delete(&slot.path).await {
                warn!(path = %slot.path, error = %e, "Remote delete failed during clear");
            }
        }
    }

    /// Current slots keyed by remote path, for the next send payload.
    pub fn snapshot(&self) -> StagingSnapshot {
        StagingSnapshot {
            image_paths: self.images.iter().map(|s| s.path.clone()).collect(),
            file_paths: self.files.iter().map(|s| s.path.clone()).collect(),
        }
    }

    /// Consume every slot without touching the remote objects.
    ///
    /// Used when a send takes ownership of the staged files: the message now
    /// references them, so they must survive on the server.
    pub fn drain(&mut self) -> (Vec<StoredObject>, Vec<StoredObject>) {
        (
            std::mem::take(&mut self.images),
            std::mem::take(&mut self.files),
        )
    }
}

// =============================================================================
// Mock implementation
// =============================================================================

/// In-memory object store for testing.
///
/// Stores uploads in a map keyed by a generated server path. Individual
/// uploads can be rejected by name and deletes can be forced to fail to
/// exercise the best-effort paths.
#[derive(Debug, Default)]
pub struct MockObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    reject_names: Mutex<Vec<String>>,
    fail_deletes: Mutex<bool>,
    delete_calls: Mutex<Vec<String>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject future uploads of files with this name.
    pub fn reject_name(&self, name: impl Into<String>) {
        self.reject_names.lock().expect("mock mutex").push(name.into());
    }

    /// Make every delete fail from now on.
    pub fn fail_deletes(&self) {
        *self.fail_deletes.lock().expect("mock mutex") = true;
    }

    /// Paths passed to `delete`, in call order.
    pub fn delete_calls(&self) -> Vec<String> {
        self.delete_calls.lock().expect("mock mutex").clone()
    }

    /// Whether an object exists under the given path.
    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().expect("mock mutex").contains_key(path)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().expect("mock mutex").len()
    }
}

impl ObjectStore for MockObjectStore {
    async fn upload(&self, kind: UploadKind, files: Vec<LocalFile>) -> Result<Vec<StoredObject>> {
        let rejected = self.reject_names.lock().expect("mock mutex").clone();
        let mut stored = Vec::new();
        for file in files {
            if rejected.contains(&file.name) {
                continue;
            }
            let ext = file
                .name
                .rsplit_once('.')
                .map(|(_, e)| format!(".{}", e))
                .unwrap_or_default();
            let path = format!("{}/{}{}", kind.field_name(), uuid::Uuid::new_v4(), ext);
            self.objects
                .lock()
                .expect("mock mutex")
                .insert(path.clone(), file.bytes);
            stored.push(StoredObject {
                url: format!("mock://static/upload/{}", path),
                name: file.name,
                path,
            });
        }
        Ok(stored)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.delete_calls
            .lock()
            .expect("mock mutex")
            .push(path.to_string());
        if *self.fail_deletes.lock().expect("mock mutex") {
            return Err(ParleyError::Remote("mock delete failure".to_string()));
        }
        self.objects.lock().expect("mock mutex").remove(path);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
