use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// The author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A message typed (or dictated) by the user.
    User,
    /// A message produced by the backend agent.
    Assistant,
}

/// The kind of an attachment, derived from its file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// A renderable image (png, jpg, jpeg, gif).
    Image,
    /// A playable audio file (mp3, wav).
    Audio,
    /// Any other file.
    File,
}

impl AttachmentKind {
    /// Classify a file extension (without the leading dot, any case).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "gif" => AttachmentKind::Image,
            "mp3" | "wav" => AttachmentKind::Audio,
            _ => AttachmentKind::File,
        }
    }

    /// Classify a file name or path by its extension. Extensionless names
    /// fall back to `File`.
    pub fn from_path(path: &str) -> Self {
        match path.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() && !ext.contains('/') => Self::from_extension(ext),
            _ => AttachmentKind::File,
        }
    }
}

// =============================================================================
// Structs
// =============================================================================

/// A resolved file reference attached to a message.
///
/// Owned by exactly one message; never shared between messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    /// Fully resolved, fetchable URL.
    pub url: String,
    /// Display name (the file name, not the server path).
    pub name: String,
}

/// Ordered, append-only reasoning trace shown alongside an assistant message.
///
/// Steps are deduplicated by literal text: replaying an identical line is a
/// no-op, so at-least-once delivery of `thinking_process` events never
/// produces visible duplicates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningTrace {
    steps: Vec<String>,
}

impl ReasoningTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step unless an identical step is already present.
    ///
    /// Returns `true` if the step was appended.
    pub fn push(&mut self, step: impl Into<String>) -> bool {
        let step = step.into();
        if self.steps.iter().any(|s| *s == step) {
            return false;
        }
        self.steps.push(step);
        true
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// A single message within a conversation.
///
/// User messages are immutable once appended. An assistant message starts as
/// an empty placeholder and is mutated in place by stream events until its
/// exchange settles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    /// Rendered answer text (or the user's query).
    pub text: String,
    /// Images, files, and playable audio attached to this message.
    pub attachments: Vec<Attachment>,
    /// Source links extracted from tool results (e.g. search citations).
    pub links: Vec<String>,
    /// Reasoning steps streamed before the final answer.
    pub reasoning: ReasoningTrace,
    /// Set when the exchange that produced this message settled with an error.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a user message with the given text and attachments.
    pub fn user(text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            text: text.into(),
            attachments,
            links: Vec::new(),
            reasoning: ReasoningTrace::new(),
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Create an empty assistant placeholder, to be filled by stream events.
    pub fn assistant_placeholder() -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            text: String::new(),
            attachments: Vec::new(),
            links: Vec::new(),
            reasoning: ReasoningTrace::new(),
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// A conversation: identity, ordered messages, and patchable metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub pinned: bool,
    pub starred: bool,
    /// Last-activity timestamp, bumped on every message append.
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation with a fresh id.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            pinned: false,
            starred: false,
            updated_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    /// Append a message and bump the last-activity timestamp.
    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

// =============================================================================
// Tests
// =============================================================================
