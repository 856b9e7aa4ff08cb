//! Transcript reducer: folds decoded stream events into a conversation.
//!
//! One `Transcript` owns the message list for a single conversation context
//! and is the only writer path into it. A send appends the user message and
//! an empty assistant placeholder, then every stream event for that exchange
//! mutates the placeholder in place until the exchange settles. Only one
//! placeholder may ever be open at a time, so events from two requests can
//! never interleave.

use tracing::warn;
use uuid::Uuid;

use parley_core::error::{ParleyError, Result};
use parley_core::types::{Attachment, Conversation, Message, Role};

use crate::event::StreamEvent;
use crate::link::OutputResolver;

/// Maximum characters of the first query used as the conversation title.
const TITLE_MAX_CHARS: usize = 30;

/// Lifecycle of the current exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangePhase {
    /// No exchange has been opened yet.
    Idle,
    /// A placeholder is open and accepting stream events.
    Streaming,
    /// The last exchange completed without an error event.
    SettledOk,
    /// The last exchange ended with an error; partial content is retained.
    SettledError,
}

/// Per-conversation transcript state machine.
#[derive(Debug)]
pub struct Transcript {
    conversation: Conversation,
    phase: ExchangePhase,
    resolver: OutputResolver,
}

impl Transcript {
    /// Create an empty transcript. `base_url` anchors generated-file URLs.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            conversation: Conversation::new(""),
            phase: ExchangePhase::Idle,
            resolver: OutputResolver::new(base_url),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.conversation.messages
    }

    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == ExchangePhase::Streaming
    }

    /// Open a new exchange: append the user message and an empty assistant
    /// placeholder, and enter `Streaming`.
    ///
    /// Rejected with [`ParleyError::Busy`] while a stream is already active
    /// for this conversation; a send is never queued behind another.
    pub fn begin_exchange(
        &mut self,
        query: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Result<Uuid> {
        if self.phase == ExchangePhase::Streaming {
            return Err(ParleyError::Busy(
                "a response stream is already active for this conversation".to_string(),
            ));
        }

        let query = query.into();
        if self.conversation.title.is_empty() {
            self.conversation.title = truncate_chars(&query, TITLE_MAX_CHARS);
        }

        self.conversation.push_message(Message::user(query, attachments));
        let placeholder = Message::assistant_placeholder();
        let id = placeholder.id;
        self.conversation.push_message(placeholder);
        self.phase = ExchangePhase::Streaming;
        Ok(id)
    }

    /// Apply one decoded stream event to the open placeholder.
    ///
    /// Events arriving outside an open exchange are dropped (defensive
    /// no-op) rather than corrupting transcript order.
    pub fn apply(&mut self, event: StreamEvent) {
        if self.phase != ExchangePhase::Streaming {
            warn!(?event, "Dropping stream event: no exchange is open");
            return;
        }

        match event {
            StreamEvent::ThinkingProcess { content, .. } => {
                let Some(placeholder) = self.open_placeholder() else {
                    return;
                };
                for line in content.lines() {
                    let line = line.trim();
                    if !line.is_empty() {
                        placeholder.reasoning.push(line);
                    }
                }
            }
            StreamEvent::ToolComplete { result, .. } => {
                let attachment = self.resolver.attachment_from(&result.result);
                let Some(placeholder) = self.open_placeholder() else {
                    return;
                };
                if let Some(att) = attachment {
                    if !placeholder.attachments.iter().any(|a| a.url == att.url) {
                        placeholder.attachments.push(att);
                    }
                }
                for link in result.links {
                    if !placeholder.links.contains(&link) {
                        placeholder.links.push(link);
                    }
                }
                placeholder.text = result.formatted_result;
            }
            StreamEvent::Result { content, .. } => {
                let Some(placeholder) = self.open_placeholder() else {
                    return;
                };
                // Merge, not overwrite: attachments and links set by earlier
                // tool_complete events survive; only the text is replaced.
                placeholder.text = content;
            }
            StreamEvent::Error { content, .. } => {
                if let Some(placeholder) = self.open_placeholder() {
                    placeholder.error = Some(content);
                }
                self.phase = ExchangePhase::SettledError;
            }
        }
    }

    /// The stream ended without an error event: settle the exchange.
    pub fn settle(&mut self) {
        if self.phase == ExchangePhase::Streaming {
            self.phase = ExchangePhase::SettledOk;
        }
    }

    /// The transport failed mid-stream: settle as error, keeping whatever
    /// partial content already arrived.
    pub fn settle_error(&mut self, message: impl Into<String>) {
        if self.phase != ExchangePhase::Streaming {
            return;
        }
        if let Some(placeholder) = self.open_placeholder() {
            placeholder.error = Some(message.into());
        }
        self.phase = ExchangePhase::SettledError;
    }

    /// The open placeholder, if the invariant holds.
    ///
    /// The last message must be an assistant message while an exchange is
    /// streaming. A violated invariant logs and yields `None`, making every
    /// merge a no-op instead of touching the wrong message.
    fn open_placeholder(&mut self) -> Option<&mut Message> {
        match self.conversation.messages.last_mut() {
            Some(msg) if msg.role == Role::Assistant => Some(msg),
            _ => {
                warn!("Transcript invariant violated: last message is not an open placeholder");
                None
            }
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

// =============================================================================
// Tests
// =============================================================================
