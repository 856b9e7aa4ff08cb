//! The chat transport boundary: one request out, one byte stream back.

use std::future::Future;
use std::sync::Mutex;

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::Client;

use parley_core::error::{ParleyError, Result};

/// Payload of a send, mirroring the backend's chat form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendRequest {
    pub message_id: String,
    pub conversation_id: String,
    pub query: String,
    pub context_length: u32,
    /// Server paths of staged images.
    pub images: Vec<String>,
    /// Server paths of staged files.
    pub files: Vec<String>,
    /// Names of the active corpora to consult.
    pub rags: Vec<String>,
}

impl SendRequest {
    /// Flatten into form fields; list fields repeat their key per entry.
    pub fn form_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("message_id", self.message_id.clone()),
            ("conversation_id", self.conversation_id.clone()),
            ("query", self.query.clone()),
            ("context_length", self.context_length.to_string()),
        ];
        pairs.extend(self.images.iter().map(|p| ("images", p.clone())));
        pairs.extend(self.files.iter().map(|p| ("files", p.clone())));
        pairs.extend(self.rags.iter().map(|r| ("rags", r.clone())));
        pairs
    }
}

/// Opens a response stream for one send.
///
/// The returned stream yields raw body chunks in arrival order; decoding is
/// the caller's concern. One stream per request, never restartable.
pub trait ChatTransport: Send + Sync {
    type Stream: Stream<Item = Result<Bytes>> + Send + Unpin;

    fn send(&self, request: &SendRequest) -> impl Future<Output = Result<Self::Stream>> + Send;
}

// =============================================================================
// HTTP implementation
// =============================================================================

/// Transport posting the chat form and streaming the NDJSON response body.
#[derive(Debug, Clone)]
pub struct HttpChatTransport {
    client: Client,
    base_url: String,
}

impl HttpChatTransport {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }
}

impl ChatTransport for HttpChatTransport {
    type Stream = BoxStream<'static, Result<Bytes>>;

    async fn send(&self, request: &SendRequest) -> Result<Self::Stream> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .form(&request.form_pairs())
            .send()
            .await
            .map_err(|e| ParleyError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ParleyError::Transport(format!(
                "chat request failed with status {}",
                response.status()
            )));
        }
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ParleyError::Transport(e.to_string())))
            .boxed())
    }
}

// =============================================================================
// Mock implementation
// =============================================================================

/// One scripted element of a mock response stream.
#[derive(Clone, Debug)]
pub enum ScriptedChunk {
    /// Bytes delivered as one chunk (need not align with line boundaries).
    Data(Vec<u8>),
    /// The transport fails mid-stream with this message.
    Fail(String),
}

/// Mock transport replaying a scripted byte stream per send.
#[derive(Debug, Default)]
pub struct MockChatTransport {
    script: Mutex<Vec<ScriptedChunk>>,
    requests: Mutex<Vec<SendRequest>>,
    refuse_connect: Mutex<bool>,
}

impl MockChatTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to every send with these chunks.
    pub fn with_script(script: Vec<ScriptedChunk>) -> Self {
        let transport = Self::new();
        *transport.script.lock().expect("mock mutex") = script;
        transport
    }

    /// Respond with each event serialized on its own line, as the backend
    /// does, one chunk per line.
    pub fn with_lines(lines: &[&str]) -> Self {
        Self::with_script(
            lines
                .iter()
                .map(|l| ScriptedChunk::Data(format!("{}\n", l).into_bytes()))
                .collect(),
        )
    }

    /// Make `send` itself fail before any stream is opened.
    pub fn refuse_connections(&self) {
        *self.refuse_connect.lock().expect("mock mutex") = true;
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<SendRequest> {
        self.requests.lock().expect("mock mutex").clone()
    }
}

impl ChatTransport for MockChatTransport {
    type Stream = stream::Iter<std::vec::IntoIter<Result<Bytes>>>;

    async fn send(&self, request: &SendRequest) -> Result<Self::Stream> {
        self.requests
            .lock()
            .expect("mock mutex")
            .push(request.clone());
        if *self.refuse_connect.lock().expect("mock mutex") {
            return Err(ParleyError::Transport("mock connection refused".to_string()));
        }
        let items: Vec<Result<Bytes>> = self
            .script
            .lock()
            .expect("mock mutex")
            .iter()
            .map(|chunk| match chunk {
                ScriptedChunk::Data(bytes) => Ok(Bytes::from(bytes.clone())),
                ScriptedChunk::Fail(message) => Err(ParleyError::Transport(message.clone())),
            })
            .collect();
        Ok(stream::iter(items))
    }
}

// =============================================================================
// Tests
// =============================================================================
