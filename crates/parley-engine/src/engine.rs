//! The send pipeline: staging snapshot in, settled assistant message out.

use futures::StreamExt;
use tracing::{debug, warn};

use parley_core::error::{ParleyError, Result};
use parley_core::types::{Attachment, AttachmentKind, Message};
use parley_stream::{LineDecoder, Transcript};
use parley_upload::{ObjectStore, StagingArea, UploadKind};

use crate::transport::{ChatTransport, SendRequest};

/// Drives one conversation context against the chat transport.
///
/// Owns the transcript (the single writer path into it) and composes a
/// send: busy check, staging snapshot, placeholder open, stream decode and
/// reduce, settle. Concurrent sends for the same conversation are rejected
/// with a busy error before anything is staged or sent.
pub struct ChatEngine<C: ChatTransport> {
    transport: C,
    transcript: Transcript,
    context_length: u32,
}

impl<C: ChatTransport> ChatEngine<C> {
    pub fn new(transport: C, base_url: impl Into<String>, context_length: u32) -> Self {
        Self {
            transport,
            transcript: Transcript::new(base_url),
            context_length,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_streaming(&self) -> bool {
        self.transcript.is_streaming()
    }

    /// Send a query with the currently staged attachments and active
    /// corpora, streaming the response into the transcript.
    ///
    /// The staging area is consumed by a successful open (the message now
    /// references the uploaded objects; they stay on the server). Returns
    /// the settled assistant message; a backend `error` event settles the
    /// exchange and is carried in the message's `error` field, while a
    /// transport failure also surfaces as `Err` with the partial transcript
    /// retained.
    pub async fn send<S: ObjectStore>(
        &mut self,
        staging: &mut StagingArea<S>,
        query: impl Into<String>,
        rags: Vec<String>,
    ) -> Result<Message> {
        let query = query.into();
        let snapshot = staging.snapshot();
        let attachments = staged_attachments(staging);

        // Rejects with busy while a stream is active; staging is untouched.
        let message_id = self.transcript.begin_exchange(query.clone(), attachments)?;
        staging.drain();

        let request = SendRequest {
            message_id: message_id.to_string(),
            conversation_id: self.transcript.conversation_id().to_string(),
            query,
            context_length: self.context_length,
            images: snapshot.image_paths,
            files: snapshot.file_paths,
            rags,
        };
        debug!(
            message_id = %request.message_id,
            images = request.images.len(),
            files = request.files.len(),
            rags = request.rags.len(),
            "Opening response stream"
        );

        let mut stream = match self.transport.send(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                self.transcript.settle_error(e.to_string());
                return Err(e);
            }
        };

        let mut decoder = LineDecoder::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    for event in decoder.push(&bytes) {
                        self.transcript.apply(event);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Transport failed mid-stream");
                    self.transcript.settle_error(e.to_string());
                    return Err(e);
                }
            }
        }
        // A trailing partial line is a protocol warning, not a failure.
        let _ = decoder.finish();
        self.transcript.settle();

        self.transcript
            .messages()
            .last()
            .cloned()
            .ok_or_else(|| ParleyError::Protocol("transcript empty after settle".to_string()))
    }
}

/// Build the user message's attachments from the staged slots.
fn staged_attachments<S: ObjectStore>(staging: &StagingArea<S>) -> Vec<Attachment> {
    let images = staging.slots(UploadKind::Images).iter().map(|s| Attachment {
        kind: AttachmentKind::Image,
        url: s.url.clone(),
        name: s.name.clone(),
    });
    let files = staging.slots(UploadKind::Files).iter().map(|s| Attachment {
        kind: AttachmentKind::from_path(&s.name),
        url: s.url.clone(),
        name: s.name.clone(),
    });
    images.chain(files).collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockChatTransport, ScriptedChunk};
    use parley_core::types::Role;
    use parley_stream::ExchangePhase;
    use parley_upload::{LocalFile, MockObjectStore};

    fn engine(transport: MockChatTransport) -> ChatEngine<MockChatTransport> {
        ChatEngine::new(transport, "http://localhost:8000", 10)
    }

    fn staging() -> StagingArea<MockObjectStore> {
        StagingArea::new(MockObjectStore::new(), 5, 5)
    }

    #[tokio::test]
    async fn test_send_reduces_full_stream() {
        let transport = MockChatTransport::with_lines(&[
            r#"{"type":"thinking_process","content":"检索中"}"#,
            r#"{"type":"thinking_process","content":"检索中"}"#,
            r#"{"type":"result","content":"天气晴"}"#,
        ]);
        let mut engine = engine(transport);
        let mut staging = staging();

        let message = engine.send(&mut staging, "武汉天气", vec![]).await.unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.text, "天气晴");
        assert_eq!(message.reasoning.steps(), &["检索中".to_string()]);
        assert!(message.error.is_none());
        assert_eq!(engine.transcript().phase(), ExchangePhase::SettledOk);
    }

    #[tokio::test]
    async fn test_send_payload_carries_staging_and_rags() {
        let transport =
            MockChatTransport::with_lines(&[r#"{"type":"result","content":"ok"}"#]);
        let mut engine = engine(transport);
        let mut staging = staging();
        staging
            .add(UploadKind::Images, vec![LocalFile::new("a.png", vec![1])])
            .await
            .unwrap();

        engine
            .send(&mut staging, "看图", vec!["docs".to_string()])
            .await
            .unwrap();

        let requests = engine.transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].images.len(), 1);
        assert!(requests[0].images[0].starts_with("images/"));
        assert_eq!(requests[0].rags, vec!["docs".to_string()]);
        assert_eq!(requests[0].context_length, 10);

        // The user message displays the attachment; staging is spent.
        assert_eq!(engine.transcript().messages()[0].attachments.len(), 1);
        assert!(staging.snapshot().is_empty());
        // Consuming the slots did not delete the remote objects.
        assert!(staging.store().delete_calls().is_empty());
    }

    #[tokio::test]
    async fn test_connection_failure_settles_error() {
        let transport = MockChatTransport::new();
        transport.refuse_connections();
        let mut engine = engine(transport);
        let mut staging = staging();

        let err = engine.send(&mut staging, "hi", vec![]).await.unwrap_err();
        assert!(matches!(err, ParleyError::Transport(_)));
        assert_eq!(engine.transcript().phase(), ExchangePhase::SettledError);
        // The placeholder carries the failure.
        let last = engine.transcript().messages().last().unwrap();
        assert!(last.error.is_some());
    }

    #[tokio::test]
    async fn test_mid_stream_failure_retains_partial_content() {
        let transport = MockChatTransport::with_script(vec![
            ScriptedChunk::Data(
                format!("{}\n", r#"{"type":"thinking_process","content":"查询中"}"#).into_bytes(),
            ),
            ScriptedChunk::Fail("connection reset".to_string()),
        ]);
        let mut engine = engine(transport);
        let mut staging = staging();

        let err = engine.send(&mut staging, "hi", vec![]).await.unwrap_err();
        assert!(matches!(err, ParleyError::Transport(_)));

        let last = engine.transcript().messages().last().unwrap();
        assert_eq!(last.reasoning.steps(), &["查询中".to_string()]);
        assert_eq!(last.error.as_deref(), Some("Transport error: connection reset"));
    }

    #[tokio::test]
    async fn test_backend_error_event_is_ok_with_message_error() {
        let transport = MockChatTransport::with_lines(&[
            r#"{"type":"thinking_process","content":"分析"}"#,
            r#"{"type":"error","content":"处理失败"}"#,
        ]);
        let mut engine = engine(transport);
        let mut staging = staging();

        let message = engine.send(&mut staging, "hi", vec![]).await.unwrap();
        assert_eq!(message.error.as_deref(), Some("处理失败"));
        assert_eq!(engine.transcript().phase(), ExchangePhase::SettledError);
    }

    #[tokio::test]
    async fn test_chunks_split_mid_line_decode_identically() {
        let line = r#"{"type":"result","content":"天气晴"}"#;
        let bytes = format!("{}\n", line).into_bytes();
        let (left, right) = bytes.split_at(13);
        let transport = MockChatTransport::with_script(vec![
            ScriptedChunk::Data(left.to_vec()),
            ScriptedChunk::Data(right.to_vec()),
        ]);
        let mut engine = engine(transport);
        let mut staging = staging();

        let message = engine.send(&mut staging, "q", vec![]).await.unwrap();
        assert_eq!(message.text, "天气晴");
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_abort_stream() {
        let transport = MockChatTransport::with_lines(&[
            "{broken",
            r#"{"type":"result","content":"ok"}"#,
        ]);
        let mut engine = engine(transport);
        let mut staging = staging();

        let message = engine.send(&mut staging, "q", vec![]).await.unwrap();
        assert_eq!(message.text, "ok");
        assert!(message.error.is_none());
    }

    #[tokio::test]
    async fn test_tool_complete_then_result_keeps_attachment() {
        let transport = MockChatTransport::with_lines(&[
            r#"{"type":"tool_complete","result":{"result":"输出路径：output/img/a.png","formatted_result":"已生成"}}"#,
            r#"{"type":"result","content":"给你画好了"}"#,
        ]);
        let mut engine = engine(transport);
        let mut staging = staging();

        let message = engine.send(&mut staging, "画图", vec![]).await.unwrap();
        assert_eq!(message.text, "给你画好了");
        assert_eq!(message.attachments.len(), 1);
        assert_eq!(
            message.attachments[0].url,
            "http://localhost:8000/static/output/img/a.png"
        );
    }

    #[tokio::test]
    async fn test_next_send_allowed_after_settled_stream() {
        let transport = MockChatTransport::with_lines(&[r#"{"type":"result","content":"one"}"#]);
        let mut engine = engine(transport);
        let mut staging = staging();

        engine.send(&mut staging, "first", vec![]).await.unwrap();
        engine.send(&mut staging, "second", vec![]).await.unwrap();
        // Two exchanges, four messages, in order.
        let roles: Vec<Role> = engine.transcript().messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
    }
}
