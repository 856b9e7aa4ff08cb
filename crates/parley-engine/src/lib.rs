//! Parley engine crate - the conversational engine facade.
//!
//! Ties the subsystem crates together: the transcript-reducing send
//! pipeline ([`engine`]), the chat transport boundary ([`transport`]), and
//! a ready-wired [`Parley`] client binding uploads, corpora, history, and
//! voice capture to one backend.

use std::time::Duration;

use reqwest::Client;

use parley_core::config::ParleyConfig;
use parley_core::error::{ParleyError, Result};
use parley_core::types::Message;
use parley_corpus::{CorpusManager, HttpCorpusApi};
use parley_history::{HistoryCache, HttpHistoryApi};
use parley_upload::{HttpObjectStore, StagingArea};
use parley_voice::{HttpSpeechToText, Microphone, VoicePipeline};

pub mod engine;
pub mod transport;

pub use engine::ChatEngine;
pub use transport::{ChatTransport, HttpChatTransport, MockChatTransport, SendRequest};

/// The fully wired client engine for one conversation context.
///
/// Every subsystem is independently usable through its field; `send`
/// composes the common path (staged uploads + active corpora + query).
pub struct Parley<M: Microphone> {
    pub chat: ChatEngine<HttpChatTransport>,
    pub uploads: StagingArea<HttpObjectStore>,
    pub corpora: CorpusManager<HttpCorpusApi, HttpObjectStore>,
    pub history: HistoryCache<HttpHistoryApi>,
    pub voice: VoicePipeline<M, HttpSpeechToText>,
}

impl<M: Microphone> Parley<M> {
    /// Wire every subsystem against the configured backend.
    ///
    /// Non-streaming calls share a client with the configured timeout; the
    /// chat stream uses an untimed client so long tool runs are not cut
    /// off mid-response.
    pub fn new(config: &ParleyConfig, mic: M) -> Result<Self> {
        let base = &config.backend.base_url;
        let api_client = Client::builder()
            .timeout(Duration::from_secs(config.backend.timeout_secs))
            .build()
            .map_err(|e| ParleyError::Config(e.to_string()))?;
        let stream_client = Client::new();

        Ok(Self {
            chat: ChatEngine::new(
                HttpChatTransport::new(stream_client, base.clone()),
                base.clone(),
                config.backend.context_length,
            ),
            uploads: StagingArea::new(
                HttpObjectStore::new(api_client.clone(), base.clone()),
                config.upload.max_images,
                config.upload.max_files,
            ),
            corpora: CorpusManager::new(
                HttpCorpusApi::new(api_client.clone(), base.clone()),
                HttpObjectStore::new(api_client.clone(), base.clone()),
            ),
            history: HistoryCache::new(
                HttpHistoryApi::new(api_client.clone(), base.clone()),
                Duration::from_millis(config.history.debounce_ms),
            ),
            voice: VoicePipeline::new(
                mic,
                HttpSpeechToText::new(api_client, base.clone()),
                config.voice.sample_rate,
            ),
        })
    }

    /// Send a query with the staged uploads and the active corpora.
    pub async fn send(&mut self, query: impl Into<String>) -> Result<Message> {
        let rags = self.corpora.active_set();
        self.chat.send(&mut self.uploads, query, rags).await
    }
}

// =============================================================================
// Tests
// =============================================================================
