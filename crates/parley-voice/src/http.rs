//! HTTP speech-to-text service backed by the transcription endpoint.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use parley_core::error::{ParleyError, Result};

use crate::SpeechToText;

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    full_text: Option<String>,
    /// Error detail returned instead of a transcript.
    #[serde(default)]
    detail: Option<String>,
}

/// Speech-to-text client posting WAV bytes as the `audio_file` field.
#[derive(Debug, Clone)]
pub struct HttpSpeechToText {
    client: Client,
    base_url: String,
}

impl HttpSpeechToText {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }
}

impl SpeechToText for HttpSpeechToText {
    async fn transcribe(&self, wav: Vec<u8>) -> Result<Option<String>> {
        let part = Part::bytes(wav)
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| ParleyError::Transcription(e.to_string()))?;
        let form = Form::new().part("audio_file", part);

        let response = self
            .client
            .post(format!("{}/api/transcribe", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ParleyError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ParleyError::Transcription(format!(
                "transcription failed with status {}",
                response.status()
            )));
        }

        let body: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| ParleyError::Serialization(e.to_string()))?;
        if let Some(detail) = body.detail {
            return Err(ParleyError::Transcription(detail));
        }
        // An empty or missing transcript is "no speech detected".
        let text = body.full_text.filter(|t| !t.trim().is_empty());
        debug!(found_speech = text.is_some(), "Transcription response received");
        Ok(text)
    }
}
