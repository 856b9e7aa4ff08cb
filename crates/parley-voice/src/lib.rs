//! Parley voice crate - microphone capture, WAV encoding, transcription.
//!
//! Provides trait-based abstractions for microphone acquisition and
//! speech-to-text exchange, the capture state machine, the canonical WAV
//! encoder, and the pipeline tying them together. Includes mock
//! implementations for testing without audio hardware or a server; a real
//! cpal-backed microphone sits behind the `capture` feature.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use parley_core::error::{ParleyError, Result};

#[cfg(feature = "capture")]
pub mod capture;
pub mod http;
pub mod pipeline;
pub mod state;
pub mod wav;

pub use http::HttpSpeechToText;
pub use pipeline::{TranscribeOutcome, VoicePipeline};
pub use state::{StateMachine, VoiceState};

// =============================================================================
// Traits
// =============================================================================

/// An open capture session owning the microphone device.
///
/// The device is held for exactly the lifetime of the session: consuming it
/// with [`stop`](CaptureSession::stop) or dropping it releases the device on
/// every exit path, including when later encoding or transcription fails.
pub trait CaptureSession: Send {
    /// Stop capturing and release the device, returning all buffered
    /// samples as f32 PCM in [-1.0, 1.0].
    fn stop(self) -> Vec<f32>;
}

/// Source of microphone capture sessions.
///
/// `open` is the permission boundary: a refusal surfaces as
/// [`ParleyError::Permission`] and acquires nothing.
pub trait Microphone: Send + Sync {
    type Session: CaptureSession;

    /// Acquire the microphone and begin buffering audio.
    fn open(&self) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// Service exchanging an encoded waveform for transcribed text.
///
/// `Ok(None)` means the service found no speech in the audio; that is a
/// normal outcome, not an error.
pub trait SpeechToText: Send + Sync {
    fn transcribe(&self, wav: Vec<u8>) -> impl Future<Output = Result<Option<String>>> + Send;
}

// =============================================================================
// Mock implementations
// =============================================================================

/// Mock microphone for testing.
///
/// Yields a scripted sample buffer per session, can simulate a permission
/// refusal, and tracks whether the device is currently held so tests can
/// assert deterministic release.
#[derive(Debug, Clone, Default)]
pub struct MockMicrophone {
    samples: Arc<Mutex<Vec<f32>>>,
    deny: Arc<Mutex<bool>>,
    open_calls: Arc<AtomicUsize>,
    active_sessions: Arc<AtomicUsize>,
}

impl MockMicrophone {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next sessions will capture these samples.
    pub fn with_samples(samples: Vec<f32>) -> Self {
        let mic = Self::new();
        *mic.samples.lock().expect("mock mutex") = samples;
        mic
    }

    /// Refuse all future `open` calls.
    pub fn deny_permission(&self) {
        *self.deny.lock().expect("mock mutex") = true;
    }

    /// Grant `open` calls again after a refusal.
    pub fn allow_permission(&self) {
        *self.deny.lock().expect("mock mutex") = false;
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::Relaxed)
    }

    /// Whether no session currently holds the device.
    pub fn device_released(&self) -> bool {
        self.active_sessions.load(Ordering::Relaxed) == 0
    }
}

impl Microphone for MockMicrophone {
    type Session = MockCaptureSession;

    async fn open(&self) -> Result<MockCaptureSession> {
        self.open_calls.fetch_add(1, Ordering::Relaxed);
        if *self.deny.lock().expect("mock mutex") {
            return Err(ParleyError::Permission(
                "microphone access denied".to_string(),
            ));
        }
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        Ok(MockCaptureSession {
            samples: self.samples.lock().expect("mock mutex").clone(),
            active_sessions: Arc::clone(&self.active_sessions),
        })
    }
}

/// Session produced by [`MockMicrophone`]; releases the device on drop.
#[derive(Debug)]
pub struct MockCaptureSession {
    samples: Vec<f32>,
    active_sessions: Arc<AtomicUsize>,
}

impl CaptureSession for MockCaptureSession {
    fn stop(mut self) -> Vec<f32> {
        std::mem::take(&mut self.samples)
    }
}

impl Drop for MockCaptureSession {
    fn drop(&mut self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Mock speech-to-text service with a scripted reply.
#[derive(Debug, Default)]
pub struct MockSpeechToText {
    reply: Mutex<MockReply>,
    calls: AtomicUsize,
}

#[derive(Debug, Default)]
enum MockReply {
    #[default]
    NoSpeech,
    Text(String),
    Failure(String),
}

impl MockSpeechToText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(text: impl Into<String>) -> Self {
        let stt = Self::new();
        *stt.reply.lock().expect("mock mutex") = MockReply::Text(text.into());
        stt
    }

    pub fn failing(message: impl Into<String>) -> Self {
        let stt = Self::new();
        *stt.reply.lock().expect("mock mutex") = MockReply::Failure(message.into());
        stt
    }

    /// Number of transcription requests received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl SpeechToText for MockSpeechToText {
    async fn transcribe(&self, wav: Vec<u8>) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if wav.len() < wav::HEADER_LEN {
            return Err(ParleyError::Transcription(
                "waveform shorter than its header".to_string(),
            ));
        }
        match &*self.reply.lock().expect("mock mutex") {
            MockReply::NoSpeech => Ok(None),
            MockReply::Text(text) => Ok(Some(text.clone())),
            MockReply::Failure(message) => Err(ParleyError::Transcription(message.clone())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_microphone_session_lifecycle() {
        let mic = MockMicrophone::with_samples(vec![0.1, 0.2]);
        assert!(mic.device_released());

        let session = mic.open().await.unwrap();
        assert!(!mic.device_released());
        assert_eq!(mic.open_calls(), 1);

        let samples = session.stop();
        assert_eq!(samples, vec![0.1, 0.2]);
        assert!(mic.device_released());
    }

    #[tokio::test]
    async fn test_mock_microphone_denied() {
        let mic = MockMicrophone::new();
        mic.deny_permission();
        let err = mic.open().await.unwrap_err();
        assert!(matches!(err, ParleyError::Permission(_)));
        assert!(mic.device_released());
    }

    #[tokio::test]
    async fn test_mock_session_drop_releases_device() {
        let mic = MockMicrophone::new();
        let session = mic.open().await.unwrap();
        drop(session);
        assert!(mic.device_released());
    }

    #[tokio::test]
    async fn test_mock_stt_replies() {
        let wav = wav::encode_wav_mono16(&[0.0; 10], 16_000);

        let stt = MockSpeechToText::returning("hello");
        assert_eq!(stt.transcribe(wav.clone()).await.unwrap().as_deref(), Some("hello"));
        assert_eq!(stt.calls(), 1);

        let stt = MockSpeechToText::new();
        assert_eq!(stt.transcribe(wav.clone()).await.unwrap(), None);

        let stt = MockSpeechToText::failing("boom");
        assert!(stt.transcribe(wav).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_stt_rejects_truncated_wav() {
        let stt = MockSpeechToText::returning("hello");
        assert!(stt.transcribe(vec![1, 2, 3]).await.is_err());
    }
}
