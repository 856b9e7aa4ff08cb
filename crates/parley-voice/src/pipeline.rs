//! The voice capture pipeline: record, encode, transcribe, append.
//!
//! Drives the capture state machine end to end. The microphone device is
//! owned by the capture session for exactly the Recording phase; stopping
//! releases it before any encoding or network work, so a failure later in
//! the pipeline can never leak the device.

use tracing::{debug, info};

use parley_core::error::Result;

use crate::state::{StateMachine, VoiceState};
use crate::{wav, CaptureSession, Microphone, SpeechToText};

/// Result of a confirmed transcription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TranscribeOutcome {
    /// The service returned transcribed text (already appended to the
    /// pending input).
    Text(String),
    /// Nothing was captured, or the service found no speech. Not an error;
    /// the pending input is untouched.
    NoSpeech,
}

/// Capture-to-text pipeline over a microphone and a transcription service.
pub struct VoicePipeline<M: Microphone, T: SpeechToText> {
    machine: StateMachine,
    mic: M,
    stt: T,
    sample_rate: u32,
    session: Option<M::Session>,
    captured: Vec<f32>,
    pending: String,
}

impl<M: Microphone, T: SpeechToText> VoicePipeline<M, T> {
    pub fn new(mic: M, stt: T, sample_rate: u32) -> Self {
        Self {
            machine: StateMachine::new(),
            mic,
            stt,
            sample_rate,
            session: None,
            captured: Vec::new(),
            pending: String::new(),
        }
    }

    pub fn state(&self) -> VoiceState {
        self.machine.current()
    }

    /// The input text accumulated so far (typed plus transcribed).
    pub fn pending_input(&self) -> &str {
        &self.pending
    }

    /// Replace the pending input (e.g. mirroring what the user typed).
    pub fn set_pending_input(&mut self, text: impl Into<String>) {
        self.pending = text.into();
    }

    /// Take the pending input for a send, leaving it empty.
    pub fn take_pending_input(&mut self) -> String {
        std::mem::take(&mut self.pending)
    }

    /// Request the microphone and begin recording.
    ///
    /// A refusal leaves the pipeline back in `Idle` with a permission error;
    /// the user must explicitly retry.
    pub async fn start(&mut self) -> Result<()> {
        self.machine.transition(VoiceState::RequestingPermission)?;
        match self.mic.open().await {
            Ok(session) => {
                self.machine.transition(VoiceState::Recording)?;
                self.session = Some(session);
                debug!("Recording started");
                Ok(())
            }
            Err(e) => {
                self.machine.transition(VoiceState::Idle)?;
                Err(e)
            }
        }
    }

    /// Stop recording, releasing the device and holding the captured audio
    /// until the user confirms or discards it. Returns the sample count.
    pub fn stop(&mut self) -> Result<usize> {
        self.machine.transition(VoiceState::StoppedAwaitingConfirm)?;
        let samples = match self.session.take() {
            Some(session) => session.stop(),
            None => Vec::new(),
        };
        debug!(samples = samples.len(), "Recording stopped, device released");
        self.captured = samples;
        Ok(self.captured.len())
    }

    /// Abort an active recording, discarding all captured audio.
    pub fn cancel(&mut self) -> Result<()> {
        self.machine.transition(VoiceState::Idle)?;
        self.session = None;
        self.captured.clear();
        info!("Recording cancelled");
        Ok(())
    }

    /// Discard a stopped take without transcribing it.
    pub fn discard(&mut self) -> Result<()> {
        self.machine.transition(VoiceState::Idle)?;
        self.captured.clear();
        Ok(())
    }

    /// Encode the held audio and exchange it for text.
    ///
    /// Zero captured samples short-circuit to `NoSpeech` without touching
    /// the network. On success the text is appended to the pending input,
    /// space-separated when the pending input is non-empty.
    pub async fn transcribe(&mut self) -> Result<TranscribeOutcome> {
        self.machine.transition(VoiceState::Transcribing)?;
        let samples = std::mem::take(&mut self.captured);

        let outcome = if samples.is_empty() {
            debug!("No samples captured; skipping transcription request");
            TranscribeOutcome::NoSpeech
        } else {
            let encoded = wav::encode_wav_mono16(&samples, self.sample_rate);
            match self.stt.transcribe(encoded).await {
                Ok(Some(text)) if !text.trim().is_empty() => TranscribeOutcome::Text(text),
                Ok(_) => TranscribeOutcome::NoSpeech,
                Err(e) => {
                    self.machine.transition(VoiceState::Idle)?;
                    return Err(e);
                }
            }
        };

        self.machine.transition(VoiceState::Idle)?;
        if let TranscribeOutcome::Text(ref text) = outcome {
            self.append_pending(text);
            info!(text_len = text.len(), "Transcription appended to pending input");
        }
        Ok(outcome)
    }

    fn append_pending(&mut self, text: &str) {
        if self.pending.is_empty() {
            self.pending.push_str(text);
        } else {
            self.pending.push(' ');
            self.pending.push_str(text);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockMicrophone, MockSpeechToText};
    use parley_core::error::ParleyError;

    fn pipeline(
        mic: MockMicrophone,
        stt: MockSpeechToText,
    ) -> VoicePipeline<MockMicrophone, MockSpeechToText> {
        VoicePipeline::new(mic, stt, 16_000)
    }

    #[tokio::test]
    async fn test_happy_path_appends_transcript() {
        let mic = MockMicrophone::with_samples(vec![0.1; 1600]);
        let stt = MockSpeechToText::returning("今天天气怎么样");
        let mut p = pipeline(mic, stt);

        p.start().await.unwrap();
        assert_eq!(p.state(), VoiceState::Recording);
        let captured = p.stop().unwrap();
        assert_eq!(captured, 1600);
        assert_eq!(p.state(), VoiceState::StoppedAwaitingConfirm);

        let outcome = p.transcribe().await.unwrap();
        assert_eq!(outcome, TranscribeOutcome::Text("今天天气怎么样".to_string()));
        assert_eq!(p.pending_input(), "今天天气怎么样");
        assert_eq!(p.state(), VoiceState::Idle);
    }

    #[tokio::test]
    async fn test_transcript_appends_space_separated() {
        let mic = MockMicrophone::with_samples(vec![0.1; 160]);
        let stt = MockSpeechToText::returning("的天气");
        let mut p = pipeline(mic, stt);
        p.set_pending_input("武汉");

        p.start().await.unwrap();
        p.stop().unwrap();
        p.transcribe().await.unwrap();
        assert_eq!(p.pending_input(), "武汉 的天气");
    }

    #[tokio::test]
    async fn test_permission_denied_is_terminal_until_retry() {
        let mic = MockMicrophone::new();
        mic.deny_permission();
        let mut p = pipeline(mic, MockSpeechToText::new());

        let err = p.start().await.unwrap_err();
        assert!(matches!(err, ParleyError::Permission(_)));
        assert_eq!(p.state(), VoiceState::Idle);
        // An explicit retry is allowed (and fails the same way while denied).
        assert!(p.start().await.is_err());
    }

    // Scenario: recording stopped with zero captured samples.
    #[tokio::test]
    async fn test_zero_samples_is_no_speech_without_network() {
        let mic = MockMicrophone::with_samples(vec![]);
        let stt = MockSpeechToText::returning("should never be used");
        let mut p = pipeline(mic, stt);

        p.start().await.unwrap();
        p.stop().unwrap();
        let outcome = p.transcribe().await.unwrap();

        assert_eq!(outcome, TranscribeOutcome::NoSpeech);
        assert_eq!(p.pending_input(), "");
        assert_eq!(p.stt.calls(), 0);
        assert_eq!(p.state(), VoiceState::Idle);
    }

    #[tokio::test]
    async fn test_empty_transcript_is_no_speech_not_error() {
        let mic = MockMicrophone::with_samples(vec![0.1; 160]);
        let stt = MockSpeechToText::new(); // replies with no speech
        let mut p = pipeline(mic, stt);

        p.start().await.unwrap();
        p.stop().unwrap();
        let outcome = p.transcribe().await.unwrap();
        assert_eq!(outcome, TranscribeOutcome::NoSpeech);
        assert_eq!(p.stt.calls(), 1);
    }

    #[tokio::test]
    async fn test_stop_releases_device_even_if_transcription_fails() {
        let mic = MockMicrophone::with_samples(vec![0.1; 160]);
        let stt = MockSpeechToText::failing("service unavailable");
        let mut p = pipeline(mic, stt);

        p.start().await.unwrap();
        p.stop().unwrap();
        assert!(p.mic.device_released());

        let err = p.transcribe().await.unwrap_err();
        assert!(matches!(err, ParleyError::Transcription(_)));
        assert_eq!(p.state(), VoiceState::Idle);
        assert!(p.mic.device_released());
    }

    #[tokio::test]
    async fn test_cancel_releases_device_and_discards_audio() {
        let mic = MockMicrophone::with_samples(vec![0.1; 160]);
        let mut p = pipeline(mic, MockSpeechToText::new());

        p.start().await.unwrap();
        p.cancel().unwrap();
        assert_eq!(p.state(), VoiceState::Idle);
        assert!(p.mic.device_released());
    }

    #[tokio::test]
    async fn test_discard_skips_transcription() {
        let mic = MockMicrophone::with_samples(vec![0.1; 160]);
        let mut p = pipeline(mic, MockSpeechToText::new());

        p.start().await.unwrap();
        p.stop().unwrap();
        p.discard().unwrap();
        assert_eq!(p.state(), VoiceState::Idle);
        assert_eq!(p.stt.calls(), 0);
    }

    #[tokio::test]
    async fn test_start_while_recording_is_rejected() {
        let mic = MockMicrophone::new();
        let mut p = pipeline(mic, MockSpeechToText::new());

        p.start().await.unwrap();
        assert!(p.start().await.is_err());
        // The rejection did not disturb the active recording.
        assert_eq!(p.state(), VoiceState::Recording);
        assert_eq!(p.mic.open_calls(), 1);
    }

    #[tokio::test]
    async fn test_stop_without_recording_is_rejected() {
        let mut p = pipeline(MockMicrophone::new(), MockSpeechToText::new());
        assert!(p.stop().is_err());
        assert_eq!(p.state(), VoiceState::Idle);
    }

    #[tokio::test]
    async fn test_retry_after_denial_succeeds_once_granted() {
        let mic = MockMicrophone::with_samples(vec![0.2; 16]);
        let mut p = pipeline(mic, MockSpeechToText::returning("ok"));

        // First attempt denied, second granted.
        p.mic.deny_permission();
        assert!(p.start().await.is_err());
        p.mic.allow_permission();
        p.start().await.unwrap();
        assert_eq!(p.state(), VoiceState::Recording);
    }
}
