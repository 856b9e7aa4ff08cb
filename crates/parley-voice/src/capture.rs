//! Real microphone capture via cpal (behind the `capture` feature).
//!
//! Builds an input stream on the default input device and accumulates f32
//! samples in a thread-safe buffer until the session is stopped. Dropping
//! the session drops the cpal stream, which is what releases the device.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, warn};

use parley_core::error::{ParleyError, Result};

use crate::{CaptureSession, Microphone};

/// Thread-safe buffer for samples arriving on the cpal callback thread.
#[derive(Debug, Clone, Default)]
struct SampleBuffer {
    samples: Arc<Mutex<Vec<f32>>>,
}

impl SampleBuffer {
    fn push(&self, data: &[f32]) {
        if let Ok(mut buf) = self.samples.lock() {
            buf.extend_from_slice(data);
        }
    }

    fn take(&self) -> Vec<f32> {
        match self.samples.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(_) => Vec::new(),
        }
    }
}

/// Wrapper to make `cpal::Stream` storable across await points.
///
/// The stream handle is only ever kept alive or dropped (to stop capture);
/// audio callbacks run on a thread cpal manages itself.
struct SendStream(#[allow(dead_code)] cpal::Stream);

// SAFETY: the handle is never used to share data between threads; it exists
// solely so that dropping the session stops the capture stream.
unsafe impl Send for SendStream {}

/// Microphone backed by the system's default input device.
#[derive(Debug, Clone)]
pub struct CpalMicrophone {
    sample_rate: u32,
}

impl CpalMicrophone {
    /// Capture at the given sample rate (mono).
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl Microphone for CpalMicrophone {
    type Session = CpalCaptureSession;

    async fn open(&self) -> Result<CpalCaptureSession> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or_else(|| {
            ParleyError::Permission("no input device available or access denied".to_string())
        })?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let buffer = SampleBuffer::default();
        let callback_buffer = buffer.clone();
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _| callback_buffer.push(data),
                |err| warn!(error = %err, "Input stream error"),
                None,
            )
            .map_err(|e| ParleyError::Audio(format!("failed to open input stream: {}", e)))?;
        stream
            .play()
            .map_err(|e| ParleyError::Audio(format!("failed to start capture: {}", e)))?;

        debug!(device = %device_name, sample_rate = self.sample_rate, "Microphone acquired");
        Ok(CpalCaptureSession {
            stream: Some(SendStream(stream)),
            buffer,
        })
    }
}

/// Active capture session; dropping it stops the stream and releases the
/// device.
pub struct CpalCaptureSession {
    stream: Option<SendStream>,
    buffer: SampleBuffer,
}

impl CaptureSession for CpalCaptureSession {
    fn stop(mut self) -> Vec<f32> {
        // Dropping the stream stops capture before the buffer is drained.
        self.stream.take();
        self.buffer.take()
    }
}
