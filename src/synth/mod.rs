//! Speech synthesis: text segment in, encoded audio bytes out.
//!
//! This module provides:
//! * [`SpeechSynthesizer`]: async trait implemented by all synthesis backends.
//! * [`ElevenLabsClient`]: REST client for the ElevenLabs text-to-speech API.
//! * [`SynthesisRequest`]: one segment plus voice/model parameters.
//! * [`SynthesisError`]: error variants for synthesis calls.
//!
//! There is no retry anywhere in this module: a failed call is reported to
//! the session, which ends the run.

pub mod elevenlabs;

pub use elevenlabs::{ElevenLabsClient, VoiceInfo};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::SynthesisConfig;

// ---------------------------------------------------------------------------
// SynthesisError
// ---------------------------------------------------------------------------

/// Errors that can occur while synthesizing one segment.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SynthesisError {
    /// The service answered with a non-success status.
    #[error("API error: {status} - {body}")]
    Status { status: u16, body: String },

    /// HTTP transport or connection error.
    #[error("request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("synthesis request timed out")]
    Timeout,

    /// The service answered 2xx with no audio.
    #[error("service returned no audio")]
    EmptyAudio,
}

impl From<reqwest::Error> for SynthesisError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SynthesisError::Timeout
        } else {
            SynthesisError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// SynthesisRequest
// ---------------------------------------------------------------------------

/// Everything a backend needs to voice one segment.
#[derive(Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
    pub credential: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
}

// Keep the credential out of debug logs.
impl std::fmt::Debug for SynthesisRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisRequest")
            .field("text_len", &self.text.len())
            .field("voice_id", &self.voice_id)
            .field("model_id", &self.model_id)
            .field("stability", &self.stability)
            .field("similarity_boost", &self.similarity_boost)
            .finish_non_exhaustive()
    }
}

/// Voice parameters for a whole session; combined with each segment's text
/// to form a [`SynthesisRequest`].
#[derive(Clone, PartialEq)]
pub struct VoiceParams {
    pub voice_id: String,
    pub credential: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
}

impl VoiceParams {
    /// Build from config.  Returns `None` when no credential is configured.
    pub fn from_config(config: &SynthesisConfig) -> Option<Self> {
        let credential = config.credential()?.to_string();
        Some(Self {
            voice_id: config.voice_id.clone(),
            credential,
            model_id: config.model_id.clone(),
            stability: config.stability,
            similarity_boost: config.similarity_boost,
        })
    }

    pub fn request(&self, text: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_string(),
            voice_id: self.voice_id.clone(),
            credential: self.credential.clone(),
            model_id: self.model_id.clone(),
            stability: self.stability,
            similarity_boost: self.similarity_boost,
        }
    }
}

impl std::fmt::Debug for VoiceParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceParams")
            .field("voice_id", &self.voice_id)
            .field("model_id", &self.model_id)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// SpeechSynthesizer trait
// ---------------------------------------------------------------------------

/// Async trait for text-to-speech backends.
///
/// Implementors must be `Send + Sync` so they can be shared behind an
/// `Arc<dyn SpeechSynthesizer>`.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `request.text`, returning encoded audio (e.g. MP3).
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, SynthesisError>;
}

// ---------------------------------------------------------------------------
// MockSynthesizer (test only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockSynthesizer;

#[cfg(test)]
mod mock {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use tokio::sync::Semaphore;

    use super::*;

    /// Returns the segment text as "audio" bytes.
    ///
    /// * `fail_on(text, status)` makes the request for `text` fail.
    /// * `gated()` holds every request until [`release`](Self::release)
    ///   adds a permit, so tests can act while a fetch is in flight.
    #[derive(Clone, Default)]
    pub struct MockSynthesizer {
        requests: Arc<Mutex<Vec<String>>>,
        failures: Arc<Mutex<HashMap<String, u16>>>,
        gate: Option<Arc<Semaphore>>,
    }

    impl MockSynthesizer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn gated() -> Self {
            Self {
                gate: Some(Arc::new(Semaphore::new(0))),
                ..Self::default()
            }
        }

        pub fn fail_on(self, text: &str, status: u16) -> Self {
            self.failures
                .lock()
                .unwrap()
                .insert(text.to_string(), status);
            self
        }

        /// Let `n` gated requests complete.
        pub fn release(&self, n: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(n);
            }
        }

        /// Texts of every request received so far, in order.
        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for MockSynthesizer {
        async fn synthesize(
            &self,
            request: &SynthesisRequest,
        ) -> Result<Vec<u8>, SynthesisError> {
            self.requests.lock().unwrap().push(request.text.clone());

            if let Some(gate) = &self.gate {
                let permit = gate.acquire().await.expect("gate closed");
                permit.forget();
            }

            let failure = self.failures.lock().unwrap().get(&request.text).copied();
            match failure {
                Some(status) => Err(SynthesisError::Status {
                    status,
                    body: "mock failure".into(),
                }),
                None => Ok(request.text.clone().into_bytes()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
