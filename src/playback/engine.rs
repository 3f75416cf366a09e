//! Playback engine: one segment in, audio out.
//!
//! The engine is stateless between segments: it owns no queue.  The session
//! controller calls [`fetch`](PlaybackEngine::fetch) and
//! [`start`](PlaybackEngine::start) separately so it can honour a pause that
//! lands between the two, and asks [`skips`](PlaybackEngine::skips) whether
//! a failed start ends the session.

use std::sync::Arc;

use crate::chunk::Segment;
use crate::synth::{SpeechSynthesizer, SynthesisError, VoiceParams};

use super::{AudioOutput, FailurePolicy, PlaybackError};

/// Shared by every session in the process; holds the only [`AudioOutput`].
pub struct PlaybackEngine {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    output: Arc<dyn AudioOutput>,
    policy: FailurePolicy,
}

impl PlaybackEngine {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        output: Arc<dyn AudioOutput>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            synthesizer,
            output,
            policy,
        }
    }

    /// Request audio for `segment`.  No retry.
    pub async fn fetch(
        &self,
        segment: &Segment,
        voice: &VoiceParams,
    ) -> Result<Vec<u8>, SynthesisError> {
        log::debug!(
            "playback: fetching segment {} ({} chars): {:?}",
            segment.index(),
            segment.char_len(),
            segment.preview(40)
        );
        let audio = self.synthesizer.synthesize(&voice.request(segment.text())).await?;
        log::debug!(
            "playback: segment {} fetched, {} bytes",
            segment.index(),
            audio.len()
        );
        Ok(audio)
    }

    /// Decode `audio` and start it at `speed`, replacing anything playing.
    pub fn start(&self, audio: Vec<u8>, speed: f32) -> Result<(), PlaybackError> {
        self.output.start(audio, speed)
    }

    /// Resolve when the clip in progress ends or is stopped.
    pub async fn finished(&self) {
        self.output.finished().await
    }

    /// Whether the session moves past `error` under this engine's policy.
    /// Synthesis errors never skip.
    pub fn skips(&self, error: &PlaybackError) -> bool {
        error.is_skippable(self.policy)
    }

    pub fn pause(&self) {
        self.output.pause();
    }

    pub fn resume(&self) {
        self.output.resume();
    }

    /// Applies to the clip in progress immediately.
    pub fn set_speed(&self, speed: f32) {
        self.output.set_speed(speed);
    }

    /// Halt playback and drop buffered audio.  Idempotent.
    pub fn stop(&self) {
        self.output.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
