//! Playback: synthesize one segment and play it to completion.
//!
//! This module provides:
//! * [`AudioOutput`]: the single audio resource (`rodio` in production).
//! * [`PlaybackEngine`]: fetch-then-play for one segment, plus the
//!   pause/resume/speed/stop controls the session drives.
//! * [`PlaybackError`]: error variants for a segment's playback.

pub mod engine;
pub mod output;

pub use engine::PlaybackEngine;
pub use output::{AudioOutput, RodioOutput};

pub use crate::config::FailurePolicy;

#[cfg(test)]
pub use output::MockOutput;

use thiserror::Error;

use crate::synth::SynthesisError;

/// Errors that can end (or, under [`FailurePolicy::Skip`], skip) a segment.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlaybackError {
    /// The synthesis call failed.  Never skipped.
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// The returned bytes are not playable audio.
    #[error("audio decode failed: {0}")]
    Decode(String),

    /// The output device could not be opened or written.
    #[error("audio output failed: {0}")]
    Output(String),
}

impl PlaybackError {
    /// Whether `policy` lets the session continue past this error.
    pub fn is_skippable(&self, policy: FailurePolicy) -> bool {
        policy == FailurePolicy::Skip && !matches!(self, PlaybackError::Synthesis(_))
    }
}
