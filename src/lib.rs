//! Read web pages and text aloud with ElevenLabs voices.
//!
//! ```text
//! Document ──extract──▶ text ──chunk──▶ segments ──synth──▶ audio ──▶ rodio
//!                          SessionController drains them in order;
//!                          Coordinator decides which context owns it.
//! ```

pub mod chunk;
pub mod config;
pub mod coordinator;
pub mod extract;
pub mod playback;
pub mod session;
pub mod synth;
