//! Session controller: drains one queue of segments strictly in order.
//!
//! [`SessionController::run`] is the drain loop.  It suspends at two points
//! per segment: awaiting the synthesis response and awaiting the end of
//! playback.  Control comes in through a cloneable [`SessionHandle`].
//!
//! # Flow
//!
//! ```text
//! run(request)
//!   └─▶ Extracting  (page: spawn_blocking(extract))
//!         └─▶ chunk_text ── none ──▶ Empty
//!         └─▶ for each segment:
//!               gate (sleep while paused, exit if stopped)
//!               Loading(i) ─▶ fetch ─▶ start (held while paused) ─▶ Playing(i) ─▶ finished
//!         └─▶ Finished
//! ```
//!
//! Pause never cancels work in flight: a fetch that completes while paused
//! is held until resume, and paused audio resumes in place.  Stop cancels
//! the fetch; a response that still arrives is dropped unplayed.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};

use crate::chunk::{chunk_text, Segment};
use crate::config::clamp_speed;
use crate::extract::{ContentExtractor, Document, Extraction};
use crate::playback::{PlaybackEngine, PlaybackError};
use crate::synth::VoiceParams;

use super::state::{PauseStage, SessionStatus, StatusEvent};

// ---------------------------------------------------------------------------
// Public inputs
// ---------------------------------------------------------------------------

/// What to read.
#[derive(Debug, Clone)]
pub enum ReadRequest {
    /// Literal text, e.g. the user's selection.
    Selection(String),
    /// A whole page; its main content is extracted first.
    Page(Document),
}

/// Parameters fixed for the life of a session.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub voice: VoiceParams,
    /// Initial speed; later changes go through [`SessionHandle::set_speed`].
    pub speed: f32,
    pub max_segment_chars: usize,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Run,
    Pause,
    Stop,
}

struct Shared {
    status: Mutex<SessionStatus>,
    speed: Mutex<f32>,
    control: watch::Sender<Control>,
    events: mpsc::UnboundedSender<StatusEvent>,
    engine: Arc<PlaybackEngine>,
}

impl Shared {
    fn lock_status(&self) -> MutexGuard<'_, SessionStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn speed(&self) -> f32 {
        *self.speed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `next` if legal and emit its event.  The caller holds the lock.
    fn apply(&self, status: &mut SessionStatus, next: SessionStatus) -> bool {
        if !status.can_transition_to(&next) {
            log::debug!("session: ignoring transition {status:?} -> {next:?}");
            return false;
        }
        log::debug!("session: {status:?} -> {next:?}");
        *status = next;
        // No receiver is fine.
        let _ = self.events.send(status.event());
        true
    }

    fn transition(&self, next: SessionStatus) -> bool {
        let mut status = self.lock_status();
        self.apply(&mut status, next)
    }

    /// Enter `Failed` and release the output.
    fn fail(&self, message: String) {
        log::error!("session: failed: {message}");
        if self.transition(SessionStatus::Failed(message)) {
            self.engine.stop();
        }
    }

    /// Wait while paused.  Returns `false` once stopped.
    async fn gate(&self) -> bool {
        let mut rx = self.control.subscribe();
        let control = rx.wait_for(|c| *c != Control::Pause).await.map(|c| *c);
        matches!(control, Ok(Control::Run))
    }

    /// Wait out any pause, then apply `next`.  The pause check and the
    /// transition happen under one status lock, so a pause landing in
    /// between sends the loop back to the gate.  Returns `false` once the
    /// session ended or `next` was refused.
    async fn advance(&self, next: SessionStatus) -> bool {
        loop {
            if !self.gate().await {
                return false;
            }
            let mut status = self.lock_status();
            if matches!(*status, SessionStatus::Paused { .. }) {
                continue;
            }
            return self.apply(&mut status, next);
        }
    }

    /// Resolves once the session is stopped.
    async fn stopped(&self) {
        let mut rx = self.control.subscribe();
        let _ = rx.wait_for(|c| *c == Control::Stop).await;
    }
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Cloneable control surface for a running session.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    pub fn status(&self) -> SessionStatus {
        self.shared.lock_status().clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.shared.lock_status().is_terminal()
    }

    /// Pause from `Loading` or `Playing`; a no-op anywhere else.
    pub fn pause(&self) -> bool {
        let mut status = self.shared.lock_status();
        let next = match *status {
            SessionStatus::Loading(index) => SessionStatus::Paused {
                index,
                stage: PauseStage::Fetching,
            },
            SessionStatus::Playing(index) => {
                self.shared.engine.pause();
                SessionStatus::Paused {
                    index,
                    stage: PauseStage::Playing,
                }
            }
            _ => return false,
        };
        self.shared.control.send_replace(Control::Pause);
        self.shared.apply(&mut status, next)
    }

    /// Resume a paused session: back to `Loading` if the fetch had not
    /// completed, otherwise `Playing` in place.
    pub fn resume(&self) -> bool {
        let mut status = self.shared.lock_status();
        let SessionStatus::Paused { index, stage } = *status else {
            return false;
        };
        let next = match stage {
            PauseStage::Fetching => SessionStatus::Loading(index),
            PauseStage::Fetched => SessionStatus::Playing(index),
            PauseStage::Playing => {
                self.shared.engine.resume();
                SessionStatus::Playing(index)
            }
        };
        self.shared.control.send_replace(Control::Run);
        self.shared.apply(&mut status, next)
    }

    /// Stop the session and halt its audio.  Idempotent; a no-op once the
    /// session has ended.
    pub fn stop(&self) -> bool {
        let mut status = self.shared.lock_status();
        if status.is_terminal() {
            return false;
        }
        self.shared.control.send_replace(Control::Stop);
        // Under the status lock so a concurrent start cannot slip in after.
        self.shared.engine.stop();
        self.shared.apply(&mut status, SessionStatus::Stopped)
    }

    /// Change speed.  Applies immediately to this session's audio and to
    /// every segment started afterwards.
    pub fn set_speed(&self, speed: f32) -> f32 {
        let speed = clamp_speed(speed);
        let status = self.shared.lock_status();
        *self.shared.speed.lock().unwrap_or_else(|e| e.into_inner()) = speed;
        let owns_output = matches!(
            *status,
            SessionStatus::Playing(_)
                | SessionStatus::Paused {
                    stage: PauseStage::Playing,
                    ..
                }
        );
        if owns_output {
            self.shared.engine.set_speed(speed);
        }
        speed
    }

    pub fn speed(&self) -> f32 {
        self.shared.speed()
    }
}

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

/// Outcome of trying to start a fetched segment.
enum StartOutcome {
    Started,
    Held,
    Discarded,
    Failed(PlaybackError),
}

/// Owns one session's queue and drives it to a terminal state.
pub struct SessionController {
    shared: Arc<Shared>,
    voice: VoiceParams,
    max_segment_chars: usize,
    extractor: ContentExtractor,
}

impl SessionController {
    /// Create a controller in `Idle`.  Every transition is sent on `events`.
    pub fn new(
        engine: Arc<PlaybackEngine>,
        params: SessionParams,
        events: mpsc::UnboundedSender<StatusEvent>,
    ) -> Self {
        let (control, _) = watch::channel(Control::Run);
        Self {
            shared: Arc::new(Shared {
                status: Mutex::new(SessionStatus::Idle),
                speed: Mutex::new(clamp_speed(params.speed)),
                control,
                events,
                engine,
            }),
            voice: params.voice,
            max_segment_chars: params.max_segment_chars,
            extractor: ContentExtractor::new(),
        }
    }

    /// Replace the content extractor used for page requests.
    pub fn with_extractor(mut self, extractor: ContentExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Run the session to completion and return its terminal status.
    pub async fn run(self, request: ReadRequest) -> SessionStatus {
        self.drain(request).await;
        let status = self.shared.lock_status().clone();
        log::info!("session: ended with {}", status.label());
        status
    }

    async fn drain(&self, request: ReadRequest) {
        if !self.shared.transition(SessionStatus::Extracting) {
            return;
        }

        let Some(text) = self.text_of(request).await else {
            return;
        };

        let segments = chunk_text(&text, self.max_segment_chars);
        if segments.is_empty() {
            log::info!("session: nothing to read");
            self.shared.transition(SessionStatus::Empty);
            return;
        }
        log::info!("session: {} segment(s) queued", segments.len());

        for segment in &segments {
            if !self.play_one(segment).await {
                return;
            }
        }

        // A pause that landed after the last clip ended still holds here.
        self.shared.advance(SessionStatus::Finished).await;
    }

    /// Text to read, or `None` if the session already ended.
    async fn text_of(&self, request: ReadRequest) -> Option<String> {
        match request {
            ReadRequest::Selection(text) => Some(text),
            ReadRequest::Page(doc) => {
                let extractor = self.extractor.clone();
                let extraction = tokio::select! {
                    r = tokio::task::spawn_blocking(move || extractor.extract(&doc)) => r,
                    _ = self.shared.stopped() => return None,
                };
                match extraction {
                    Ok(Extraction::Content(article)) => Some(article.text),
                    Ok(Extraction::Empty) => Some(String::new()),
                    Err(e) => {
                        self.shared.fail(format!("extraction task failed: {e}"));
                        None
                    }
                }
            }
        }
    }

    /// Fetch and play one segment.  Returns `false` when the session ended.
    async fn play_one(&self, segment: &Segment) -> bool {
        let index = segment.index();

        if !self.shared.advance(SessionStatus::Loading(index)).await {
            return false;
        }

        let fetched = tokio::select! {
            r = self.shared.engine.fetch(segment, &self.voice) => r,
            _ = self.shared.stopped() => return false,
        };
        let audio = match fetched {
            Ok(audio) => audio,
            Err(e) => {
                self.shared.fail(e.to_string());
                return false;
            }
        };

        let outcome = loop {
            match self.try_start(index, &audio) {
                StartOutcome::Held => {
                    if !self.shared.gate().await {
                        log::debug!("session: discarding audio for segment {index}, session stopped");
                        return false;
                    }
                }
                other => break other,
            }
        };

        match outcome {
            StartOutcome::Started => {}
            StartOutcome::Held | StartOutcome::Discarded => return false,
            StartOutcome::Failed(e) if self.shared.engine.skips(&e) => {
                log::warn!("session: skipping segment {index}: {e}");
                return true;
            }
            StartOutcome::Failed(e) => {
                self.shared.fail(e.to_string());
                return false;
            }
        }

        tokio::select! {
            _ = self.shared.engine.finished() => {}
            _ = self.shared.stopped() => return false,
        }
        !self.shared.lock_status().is_terminal()
    }

    /// Start `audio` unless the session was stopped or re-paused meanwhile.
    fn try_start(&self, index: usize, audio: &[u8]) -> StartOutcome {
        let mut status = self.shared.lock_status();
        if status.is_terminal() {
            log::debug!("session: discarding stale audio for segment {index}");
            return StartOutcome::Discarded;
        }
        match *status {
            SessionStatus::Paused {
                stage: PauseStage::Fetching,
                ..
            } => {
                self.shared.apply(
                    &mut status,
                    SessionStatus::Paused {
                        index,
                        stage: PauseStage::Fetched,
                    },
                );
                return StartOutcome::Held;
            }
            SessionStatus::Paused { .. } => return StartOutcome::Held,
            _ => {}
        }

        if let Err(e) = self.shared.engine.start(audio.to_vec(), self.shared.speed()) {
            return StartOutcome::Failed(e);
        }
        if *status == SessionStatus::Loading(index) {
            self.shared.apply(&mut status, SessionStatus::Playing(index));
        }
        StartOutcome::Started
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
