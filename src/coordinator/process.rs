//! The process-wide authority over which context owns the
//! active session.
//!
//! # Start flow
//!
//! ```text
//! start_by_selection / start_by_page
//!   └─▶ load settings ── no credential ──▶ "Error: No API key configured"
//!   └─▶ resolve active context
//!   └─▶ [transition lock]
//!         probe (Ping) ── no answer ──▶ install agent, settle
//!         stop previous owner, await ack   (if different context)
//!         owner = target
//!         send Speak / SpeakPage
//! ```
//!
//! Observers read a cached [`StateSnapshot`] through
//! [`get_state`](Coordinator::get_state) and receive every change on a
//! `broadcast` channel.  The cache is fed by
//! [`spawn_event_pump`](Coordinator::spawn_event_pump), which accepts status
//! events from the owner only and resets to Idle when the owner disappears.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{clamp_speed, AppConfig, CoordinatorConfig, SettingsStore};
use crate::extract::Extraction;
use crate::session::{SessionParams, StatusEvent};
use crate::synth::VoiceParams;

use super::context::{AgentCommand, ContextError, ContextHost, ContextId, HostEvent};

/// Label published when a read is requested without a credential.
pub const MISSING_CREDENTIAL_LABEL: &str = "Error: No API key configured";

const BROADCAST_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// CoordinatorError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("No API key configured")]
    MissingCredential,

    #[error("no active context to read from")]
    NoTargetContext,

    /// The target stopped answering between provisioning and dispatch.
    #[error("{0} is unreachable")]
    Unreachable(ContextId),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("settings: {0:#}")]
    Settings(anyhow::Error),
}

// ---------------------------------------------------------------------------
// StateSnapshot
// ---------------------------------------------------------------------------

/// What observers see.  The default is the idle, ownerless snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub is_playing: bool,
    pub is_paused: bool,
    pub status_label: String,
    pub owner: Option<ContextId>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self::from_event(&StatusEvent::default(), None)
    }
}

impl StateSnapshot {
    fn from_event(event: &StatusEvent, owner: Option<ContextId>) -> Self {
        Self {
            is_playing: event.is_playing,
            is_paused: event.is_paused,
            status_label: event.label.clone(),
            owner,
        }
    }
}

#[derive(Debug, Default)]
struct OwnershipRecord {
    owner: Option<ContextId>,
    snapshot: StateSnapshot,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

struct Inner {
    host: Arc<dyn ContextHost>,
    settings: Arc<dyn SettingsStore>,
    config: CoordinatorConfig,
    record: Mutex<OwnershipRecord>,
    updates: broadcast::Sender<StateSnapshot>,
    /// Serialises ownership changes (start and stop).
    transition: tokio::sync::Mutex<()>,
}

/// Cheap to clone; all clones share one ownership record.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(
        host: Arc<dyn ContextHost>,
        settings: Arc<dyn SettingsStore>,
        config: CoordinatorConfig,
    ) -> Self {
        let (updates, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                host,
                settings,
                config,
                record: Mutex::new(OwnershipRecord::default()),
                updates,
                transition: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn record(&self) -> MutexGuard<'_, OwnershipRecord> {
        self.inner.record.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn owner(&self) -> Option<ContextId> {
        self.record().owner
    }

    /// Replace the snapshot and broadcast it.  No observers is fine.
    fn publish(&self, record: &mut OwnershipRecord, snapshot: StateSnapshot) {
        record.snapshot = snapshot.clone();
        let _ = self.inner.updates.send(snapshot);
    }

    fn reset(&self) {
        let mut record = self.record();
        record.owner = None;
        self.publish(&mut record, StateSnapshot::default());
    }

    // -----------------------------------------------------------------------
    // Observer surface
    // -----------------------------------------------------------------------

    /// Cached snapshot; never contacts the owner.
    pub fn get_state(&self) -> StateSnapshot {
        self.record().snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateSnapshot> {
        self.inner.updates.subscribe()
    }

    /// Feed host events into the cached snapshot until `events` closes.
    pub fn spawn_event_pump(&self, mut events: mpsc::UnboundedReceiver<HostEvent>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                this.handle_host_event(event);
            }
            log::debug!("coordinator: host event channel closed");
        })
    }

    pub fn handle_host_event(&self, event: HostEvent) {
        let mut record = self.record();
        match event {
            HostEvent::Status { context, event } => {
                if record.owner != Some(context) {
                    log::debug!("coordinator: ignoring status from non-owner {context}");
                    return;
                }
                let snapshot = StateSnapshot::from_event(&event, Some(context));
                self.publish(&mut record, snapshot);
            }
            HostEvent::AgentLost(context) => {
                if record.owner == Some(context) {
                    log::info!("coordinator: owner {context} disappeared, resetting to idle");
                    record.owner = None;
                    self.publish(&mut record, StateSnapshot::default());
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Read `text` in the active context.
    pub async fn start_by_selection(&self, text: &str) -> Result<ContextId, CoordinatorError> {
        let text = text.to_string();
        self.start(move |params| AgentCommand::Speak { text, params })
            .await
    }

    /// Extract and read the active context's page.
    pub async fn start_by_page(&self) -> Result<ContextId, CoordinatorError> {
        self.start(|params| AgentCommand::SpeakPage { params }).await
    }

    async fn start(
        &self,
        command: impl FnOnce(SessionParams) -> AgentCommand,
    ) -> Result<ContextId, CoordinatorError> {
        let config = self
            .inner
            .settings
            .load()
            .map_err(CoordinatorError::Settings)?;
        let params = self.session_params(&config)?;

        let target = self
            .inner
            .host
            .active_context()
            .ok_or(CoordinatorError::NoTargetContext)?;

        let _transition = self.inner.transition.lock().await;

        self.ensure_agent(target).await?;

        if let Some(previous) = self.owner().filter(|owner| *owner != target) {
            self.stop_context(previous).await;
        }

        {
            let mut record = self.record();
            record.owner = Some(target);
            let snapshot = StateSnapshot {
                owner: Some(target),
                ..StateSnapshot::default()
            };
            self.publish(&mut record, snapshot);
        }

        if let Err(e) = self.inner.host.send(target, command(params)) {
            log::warn!("coordinator: dispatch to {target} failed: {e}");
            self.reset();
            return Err(CoordinatorError::Unreachable(target));
        }
        log::info!("coordinator: {target} now owns the session");
        Ok(target)
    }

    /// Session parameters from persisted settings, or the missing-credential
    /// error (published to observers) before any context is contacted.
    fn session_params(&self, config: &AppConfig) -> Result<SessionParams, CoordinatorError> {
        let Some(voice) = VoiceParams::from_config(&config.synthesis) else {
            log::error!("coordinator: no API key configured");
            let mut record = self.record();
            let snapshot = StateSnapshot {
                is_playing: false,
                is_paused: false,
                status_label: MISSING_CREDENTIAL_LABEL.to_string(),
                owner: record.owner,
            };
            self.publish(&mut record, snapshot);
            return Err(CoordinatorError::MissingCredential);
        };
        Ok(SessionParams {
            voice,
            speed: clamp_speed(config.playback.speed),
            max_segment_chars: config.playback.max_segment_chars,
        })
    }

    /// Probe `context`; install an agent if the probe goes unanswered.
    async fn ensure_agent(&self, context: ContextId) -> Result<(), CoordinatorError> {
        let (reply, answered) = oneshot::channel();
        let reachable = match self.inner.host.send(context, AgentCommand::Ping { reply }) {
            Ok(()) => matches!(
                tokio::time::timeout(self.inner.config.probe_timeout(), answered).await,
                Ok(Ok(()))
            ),
            Err(e) => {
                log::debug!("coordinator: probe of {context} failed: {e}");
                false
            }
        };

        if !reachable {
            log::info!("coordinator: provisioning {context}");
            self.inner.host.install(context).await?;
            tokio::time::sleep(self.inner.config.settle_delay()).await;
        }
        Ok(())
    }

    /// Stop the session in `context` and wait for the acknowledgement.
    async fn stop_context(&self, context: ContextId) {
        let (ack, acked) = oneshot::channel();
        if let Err(e) = self.inner.host.send(context, AgentCommand::Stop { ack: Some(ack) }) {
            log::debug!("coordinator: {context} unreachable on stop: {e}");
            return;
        }
        match tokio::time::timeout(self.inner.config.stop_ack_timeout(), acked).await {
            Ok(Ok(())) => log::debug!("coordinator: {context} stopped"),
            Ok(Err(_)) => log::debug!("coordinator: {context} went away while stopping"),
            Err(_) => log::warn!("coordinator: {context} did not acknowledge stop in time"),
        }
    }

    /// Relay `command` to the owner, if any.  An unreachable owner is
    /// dropped and the snapshot reset.
    fn relay(&self, command: AgentCommand) {
        let Some(owner) = self.owner() else {
            return;
        };
        if let Err(e) = self.inner.host.send(owner, command) {
            log::warn!("coordinator: owner {owner} unreachable ({e}), resetting to idle");
            self.handle_host_event(HostEvent::AgentLost(owner));
        }
    }

    pub fn pause(&self) {
        self.relay(AgentCommand::Pause);
    }

    pub fn resume(&self) {
        self.relay(AgentCommand::Resume);
    }

    /// Stop the owner's session and release ownership.  Idempotent.
    pub async fn stop(&self) {
        let _transition = self.inner.transition.lock().await;
        if let Some(owner) = self.owner() {
            self.stop_context(owner).await;
        }
        self.reset();
    }

    /// Persist `value` (clamped) for future sessions and apply it to the
    /// current one.
    pub fn set_speed(&self, value: f32) -> Result<f32, CoordinatorError> {
        let speed = clamp_speed(value);
        self.inner
            .settings
            .update(&mut |config| config.playback.speed = speed)
            .map_err(CoordinatorError::Settings)?;
        self.relay(AgentCommand::SetSpeed(speed));
        Ok(speed)
    }

    /// Extract the active context's page without reading it.
    pub async fn get_content(&self) -> Result<Extraction, CoordinatorError> {
        let target = self
            .inner
            .host
            .active_context()
            .ok_or(CoordinatorError::NoTargetContext)?;
        self.ensure_agent(target).await?;

        let (reply, extraction) = oneshot::channel();
        self.inner
            .host
            .send(target, AgentCommand::GetContent { reply })?;
        extraction
            .await
            .map_err(|_| CoordinatorError::Unreachable(target))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{FailurePolicy, MemorySettingsStore};
    use crate::coordinator::LocalContextHost;
    use crate::extract::Document;
    use crate::playback::{MockOutput, PlaybackEngine};
    use crate::synth::MockSynthesizer;

    const TEXT: &str = "Hello world. This is a test. Short.";

    struct Rig {
        coordinator: Coordinator,
        host: Arc<LocalContextHost>,
        settings: Arc<MemorySettingsStore>,
        synth: MockSynthesizer,
        output: MockOutput,
    }

    fn fast_timings() -> CoordinatorConfig {
        CoordinatorConfig {
            probe_timeout_ms: 20,
            settle_delay_ms: 5,
            stop_ack_timeout_ms: 500,
        }
    }

    fn rig_with(config: AppConfig, output: MockOutput) -> Rig {
        let synth = MockSynthesizer::new();
        let engine = Arc::new(PlaybackEngine::new(
            Arc::new(synth.clone()),
            Arc::new(output.clone()),
            FailurePolicy::Abort,
        ));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let host = Arc::new(LocalContextHost::new(engine, events_tx));
        let settings = Arc::new(MemorySettingsStore::new(config));
        let coordinator = Coordinator::new(host.clone(), settings.clone(), fast_timings());
        coordinator.spawn_event_pump(events_rx);
        Rig {
            coordinator,
            host,
            settings,
            synth,
            output,
        }
    }

    fn keyed_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.synthesis.api_key = Some("key".into());
        config.playback.max_segment_chars = 20;
        config
    }

    fn rig(output: MockOutput) -> Rig {
        rig_with(keyed_config(), output)
    }

    async fn wait_for_state(coordinator: &Coordinator, pred: impl Fn(&StateSnapshot) -> bool) {
        for _ in 0..500 {
            if pred(&coordinator.get_state()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("state not reached: {:?}", coordinator.get_state());
    }

    async fn wait_for(pred: impl Fn() -> bool) {
        for _ in 0..500 {
            if pred() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn missing_credential_fails_without_contacting_any_context() {
        let rig = rig_with(AppConfig::default(), MockOutput::auto());
        rig.host.open_context(Document::new("<p>Page.</p>"));
        let mut updates = rig.coordinator.subscribe();

        let err = rig.coordinator.start_by_selection(TEXT).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::MissingCredential));

        let state = rig.coordinator.get_state();
        assert_eq!(state.status_label, MISSING_CREDENTIAL_LABEL);
        assert!(!state.is_playing);
        assert_eq!(updates.recv().await.unwrap().status_label, MISSING_CREDENTIAL_LABEL);

        assert_eq!(rig.host.install_count(), 0);
        assert!(rig.synth.requests().is_empty());
    }

    #[tokio::test]
    async fn no_active_context_is_an_error() {
        let rig = rig(MockOutput::auto());
        assert!(matches!(
            rig.coordinator.start_by_page().await,
            Err(CoordinatorError::NoTargetContext)
        ));
    }

    #[tokio::test]
    async fn selection_is_read_to_the_end() {
        let rig = rig(MockOutput::auto());
        let ctx = rig.host.open_context(Document::default());

        assert_eq!(rig.coordinator.start_by_selection(TEXT).await.unwrap(), ctx);
        wait_for_state(&rig.coordinator, |s| s.status_label == "Finished").await;

        let state = rig.coordinator.get_state();
        assert_eq!(state.owner, Some(ctx));
        assert!(!state.is_playing);
        assert_eq!(rig.output.started(), ["Hello world.", "This is a test.", "Short."]);
    }

    #[tokio::test]
    async fn page_read_uses_the_context_document() {
        let rig = rig(MockOutput::auto());
        rig.host.open_context(Document::new(
            "<html><body><nav>Menu</nav><article><p>Article body.</p></article></body></html>",
        ));

        rig.coordinator.start_by_page().await.unwrap();
        wait_for_state(&rig.coordinator, |s| s.status_label == "Finished").await;
        assert_eq!(rig.output.started(), ["Article body."]);
    }

    #[tokio::test]
    async fn empty_page_reports_no_content() {
        let rig = rig(MockOutput::auto());
        rig.host.open_context(Document::new(
            "<html><body><nav>Home</nav><script>go()</script></body></html>",
        ));

        rig.coordinator.start_by_page().await.unwrap();
        wait_for_state(&rig.coordinator, |s| s.status_label == "No content to read").await;
        assert!(rig.synth.requests().is_empty());
    }

    #[tokio::test]
    async fn probe_installs_once_per_agent_lifetime() {
        let rig = rig(MockOutput::auto());
        let ctx = rig.host.open_context(Document::default());

        rig.coordinator.start_by_selection("One.").await.unwrap();
        assert_eq!(rig.host.install_count(), 1);
        rig.coordinator.start_by_selection("Two.").await.unwrap();
        assert_eq!(rig.host.install_count(), 1);

        rig.host.navigate(ctx, Document::new("<p>Next.</p>")).unwrap();
        rig.coordinator.start_by_selection("Three.").await.unwrap();
        assert_eq!(rig.host.install_count(), 2);
    }

    #[tokio::test]
    async fn owner_torn_down_while_playing_resets_to_idle() {
        let rig = rig(MockOutput::manual());
        let ctx = rig.host.open_context(Document::default());

        rig.coordinator.start_by_selection(TEXT).await.unwrap();
        wait_for_state(&rig.coordinator, |s| s.status_label == "Reading...").await;
        wait_for(|| rig.output.is_playing()).await;

        rig.host.close_context(ctx).unwrap();
        wait_for_state(&rig.coordinator, |s| *s == StateSnapshot::default()).await;
        wait_for(|| !rig.output.is_playing()).await;

        // Late events from the closed context do not revive it.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(rig.coordinator.get_state(), StateSnapshot::default());
    }

    #[tokio::test]
    async fn new_session_elsewhere_stops_the_previous_owner_first() {
        let rig = rig(MockOutput::manual());
        let first = rig.host.open_context(Document::default());
        let second = rig.host.open_context(Document::default());

        rig.host.focus(first).unwrap();
        rig.coordinator.start_by_selection("First page.").await.unwrap();
        wait_for(|| rig.output.is_playing()).await;

        rig.host.focus(second).unwrap();
        rig.coordinator.start_by_selection("Second page.").await.unwrap();
        wait_for(|| rig.output.started().len() == 2).await;

        assert_eq!(rig.output.started(), ["First page.", "Second page."]);
        assert_eq!(rig.output.overlaps(), 0);
        wait_for_state(&rig.coordinator, |s| {
            s.owner == Some(second) && s.status_label == "Reading..."
        })
        .await;
    }

    #[tokio::test]
    async fn stop_without_owner_is_idempotent() {
        let rig = rig(MockOutput::auto());
        rig.coordinator.stop().await;
        rig.coordinator.stop().await;
        assert_eq!(rig.coordinator.get_state(), StateSnapshot::default());
    }

    #[tokio::test]
    async fn stop_halts_audio_and_resets_to_idle() {
        let rig = rig(MockOutput::manual());
        rig.host.open_context(Document::default());

        rig.coordinator.start_by_selection(TEXT).await.unwrap();
        wait_for(|| rig.output.is_playing()).await;

        rig.coordinator.stop().await;
        assert!(!rig.output.is_playing());
        assert_eq!(rig.coordinator.get_state(), StateSnapshot::default());

        rig.coordinator.stop().await;
        assert_eq!(rig.coordinator.get_state(), StateSnapshot::default());
    }

    #[tokio::test]
    async fn pause_and_resume_are_relayed_to_the_owner() {
        let rig = rig(MockOutput::manual());
        rig.host.open_context(Document::default());

        // No owner yet: nothing happens.
        rig.coordinator.pause();
        assert_eq!(rig.coordinator.get_state(), StateSnapshot::default());

        rig.coordinator.start_by_selection(TEXT).await.unwrap();
        wait_for(|| rig.output.is_playing()).await;

        rig.coordinator.pause();
        wait_for_state(&rig.coordinator, |s| s.is_paused && s.status_label == "Paused").await;
        assert!(rig.output.is_paused());

        rig.coordinator.resume();
        wait_for_state(&rig.coordinator, |s| !s.is_paused && s.status_label == "Reading...").await;
        assert!(!rig.output.is_paused());
    }

    #[tokio::test]
    async fn set_speed_is_persisted_and_applied() {
        let rig = rig(MockOutput::manual());
        rig.host.open_context(Document::default());

        rig.coordinator.start_by_selection(TEXT).await.unwrap();
        wait_for(|| rig.output.is_playing()).await;

        assert_eq!(rig.coordinator.set_speed(1.25).unwrap(), 1.25);
        assert_eq!(rig.settings.load().unwrap().playback.speed, 1.25);
        wait_for(|| rig.output.speed() == 1.25).await;

        assert_eq!(rig.coordinator.set_speed(0.1).unwrap(), 0.5);
        assert_eq!(rig.settings.load().unwrap().playback.speed, 0.5);
    }

    #[tokio::test]
    async fn saved_speed_seeds_the_next_session() {
        let rig = rig(MockOutput::auto());
        rig.host.open_context(Document::default());

        rig.coordinator.set_speed(1.5).unwrap();
        rig.coordinator.start_by_selection("Fast.").await.unwrap();
        wait_for_state(&rig.coordinator, |s| s.status_label == "Finished").await;
        assert_eq!(rig.output.start_speeds(), [1.5]);
    }

    #[tokio::test]
    async fn status_from_non_owner_is_ignored() {
        let rig = rig(MockOutput::auto());
        rig.coordinator.handle_host_event(HostEvent::Status {
            context: ContextId(42),
            event: StatusEvent {
                label: "Reading...".into(),
                is_playing: true,
                is_paused: false,
            },
        });
        assert_eq!(rig.coordinator.get_state(), StateSnapshot::default());
    }

    #[tokio::test]
    async fn observers_receive_every_change() {
        let rig = rig(MockOutput::auto());
        rig.host.open_context(Document::default());
        let mut updates = rig.coordinator.subscribe();

        rig.coordinator.start_by_selection("Only sentence.").await.unwrap();

        let mut labels = Vec::new();
        while labels.last().map(String::as_str) != Some("Finished") {
            let snapshot = tokio::time::timeout(Duration::from_secs(2), updates.recv())
                .await
                .unwrap()
                .unwrap();
            labels.push(snapshot.status_label);
        }
        assert!(labels.contains(&"Reading...".to_string()));
    }

    #[tokio::test]
    async fn get_content_provisions_and_extracts() {
        let rig = rig(MockOutput::auto());
        rig.host.open_context(Document::new(
            "<html><body><main><p>Main text.</p></main></body></html>",
        ));

        let extraction = rig.coordinator.get_content().await.unwrap();
        assert_eq!(extraction.text(), Some("Main text."));
        assert_eq!(rig.host.install_count(), 1);
    }
}
