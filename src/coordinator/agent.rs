//! Per-context reader agent.
//!
//! One agent task runs in each provisioned context.  It owns at most one
//! session at a time, starts a new one only after stopping the old, and
//! forwards every status event of its current session as a
//! [`HostEvent::Status`].  When its command channel closes the agent stops
//! its session and exits.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::extract::{ContentExtractor, Document};
use crate::playback::PlaybackEngine;
use crate::session::{ReadRequest, SessionController, SessionHandle, SessionParams, StatusEvent};

use super::context::{AgentCommand, ContextId, HostEvent};

pub struct ReaderAgent {
    context: ContextId,
    document: Document,
    engine: Arc<PlaybackEngine>,
    extractor: ContentExtractor,
    host_events: mpsc::UnboundedSender<HostEvent>,
    session: Option<SessionHandle>,
    session_events: Option<mpsc::UnboundedReceiver<StatusEvent>>,
}

impl ReaderAgent {
    pub fn new(
        context: ContextId,
        document: Document,
        engine: Arc<PlaybackEngine>,
        extractor: ContentExtractor,
        host_events: mpsc::UnboundedSender<HostEvent>,
    ) -> Self {
        Self {
            context,
            document,
            engine,
            extractor,
            host_events,
            session: None,
            session_events: None,
        }
    }

    /// Spawn the agent loop and return its command sender.  Dropping the
    /// sender shuts the agent down.
    pub fn spawn(self) -> mpsc::UnboundedSender<AgentCommand> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(rx));
        tx
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<AgentCommand>) {
        log::debug!("agent[{}]: started", self.context);
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                event = next_status(&mut self.session_events) => match event {
                    Some(event) => self.forward(event),
                    // Session finished and dropped its sender.
                    None => self.session_events = None,
                },
            }
        }
        self.stop_session();
        log::debug!("agent[{}]: shut down", self.context);
    }

    async fn handle(&mut self, command: AgentCommand) {
        match command {
            AgentCommand::Ping { reply } => {
                let _ = reply.send(());
            }
            AgentCommand::Speak { text, params } => {
                self.start_session(ReadRequest::Selection(text), params);
            }
            AgentCommand::SpeakPage { params } => {
                self.start_session(ReadRequest::Page(self.document.clone()), params);
            }
            AgentCommand::Pause => {
                if let Some(session) = &self.session {
                    session.pause();
                }
            }
            AgentCommand::Resume => {
                if let Some(session) = &self.session {
                    session.resume();
                }
            }
            AgentCommand::Stop { ack } => {
                self.stop_session();
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            AgentCommand::SetSpeed(speed) => {
                if let Some(session) = &self.session {
                    session.set_speed(speed);
                }
            }
            AgentCommand::GetContent { reply } => {
                let extractor = self.extractor.clone();
                let document = self.document.clone();
                match tokio::task::spawn_blocking(move || extractor.extract(&document)).await {
                    Ok(extraction) => {
                        let _ = reply.send(extraction);
                    }
                    // Dropping `reply` tells the caller it failed.
                    Err(e) => log::error!("agent[{}]: extraction task failed: {e}", self.context),
                }
            }
        }
    }

    fn start_session(&mut self, request: ReadRequest, params: SessionParams) {
        self.stop_session();

        let (tx, rx) = mpsc::unbounded_channel();
        let controller = SessionController::new(Arc::clone(&self.engine), params, tx)
            .with_extractor(self.extractor.clone());
        self.session = Some(controller.handle());
        self.session_events = Some(rx);

        log::info!("agent[{}]: starting session", self.context);
        tokio::spawn(controller.run(request));
    }

    /// Stop the current session and forward the events it has left, so a
    /// following session's events can never overtake them.
    fn stop_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop();
        }
        if let Some(mut events) = self.session_events.take() {
            while let Ok(event) = events.try_recv() {
                self.forward(event);
            }
        }
    }

    fn forward(&self, event: StatusEvent) {
        let _ = self.host_events.send(HostEvent::Status {
            context: self.context,
            event,
        });
    }
}

async fn next_status(
    events: &mut Option<mpsc::UnboundedReceiver<StatusEvent>>,
) -> Option<StatusEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
