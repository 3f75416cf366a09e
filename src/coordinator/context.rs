//! Execution contexts and the messages exchanged with them.
//!
//! A context is anything that can host a [`ReaderAgent`](super::ReaderAgent):
//! one open page with its own extraction and session machinery.  The
//! coordinator reaches contexts only through a [`ContextHost`].

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::extract::Extraction;
use crate::session::{SessionParams, StatusEvent};

/// Identifies one execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Commands understood by an installed agent.
#[derive(Debug)]
pub enum AgentCommand {
    /// Reachability probe; the agent answers immediately.
    Ping { reply: oneshot::Sender<()> },
    /// Read `text`, replacing any session already running here.
    Speak { text: String, params: SessionParams },
    /// Extract this context's page and read it.
    SpeakPage { params: SessionParams },
    Pause,
    Resume,
    /// Stop the current session; `ack` fires once the audio is halted.
    Stop { ack: Option<oneshot::Sender<()>> },
    SetSpeed(f32),
    /// Extract this context's page without reading it.
    GetContent { reply: oneshot::Sender<Extraction> },
}

/// Notifications flowing from contexts to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// A session in `context` changed state.
    Status {
        context: ContextId,
        event: StatusEvent,
    },
    /// The agent in `context` is gone (page closed or navigated away).
    AgentLost(ContextId),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("no such context: {0}")]
    NotFound(ContextId),

    /// The context exists but has no live agent.
    #[error("no agent installed in {0}")]
    NoAgent(ContextId),

    #[error("failed to install agent in {context}: {reason}")]
    Install { context: ContextId, reason: String },
}

/// Where agents live.
///
/// `send` is fire-and-forget; replies travel on the command's own oneshot.
#[async_trait]
pub trait ContextHost: Send + Sync {
    /// The context a new read should target, if any.
    fn active_context(&self) -> Option<ContextId>;

    /// Deliver `command` to the agent in `context`.
    fn send(&self, context: ContextId, command: AgentCommand) -> Result<(), ContextError>;

    /// Install a fresh agent in `context`, replacing any existing one.
    async fn install(&self, context: ContextId) -> Result<(), ContextError>;
}
