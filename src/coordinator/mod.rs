//! Process coordinator: single ownership of the active session.
//!
//! # Architecture
//!
//! ```text
//! Coordinator (one per process)
//!   │  start / pause / resume / stop / set_speed / get_state
//!   ▼
//! ContextHost ──install──▶ ReaderAgent (one per provisioned context)
//!   ▲                         │  owns ≤ 1 SessionController
//!   │                         ▼
//!   └──── HostEvent ◀──── StatusEvent
//! ```
//!
//! Every agent shares the same `PlaybackEngine`; the coordinator stops the
//! previous owner before a new one starts, so only one session ever holds
//! the audio output.

pub mod agent;
pub mod context;
pub mod host;
pub mod process;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use agent::ReaderAgent;
pub use context::{AgentCommand, ContextError, ContextHost, ContextId, HostEvent};
pub use host::LocalContextHost;
pub use process::{Coordinator, CoordinatorError, StateSnapshot, MISSING_CREDENTIAL_LABEL};
