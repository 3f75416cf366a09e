//! Read-aloud sessions.
//!
//! A session is one run of extract → chunk → drain → play.  [`state`] holds
//! the state machine and the events observers see; [`controller`] runs it.

pub mod controller;
pub mod state;

pub use controller::{ReadRequest, SessionController, SessionHandle, SessionParams};
pub use state::{PauseStage, SessionStatus, StatusEvent};
