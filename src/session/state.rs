//! Session state machine and the status events it emits.
//!
//! ```text
//! Idle ──start──▶ Extracting ──segments──▶ Loading(0)
//!                            ──no text───▶ Empty
//! Loading(i) ──audio started──▶ Playing(i) ──ended──▶ Loading(i+1) | Finished
//! Loading(i) / Playing(i) ──error──▶ Failed
//! Loading(i) / Playing(i) ──pause──▶ Paused(i) ──resume──▶ Loading(i) | Playing(i)
//! any non-terminal ──stop──▶ Stopped
//! ```
//!
//! `Finished`, `Empty`, `Failed` and `Stopped` are terminal.

use serde::Serialize;

// ---------------------------------------------------------------------------
// PauseStage
// ---------------------------------------------------------------------------

/// Where in a segment's lifecycle a pause landed.  Decides what `resume`
/// goes back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseStage {
    /// The synthesis request is still in flight.
    Fetching,
    /// Audio arrived while paused and is held, unplayed.
    Fetched,
    /// Audio output was playing and is now paused in place.
    Playing,
}

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// State of one read-aloud session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    Extracting,
    /// Fetching audio for segment `i`.
    Loading(usize),
    /// Segment `i` is audible.
    Playing(usize),
    Paused {
        index: usize,
        stage: PauseStage,
    },
    /// Every segment played.
    Finished,
    /// Extraction produced no readable text.
    Empty,
    Failed(String),
    Stopped,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Finished
                | SessionStatus::Empty
                | SessionStatus::Failed(_)
                | SessionStatus::Stopped
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// ```
    /// use read_aloud::session::SessionStatus;
    ///
    /// assert!(SessionStatus::Playing(0).can_transition_to(&SessionStatus::Loading(1)));
    /// assert!(!SessionStatus::Finished.can_transition_to(&SessionStatus::Stopped));
    /// ```
    pub fn can_transition_to(&self, next: &SessionStatus) -> bool {
        use SessionStatus::*;

        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Stopped) => true,
            (Idle, Extracting) => true,
            (Extracting, Loading(0) | Empty | Failed(_)) => true,
            (Loading(i), Playing(j)) => i == j,
            (Loading(i), Paused { index, stage }) => {
                i == index && matches!(stage, PauseStage::Fetching | PauseStage::Fetched)
            }
            (Loading(_), Failed(_)) => true,
            (Playing(i), Loading(j)) => i + 1 == *j,
            (Playing(i), Paused { index, stage }) => i == index && *stage == PauseStage::Playing,
            (Playing(_), Finished | Failed(_)) => true,
            // A segment skipped under the skip policy.
            (Loading(i), Loading(j)) => i + 1 == *j,
            (Loading(_), Finished) => true,
            (
                Paused {
                    index,
                    stage: PauseStage::Fetching,
                },
                Paused {
                    index: j,
                    stage: PauseStage::Fetched,
                },
            ) => index == j,
            (Paused { index, stage }, Loading(j)) => {
                index == j && *stage == PauseStage::Fetching
            }
            (Paused { index, stage }, Playing(j)) => {
                index == j && *stage != PauseStage::Fetching
            }
            (Paused { .. }, Failed(_)) => true,
            _ => false,
        }
    }

    /// Short human-readable label for observers.
    pub fn label(&self) -> String {
        match self {
            SessionStatus::Idle => "Idle".into(),
            SessionStatus::Extracting => "Extracting content...".into(),
            SessionStatus::Loading(_) | SessionStatus::Playing(_) => "Reading...".into(),
            SessionStatus::Paused { .. } => "Paused".into(),
            SessionStatus::Finished => "Finished".into(),
            SessionStatus::Empty => "No content to read".into(),
            SessionStatus::Failed(msg) => format!("Error: {msg}"),
            SessionStatus::Stopped => "Stopped".into(),
        }
    }

    /// The event observers see for this status.
    pub fn event(&self) -> StatusEvent {
        StatusEvent {
            label: self.label(),
            // A paused session still holds the output.
            is_playing: matches!(
                self,
                SessionStatus::Extracting
                    | SessionStatus::Loading(_)
                    | SessionStatus::Playing(_)
                    | SessionStatus::Paused { .. }
            ),
            is_paused: matches!(self, SessionStatus::Paused { .. }),
        }
    }
}

// ---------------------------------------------------------------------------
// StatusEvent
// ---------------------------------------------------------------------------

/// Emitted on every session transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub label: String,
    pub is_playing: bool,
    pub is_paused: bool,
}

impl Default for StatusEvent {
    fn default() -> Self {
        SessionStatus::Idle.event()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn paused(index: usize, stage: PauseStage) -> SessionStatus {
        SessionStatus::Paused { index, stage }
    }

    #[test]
    fn happy_path_is_legal() {
        let path = [
            SessionStatus::Idle,
            SessionStatus::Extracting,
            SessionStatus::Loading(0),
            SessionStatus::Playing(0),
            SessionStatus::Loading(1),
            SessionStatus::Playing(1),
            SessionStatus::Finished,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn segments_cannot_be_skipped_or_repeated() {
        assert!(!SessionStatus::Playing(0).can_transition_to(&SessionStatus::Loading(2)));
        assert!(!SessionStatus::Playing(1).can_transition_to(&SessionStatus::Loading(1)));
        assert!(!SessionStatus::Loading(1).can_transition_to(&SessionStatus::Playing(2)));
    }

    #[test]
    fn pause_only_from_loading_or_playing() {
        let p = paused(0, PauseStage::Fetching);
        assert!(SessionStatus::Loading(0).can_transition_to(&p));
        assert!(!SessionStatus::Idle.can_transition_to(&p));
        assert!(!SessionStatus::Extracting.can_transition_to(&p));
        assert!(!SessionStatus::Finished.can_transition_to(&p));
        assert!(!SessionStatus::Failed("x".into()).can_transition_to(&p));
        assert!(!SessionStatus::Stopped.can_transition_to(&p));
        assert!(SessionStatus::Playing(3).can_transition_to(&paused(3, PauseStage::Playing)));
    }

    #[test]
    fn resume_target_depends_on_stage() {
        assert!(paused(2, PauseStage::Fetching).can_transition_to(&SessionStatus::Loading(2)));
        assert!(!paused(2, PauseStage::Fetching).can_transition_to(&SessionStatus::Playing(2)));
        assert!(paused(2, PauseStage::Fetched).can_transition_to(&SessionStatus::Playing(2)));
        assert!(paused(2, PauseStage::Playing).can_transition_to(&SessionStatus::Playing(2)));
        assert!(!paused(2, PauseStage::Playing).can_transition_to(&SessionStatus::Loading(2)));
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [
            SessionStatus::Finished,
            SessionStatus::Empty,
            SessionStatus::Failed("boom".into()),
            SessionStatus::Stopped,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(&SessionStatus::Stopped));
            assert!(!terminal.can_transition_to(&SessionStatus::Idle));
        }
    }

    #[test]
    fn events_reflect_status() {
        let e = SessionStatus::Playing(0).event();
        assert_eq!(e.label, "Reading...");
        assert!(e.is_playing && !e.is_paused);

        let e = paused(0, PauseStage::Playing).event();
        assert_eq!(e.label, "Paused");
        assert!(e.is_playing && e.is_paused);

        let e = SessionStatus::Failed("API error: 500 - oops".into()).event();
        assert_eq!(e.label, "Error: API error: 500 - oops");
        assert!(!e.is_playing && !e.is_paused);

        assert_eq!(StatusEvent::default().label, "Idle");
    }
}
