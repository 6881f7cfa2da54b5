//! Stage tracking for one run

use crate::types::{Event, RunId, Stage};
use tokio::sync::broadcast;

/// Current stage of a run plus the channel its transitions are announced on
pub(super) struct RunState {
    run: RunId,
    stage: Stage,
    event_tx: broadcast::Sender<Event>,
}

impl RunState {
    pub(super) fn new(run: RunId, event_tx: broadcast::Sender<Event>) -> Self {
        Self {
            run,
            stage: Stage::Idle,
            event_tx,
        }
    }

    pub(super) fn stage(&self) -> Stage {
        self.stage
    }

    /// Move to `next` and emit [`Event::StageChanged`]
    ///
    /// Illegal transitions are refused and logged; the stage stays unchanged.
    pub(super) fn advance(&mut self, next: Stage) {
        if !self.stage.can_transition_to(next) {
            tracing::error!(
                run = %self.run,
                from = %self.stage,
                to = %next,
                "Refusing illegal stage transition"
            );
            return;
        }
        tracing::debug!(run = %self.run, from = %self.stage, to = %next, "Stage changed");
        self.stage = next;
        self.emit(Event::StageChanged {
            run: self.run,
            stage: next,
        });
    }

    /// Send an event; having no subscribers is fine
    pub(super) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_are_announced() {
        let (tx, mut rx) = broadcast::channel(16);
        let mut state = RunState::new(RunId(1), tx);

        state.advance(Stage::Resolving);
        state.advance(Stage::Failed);

        assert_eq!(state.stage(), Stage::Failed);
        assert!(matches!(
            rx.try_recv().unwrap(),
            Event::StageChanged { stage: Stage::Resolving, .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            Event::StageChanged { stage: Stage::Failed, .. }
        ));
    }

    #[test]
    fn terminal_stage_is_final() {
        let (tx, mut rx) = broadcast::channel(16);
        let mut state = RunState::new(RunId(1), tx);
        state.advance(Stage::Resolving);
        state.advance(Stage::Failed);
        while rx.try_recv().is_ok() {}

        state.advance(Stage::Resolving);

        assert_eq!(state.stage(), Stage::Failed);
        assert!(rx.try_recv().is_err(), "refused transitions emit nothing");
    }
}
