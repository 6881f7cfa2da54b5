//! Custom assertions and event helpers for end-to-end tests

use panopto_dl::{Event, Stage};
use std::path::Path;
use tokio::sync::broadcast;

/// Count regular files anywhere below `dir` (0 when `dir` does not exist)
pub fn count_files(dir: &Path) -> usize {
    if !dir.exists() {
        return 0;
    }
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

/// Take every event already sent on `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// The stages a run announced, in order
pub fn stage_sequence(events: &[Event]) -> Vec<Stage> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::StageChanged { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect()
}

/// Assert the run announced exactly `expected` stage transitions
pub fn assert_stages(events: &[Event], expected: &[Stage]) {
    let actual = stage_sequence(events);
    assert_eq!(
        actual, expected,
        "unexpected stage sequence, events: {events:#?}"
    );
}
