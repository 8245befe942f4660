//! Progress display helpers

use ivs_common::events::STEP_COUNT;
use ivs_common::Phase;
use std::time::Duration;

use crate::state::{PhaseStatus, PhaseView};

/// How often the simulated indicator advances while a stream is silent
pub const DEFAULT_SIMULATION_TICK: Duration = Duration::from_millis(1500);

/// One status line for a phase, e.g. `[rag] 2/4 retrieval`.
///
/// Real progress always wins; the simulated step is shown only while no
/// event has arrived, and is marked as such.
pub fn render_phase(phase: Phase, view: &PhaseView) -> String {
    let labels = phase.step_labels();
    match view.status {
        PhaseStatus::Idle => format!("[{phase}] idle"),
        PhaseStatus::Done => format!("[{phase}] done"),
        PhaseStatus::Running => match (view.current_step(), view.simulated_step) {
            (Some(step), _) => {
                let index = usize::from(step);
                format!("[{phase}] {}/{STEP_COUNT} {}", index + 1, labels[index])
            }
            (None, Some(step)) => {
                let index = usize::from(step);
                format!("[{phase}] {}/{STEP_COUNT} {} (waiting)", index + 1, labels[index])
            }
            (None, None) => format!("[{phase}] starting"),
        },
    }
}

/// Latest log code of a phase, if any
pub fn latest_log(view: &PhaseView) -> Option<&str> {
    view.logs.last().map(|log| log.code.as_str())
}
