//! Ordering rules for one phase's event stream
//!
//! Within a stream: step indices never decrease, `done(i)` never precedes
//! `start(i)`, and at most one terminal event (`result` or `error`) appears,
//! after which nothing else may follow.

use thiserror::Error;

use super::{Phase, StepStatus, StreamEvent, STEP_COUNT};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceViolation {
    #[error("{event} event after the stream already terminated")]
    AfterTerminal { event: &'static str },

    #[error("event for phase {found} on a {expected} stream")]
    WrongPhase { expected: Phase, found: Phase },

    #[error("step index {index} out of range")]
    IndexOutOfRange { index: u8 },

    #[error("step index {index} after step {previous}")]
    IndexRegressed { index: u8, previous: u8 },

    #[error("step {index} done before it started")]
    DoneBeforeStart { index: u8 },

    #[error("stream ended without a result or error event")]
    MissingTerminal,
}

/// Incremental checker fed one event at a time
#[derive(Debug, Clone)]
pub struct SequenceTracker {
    phase: Phase,
    last_index: Option<u8>,
    started: [bool; STEP_COUNT],
    terminated: bool,
}

impl SequenceTracker {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            last_index: None,
            started: [false; STEP_COUNT],
            terminated: false,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Record `event`, rejecting it if it breaks the ordering rules.
    /// A rejected event leaves the tracker unchanged.
    pub fn observe(&mut self, event: &StreamEvent) -> Result<(), SequenceViolation> {
        if self.terminated {
            return Err(SequenceViolation::AfterTerminal {
                event: event.event_type(),
            });
        }

        match event {
            StreamEvent::Step(step) => {
                if step.phase != self.phase {
                    return Err(SequenceViolation::WrongPhase {
                        expected: self.phase,
                        found: step.phase,
                    });
                }
                let slot = usize::from(step.index);
                if slot >= STEP_COUNT {
                    return Err(SequenceViolation::IndexOutOfRange { index: step.index });
                }
                if let Some(previous) = self.last_index {
                    if step.index < previous {
                        return Err(SequenceViolation::IndexRegressed {
                            index: step.index,
                            previous,
                        });
                    }
                }
                match step.status {
                    StepStatus::Start => self.started[slot] = true,
                    StepStatus::Done if !self.started[slot] => {
                        return Err(SequenceViolation::DoneBeforeStart { index: step.index });
                    }
                    StepStatus::Done => {}
                }
                self.last_index = Some(step.index);
            }
            StreamEvent::Result(result) => {
                if result.phase() != self.phase {
                    return Err(SequenceViolation::WrongPhase {
                        expected: self.phase,
                        found: result.phase(),
                    });
                }
                self.terminated = true;
            }
            StreamEvent::Error(_) => self.terminated = true,
            StreamEvent::Log(_) => {}
        }

        Ok(())
    }
}

/// Check a complete stream: ordering rules hold and it ends with exactly one
/// terminal event.
pub fn check_sequence(phase: Phase, events: &[StreamEvent]) -> Result<(), SequenceViolation> {
    let mut tracker = SequenceTracker::new(phase);
    for event in events {
        tracker.observe(event)?;
    }
    if !tracker.is_terminated() {
        return Err(SequenceViolation::MissingTerminal);
    }
    Ok(())
}
