//! Client-side view of the two phases
//!
//! [`StreamState`] is plain data with no I/O: the session feeds it events
//! and stream outcomes, and anything rendering progress reads snapshots of
//! it. Every mutation is checked against the phase's current generation so
//! output from a superseded request can never change what is shown.

use ivs_common::events::{LogEvent, StepStatus, STEP_COUNT};
use ivs_common::{InstrumentDescription, Phase, PhaseResult, StreamEvent, ValuationResult};

use crate::error::ClientError;

/// Monotonic id of one client-initiated operation
pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhaseStatus {
    #[default]
    Idle,
    Running,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepMark {
    #[default]
    Pending,
    Active,
    Done,
}

/// Progress of one phase
#[derive(Debug, Clone, Default)]
pub struct PhaseView {
    pub status: PhaseStatus,
    /// Generation whose events are accepted; `None` when nothing is live
    pub generation: Option<Generation>,
    /// Progress derived from real `step` events only
    pub steps: [StepMark; STEP_COUNT],
    pub logs: Vec<LogEvent>,
    pub events_received: usize,
    /// Display-only step guess while no real event has arrived
    pub simulated_step: Option<u8>,
    pub simulation_disabled: bool,
    /// Set once a `result` or `error` event was applied
    pub terminated: bool,
}

impl PhaseView {
    fn running(generation: Generation) -> Self {
        Self {
            status: PhaseStatus::Running,
            generation: Some(generation),
            ..Default::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == PhaseStatus::Running
    }

    /// Highest step with real progress
    pub fn current_step(&self) -> Option<u8> {
        self.steps
            .iter()
            .rposition(|mark| *mark != StepMark::Pending)
            .map(|index| index as u8)
    }
}

/// What applying an event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Progress,
    Completed,
    Failed,
}

/// How a stream ended from the transport's point of view
#[derive(Debug)]
pub enum StreamEnd {
    /// Body finished normally
    Closed,
    Failed(ClientError),
    Cancelled,
}

/// What the session should do once a stream is over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Nothing more to do
    Finished,
    /// Zero events arrived: retry once through the synchronous endpoint
    Fallback,
}

#[derive(Debug, Clone, Default)]
pub struct StreamState {
    last_generation: Generation,
    pub vision: PhaseView,
    pub rag: PhaseView,
    pub description: Option<InstrumentDescription>,
    pub valuation: Option<ValuationResult>,
    pub error: Option<String>,
    /// Vision generation whose result should start a valuation
    auto_estimate: Option<Generation>,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self, phase: Phase) -> &PhaseView {
        match phase {
            Phase::Vision => &self.vision,
            Phase::Rag => &self.rag,
        }
    }

    fn view_mut(&mut self, phase: Phase) -> &mut PhaseView {
        match phase {
            Phase::Vision => &mut self.vision,
            Phase::Rag => &mut self.rag,
        }
    }

    /// Neither phase is running
    pub fn is_settled(&self) -> bool {
        !self.vision.is_running() && !self.rag.is_running()
    }

    pub fn auto_estimate_armed(&self) -> bool {
        self.auto_estimate.is_some()
    }

    /// Start a new operation for `phase` and return its generation.
    ///
    /// A new description supersedes everything derived from the previous
    /// photo, so it also resets the valuation phase.
    pub fn begin(&mut self, phase: Phase) -> Generation {
        self.last_generation += 1;
        let generation = self.last_generation;

        self.error = None;
        self.auto_estimate = None;

        if phase == Phase::Vision {
            self.description = None;
            self.valuation = None;
            self.rag = PhaseView::default();
            self.auto_estimate = Some(generation);
        } else {
            self.valuation = None;
        }
        *self.view_mut(phase) = PhaseView::running(generation);
        generation
    }

    fn check_current(&self, phase: Phase, generation: Generation) -> Result<(), ClientError> {
        if self.view(phase).generation == Some(generation) {
            Ok(())
        } else {
            Err(ClientError::StaleResponseDiscarded { phase, generation })
        }
    }

    fn fail(&mut self, phase: Phase, message: String) {
        let view = self.view_mut(phase);
        view.status = PhaseStatus::Idle;
        view.simulated_step = None;
        self.error = Some(message);
        if phase == Phase::Vision {
            self.auto_estimate = None;
        }
    }

    fn complete(&mut self, phase: Phase, result: PhaseResult) -> Applied {
        if result.phase() != phase {
            self.fail(phase, format!("Unexpected {} result on the {phase} stream", result.phase()));
            return Applied::Failed;
        }
        match result {
            PhaseResult::Vision(description) => self.description = Some(description),
            PhaseResult::Rag(valuation) => self.valuation = Some(valuation),
        }
        let view = self.view_mut(phase);
        view.status = PhaseStatus::Done;
        view.simulated_step = None;
        Applied::Completed
    }

    /// Apply one real event from the stream of `generation`
    pub fn apply_event(
        &mut self,
        phase: Phase,
        generation: Generation,
        event: StreamEvent,
    ) -> Result<Applied, ClientError> {
        self.check_current(phase, generation)?;

        let view = self.view_mut(phase);
        view.events_received += 1;
        view.simulation_disabled = true;
        view.simulated_step = None;

        let applied = match event {
            StreamEvent::Step(step) => {
                if let Some(mark) = view.steps.get_mut(usize::from(step.index)) {
                    *mark = match step.status {
                        StepStatus::Start => StepMark::Active,
                        StepStatus::Done => StepMark::Done,
                    };
                }
                Applied::Progress
            }
            StreamEvent::Log(log) => {
                view.logs.push(log);
                Applied::Progress
            }
            StreamEvent::Result(result) => {
                view.terminated = true;
                self.complete(phase, result)
            }
            StreamEvent::Error(error) => {
                view.terminated = true;
                self.fail(phase, error.message);
                Applied::Failed
            }
        };
        Ok(applied)
    }

    /// Decide what follows the end of a stream
    pub fn stream_closed(
        &mut self,
        phase: Phase,
        generation: Generation,
        end: StreamEnd,
    ) -> Result<CloseAction, ClientError> {
        self.check_current(phase, generation)?;
        let view = self.view_mut(phase);

        if view.terminated {
            return Ok(CloseAction::Finished);
        }
        let error = match end {
            StreamEnd::Cancelled => {
                view.status = PhaseStatus::Idle;
                view.simulated_step = None;
                if phase == Phase::Vision {
                    self.auto_estimate = None;
                }
                return Ok(CloseAction::Finished);
            }
            _ if view.events_received == 0 => return Ok(CloseAction::Fallback),
            StreamEnd::Closed => ClientError::Incomplete,
            StreamEnd::Failed(error) => error,
        };
        self.fail(phase, error.to_string());
        Ok(CloseAction::Finished)
    }

    /// Apply the outcome of the synchronous retry
    pub fn apply_fallback(
        &mut self,
        phase: Phase,
        generation: Generation,
        outcome: Result<PhaseResult, ClientError>,
    ) -> Result<Applied, ClientError> {
        self.check_current(phase, generation)?;
        self.view_mut(phase).terminated = true;
        Ok(match outcome {
            Ok(result) => self.complete(phase, result),
            Err(error) => {
                self.fail(phase, error.to_string());
                Applied::Failed
            }
        })
    }

    /// One-shot: the description to estimate if `generation`'s result
    /// should chain into a valuation
    pub fn take_auto_estimate(&mut self, generation: Generation) -> Option<InstrumentDescription> {
        if self.auto_estimate != Some(generation) || self.vision.generation != Some(generation) {
            return None;
        }
        let description = self.description.clone()?;
        self.auto_estimate = None;
        Some(description)
    }

    /// Advance the simulated indicator by one step. Returns false once the
    /// ticker for `generation` should stop.
    pub fn tick_simulation(&mut self, phase: Phase, generation: Generation) -> bool {
        if self.check_current(phase, generation).is_err() {
            return false;
        }
        let view = self.view_mut(phase);
        if !view.is_running() || view.simulation_disabled {
            return false;
        }
        let last = (STEP_COUNT - 1) as u8;
        view.simulated_step = Some(match view.simulated_step {
            None => 0,
            Some(step) => (step + 1).min(last),
        });
        true
    }

    /// Apply a user edit to the current description
    pub fn edit_description<F>(&mut self, edit: F) -> Result<(), ClientError>
    where
        F: FnOnce(&mut InstrumentDescription),
    {
        let description = self.description.as_mut().ok_or(ClientError::NoDescription)?;
        edit(description);
        Ok(())
    }
}
