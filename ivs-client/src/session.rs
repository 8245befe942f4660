//! Async driver around [`StreamState`]
//!
//! An [`AppraisalSession`] owns one state, runs at most one stream per
//! phase, and publishes a snapshot on every change. Starting an operation
//! cancels the previous one for that phase (a new description also cancels
//! the valuation); a successful description chains into a valuation once.

use futures::StreamExt;
use ivs_common::{InstrumentDescription, Phase};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::ClientError;
use crate::http::{ImageFile, PhaseRequest, ValuationBackend};
use crate::progress::DEFAULT_SIMULATION_TICK;
use crate::state::{Applied, CloseAction, Generation, StreamEnd, StreamState};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Use the `/stream` endpoints; otherwise only synchronous requests
    pub streaming: bool,
    pub simulation_tick: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            streaming: true,
            simulation_tick: DEFAULT_SIMULATION_TICK,
        }
    }
}

struct Shared {
    state: StreamState,
    cancels: HashMap<Phase, CancellationToken>,
}

struct Inner {
    backend: Arc<dyn ValuationBackend>,
    options: SessionOptions,
    shared: Mutex<Shared>,
    snapshots: watch::Sender<StreamState>,
}

#[derive(Clone)]
pub struct AppraisalSession {
    inner: Arc<Inner>,
}

impl AppraisalSession {
    pub fn new(backend: Arc<dyn ValuationBackend>, options: SessionOptions) -> Self {
        let (snapshots, _) = watch::channel(StreamState::new());
        Self {
            inner: Arc::new(Inner {
                backend,
                options,
                shared: Mutex::new(Shared {
                    state: StreamState::new(),
                    cancels: HashMap::new(),
                }),
                snapshots,
            }),
        }
    }

    /// Receiver of state snapshots, one per change
    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.inner.snapshots.subscribe()
    }

    pub async fn snapshot(&self) -> StreamState {
        self.inner.shared.lock().await.state.clone()
    }

    /// Describe a photo; supersedes every earlier operation
    pub async fn describe(&self, image: ImageFile) -> Generation {
        let mut shared = self.inner.shared.lock().await;
        let generation = self.inner.launch(&mut shared, PhaseRequest::Describe(image));
        self.inner.publish(&shared.state);
        generation
    }

    /// Estimate `description`; supersedes an earlier valuation
    pub async fn estimate(&self, description: InstrumentDescription) -> Generation {
        let mut shared = self.inner.shared.lock().await;
        let generation = self.inner.launch(&mut shared, PhaseRequest::Estimate(description));
        self.inner.publish(&shared.state);
        generation
    }

    /// Re-estimate the current (possibly edited) description
    pub async fn estimate_current(&self) -> Result<Generation, ClientError> {
        let mut shared = self.inner.shared.lock().await;
        let description = shared
            .state
            .description
            .clone()
            .ok_or(ClientError::NoDescription)?;
        let generation = self.inner.launch(&mut shared, PhaseRequest::Estimate(description));
        self.inner.publish(&shared.state);
        Ok(generation)
    }

    pub async fn edit_description<F>(&self, edit: F) -> Result<(), ClientError>
    where
        F: FnOnce(&mut InstrumentDescription),
    {
        let mut shared = self.inner.shared.lock().await;
        shared.state.edit_description(edit)?;
        self.inner.publish(&shared.state);
        Ok(())
    }

    /// Abort the in-flight operation of `phase`, if any
    pub async fn cancel(&self, phase: Phase) {
        let shared = self.inner.shared.lock().await;
        if let Some(token) = shared.cancels.get(&phase) {
            token.cancel();
        }
    }

    /// Wait until neither phase is running and return that state
    pub async fn settled(&self) -> StreamState {
        let mut rx = self.subscribe();
        let settled = rx.wait_for(StreamState::is_settled).await.map(|state| state.clone());
        match settled {
            Ok(state) => state,
            Err(_) => self.snapshot().await,
        }
    }
}

impl Inner {
    fn publish(&self, state: &StreamState) {
        self.snapshots.send_replace(state.clone());
    }

    /// Begin `request` in the state, cancel what it supersedes and spawn
    /// its run. Called with the shared lock held.
    fn launch(self: &Arc<Self>, shared: &mut Shared, request: PhaseRequest) -> Generation {
        let phase = request.phase();
        let generation = shared.state.begin(phase);

        let superseded: &[Phase] = match phase {
            Phase::Vision => &[Phase::Vision, Phase::Rag],
            Phase::Rag => &[Phase::Rag],
        };
        for stale in superseded {
            if let Some(token) = shared.cancels.remove(stale) {
                token.cancel();
            }
        }
        let cancel = CancellationToken::new();
        shared.cancels.insert(phase, cancel.clone());

        let span = info_span!("phase_run", %phase, generation);
        tokio::spawn(
            Arc::clone(self)
                .simulate(phase, generation, cancel.clone())
                .instrument(span.clone()),
        );
        tokio::spawn(
            Arc::clone(self)
                .run(phase, generation, request, cancel)
                .instrument(span),
        );
        generation
    }

    async fn run(
        self: Arc<Self>,
        phase: Phase,
        generation: Generation,
        request: PhaseRequest,
        cancel: CancellationToken,
    ) {
        let fallback = if self.options.streaming {
            let end = tokio::select! {
                _ = cancel.cancelled() => StreamEnd::Cancelled,
                end = self.consume(phase, generation, &request) => end,
            };
            let mut shared = self.shared.lock().await;
            let action = shared.state.stream_closed(phase, generation, end);
            self.publish(&shared.state);
            match action {
                Ok(action) => action == CloseAction::Fallback,
                Err(err) => {
                    debug!(error = %err, "Stream end ignored");
                    false
                }
            }
        } else {
            true
        };

        if !fallback {
            return;
        }
        if self.options.streaming {
            info!("Stream delivered no events, retrying synchronously");
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                let mut shared = self.shared.lock().await;
                if shared.state.stream_closed(phase, generation, StreamEnd::Cancelled).is_ok() {
                    self.publish(&shared.state);
                }
                return;
            }
            outcome = self.backend.request(&request) => outcome,
        };

        let mut shared = self.shared.lock().await;
        match shared.state.apply_fallback(phase, generation, outcome) {
            Ok(Applied::Completed) => self.after_completion(&mut shared, phase, generation),
            Ok(_) => {
                if let Some(error) = &shared.state.error {
                    warn!(%error, "Synchronous request failed");
                }
            }
            Err(err) => debug!(error = %err, "Fallback result ignored"),
        }
        self.publish(&shared.state);
    }

    /// A finished description chains into its one valuation
    fn after_completion(self: &Arc<Self>, shared: &mut Shared, phase: Phase, generation: Generation) {
        if phase != Phase::Vision {
            return;
        }
        if let Some(description) = shared.state.take_auto_estimate(generation) {
            info!("Description ready, starting valuation");
            self.launch(shared, PhaseRequest::Estimate(description));
        }
    }

    /// Drain one stream into the state
    async fn consume(self: &Arc<Self>, phase: Phase, generation: Generation, request: &PhaseRequest) -> StreamEnd {
        let mut events = match self.backend.open_stream(request).await {
            Ok(events) => events,
            Err(err) => {
                warn!(error = %err, "Failed to open event stream");
                return StreamEnd::Failed(err);
            }
        };

        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "Event stream failed");
                    return StreamEnd::Failed(err);
                }
            };

            let mut shared = self.shared.lock().await;
            let applied = shared.state.apply_event(phase, generation, event);
            match applied {
                Ok(Applied::Progress) => {}
                Ok(Applied::Completed) => {
                    self.after_completion(&mut shared, phase, generation);
                    self.publish(&shared.state);
                    return StreamEnd::Closed;
                }
                Ok(Applied::Failed) => {
                    self.publish(&shared.state);
                    return StreamEnd::Closed;
                }
                Err(err) => {
                    debug!(error = %err, "Superseded stream dropped");
                    return StreamEnd::Cancelled;
                }
            }
            self.publish(&shared.state);
        }
        StreamEnd::Closed
    }

    /// Advance the simulated indicator until a real event arrives
    async fn simulate(self: Arc<Self>, phase: Phase, generation: Generation, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.options.simulation_tick);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let mut shared = self.shared.lock().await;
            if !shared.state.tick_simulation(phase, generation) {
                return;
            }
            self.publish(&shared.state);
        }
    }
}
