//! Run registry and concurrency control.
//!
//! The engine owns the backend handles and two semaphores: one bounding how
//! many runs execute at once, one bounding outbound service requests across
//! all runs. Individual runs are spawned tasks that unregister themselves
//! when they finish; cancellation aborts the task, which also tears down the
//! run's in-flight service requests.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Semaphore, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::align::RoleStrategy;
use crate::asr::AsrBackend;
use crate::config::PipelineConfig;
use crate::diarization::DiarizationBackend;
use crate::error::{PipelineError, RunError, Stage};
use crate::result::PipelineResult;
use crate::runner::{PipelineRun, RunState};

struct RunEntry {
    abort_handle: tokio::task::AbortHandle,
}

/// Handle to a started run.
pub struct RunHandle {
    pub run_id: Uuid,
    state: watch::Receiver<RunState>,
    join: JoinHandle<Result<PipelineResult, RunError>>,
}

impl RunHandle {
    /// Current state of the run.
    pub fn state(&self) -> RunState {
        self.state.borrow().clone()
    }

    /// A receiver that observes state transitions as they happen.
    pub fn watch(&self) -> watch::Receiver<RunState> {
        self.state.clone()
    }

    /// Waits for the run to finish.
    ///
    /// A cancelled run surfaces as [`PipelineError::Cancelled`] attributed
    /// to whichever stage it was in when the abort landed.
    pub async fn wait(self) -> Result<PipelineResult, RunError> {
        let Self { state, join, .. } = self;
        match join.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => {
                Err(PipelineError::Cancelled.at(stage_for_state(&state.borrow())))
            }
            Err(e) => Err(PipelineError::TaskFailed {
                detail: format!("run task panicked: {e}"),
            }
            .at(stage_for_state(&state.borrow()))),
        }
    }
}

fn stage_for_state(state: &RunState) -> Stage {
    match state {
        RunState::Created | RunState::Normalizing => Stage::Normalize,
        RunState::Transcribing => Stage::Transcribe,
        RunState::Diarizing => Stage::Diarize,
        RunState::Aligning => Stage::Align,
        RunState::Labeling | RunState::Completed => Stage::Label,
        RunState::Failed { stage, .. } => *stage,
    }
}

/// Shared engine that accepts audio and produces labeled transcripts.
pub struct PipelineEngine {
    config: PipelineConfig,
    asr: Arc<dyn AsrBackend>,
    diarizer: Arc<dyn DiarizationBackend>,
    roles: Arc<dyn RoleStrategy>,
    outbound: Arc<Semaphore>,
    run_slots: Arc<Semaphore>,
    runs: Arc<DashMap<Uuid, RunEntry>>,
}

impl PipelineEngine {
    pub fn new(
        config: PipelineConfig,
        asr: Arc<dyn AsrBackend>,
        diarizer: Arc<dyn DiarizationBackend>,
        roles: Arc<dyn RoleStrategy>,
    ) -> Self {
        let outbound = Arc::new(Semaphore::new(config.max_outbound_requests.max(1)));
        let run_slots = Arc::new(Semaphore::new(config.max_concurrent_runs.max(1)));
        info!(
            asr = asr.name(),
            diarizer = diarizer.name(),
            roles = roles.name(),
            max_concurrent_runs = config.max_concurrent_runs,
            max_outbound_requests = config.max_outbound_requests,
            "Pipeline engine ready"
        );
        Self {
            config,
            asr,
            diarizer,
            roles,
            outbound,
            run_slots,
            runs: Arc::new(DashMap::new()),
        }
    }

    /// Starts a run and returns immediately.
    ///
    /// If all run slots are busy the run stays queued in `Created` until one
    /// frees up.
    pub fn start_run(&self, audio_bytes: Vec<u8>) -> RunHandle {
        let run_id = Uuid::new_v4();
        let (run, state_rx) = PipelineRun::new(
            run_id,
            self.config.clone(),
            Arc::clone(&self.asr),
            Arc::clone(&self.diarizer),
            Arc::clone(&self.roles),
            Arc::clone(&self.outbound),
        );

        let runs = Arc::clone(&self.runs);
        let slots = Arc::clone(&self.run_slots);
        let (registered_tx, registered_rx) = oneshot::channel();
        let join = tokio::spawn(async move {
            // The registry insert below must land before the cleanup here
            // can run, or a fast run would leave a stale entry behind.
            let _ = registered_rx.await;
            let result = match slots.acquire_owned().await {
                Ok(_slot) => run.run(audio_bytes).await,
                // The slot semaphore is never closed while the engine lives.
                Err(_) => Err(PipelineError::Cancelled.at(Stage::Normalize)),
            };
            runs.remove(&run_id);
            result
        });

        self.runs.insert(
            run_id,
            RunEntry {
                abort_handle: join.abort_handle(),
            },
        );
        let _ = registered_tx.send(());
        info!(%run_id, active = self.runs.len(), "Run registered");

        RunHandle {
            run_id,
            state: state_rx,
            join,
        }
    }

    /// Starts a run and waits for it.
    pub async fn run(&self, audio_bytes: Vec<u8>) -> Result<PipelineResult, RunError> {
        self.start_run(audio_bytes).wait().await
    }

    /// Aborts a run, abandoning its in-flight service requests.
    ///
    /// Returns false if no run with that id is active.
    pub fn cancel_run(&self, run_id: Uuid) -> bool {
        match self.runs.remove(&run_id) {
            Some((_, entry)) => {
                entry.abort_handle.abort();
                info!(%run_id, "Run cancelled");
                true
            }
            None => {
                warn!(%run_id, "Cancel requested for unknown run");
                false
            }
        }
    }

    /// Number of runs currently registered (queued or executing).
    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }
}
