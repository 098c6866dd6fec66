use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Semaphore, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::align::{self, RoleStrategy};
use crate::asr::{self, AsrBackend, merge};
use crate::audio;
use crate::config::PipelineConfig;
use crate::diarization::{self, DiarizationBackend, DiarizationOutcome};
use crate::error::{PipelineError, RunError, Stage};
use crate::result::PipelineResult;

/// Observable progress of a run.
///
/// Transcription and diarization execute concurrently; the reported state
/// follows the transcription branch and flips to `Diarizing` while the run
/// waits for the diarization branch to join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Created,
    Normalizing,
    Transcribing,
    Diarizing,
    Aligning,
    Labeling,
    Completed,
    Failed { stage: Stage, transient: bool },
}

/// Guard that aborts a spawned task when dropped.
///
/// Dropping a `JoinHandle` detaches the task instead of stopping it, so a
/// failed or cancelled run would otherwise leave its diarization branch
/// running against the external service.
struct AbortOnDrop<T>(tokio::task::JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// One pipeline run: raw audio bytes in, labeled transcript out.
///
/// A run owns nothing shared except the backend handles and the global
/// outbound request limiter; concurrent runs never touch each other.
pub struct PipelineRun {
    run_id: Uuid,
    config: PipelineConfig,
    asr: Arc<dyn AsrBackend>,
    diarizer: Arc<dyn DiarizationBackend>,
    roles: Arc<dyn RoleStrategy>,
    outbound: Arc<Semaphore>,
    state_tx: watch::Sender<RunState>,
}

impl PipelineRun {
    pub fn new(
        run_id: Uuid,
        config: PipelineConfig,
        asr: Arc<dyn AsrBackend>,
        diarizer: Arc<dyn DiarizationBackend>,
        roles: Arc<dyn RoleStrategy>,
        outbound: Arc<Semaphore>,
    ) -> (Self, watch::Receiver<RunState>) {
        let (state_tx, state_rx) = watch::channel(RunState::Created);
        (
            Self {
                run_id,
                config,
                asr,
                diarizer,
                roles,
                outbound,
                state_tx,
            },
            state_rx,
        )
    }

    fn set_state(&self, state: RunState) {
        debug!(run_id = %self.run_id, ?state, "Run state changed");
        // Nobody may be watching; the run itself does not care.
        let _ = self.state_tx.send(state);
    }

    /// Runs the pipeline to completion or to a typed, stage-attributed
    /// failure.
    pub async fn run(self, audio_bytes: Vec<u8>) -> Result<PipelineResult, RunError> {
        let started = Instant::now();
        info!(
            run_id = %self.run_id,
            bytes = audio_bytes.len(),
            asr = self.asr.name(),
            diarizer = self.diarizer.name(),
            "Pipeline run started"
        );

        match self.execute(audio_bytes).await {
            Ok(result) => {
                self.set_state(RunState::Completed);
                info!(
                    run_id = %self.run_id,
                    segments = result.segments.len(),
                    duration_secs = result.duration_secs,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Pipeline run completed"
                );
                Ok(result)
            }
            Err(err) => {
                self.set_state(RunState::Failed {
                    stage: err.stage,
                    transient: err.is_transient(),
                });
                warn!(run_id = %self.run_id, stage = %err.stage, error = %err, "Pipeline run failed");
                Err(err)
            }
        }
    }

    async fn execute(&self, audio_bytes: Vec<u8>) -> Result<PipelineResult, RunError> {
        self.set_state(RunState::Normalizing);
        let config = self.config.clone();
        let normalized =
            tokio::task::spawn_blocking(move || audio::normalize(&audio_bytes, &config))
                .await
                .map_err(|e| {
                    PipelineError::TaskFailed {
                        detail: format!("normalization task failed: {e}"),
                    }
                    .at(Stage::Normalize)
                })?
                .map_err(|e| PipelineError::from(e).at(Stage::Normalize))?;
        let audio::NormalizedAudio {
            waveform,
            mut warnings,
        } = normalized;

        self.set_state(RunState::Transcribing);
        let chunks = audio::split_chunks(&waveform, &self.asr.limits(), self.config.min_chunk_secs)
            .map_err(|e| e.at(Stage::Chunk))?;

        // Diarization is usually the critical path; start it before the
        // chunk fan-out so both branches overlap.
        let diarize_task = tokio::spawn({
            let diarizer = Arc::clone(&self.diarizer);
            let waveform = waveform.clone();
            let expected = self.config.expected_speakers;
            let timeout = self.config.request_timeout();
            let retry = self.config.retry();
            async move {
                diarization::diarize_waveform(diarizer, &waveform, expected, timeout, &retry).await
            }
        });
        let mut diarize_guard = AbortOnDrop(diarize_task);

        let transcripts = asr::transcribe_chunks(
            Arc::clone(&self.asr),
            &chunks,
            &self.config,
            Arc::clone(&self.outbound),
        )
        .await
        .map_err(|e| PipelineError::from(e).at(Stage::Transcribe))?;
        let merged = merge::merge_chunk_transcripts(&chunks, &transcripts, &self.config);

        self.set_state(RunState::Diarizing);
        let outcome = match (&mut diarize_guard.0).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    run_id = %self.run_id,
                    error = %e,
                    "Diarization branch died, continuing without speaker turns"
                );
                DiarizationOutcome {
                    turns: Vec::new(),
                    degraded: Some(format!("diarization branch failed: {e}")),
                }
            }
        };
        if let Some(reason) = &outcome.degraded {
            warnings.push(format!("diarization degraded: {reason}"));
        }

        self.set_state(RunState::Aligning);
        let aligned = align::align_segments(
            &merged.segments,
            &outcome.turns,
            self.config.min_overlap_ratio,
        )
        .map_err(|e| e.at(Stage::Align))?;

        self.set_state(RunState::Labeling);
        let roles = self.roles.assign(&aligned);
        debug!(
            run_id = %self.run_id,
            policy = self.roles.name(),
            speakers = roles.len(),
            "Roles labeled"
        );

        let language = merged.language.clone().or_else(|| self.config.language.clone());
        Ok(PipelineResult::assemble(
            aligned,
            &roles,
            outcome.turns,
            waveform.duration_secs(),
            language,
            warnings,
        ))
    }
}
