use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{DiarizationBackend, RawTurn};
use crate::audio::Waveform;

/// Serializes access to a backend holding a single resident model.
///
/// A GPU-resident diarization model is non-reentrant: one inference at a
/// time, process-wide. Wrapping the backend makes that constraint explicit;
/// concurrent runs queue on the lock instead of racing for the model.
pub struct ExclusiveDiarizer<B> {
    name: String,
    inner: Mutex<B>,
}

impl<B: DiarizationBackend> ExclusiveDiarizer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            name: format!("exclusive({})", backend.name()),
            inner: Mutex::new(backend),
        }
    }
}

#[async_trait]
impl<B: DiarizationBackend> DiarizationBackend for ExclusiveDiarizer<B> {
    async fn diarize(
        &self,
        waveform: &Waveform,
        expected_speakers: Option<u32>,
    ) -> anyhow::Result<Vec<RawTurn>> {
        let guard = self.inner.lock().await;
        debug!(backend = %self.name, "Acquired diarization model");
        guard.diarize(waveform, expected_speakers).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
