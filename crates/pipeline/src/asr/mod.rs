//! Transcription backends and the per-chunk fan-out.
//!
//! A backend turns one [`AudioChunk`] into chunk-local segments; everything
//! about global time, ordering and boundary cleanup lives in [`merge`].

pub mod merge;
pub mod remote;

pub use remote::{RemoteAsrBackend, RemoteAsrConfig};

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::audio::{AudioChunk, UploadLimits};
use crate::config::PipelineConfig;
use crate::error::AsrError;
use crate::retry;

/// Drift between a chunk's nominal length and the duration the service
/// reports for it that is worth surfacing in the logs.
const DURATION_DRIFT_WARN_SECS: f64 = 2.0;

/// One transcribed span. Backends return these in chunk-local time;
/// [`merge::merge_chunk_transcripts`] rebases them to session time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// A single chunk's transcription response.
#[derive(Debug, Clone)]
pub struct ChunkTranscript {
    pub segments: Vec<TranscriptSegment>,
    /// Duration the service measured for the uploaded audio, if reported.
    pub detected_duration_secs: Option<f64>,
    /// Language the service detected, if reported.
    pub language: Option<String>,
}

/// Trait for pluggable transcription backends.
#[async_trait]
pub trait AsrBackend: Send + Sync + 'static {
    /// Transcribes one chunk into chunk-local segments.
    ///
    /// Implementations report failures through [`AsrError`] so the caller
    /// can tell transient conditions from fatal ones; retries and timeouts
    /// are applied by the caller, not here.
    async fn transcribe_chunk(
        &self,
        chunk: &AudioChunk,
        language_hint: Option<&str>,
    ) -> Result<ChunkTranscript, AsrError>;

    /// Upload budget a single request must respect.
    fn limits(&self) -> UploadLimits;

    /// Human-readable backend name.
    fn name(&self) -> &str;
}

/// Transcribes every chunk with bounded concurrency.
///
/// At most `max_inflight_chunks` requests run at once within this call, and
/// each in-flight request additionally holds a permit from the process-wide
/// `outbound` semaphore while it is on the wire. Results come back in chunk
/// order regardless of completion order. Each chunk retries transient
/// failures with backoff; a chunk that exhausts its retries (or hits a fatal
/// error) fails the whole call, abandoning the remaining in-flight requests.
pub async fn transcribe_chunks(
    backend: Arc<dyn AsrBackend>,
    chunks: &[AudioChunk],
    config: &PipelineConfig,
    outbound: Arc<Semaphore>,
) -> Result<Vec<ChunkTranscript>, AsrError> {
    let retry_config = config.retry();
    let timeout = config.request_timeout();
    let timeout_secs = config.request_timeout_secs;
    let max_inflight = config.max_inflight_chunks.max(1);

    debug!(
        backend = backend.name(),
        chunks = chunks.len(),
        max_inflight,
        "Transcribing chunks"
    );

    // Build the request futures up front. Handing `stream::iter` the mapping
    // closure directly ties the futures' type to the closure's borrow, which
    // the runtime cannot prove `Send` once the caller is spawned.
    let requests: Vec<_> = chunks
        .iter()
        .map(|chunk| {
            let backend = Arc::clone(&backend);
            let outbound = Arc::clone(&outbound);
            let language = config.language.clone();
            async move {
                let what = format!("transcription of chunk {}", chunk.index());
                let transcript = retry::with_backoff(retry_config, &what, || {
                    let backend = Arc::clone(&backend);
                    let outbound = Arc::clone(&outbound);
                    let language = language.clone();
                    async move {
                        let _permit = outbound.acquire().await.map_err(|_| AsrError::Transport {
                            message: "outbound request limiter closed".to_string(),
                        })?;
                        match tokio::time::timeout(
                            timeout,
                            backend.transcribe_chunk(chunk, language.as_deref()),
                        )
                        .await
                        {
                            Ok(result) => result,
                            Err(_) => Err(AsrError::Timeout { secs: timeout_secs }),
                        }
                    }
                })
                .await?;

                if let Some(detected) = transcript.detected_duration_secs {
                    let drift = (detected - chunk.duration_secs()).abs();
                    if drift > DURATION_DRIFT_WARN_SECS {
                        warn!(
                            chunk = chunk.index(),
                            detected,
                            nominal = chunk.duration_secs(),
                            "Service-detected duration drifts from chunk length"
                        );
                    }
                }
                Ok::<_, AsrError>(transcript)
            }
        })
        .collect();

    let transcripts: Vec<ChunkTranscript> = stream::iter(requests)
        .buffered(max_inflight)
        .try_collect()
        .await?;

    info!(
        backend = backend.name(),
        chunks = transcripts.len(),
        segments = transcripts.iter().map(|t| t.segments.len()).sum::<usize>(),
        "Transcription complete"
    );
    Ok(transcripts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::split_chunks;
    use crate::audio::testing::waveform_secs;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    fn four_chunks() -> Vec<AudioChunk> {
        let waveform = waveform_secs(40.0, 0.1);
        let limits = UploadLimits {
            max_upload_bytes: u64::MAX,
            max_chunk_secs: 10.0,
        };
        split_chunks(&waveform, &limits, 1.0).unwrap()
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            retry_initial_backoff_ms: 10,
            retry_max_backoff_ms: 40,
            ..PipelineConfig::default()
        }
    }

    fn transcript_saying(text: &str) -> ChunkTranscript {
        ChunkTranscript {
            segments: vec![TranscriptSegment {
                start: 0.0,
                end: 1.0,
                text: text.to_string(),
            }],
            detected_duration_secs: None,
            language: Some("en".to_string()),
        }
    }

    struct SlowEarlyBackend;

    #[async_trait]
    impl AsrBackend for SlowEarlyBackend {
        async fn transcribe_chunk(
            &self,
            chunk: &AudioChunk,
            _language_hint: Option<&str>,
        ) -> Result<ChunkTranscript, AsrError> {
            // Earlier chunks take longer, so completion order is reversed.
            let delay = 100 - chunk.index() as u64 * 20;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(transcript_saying(&format!("chunk {}", chunk.index())))
        }

        fn limits(&self) -> UploadLimits {
            UploadLimits {
                max_upload_bytes: u64::MAX,
                max_chunk_secs: 10.0,
            }
        }

        fn name(&self) -> &str {
            "slow-early"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn results_come_back_in_chunk_order() {
        let chunks = four_chunks();
        let outbound = Arc::new(Semaphore::new(8));

        let transcripts = transcribe_chunks(
            Arc::new(SlowEarlyBackend),
            &chunks,
            &test_config(),
            outbound,
        )
        .await
        .unwrap();

        let texts: Vec<&str> = transcripts
            .iter()
            .map(|t| t.segments[0].text.as_str())
            .collect();
        assert_eq!(texts, ["chunk 0", "chunk 1", "chunk 2", "chunk 3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_runs_inside_a_spawned_task() {
        // The runner drives this through `tokio::spawn`, which requires the
        // whole fan-out future to be `Send`; exercise that path directly.
        let outbound = Arc::new(Semaphore::new(8));

        let handle = tokio::spawn(async move {
            let chunks = four_chunks();
            transcribe_chunks(
                Arc::new(SlowEarlyBackend),
                &chunks,
                &test_config(),
                outbound,
            )
            .await
        });

        let transcripts = handle.await.unwrap().unwrap();
        assert_eq!(transcripts.len(), 4);
    }

    struct FlakyBackend {
        calls: AtomicU32,
    }

    #[async_trait]
    impl AsrBackend for FlakyBackend {
        async fn transcribe_chunk(
            &self,
            _chunk: &AudioChunk,
            _language_hint: Option<&str>,
        ) -> Result<ChunkTranscript, AsrError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(AsrError::RateLimited);
            }
            Ok(transcript_saying("ok"))
        }

        fn limits(&self) -> UploadLimits {
            UploadLimits {
                max_upload_bytes: u64::MAX,
                max_chunk_secs: 60.0,
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_per_chunk() {
        let waveform = waveform_secs(5.0, 0.1);
        let backend = Arc::new(FlakyBackend {
            calls: AtomicU32::new(0),
        });
        let chunks = split_chunks(&waveform, &backend.limits(), 1.0).unwrap();

        let transcripts = transcribe_chunks(
            Arc::clone(&backend) as Arc<dyn AsrBackend>,
            &chunks,
            &test_config(),
            Arc::new(Semaphore::new(8)),
        )
        .await
        .unwrap();

        assert_eq!(transcripts.len(), 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    struct RejectingBackend;

    #[async_trait]
    impl AsrBackend for RejectingBackend {
        async fn transcribe_chunk(
            &self,
            _chunk: &AudioChunk,
            _language_hint: Option<&str>,
        ) -> Result<ChunkTranscript, AsrError> {
            Err(AsrError::MalformedAudio {
                message: "not audio".to_string(),
            })
        }

        fn limits(&self) -> UploadLimits {
            UploadLimits {
                max_upload_bytes: u64::MAX,
                max_chunk_secs: 10.0,
            }
        }

        fn name(&self) -> &str {
            "rejecting"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_are_not_retried_and_fail_the_call() {
        let chunks = four_chunks();

        let err = transcribe_chunks(
            Arc::new(RejectingBackend),
            &chunks,
            &test_config(),
            Arc::new(Semaphore::new(8)),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AsrError::MalformedAudio { .. }));
    }

    struct CountingBackend {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl AsrBackend for CountingBackend {
        async fn transcribe_chunk(
            &self,
            _chunk: &AudioChunk,
            _language_hint: Option<&str>,
        ) -> Result<ChunkTranscript, AsrError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(transcript_saying("ok"))
        }

        fn limits(&self) -> UploadLimits {
            UploadLimits {
                max_upload_bytes: u64::MAX,
                max_chunk_secs: 10.0,
            }
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_semaphore_caps_wire_concurrency() {
        let chunks = four_chunks();
        let backend = Arc::new(CountingBackend {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });

        transcribe_chunks(
            Arc::clone(&backend) as Arc<dyn AsrBackend>,
            &chunks,
            &test_config(),
            Arc::new(Semaphore::new(2)),
        )
        .await
        .unwrap();

        assert!(backend.peak.load(Ordering::SeqCst) <= 2);
    }
}
