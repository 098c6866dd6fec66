use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AsrBackend, ChunkTranscript, TranscriptSegment};
use crate::audio::{self, AudioChunk, UploadLimits};
use crate::error::AsrError;

/// Configuration for an OpenAI-compatible transcription endpoint
/// (`POST {endpoint}` with a multipart WAV upload).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteAsrConfig {
    /// Full endpoint URL, e.g. `http://localhost:8000/v1/audio/transcriptions`.
    pub endpoint: String,
    /// Model name passed through in the form body.
    pub model: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Largest request body the service accepts, in bytes.
    pub max_upload_bytes: u64,
    /// Longest single upload the service accepts, in seconds.
    pub max_chunk_secs: f64,
}

impl Default for RemoteAsrConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/v1/audio/transcriptions".to_string(),
            model: "whisper-large-v3".to_string(),
            api_key: None,
            max_upload_bytes: 25 * 1024 * 1024,
            max_chunk_secs: 600.0,
        }
    }
}

/// Transcription backend speaking the OpenAI audio-transcriptions protocol
/// (Whisper-style servers, Voxtral, open-asr-server and similar).
pub struct RemoteAsrBackend {
    config: RemoteAsrConfig,
    client: reqwest::Client,
}

impl RemoteAsrBackend {
    pub fn new(config: RemoteAsrConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AsrBackend for RemoteAsrBackend {
    async fn transcribe_chunk(
        &self,
        chunk: &AudioChunk,
        language_hint: Option<&str>,
    ) -> Result<ChunkTranscript, AsrError> {
        let wav = audio::encode_wav_pcm16(chunk.samples(), chunk.sample_rate()).map_err(|e| {
            AsrError::MalformedAudio {
                message: format!("could not encode upload: {e}"),
            }
        })?;
        debug!(
            chunk = chunk.index(),
            bytes = wav.len(),
            "Uploading chunk for transcription"
        );

        let part = reqwest::multipart::Part::bytes(wav)
            .file_name(format!("chunk-{:03}.wav", chunk.index()))
            .mime_str("audio/wav")
            .map_err(|e| AsrError::Transport {
                message: format!("multipart build failed: {e}"),
            })?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json");
        if let Some(lang) = language_hint {
            form = form.text("language", lang.to_string());
        }

        let mut request = self.client.post(&self.config.endpoint).multipart(form);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| AsrError::Transport {
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let body: VerboseTranscription =
            response.json().await.map_err(|e| AsrError::InvalidResponse {
                message: format!("could not parse transcription response: {e}"),
            })?;
        Ok(transcript_from_response(body, chunk.duration_secs()))
    }

    fn limits(&self) -> UploadLimits {
        UploadLimits {
            max_upload_bytes: self.config.max_upload_bytes,
            max_chunk_secs: self.config.max_chunk_secs,
        }
    }

    fn name(&self) -> &str {
        "openai_compat"
    }
}

/// Whisper-style `verbose_json` response body. Servers that only return
/// plain `{ "text": ... }` parse too; the segment list is then synthesized.
#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    text: String,
    language: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    segments: Vec<VerboseSegment>,
}

#[derive(Debug, Deserialize)]
struct VerboseSegment {
    start: f64,
    end: f64,
    text: String,
}

fn classify_status(status: StatusCode, body: String) -> AsrError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => AsrError::RateLimited,
        StatusCode::BAD_REQUEST
        | StatusCode::UNSUPPORTED_MEDIA_TYPE
        | StatusCode::UNPROCESSABLE_ENTITY => AsrError::MalformedAudio { message: body },
        s if s.is_server_error() => AsrError::Transport {
            message: format!("service returned {s}: {body}"),
        },
        s => AsrError::Rejected {
            status: s.as_u16(),
            message: body,
        },
    }
}

fn transcript_from_response(body: VerboseTranscription, chunk_duration: f64) -> ChunkTranscript {
    let mut segments: Vec<TranscriptSegment> = body
        .segments
        .into_iter()
        .map(|s| TranscriptSegment {
            start: s.start,
            end: s.end,
            text: s.text.trim().to_string(),
        })
        .collect();

    // A plain-text response still carries usable content; represent it as
    // one segment spanning the chunk.
    if segments.is_empty() && !body.text.trim().is_empty() {
        segments.push(TranscriptSegment {
            start: 0.0,
            end: body.duration.unwrap_or(chunk_duration),
            text: body.text.trim().to_string(),
        });
    }

    ChunkTranscript {
        segments,
        detected_duration_secs: body.duration,
        language: body.language,
    }
}
