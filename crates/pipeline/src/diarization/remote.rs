use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{DiarizationBackend, RawTurn};
use crate::audio::{self, Waveform};

/// Configuration for an HTTP diarization endpoint taking a multipart WAV
/// upload and returning speaker turns as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteDiarizationConfig {
    /// Full endpoint URL, e.g. `http://localhost:8001/diarize`.
    pub endpoint: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
}

impl Default for RemoteDiarizationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8001/diarize".to_string(),
            api_key: None,
        }
    }
}

/// Diarization backend calling a pyannote-style HTTP service.
pub struct RemoteDiarizationBackend {
    config: RemoteDiarizationConfig,
    client: reqwest::Client,
}

impl RemoteDiarizationBackend {
    pub fn new(config: RemoteDiarizationConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl DiarizationBackend for RemoteDiarizationBackend {
    async fn diarize(
        &self,
        waveform: &Waveform,
        expected_speakers: Option<u32>,
    ) -> anyhow::Result<Vec<RawTurn>> {
        let wav = audio::encode_wav_pcm16(waveform.samples(), waveform.sample_rate())
            .context("could not encode waveform for diarization")?;
        debug!(bytes = wav.len(), "Uploading waveform for diarization");

        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("session.wav")
            .mime_str("audio/wav")
            .context("multipart build failed")?;
        let mut form = reqwest::multipart::Form::new().part("file", part);
        if let Some(n) = expected_speakers {
            form = form.text("num_speakers", n.to_string());
        }

        let mut request = self.client.post(&self.config.endpoint).multipart(form);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.context("diarization request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("diarization service returned {status}: {body}");
        }

        let body: DiarizationResponse = response
            .json()
            .await
            .context("could not parse diarization response")?;
        Ok(body.into_turns())
    }

    fn name(&self) -> &str {
        "remote_diarizer"
    }
}

/// Services disagree on whether the turn list is wrapped in an object or
/// sent bare, and whether speakers are labels or indices; accept all of it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DiarizationResponse {
    Wrapped { segments: Vec<WireTurn> },
    Bare(Vec<WireTurn>),
}

impl DiarizationResponse {
    fn into_turns(self) -> Vec<RawTurn> {
        let wire = match self {
            Self::Wrapped { segments } => segments,
            Self::Bare(segments) => segments,
        };
        wire.into_iter()
            .map(|t| RawTurn {
                speaker: t.speaker.into_label(),
                start: t.start,
                end: t.end,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct WireTurn {
    #[serde(alias = "speaker_id")]
    speaker: SpeakerLabel,
    start: f64,
    end: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpeakerLabel {
    Name(String),
    Index(u64),
}

impl SpeakerLabel {
    fn into_label(self) -> String {
        match self {
            Self::Name(name) => name,
            Self::Index(index) => index.to_string(),
        }
    }
}
