//! Command-line front end for the session transcript pipeline.
//!
//! Reads a WAV file, runs it through transcription, diarization, alignment
//! and role labeling against the configured services, and writes the
//! artifact JSON next to the input (or wherever `--output` points).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sessionscribe_pipeline::{
    DiarizationBackend, ExclusiveDiarizer, PipelineConfig, PipelineEngine, QuestionLeadPolicy,
    RemoteAsrBackend, RemoteAsrConfig, RemoteDiarizationBackend, RemoteDiarizationConfig,
};

#[derive(Parser, Debug)]
#[command(
    name = "sessionscribe",
    about = "Transcribes a recorded session and labels who said what",
    version
)]
struct Args {
    /// Input WAV file.
    input: PathBuf,

    /// Where to write the artifact JSON. Defaults to `<input>.transcript.json`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML config file with `[pipeline]`, `[transcription]` and
    /// `[diarization]` sections.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Language hint override (e.g. "en").
    #[arg(long)]
    language: Option<String>,

    /// Expected speaker count override.
    #[arg(long)]
    speakers: Option<u32>,

    /// Pretty-print the artifact JSON.
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    pipeline: PipelineConfig,
    transcription: RemoteAsrConfig,
    diarization: DiarizationSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DiarizationSection {
    #[serde(flatten)]
    remote: RemoteDiarizationConfig,
    /// Serialize requests to the diarization service. Useful when it hosts
    /// a single resident model.
    serialize: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    run(Args::parse()).await
}

async fn run(args: Args) -> Result<()> {
    let file_config = load_config(args.config.as_deref())?;
    let mut pipeline_config = file_config.pipeline;
    if args.language.is_some() {
        pipeline_config.language = args.language.clone();
    }
    if let Some(speakers) = args.speakers {
        pipeline_config.expected_speakers = Some(speakers);
    }

    let audio = std::fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    info!(
        path = %args.input.display(),
        bytes = audio.len(),
        "Submitting session audio"
    );

    let asr = Arc::new(RemoteAsrBackend::new(file_config.transcription));
    let diarizer: Arc<dyn DiarizationBackend> = if file_config.diarization.serialize {
        Arc::new(ExclusiveDiarizer::new(RemoteDiarizationBackend::new(
            file_config.diarization.remote,
        )))
    } else {
        Arc::new(RemoteDiarizationBackend::new(file_config.diarization.remote))
    };
    let engine = PipelineEngine::new(pipeline_config, asr, diarizer, Arc::new(QuestionLeadPolicy));

    let result = engine.run(audio).await?;
    for warning in &result.warnings {
        warn!(%warning, "Run degraded");
    }

    let artifact = result.to_artifact();
    let json = if args.pretty {
        serde_json::to_string_pretty(&artifact)?
    } else {
        serde_json::to_string(&artifact)?
    };
    let output = args
        .output
        .unwrap_or_else(|| default_output(&args.input));
    std::fs::write(&output, json)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(
        path = %output.display(),
        segments = artifact.metadata.num_segments,
        speakers = artifact.metadata.num_speaker_turns,
        "Artifact written"
    );

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<FileConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
        }
        None => Ok(FileConfig::default()),
    }
}

fn default_output(input: &Path) -> PathBuf {
    input.with_extension("transcript.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_accept_overrides() {
        let args = Args::try_parse_from([
            "sessionscribe",
            "session.wav",
            "--language",
            "en",
            "--speakers",
            "3",
            "--pretty",
        ])
        .unwrap();

        assert_eq!(args.input, PathBuf::from("session.wav"));
        assert_eq!(args.language.as_deref(), Some("en"));
        assert_eq!(args.speakers, Some(3));
        assert!(args.pretty);
        assert!(args.output.is_none());
    }

    #[test]
    fn config_file_sections_parse() {
        let config: FileConfig = toml::from_str(
            r#"
            [pipeline]
            max_inflight_chunks = 2
            language = "de"

            [transcription]
            endpoint = "http://asr.internal/v1/audio/transcriptions"
            model = "whisper-1"

            [diarization]
            endpoint = "http://diarizer.internal/diarize"
            serialize = true
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.max_inflight_chunks, 2);
        assert_eq!(config.pipeline.language.as_deref(), Some("de"));
        assert_eq!(
            config.transcription.endpoint,
            "http://asr.internal/v1/audio/transcriptions"
        );
        assert_eq!(config.transcription.model, "whisper-1");
        assert_eq!(
            config.diarization.remote.endpoint,
            "http://diarizer.internal/diarize"
        );
        assert!(config.diarization.serialize);
        // Untouched sections keep their defaults.
        assert_eq!(config.pipeline.retry_max_attempts, 3);
        assert!(config.transcription.api_key.is_none());
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.pipeline.max_concurrent_runs, 4);
        assert!(!config.diarization.serialize);
    }

    #[test]
    fn output_defaults_next_to_input() {
        assert_eq!(
            default_output(Path::new("/tmp/session.wav")),
            PathBuf::from("/tmp/session.transcript.json")
        );
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
