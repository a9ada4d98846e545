//! External collaborator seams
//!
//! The pipeline consumes metadata extraction, audio acquisition,
//! transcription, and LLM summarization through the narrow async traits
//! defined here. Engine selection is a closed enum resolved into concrete
//! implementations once, at startup, so an unknown engine cannot survive
//! past configuration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{LlmEngineKind, ProcessingOptions, TranscriptionEngineKind};
use crate::lifecycle::ResourceManager;
use crate::pipeline::ShowNoteMetadata;
use crate::{CastnotesError, Result};

pub mod audio;
pub mod llm;
pub mod metadata;
pub mod transcription;

/// Result of a single transcription call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// The transcribed text
    pub transcript: String,

    /// Engine model that produced it
    pub model_id: String,

    /// Vendor rate used for cost accounting
    pub cost_per_minute_cents: f64,
}

/// What audio acquisition starts from
#[derive(Debug, Clone, Copy)]
pub enum AcquisitionSource<'a> {
    /// A remote media URL handed to yt-dlp
    RemoteUrl(&'a str),
    /// A local media file converted with ffmpeg
    LocalFile(&'a Path),
}

/// Extracts descriptive metadata for a remote source
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<ShowNoteMetadata>;
}

/// Materializes a normalized audio artifact at `<dest_base>.wav`
#[async_trait]
pub trait AudioAcquirer: Send + Sync {
    async fn acquire(&self, source: AcquisitionSource<'_>, dest_base: &Path) -> Result<PathBuf>;
}

/// A speech-to-text engine
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResult>;

    fn name(&self) -> &'static str;
}

/// Inputs handed to an LLM engine for show-note generation
#[derive(Debug, Clone, Copy)]
pub struct LlmRequest<'a> {
    pub front_matter: &'a str,
    pub prompt: &'a str,
    pub transcript: &'a str,
    pub metadata: &'a ShowNoteMetadata,
}

/// A large-language-model engine
#[async_trait]
pub trait LlmEngine: Send + Sync {
    async fn generate(&self, request: LlmRequest<'_>) -> Result<String>;

    fn name(&self) -> &'static str;

    fn model_id(&self) -> &str;
}

/// The collaborators a run is wired with
pub struct EngineSet {
    pub metadata: Arc<dyn MetadataExtractor>,
    pub audio: Arc<dyn AudioAcquirer>,
    pub transcription: Option<Arc<dyn TranscriptionEngine>>,
    pub llm: Option<Arc<dyn LlmEngine>>,
}

impl EngineSet {
    /// Resolve the configured engine selections into concrete engines.
    /// Missing API keys surface here, before any stage runs.
    pub fn from_options(
        options: &ProcessingOptions,
        manager: &ResourceManager,
        http: &reqwest::Client,
    ) -> Result<Self> {
        let transcription: Option<Arc<dyn TranscriptionEngine>> = match &options.transcription {
            Some(TranscriptionEngineKind::Whisper { model }) => Some(Arc::new(
                transcription::WhisperEngine::new(manager.clone(), model.clone()),
            )),
            Some(TranscriptionEngineKind::Deepgram { model }) => {
                Some(Arc::new(transcription::DeepgramEngine::new(
                    http.clone(),
                    api_key("DEEPGRAM_API_KEY")?,
                    model.clone(),
                )))
            }
            Some(TranscriptionEngineKind::Assembly { model }) => {
                Some(Arc::new(transcription::AssemblyEngine::new(
                    http.clone(),
                    api_key("ASSEMBLYAI_API_KEY")?,
                    model.clone(),
                )))
            }
            None => None,
        };

        let llm: Option<Arc<dyn LlmEngine>> = match &options.llm {
            Some(LlmEngineKind::ChatGpt { model }) => Some(Arc::new(llm::ChatGptEngine::new(
                http.clone(),
                api_key("OPENAI_API_KEY")?,
                model.clone(),
            ))),
            Some(LlmEngineKind::Claude { model }) => Some(Arc::new(llm::ClaudeEngine::new(
                http.clone(),
                api_key("ANTHROPIC_API_KEY")?,
                model.clone(),
            ))),
            Some(LlmEngineKind::Gemini { model }) => Some(Arc::new(llm::GeminiEngine::new(
                http.clone(),
                api_key("GEMINI_API_KEY")?,
                model.clone(),
            ))),
            None => None,
        };

        Ok(Self {
            metadata: Arc::new(metadata::YtDlpMetadataExtractor::new(manager.clone())),
            audio: Arc::new(audio::MediaAudioAcquirer::new(manager.clone())),
            transcription,
            llm,
        })
    }

    /// The selected transcription engine; its absence is a configuration
    /// error raised before the retry wrapper is entered.
    pub fn transcription(&self) -> Result<&Arc<dyn TranscriptionEngine>> {
        self.transcription
            .as_ref()
            .ok_or_else(|| CastnotesError::Config("no transcription engine selected".into()))
    }
}

fn api_key(var: &str) -> Result<String> {
    std::env::var(var)
        .map_err(|_| CastnotesError::Config(format!("missing API key in environment: {var}")))
}
