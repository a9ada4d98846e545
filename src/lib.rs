//! Castnotes - A Rust CLI tool for turning media into show notes
//!
//! This library chains metadata extraction, audio acquisition, speech
//! transcription, prompt selection, and LLM summarization into a single
//! pipeline, driven from a local file, a URL list, or RSS feeds.

pub mod cli;
pub mod config;
pub mod engines;
pub mod feed;
pub mod lifecycle;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod utils;

pub use cli::Cli;
pub use config::{ProcessingOptions, SourceKind};
pub use engines::TranscriptionResult;
pub use lifecycle::ResourceManager;
pub use orchestrator::ShowNotesPipeline;
pub use pipeline::{PipelineItemResult, ShowNoteMetadata};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, CastnotesError>;

/// Error types for the show-notes pipeline
///
/// Every failure is typed so that the binary entry point is the only place
/// translating an error into an exit code.
#[derive(thiserror::Error, Debug)]
pub enum CastnotesError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("metadata extraction failed: {0}")]
    Metadata(String),

    #[error("audio acquisition failed: {0}")]
    AudioAcquisition(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("LLM call failed: {0}")]
    Llm(String),

    #[error("feed error: {0}")]
    Feed(String),

    #[error("max retries ({attempts}) reached: {source}")]
    MaxRetries {
        attempts: u32,
        #[source]
        source: Box<CastnotesError>,
    },

    #[error("interrupted")]
    Interrupted,

    #[error("file operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config file parsing failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
