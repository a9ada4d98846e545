//! The stage pipeline
//!
//! Five ordered stages turn one source item into a [`PipelineItemResult`]:
//! front matter, audio acquisition, transcription dispatch, prompt
//! selection, and LLM execution. Each stage consumes the previous stage's
//! output; a stage never runs with a partially-populated predecessor result.
//! A failure aborts the pipeline for that item only.

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::ProcessingOptions;
use crate::engines::{AcquisitionSource, EngineSet, LlmRequest, TranscriptionResult};
use crate::lifecycle::ResourceManager;
use crate::retry::{with_retry, RetryPolicy};
use crate::{CastnotesError, Result};

pub mod front_matter;
pub mod prompt;

/// One source item's descriptive data, created by the front-matter stage
/// and immutable afterward
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowNoteMetadata {
    pub show_link: String,
    pub channel: String,
    #[serde(rename = "channelURL")]
    pub channel_url: String,
    pub title: String,
    pub description: String,
    pub publish_date: String,
    pub cover_image: String,
}

/// One item to run through the stage pipeline
#[derive(Debug, Clone)]
pub enum ItemSource {
    /// A local media file
    LocalFile(PathBuf),
    /// A remote media URL
    Url(String),
    /// A feed item that already carries its metadata
    FeedItem(ShowNoteMetadata),
}

impl ItemSource {
    /// Short human label for log lines
    pub fn descriptor(&self) -> String {
        match self {
            ItemSource::LocalFile(path) => path.display().to_string(),
            ItemSource::Url(url) => url.clone(),
            ItemSource::FeedItem(metadata) => metadata.title.clone(),
        }
    }
}

/// Per-item outcome folded into the batch result list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineItemResult {
    pub front_matter: String,
    pub final_path: String,
    pub prompt: String,
    pub transcript: String,
    pub llm_output: String,
    pub failed: bool,
}

impl PipelineItemResult {
    /// Error-flagged result with empty fields for stages that never ran
    pub fn failure() -> Self {
        Self {
            front_matter: String::new(),
            final_path: String::new(),
            prompt: String::new(),
            transcript: String::new(),
            llm_output: String::new(),
            failed: true,
        }
    }
}

/// Runs the five stages for single items
pub struct ItemProcessor<'a> {
    options: &'a ProcessingOptions,
    engines: &'a EngineSet,
    manager: &'a ResourceManager,
    retry: &'a RetryPolicy,
}

impl<'a> ItemProcessor<'a> {
    pub fn new(
        options: &'a ProcessingOptions,
        engines: &'a EngineSet,
        manager: &'a ResourceManager,
        retry: &'a RetryPolicy,
    ) -> Self {
        Self {
            options,
            engines,
            manager,
            retry,
        }
    }

    /// Run all five stages for one item
    pub async fn process(&self, source: &ItemSource) -> Result<PipelineItemResult> {
        let generated =
            front_matter::generate(self.options, self.engines.metadata.as_ref(), source).await?;

        let audio_path = self.acquire_audio(source, &generated.final_path).await?;

        let (outcome, _cost) = self.run_transcription(&audio_path).await?;

        let prompt = prompt::select_prompt(self.options)?;

        let llm_output = self
            .run_llm(&generated, &prompt, &outcome.transcript)
            .await?;

        if !self.options.save_audio && !self.options.app.keep_audio {
            let _ = fs_err::remove_file(&audio_path);
        }

        Ok(PipelineItemResult {
            front_matter: generated.front_matter,
            final_path: generated.final_path.to_string_lossy().into_owned(),
            prompt,
            transcript: outcome.transcript,
            llm_output,
            failed: false,
        })
    }

    /// Stage 2: the acquirer materializes `<base>.wav`; this stage only
    /// validates the artifact exists afterward.
    async fn acquire_audio(&self, source: &ItemSource, final_path: &Path) -> Result<PathBuf> {
        let acquisition = match source {
            ItemSource::LocalFile(path) => AcquisitionSource::LocalFile(path),
            ItemSource::Url(url) => AcquisitionSource::RemoteUrl(url),
            ItemSource::FeedItem(metadata) => {
                if metadata.show_link.is_empty() {
                    return Err(CastnotesError::AudioAcquisition(format!(
                        "feed item has no enclosure link: {}",
                        metadata.title
                    )));
                }
                AcquisitionSource::RemoteUrl(&metadata.show_link)
            }
        };

        let spinner = self.stage_spinner("Acquiring audio...");
        let acquired = self.engines.audio.acquire(acquisition, final_path).await;
        spinner.finish_and_clear();
        let audio_path = acquired?;

        if fs_err::metadata(&audio_path).is_err() {
            return Err(CastnotesError::AudioAcquisition(format!(
                "expected audio artifact missing: {}",
                audio_path.display()
            )));
        }

        Ok(audio_path)
    }

    /// Stage 3: dispatch to the selected engine through the retry wrapper.
    /// A missing engine selection fails before the wrapper is entered.
    async fn run_transcription(
        &self,
        audio_path: &Path,
    ) -> Result<(TranscriptionResult, f64)> {
        let engine = self.engines.transcription()?;
        tracing::info!(engine = engine.name(), "running transcription");

        let spinner = self.stage_spinner("Transcribing...");
        let (cancel, registration) = self.manager.cancellation_token();
        let outcome = with_retry(self.retry, &cancel, "transcription", || {
            engine.transcribe(audio_path)
        })
        .await;
        registration.revoke();
        spinner.finish_and_clear();
        let outcome = outcome?;

        let cost = match crate::utils::audio_duration_minutes(self.manager, audio_path).await {
            Ok(minutes) => {
                let cost = outcome.cost_per_minute_cents * minutes;
                tracing::info!(
                    model = %outcome.model_id,
                    minutes = format!("{minutes:.2}"),
                    cost_cents = format!("{cost:.5}"),
                    "estimated transcription cost"
                );
                cost
            }
            Err(error) => {
                tracing::warn!(%error, "could not estimate transcription cost");
                0.0
            }
        };

        Ok((outcome, cost))
    }

    /// Stage 5: run the selected LLM engine, or write the prompt artifact
    /// when none is selected. Never wrapped in automatic retry; hosted LLM
    /// engines own their cost-sensitive retry policies.
    async fn run_llm(
        &self,
        generated: &front_matter::GeneratedFrontMatter,
        prompt: &str,
        transcript: &str,
    ) -> Result<String> {
        let Some(engine) = &self.engines.llm else {
            let output_path = artifact_path(&generated.final_path, "prompt");
            fs_err::write(
                &output_path,
                format!(
                    "{}\n{}\n## Transcript\n\n{}",
                    generated.front_matter, prompt, transcript
                ),
            )?;
            tracing::info!(path = %output_path.display(), "no LLM selected, wrote prompt artifact");
            return Ok(String::new());
        };

        tracing::info!(engine = engine.name(), model = engine.model_id(), "running LLM");
        let spinner = self.stage_spinner("Generating show notes...");
        let generated_notes = engine
            .generate(LlmRequest {
                front_matter: &generated.front_matter,
                prompt,
                transcript,
                metadata: &generated.metadata,
            })
            .await;
        spinner.finish_and_clear();
        let notes = generated_notes?;

        let output_path = artifact_path(
            &generated.final_path,
            &format!("{}-shownotes", engine.name()),
        );
        fs_err::write(
            &output_path,
            format!(
                "{}\n{}\n\n## Transcript\n\n{}",
                generated.front_matter, notes, transcript
            ),
        )?;
        tracing::info!(path = %output_path.display(), "show notes written");

        Ok(notes)
    }

    fn stage_spinner(&self, message: &'static str) -> ProgressBar {
        if self.options.quiet || self.options.json {
            return ProgressBar::hidden();
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            spinner.set_style(style);
        }
        spinner.set_message(message);
        spinner.enable_steady_tick(std::time::Duration::from_millis(120));
        spinner
    }
}

fn artifact_path(final_path: &Path, suffix: &str) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push('-');
    name.push_str(suffix);
    name.push_str(".md");
    final_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_result_has_empty_fields() {
        let result = PipelineItemResult::failure();
        assert!(result.failed);
        assert!(result.front_matter.is_empty());
        assert!(result.transcript.is_empty());
        assert!(result.llm_output.is_empty());
    }

    #[test]
    fn artifact_paths_append_suffixes() {
        let base = Path::new("content/2025-07-01-episode");
        assert_eq!(
            artifact_path(base, "prompt"),
            Path::new("content/2025-07-01-episode-prompt.md")
        );
        assert_eq!(
            artifact_path(base, "claude-shownotes"),
            Path::new("content/2025-07-01-episode-claude-shownotes.md")
        );
    }

    #[test]
    fn metadata_serializes_with_original_key_names() {
        let metadata = ShowNoteMetadata {
            show_link: "https://example.com/ep.mp3".into(),
            channel: "Test Cast".into(),
            channel_url: "https://example.com".into(),
            title: "Episode".into(),
            description: String::new(),
            publish_date: "2025-07-01".into(),
            cover_image: String::new(),
        };

        let json = serde_json::to_value(&metadata).unwrap();
        assert!(json.get("showLink").is_some());
        assert!(json.get("channelURL").is_some());
        assert!(json.get("publishDate").is_some());
    }
}
