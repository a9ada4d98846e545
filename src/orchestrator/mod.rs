//! Top-level pipeline drivers
//!
//! One entry point per source kind (single file, URL list, RSS feeds), all
//! sharing a single batch runner. Whether an item failure aborts the run or
//! is recorded and skipped is an explicit parameter rather than a behavioral
//! difference between code paths.

use std::path::Path;

use crate::config::{ProcessingOptions, SourceKind};
use crate::engines::EngineSet;
use crate::feed::{self, ResolvedFeed};
use crate::lifecycle::ResourceManager;
use crate::pipeline::{ItemProcessor, ItemSource, PipelineItemResult, ShowNoteMetadata};
use crate::progress::{format_item_progress, BatchProgress, BatchSummary};
use crate::retry::RetryPolicy;
use crate::utils::sanitize_title;
use crate::{CastnotesError, Result};

/// How the batch runner reacts to a failed item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnItemError {
    /// Log the failure, record an error-flagged result, keep going
    Continue,
    /// Propagate the failure and stop the run
    Abort,
}

/// Top-level driver for one run
pub struct ShowNotesPipeline {
    options: ProcessingOptions,
    manager: ResourceManager,
    engines: EngineSet,
    retry: RetryPolicy,
    http: reqwest::Client,
}

impl ShowNotesPipeline {
    pub fn new(options: ProcessingOptions, manager: ResourceManager) -> Result<Self> {
        let http = reqwest::Client::new();
        let engines = EngineSet::from_options(&options, &manager, &http)?;
        Ok(Self::with_engines(options, manager, engines))
    }

    /// Wire a pipeline with explicit collaborators
    pub fn with_engines(
        options: ProcessingOptions,
        manager: ResourceManager,
        engines: EngineSet,
    ) -> Self {
        Self {
            options,
            manager,
            engines,
            retry: RetryPolicy::default(),
            http: reqwest::Client::new(),
        }
    }

    /// Run the pipeline for the configured source
    pub async fn run(&self) -> Result<Vec<PipelineItemResult>> {
        match self.options.source.clone() {
            SourceKind::File(path) => self.process_file(&path).await,
            SourceKind::UrlList(path) => self.process_urls(&path).await,
            SourceKind::Rss(refs) => self.process_rss(&refs).await,
        }
    }

    /// Single-file mode: one item, a stage failure is fatal to the run
    pub async fn process_file(&self, path: &Path) -> Result<Vec<PipelineItemResult>> {
        let sources = vec![ItemSource::LocalFile(path.to_path_buf())];
        let (results, _) = self.run_batch(sources, OnItemError::Abort, "files").await?;
        tracing::info!("file processed successfully");
        Ok(results)
    }

    /// URL-list mode: every URL is processed; one URL's failure is logged
    /// and the loop continues
    pub async fn process_urls(&self, path: &Path) -> Result<Vec<PipelineItemResult>> {
        let urls = read_url_list(path)?;
        tracing::info!(count = urls.len(), "found URLs in the file");

        if self.options.info {
            self.write_urls_info(&urls).await?;
            return Ok(Vec::new());
        }

        let sources = urls.into_iter().map(ItemSource::Url).collect();
        let (results, _) = self.run_batch(sources, OnItemError::Continue, "urls").await?;
        Ok(results)
    }

    /// RSS mode: expand feed references, then select and process items per
    /// feed with the same continue-on-error semantics as URL-list mode
    pub async fn process_rss(&self, refs: &[String]) -> Result<Vec<PipelineItemResult>> {
        let feed_urls = feed::expand_feed_refs(refs)?;
        if feed_urls.is_empty() {
            return Err(CastnotesError::Config(
                "no valid RSS URLs provided for processing".into(),
            ));
        }

        let mut all_results = Vec::new();
        for feed_url in &feed_urls {
            if self.manager.is_cancelled() {
                break;
            }

            let feed = feed::fetch_feed(
                &self.manager,
                &self.http,
                &self.retry,
                feed_url,
                &self.options,
            )
            .await?;

            if self.options.info {
                self.write_feed_info(&feed)?;
                continue;
            }

            if feed.items.is_empty() {
                tracing::info!(%feed_url, "no items matched the selection for this feed, skipping");
                continue;
            }

            feed::log_selection_status(feed.items.len(), feed.items.len(), &self.options);

            let sources = feed.items.into_iter().map(ItemSource::FeedItem).collect();
            let (results, _) = self.run_batch(sources, OnItemError::Continue, "items").await?;
            all_results.extend(results);
        }

        Ok(all_results)
    }

    /// Shared per-item loop. Item order follows the selector's output order
    /// and is preserved even when failures do not abort the batch. Once
    /// shutdown has begun, remaining items are skipped.
    async fn run_batch(
        &self,
        sources: Vec<ItemSource>,
        on_item_error: OnItemError,
        label: &'static str,
    ) -> Result<(Vec<PipelineItemResult>, BatchSummary)> {
        let total = sources.len();
        let mut progress = BatchProgress::new(label, total);
        let mut results = Vec::with_capacity(total);
        let processor =
            ItemProcessor::new(&self.options, &self.engines, &self.manager, &self.retry);

        for (index, source) in sources.iter().enumerate() {
            if self.manager.is_cancelled() {
                progress.skip();
                continue;
            }

            tracing::info!(
                "{} {}",
                format_item_progress(index + 1, total),
                source.descriptor()
            );

            match processor.process(source).await {
                Ok(result) => {
                    progress.complete(!result.failed);
                    results.push(result);
                }
                Err(error) => match on_item_error {
                    OnItemError::Abort => return Err(error),
                    OnItemError::Continue => {
                        tracing::error!(
                            %error,
                            item = %source.descriptor(),
                            "error processing item, continuing batch"
                        );
                        progress.complete(false);
                        results.push(PipelineItemResult::failure());
                    }
                },
            }
        }

        if on_item_error == OnItemError::Continue {
            progress.print_summary(self.options.quiet, self.options.json);
        }

        Ok((results, progress.summary()))
    }

    /// Write metadata for every URL in the list as JSON instead of
    /// processing; extraction failures are logged and skipped
    async fn write_urls_info(&self, urls: &[String]) -> Result<()> {
        let mut metadata_list: Vec<ShowNoteMetadata> = Vec::with_capacity(urls.len());
        for url in urls {
            match self.engines.metadata.extract(url).await {
                Ok(metadata) => metadata_list.push(metadata),
                Err(error) => {
                    tracing::error!(%error, %url, "error extracting metadata");
                }
            }
        }

        fs_err::create_dir_all(&self.options.app.content_dir)?;
        let path = self.options.app.content_dir.join("urls_info.json");
        fs_err::write(&path, serde_json::to_string_pretty(&metadata_list)?)?;
        tracing::info!(path = %path.display(), "URL information saved");
        Ok(())
    }

    /// Write the selected feed items as JSON instead of processing
    fn write_feed_info(&self, feed: &ResolvedFeed) -> Result<()> {
        fs_err::create_dir_all(&self.options.app.content_dir)?;
        let path = self.options.app.content_dir.join(format!(
            "{}_info.json",
            sanitize_title(&feed.channel_title)
        ));
        fs_err::write(&path, serde_json::to_string_pretty(&feed.items)?)?;
        tracing::info!(path = %path.display(), "feed information saved");
        Ok(())
    }
}

/// Read a newline-delimited URL list, ignoring blank lines and `#` comments
fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let content = fs_err::read_to_string(path)?;
    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect();

    if urls.is_empty() {
        return Err(CastnotesError::Config(format!(
            "no URLs found in the file: {}",
            path.display()
        )));
    }

    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, TranscriptionEngineKind};
    use crate::engines::{
        AcquisitionSource, AudioAcquirer, LlmEngine, LlmRequest, MetadataExtractor,
        TranscriptionEngine, TranscriptionResult,
    };
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct StubMetadata;

    #[async_trait]
    impl MetadataExtractor for StubMetadata {
        async fn extract(&self, url: &str) -> Result<ShowNoteMetadata> {
            Ok(ShowNoteMetadata {
                show_link: url.to_string(),
                channel: "Stub Channel".into(),
                channel_url: "https://example.com".into(),
                title: "Stub Episode".into(),
                description: String::new(),
                publish_date: "2025-07-01".into(),
                cover_image: String::new(),
            })
        }
    }

    /// Creates the expected artifact, failing on the calls whose 1-indexed
    /// position is listed
    struct StubAcquirer {
        calls: AtomicU32,
        fail_on: Vec<u32>,
    }

    impl StubAcquirer {
        fn new(fail_on: Vec<u32>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl AudioAcquirer for StubAcquirer {
        async fn acquire(
            &self,
            _source: AcquisitionSource<'_>,
            dest_base: &Path,
        ) -> Result<PathBuf> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&call) {
                return Err(CastnotesError::AudioAcquisition("stub failure".into()));
            }
            let path = dest_base.with_extension("wav");
            fs_err::write(&path, b"fake audio")?;
            Ok(path)
        }
    }

    struct StubTranscription;

    #[async_trait]
    impl TranscriptionEngine for StubTranscription {
        async fn transcribe(&self, _audio_path: &Path) -> Result<TranscriptionResult> {
            Ok(TranscriptionResult {
                transcript: "hello world".into(),
                model_id: "stub".into(),
                cost_per_minute_cents: 0.0,
            })
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    struct StubLlm;

    #[async_trait]
    impl LlmEngine for StubLlm {
        async fn generate(&self, _request: LlmRequest<'_>) -> Result<String> {
            Ok("generated notes".into())
        }

        fn name(&self) -> &'static str {
            "stub"
        }

        fn model_id(&self) -> &str {
            "stub-1"
        }
    }

    fn stub_engines(fail_acquire_on: Vec<u32>) -> EngineSet {
        EngineSet {
            metadata: Arc::new(StubMetadata),
            audio: Arc::new(StubAcquirer::new(fail_acquire_on)),
            transcription: Some(Arc::new(StubTranscription)),
            llm: Some(Arc::new(StubLlm)),
        }
    }

    fn test_options(content_dir: &Path) -> ProcessingOptions {
        ProcessingOptions {
            source: SourceKind::Rss(vec!["https://example.com/feed.xml".into()]),
            items: Vec::new(),
            last: None,
            skip: None,
            order: None,
            dates: Vec::new(),
            last_days: None,
            transcription: Some(TranscriptionEngineKind::Whisper {
                model: "base".into(),
            }),
            llm: None,
            prompt_sections: Vec::new(),
            custom_prompt: None,
            save_audio: false,
            info: false,
            quiet: true,
            json: false,
            app: AppConfig {
                content_dir: content_dir.to_path_buf(),
                ..AppConfig::default()
            },
        }
    }

    fn feed_item(index: usize) -> ItemSource {
        ItemSource::FeedItem(ShowNoteMetadata {
            show_link: format!("https://example.com/ep{index}.mp3"),
            channel: "Test Cast".into(),
            channel_url: "https://example.com".into(),
            title: format!("Episode {index}"),
            description: String::new(),
            publish_date: "2025-07-01".into(),
            cover_image: String::new(),
        })
    }

    #[tokio::test]
    async fn batch_continues_past_a_failed_item() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ShowNotesPipeline::with_engines(
            test_options(dir.path()),
            ResourceManager::new(),
            stub_engines(vec![2]),
        );

        let sources = vec![feed_item(1), feed_item(2), feed_item(3)];
        let (results, summary) = pipeline
            .run_batch(sources, OnItemError::Continue, "items")
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(!results[0].failed);
        assert!(results[1].failed);
        assert!(!results[2].failed);

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn abort_mode_propagates_the_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ShowNotesPipeline::with_engines(
            test_options(dir.path()),
            ResourceManager::new(),
            stub_engines(vec![1]),
        );

        let result = pipeline
            .run_batch(vec![feed_item(1)], OnItemError::Abort, "files")
            .await;

        assert!(matches!(result, Err(CastnotesError::AudioAcquisition(_))));
    }

    #[tokio::test]
    async fn successful_items_carry_stage_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ShowNotesPipeline::with_engines(
            test_options(dir.path()),
            ResourceManager::new(),
            stub_engines(Vec::new()),
        );

        let (results, _) = pipeline
            .run_batch(vec![feed_item(1)], OnItemError::Continue, "items")
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert!(!result.failed);
        assert_eq!(result.transcript, "hello world");
        assert_eq!(result.llm_output, "generated notes");
        assert!(result.front_matter.contains("title: \"Episode 1\""));

        let artifact = dir.path().join("2025-07-01-episode-1-stub-shownotes.md");
        assert!(artifact.exists());
    }

    #[tokio::test]
    async fn cancelled_run_skips_remaining_items() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ResourceManager::new();
        manager.perform_cleanup().await;

        let pipeline = ShowNotesPipeline::with_engines(
            test_options(dir.path()),
            manager,
            stub_engines(Vec::new()),
        );

        let (results, summary) = pipeline
            .run_batch(
                vec![feed_item(1), feed_item(2)],
                OnItemError::Continue,
                "items",
            )
            .await
            .unwrap();

        assert!(results.is_empty());
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.skipped, 2);
    }

    #[test]
    fn url_lists_ignore_blanks_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        fs_err::write(
            &path,
            "# sources\nhttps://example.com/a\n\n  https://example.com/b  \n",
        )
        .unwrap();

        let urls = read_url_list(&path).unwrap();
        assert_eq!(urls, vec!["https://example.com/a", "https://example.com/b"]);
    }

    #[test]
    fn empty_url_lists_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        fs_err::write(&path, "# nothing here\n\n").unwrap();

        assert!(matches!(
            read_url_list(&path),
            Err(CastnotesError::Config(_))
        ));
    }
}
