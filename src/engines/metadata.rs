use async_trait::async_trait;

use super::MetadataExtractor;
use crate::lifecycle::ResourceManager;
use crate::pipeline::ShowNoteMetadata;
use crate::{CastnotesError, Result};

/// Metadata extractor shelling out to yt-dlp
pub struct YtDlpMetadataExtractor {
    manager: ResourceManager,
}

impl YtDlpMetadataExtractor {
    pub fn new(manager: ResourceManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl MetadataExtractor for YtDlpMetadataExtractor {
    async fn extract(&self, url: &str) -> Result<ShowNoteMetadata> {
        tracing::debug!(%url, "extracting metadata with yt-dlp");

        let output = self
            .manager
            .run_command(
                "yt-dlp",
                &[
                    "--restrict-filenames",
                    "--print",
                    "%(webpage_url)s",
                    "--print",
                    "%(channel)s",
                    "--print",
                    "%(uploader_url)s",
                    "--print",
                    "%(title)s",
                    "--print",
                    "%(upload_date>%Y-%m-%d)s",
                    "--print",
                    "%(thumbnail)s",
                    url,
                ],
            )
            .await?;

        if !output.success {
            return Err(CastnotesError::Metadata(format!(
                "yt-dlp failed for {url}: {}",
                output.stderr.trim()
            )));
        }

        let mut lines = output.stdout.trim().lines();
        let mut next_field = || lines.next().unwrap_or_default().to_string();

        let metadata = ShowNoteMetadata {
            show_link: next_field(),
            channel: next_field(),
            channel_url: next_field(),
            title: next_field(),
            description: String::new(),
            publish_date: next_field(),
            cover_image: next_field(),
        };

        if metadata.show_link.is_empty() || metadata.title.is_empty() {
            return Err(CastnotesError::Metadata(format!(
                "incomplete metadata received from yt-dlp for {url}"
            )));
        }

        Ok(metadata)
    }
}
