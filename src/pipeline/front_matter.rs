//! Stage 1: front matter and the canonical base path
//!
//! Derives a filename-safe base path and a [`ShowNoteMetadata`] for the item
//! (remote lookup for URLs, filesystem inspection for local files, direct
//! pass-through for feed items), then renders the fixed key-ordered front
//! matter block consumed by every later stage.

use std::path::PathBuf;

use super::{ItemSource, ShowNoteMetadata};
use crate::config::ProcessingOptions;
use crate::engines::MetadataExtractor;
use crate::utils::sanitize_title;
use crate::Result;

/// Output of the front-matter stage
#[derive(Debug, Clone)]
pub struct GeneratedFrontMatter {
    pub front_matter: String,
    pub final_path: PathBuf,
    pub filename: String,
    pub metadata: ShowNoteMetadata,
}

/// Render the front matter block. Key order is fixed.
pub fn build_front_matter(metadata: &ShowNoteMetadata) -> String {
    [
        "---".to_string(),
        format!("showLink: \"{}\"", metadata.show_link),
        format!("channel: \"{}\"", metadata.channel),
        format!("channelURL: \"{}\"", metadata.channel_url),
        format!("title: \"{}\"", metadata.title),
        format!("description: \"{}\"", metadata.description),
        format!("publishDate: \"{}\"", metadata.publish_date),
        format!("coverImage: \"{}\"", metadata.cover_image),
        "---\n".to_string(),
    ]
    .join("\n")
}

/// Run stage 1 for one item
pub async fn generate(
    options: &ProcessingOptions,
    extractor: &dyn MetadataExtractor,
    source: &ItemSource,
) -> Result<GeneratedFrontMatter> {
    let (filename, metadata) = match source {
        ItemSource::Url(url) => {
            let metadata = extractor.extract(url).await?;
            let filename = format!(
                "{}-{}",
                metadata.publish_date,
                sanitize_title(&metadata.title)
            );
            (filename, metadata)
        }

        ItemSource::LocalFile(path) => {
            let original_filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let stem = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();

            let metadata = ShowNoteMetadata {
                show_link: original_filename.clone(),
                title: original_filename,
                ..ShowNoteMetadata::default()
            };
            (sanitize_title(&stem), metadata)
        }

        ItemSource::FeedItem(metadata) => {
            let filename = format!(
                "{}-{}",
                metadata.publish_date,
                sanitize_title(&metadata.title)
            );
            (filename, metadata.clone())
        }
    };

    fs_err::create_dir_all(&options.app.content_dir)?;
    let final_path = options.app.content_dir.join(&filename);
    let front_matter = build_front_matter(&metadata);

    tracing::debug!(
        final_path = %final_path.display(),
        %filename,
        "front matter generated"
    );

    Ok(GeneratedFrontMatter {
        front_matter,
        final_path,
        filename,
        metadata,
    })
}
