use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{AcquisitionSource, AudioAcquirer};
use crate::lifecycle::ResourceManager;
use crate::{CastnotesError, Result};

const SUPPORTED_LOCAL_EXTENSIONS: &[&str] = &[
    "wav", "mp3", "m4a", "aac", "ogg", "flac", "mp4", "mkv", "avi", "mov", "webm",
];

/// Acquires audio as 16kHz mono WAV: yt-dlp for remote URLs, ffmpeg for
/// local files.
pub struct MediaAudioAcquirer {
    manager: ResourceManager,
}

impl MediaAudioAcquirer {
    pub fn new(manager: ResourceManager) -> Self {
        Self { manager }
    }

    async fn download_remote(&self, url: &str, output_path: &Path) -> Result<()> {
        let output = self
            .manager
            .run_command(
                "yt-dlp",
                &[
                    "--no-warnings",
                    "--restrict-filenames",
                    "--extract-audio",
                    "--audio-format",
                    "wav",
                    "--postprocessor-args",
                    "ffmpeg:-ar 16000 -ac 1",
                    "--no-playlist",
                    "-o",
                    &output_path.to_string_lossy(),
                    url,
                ],
            )
            .await?;

        if !output.success {
            return Err(CastnotesError::AudioAcquisition(format!(
                "yt-dlp failed for {url}: {}",
                output.stderr.trim()
            )));
        }
        if !output.stderr.trim().is_empty() {
            tracing::warn!(stderr = %output.stderr.trim(), "yt-dlp warnings");
        }

        Ok(())
    }

    async fn convert_local(&self, input: &Path, output_path: &Path) -> Result<()> {
        let extension = input
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !SUPPORTED_LOCAL_EXTENSIONS.contains(&extension.as_str()) {
            return Err(CastnotesError::AudioAcquisition(format!(
                "unsupported file type: {}",
                input.display()
            )));
        }

        let output = self
            .manager
            .run_command(
                "ffmpeg",
                &[
                    "-i",
                    &input.to_string_lossy(),
                    "-ar",
                    "16000",
                    "-ac",
                    "1",
                    "-c:a",
                    "pcm_s16le",
                    &output_path.to_string_lossy(),
                ],
            )
            .await?;

        if !output.success {
            return Err(CastnotesError::AudioAcquisition(format!(
                "ffmpeg failed for {}: {}",
                input.display(),
                output.stderr.trim()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl AudioAcquirer for MediaAudioAcquirer {
    async fn acquire(&self, source: AcquisitionSource<'_>, dest_base: &Path) -> Result<PathBuf> {
        let output_path = dest_base.with_extension("wav");

        // An artifact left behind by an earlier run is moved aside, not
        // silently overwritten
        if output_path.exists() {
            let renamed = dest_base.with_extension("renamed.wav");
            fs_err::rename(&output_path, &renamed)?;
            tracing::info!(
                existing = %output_path.display(),
                renamed = %renamed.display(),
                "existing audio artifact moved aside"
            );
        }

        match source {
            AcquisitionSource::RemoteUrl(url) => {
                self.download_remote(url, &output_path).await?;
            }
            AcquisitionSource::LocalFile(input) => {
                fs_err::metadata(input)?;
                self.convert_local(input, &output_path).await?;
            }
        }

        Ok(output_path)
    }
}
