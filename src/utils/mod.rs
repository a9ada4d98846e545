use std::path::Path;

use crate::lifecycle::ResourceManager;
use crate::{CastnotesError, Result};

/// Sanitize a title into a filename-safe kebab-case slug
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
        .collect();

    let mut slug = String::with_capacity(cleaned.len());
    let mut last_was_dash = false;
    for c in cleaned.trim().chars() {
        if c.is_whitespace() || c == '_' || c == '-' {
            if !last_was_dash {
                slug.push('-');
                last_was_dash = true;
            }
        } else {
            slug.extend(c.to_lowercase());
            last_was_dash = false;
        }
    }

    slug.trim_matches('-').chars().take(200).collect()
}

/// Probe an audio file's duration and return it in minutes
pub async fn audio_duration_minutes(manager: &ResourceManager, path: &Path) -> Result<f64> {
    let output = manager
        .run_command(
            "ffprobe",
            &[
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "csv=p=0",
                &path.to_string_lossy(),
            ],
        )
        .await?;

    if !output.success {
        return Err(CastnotesError::AudioAcquisition(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            output.stderr.trim()
        )));
    }

    let seconds: f64 = output.stdout.trim().parse().map_err(|_| {
        CastnotesError::AudioAcquisition(format!(
            "could not parse audio duration for {}",
            path.display()
        ))
    })?;

    Ok(seconds / 60.0)
}

/// Check if the current environment has required tools
pub async fn check_dependencies() -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available("yt-dlp").await {
        missing.push("yt-dlp - required for URL and RSS audio extraction".to_string());
    }

    if !check_command_available("ffmpeg").await {
        missing.push("ffmpeg - required for local file conversion".to_string());
    }

    if !check_command_available("ffprobe").await {
        missing.push("ffprobe - required for audio duration probing".to_string());
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
