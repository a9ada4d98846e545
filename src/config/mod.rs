use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cli::{Cli, FeedOrder};
use crate::{CastnotesError, Result};

/// Application settings loaded from a config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory where generated artifacts and intermediate audio land
    pub content_dir: PathBuf,

    /// Keep intermediate audio files after processing
    pub keep_audio: bool,

    /// Timeout for a single feed fetch, in seconds
    pub fetch_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("content"),
            keep_audio: false,
            fetch_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration from file or fall back to defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        match config_path {
            Some(path) if path.exists() => {
                let content = fs_err::read_to_string(&path)?;
                let config: AppConfig = serde_yaml::from_str(&content)?;
                Ok(config)
            }
            _ => Ok(Self::default()),
        }
    }

    fn config_path() -> Option<PathBuf> {
        // A local config.yaml wins for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        dirs::config_dir().map(|dir| dir.join("castnotes").join("config.yaml"))
    }
}

/// Which source a run draws its items from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// A single local media file
    File(PathBuf),
    /// A file containing newline-delimited URLs
    UrlList(PathBuf),
    /// One or more RSS feed references
    Rss(Vec<String>),
}

/// Transcription engine selection, one variant per supported engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionEngineKind {
    Whisper { model: String },
    Deepgram { model: String },
    Assembly { model: String },
}

impl TranscriptionEngineKind {
    pub fn label(&self) -> &'static str {
        match self {
            TranscriptionEngineKind::Whisper { .. } => "whisper",
            TranscriptionEngineKind::Deepgram { .. } => "deepgram",
            TranscriptionEngineKind::Assembly { .. } => "assembly",
        }
    }
}

/// LLM engine selection, one variant per supported engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmEngineKind {
    ChatGpt { model: String },
    Claude { model: String },
    Gemini { model: String },
}

impl LlmEngineKind {
    pub fn label(&self) -> &'static str {
        match self {
            LlmEngineKind::ChatGpt { .. } => "chatgpt",
            LlmEngineKind::Claude { .. } => "claude",
            LlmEngineKind::Gemini { .. } => "gemini",
        }
    }
}

/// Configuration bag for a single run
#[derive(Debug, Clone)]
pub struct ProcessingOptions {
    pub source: SourceKind,

    /// Explicit feed item links to process
    pub items: Vec<String>,
    pub last: Option<u32>,
    pub skip: Option<u32>,
    pub order: Option<FeedOrder>,
    /// Explicit publish dates (YYYY-MM-DD) to process
    pub dates: Vec<String>,
    pub last_days: Option<u32>,

    pub transcription: Option<TranscriptionEngineKind>,
    pub llm: Option<LlmEngineKind>,

    pub prompt_sections: Vec<String>,
    pub custom_prompt: Option<PathBuf>,

    pub save_audio: bool,
    pub info: bool,
    pub quiet: bool,
    pub json: bool,

    pub app: AppConfig,
}

impl ProcessingOptions {
    /// Build run options from parsed CLI arguments plus the app config,
    /// validating the selection invariants before any stage runs.
    pub fn from_cli(cli: Cli, app: AppConfig) -> Result<Self> {
        let source = if let Some(file) = cli.file {
            SourceKind::File(file)
        } else if let Some(urls) = cli.urls {
            SourceKind::UrlList(urls)
        } else if !cli.rss.is_empty() {
            SourceKind::Rss(cli.rss)
        } else {
            return Err(CastnotesError::Config(
                "one of --file, --urls, or --rss is required".into(),
            ));
        };

        let transcription = match (cli.whisper, cli.deepgram, cli.assembly) {
            (Some(model), None, None) => Some(TranscriptionEngineKind::Whisper { model }),
            (None, Some(model), None) => Some(TranscriptionEngineKind::Deepgram { model }),
            (None, None, Some(model)) => Some(TranscriptionEngineKind::Assembly { model }),
            (None, None, None) => None,
            _ => {
                return Err(CastnotesError::Config(
                    "only one transcription engine may be selected".into(),
                ))
            }
        };

        let llm = match (cli.chatgpt, cli.claude, cli.gemini) {
            (Some(model), None, None) => Some(LlmEngineKind::ChatGpt { model }),
            (None, Some(model), None) => Some(LlmEngineKind::Claude { model }),
            (None, None, Some(model)) => Some(LlmEngineKind::Gemini { model }),
            (None, None, None) => None,
            _ => {
                return Err(CastnotesError::Config(
                    "only one LLM engine may be selected".into(),
                ))
            }
        };

        let options = Self {
            source,
            items: cli.item,
            last: cli.last,
            skip: cli.skip,
            order: cli.order,
            dates: cli.date,
            last_days: cli.last_days,
            transcription,
            llm,
            prompt_sections: cli.prompt,
            custom_prompt: cli.custom_prompt,
            save_audio: cli.save_audio,
            info: cli.info,
            quiet: cli.quiet,
            json: cli.json,
            app,
        };

        options.validate_selection()?;
        Ok(options)
    }

    /// Enforce that the per-item selection fields are mutually exclusive as a
    /// group. Violations are configuration errors, not pipeline errors.
    pub fn validate_selection(&self) -> Result<()> {
        if let Some(last) = self.last {
            if last < 1 {
                return Err(CastnotesError::Config(
                    "the --last option must be a positive integer".into(),
                ));
            }
            if self.skip.is_some() || self.order.is_some() {
                return Err(CastnotesError::Config(
                    "the --last option cannot be used with --skip or --order".into(),
                ));
            }
        }

        if let Some(last_days) = self.last_days {
            if last_days < 1 {
                return Err(CastnotesError::Config(
                    "the --last-days option must be a positive integer".into(),
                ));
            }
            if self.last.is_some()
                || self.skip.is_some()
                || self.order.is_some()
                || !self.dates.is_empty()
            {
                return Err(CastnotesError::Config(
                    "the --last-days option cannot be used with --last, --skip, --order, or --date"
                        .into(),
                ));
            }
        }

        if !self.dates.is_empty() {
            for date in &self.dates {
                if chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                    return Err(CastnotesError::Config(format!(
                        "invalid date format \"{date}\", expected YYYY-MM-DD"
                    )));
                }
            }
            if self.last.is_some() || self.skip.is_some() || self.order.is_some() {
                return Err(CastnotesError::Config(
                    "the --date option cannot be used with --last, --skip, or --order".into(),
                ));
            }
        }

        Ok(())
    }
}
