use clap::{ArgGroup, Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "castnotes",
    about = "Castnotes - Generate show notes from podcasts, videos, and RSS feeds",
    version,
    long_about = "A CLI tool that turns a local media file, a list of URLs, or RSS feed items into generated show notes by chaining audio acquisition, speech transcription, and LLM summarization."
)]
#[command(group(ArgGroup::new("source").required(true)))]
#[command(group(ArgGroup::new("transcription").required(true)))]
#[command(group(ArgGroup::new("llm")))]
pub struct Cli {
    /// Local audio or video file to process
    #[arg(long, value_name = "FILE", group = "source")]
    pub file: Option<PathBuf>,

    /// File containing a newline-delimited list of URLs to process
    #[arg(long, value_name = "FILE", group = "source")]
    pub urls: Option<PathBuf>,

    /// RSS feed URL or local feed file (repeatable; .md files expand to one feed URL per line)
    #[arg(long, value_name = "URL", group = "source", num_args = 1..)]
    pub rss: Vec<String>,

    /// Process only the feed items whose enclosure link matches (repeatable)
    #[arg(long, value_name = "URL")]
    pub item: Vec<String>,

    /// Process the most recent N feed items
    #[arg(long, value_name = "COUNT")]
    pub last: Option<u32>,

    /// Skip the first N feed items
    #[arg(long, value_name = "COUNT")]
    pub skip: Option<u32>,

    /// Feed traversal order
    #[arg(long, value_enum, value_name = "ORDER")]
    pub order: Option<FeedOrder>,

    /// Process only items published on the given dates (YYYY-MM-DD, repeatable)
    #[arg(long, value_name = "DATE")]
    pub date: Vec<String>,

    /// Process only items published in the last N days
    #[arg(long, value_name = "DAYS")]
    pub last_days: Option<u32>,

    /// Transcribe with local whisper.cpp (optionally naming a model)
    #[arg(long, value_name = "MODEL", group = "transcription", num_args = 0..=1, default_missing_value = "base")]
    pub whisper: Option<String>,

    /// Transcribe with Deepgram (optionally naming a model)
    #[arg(long, value_name = "MODEL", group = "transcription", num_args = 0..=1, default_missing_value = "nova-2")]
    pub deepgram: Option<String>,

    /// Transcribe with AssemblyAI (optionally naming a model)
    #[arg(long, value_name = "MODEL", group = "transcription", num_args = 0..=1, default_missing_value = "best")]
    pub assembly: Option<String>,

    /// Summarize with OpenAI ChatGPT (optionally naming a model)
    #[arg(long, value_name = "MODEL", group = "llm", num_args = 0..=1, default_missing_value = "gpt-4o")]
    pub chatgpt: Option<String>,

    /// Summarize with Anthropic Claude (optionally naming a model)
    #[arg(long, value_name = "MODEL", group = "llm", num_args = 0..=1, default_missing_value = "claude-3-7-sonnet-latest")]
    pub claude: Option<String>,

    /// Summarize with Google Gemini (optionally naming a model)
    #[arg(long, value_name = "MODEL", group = "llm", num_args = 0..=1, default_missing_value = "gemini-1.5-flash")]
    pub gemini: Option<String>,

    /// Prompt sections to include in the generated notes (repeatable)
    #[arg(long, value_name = "SECTION")]
    pub prompt: Vec<String>,

    /// Read the full prompt from a file instead of the built-in sections
    #[arg(long, value_name = "FILE")]
    pub custom_prompt: Option<PathBuf>,

    /// Keep the intermediate audio file instead of deleting it
    #[arg(long)]
    pub save_audio: bool,

    /// Write item metadata as JSON instead of processing
    #[arg(long)]
    pub info: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress progress indicators and summaries
    #[arg(short, long)]
    pub quiet: bool,

    /// Machine-readable output (suppresses the batch summary line)
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedOrder {
    /// Feed order (feeds list newest entries first)
    Newest,
    /// Reverse feed order
    Oldest,
}

impl std::fmt::Display for FeedOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedOrder::Newest => write!(f, "newest"),
            FeedOrder::Oldest => write!(f, "oldest"),
        }
    }
}
