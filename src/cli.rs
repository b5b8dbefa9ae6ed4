//! CLI definitions for plurkdump.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// plurkdump - Plurk timeline archiver and activity charts
#[derive(Parser, Debug)]
#[command(name = "plurkdump")]
#[command(version)]
#[command(about = "Archive a Plurk timeline into SQLite and chart monthly activity")]
#[command(long_about = r#"
plurkdump walks your Plurk timeline backward in time, storing every plurk,
response and user it sees in a local SQLite file, and renders a stacked bar
chart of monthly activity per user.

Quick start:
  1. Put CONSUMER_KEY and CONSUMER_SECRET in the environment or a .env file
  2. Run: plurkdump sync          (authorize in the browser, paste the code)
  3. Run: plurkdump report        (writes combined_activity_tab20.png)

Re-running sync is always safe: rows are replaced whole and the walk resumes
from the oldest stored plurk.
"#)]
pub struct Cli {
    /// Path to the database file
    #[arg(long, env = "PLURK_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Path to a config file (default: ~/.config/plurkdump/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Be verbose (show debug info)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch the timeline and responses into the database
    Sync(SyncArgs),

    /// Render the monthly activity chart
    Report(ReportArgs),

    /// Show database statistics
    Stats,

    /// Show or manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Stop after this many timeline pages
    #[arg(long, short = 'n')]
    pub max_pages: Option<usize>,

    /// Plurks per timeline page
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Do not store users that only appear in response payloads
    #[arg(long)]
    pub no_reply_authors: bool,
}

#[derive(Args, Debug, Default)]
pub struct ReportArgs {
    /// Color palette (viridis, plasma, tab20, Set1, ...)
    #[arg(long, short = 'p')]
    pub palette: Option<String>,

    /// Size multiplier for figure, fonts and resolution
    #[arg(long, short = 's')]
    pub scale: Option<f64>,

    /// Directory to write the chart to
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,

    /// Render one chart per known palette
    #[arg(long, conflicts_with = "palette")]
    pub all_palettes: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show the effective configuration
    #[arg(long)]
    pub show: bool,

    /// Write a default config file (refuses to overwrite)
    #[arg(long)]
    pub init: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
}

impl OutputFormat {
    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::JsonPretty)
    }
}
