//! CLI - Command Line Interface for AniStream
//!
//! Every pipeline operation is scriptable. All output is JSON-parseable.
//!
//! # Examples
//!
//! ```bash
//! # Find a title and list its episodes
//! anistream search "frieren" --json
//! anistream episodes frieren-18542
//!
//! # Resolve an episode to a playable stream
//! anistream resolve frieren-18542 3
//! anistream resolve frieren-18542 3 --url-only
//! ```

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::error::{ErrorKind, ResolveError};
use crate::models::EpisodeNumber;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments
    InvalidArgs = 2,
    /// Network error
    NetworkError = 3,
    /// Content unavailable or access denied
    ContentUnavailable = 4,
    /// No streams available
    NoStreams = 5,
    /// Upstream server error
    ServerError = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

impl From<ErrorKind> for ExitCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Connection => ExitCode::NetworkError,
            ErrorKind::ContentUnavailable | ErrorKind::AccessDenied => {
                ExitCode::ContentUnavailable
            }
            ErrorKind::ServerTemporary => ExitCode::ServerError,
            ErrorKind::NoSource => ExitCode::NoStreams,
            ErrorKind::Cancelled | ErrorKind::Internal => ExitCode::Error,
        }
    }
}

impl From<&ResolveError> for ExitCode {
    fn from(error: &ResolveError) -> Self {
        error.kind().into()
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// AniStream - resolve anime episodes to playable streams
#[derive(Parser, Debug)]
#[command(
    name = "anistream",
    version,
    about = "Resolve anime episodes to playable streams",
    long_about = "Looks up titles in the catalog, maps episode numbers to the \
                  streaming provider's episode IDs, and returns ranked video \
                  sources with merged subtitle tracks.",
    after_help = "EXAMPLES:\n\
                  anistream search \"frieren\"              Search the catalog\n\
                  anistream episodes frieren-18542        List episodes\n\
                  anistream resolve frieren-18542 3       Resolve episode 3\n\
                  anistream home                          Trending and top 10\n\
                  anistream sources frieren-18542-ep-3    Raw sources for an ID"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve an episode to ranked sources and subtitles
    #[command(visible_alias = "r")]
    Resolve(ResolveCmd),

    /// List a title's episodes from the catalog
    #[command(visible_alias = "ep")]
    Episodes(EpisodesCmd),

    /// Show the streaming provider's episode index for a title
    Index(IndexCmd),

    /// Fetch sources for a known streaming episode ID
    #[command(visible_alias = "src")]
    Sources(SourcesCmd),

    /// Get details for a title
    #[command(visible_alias = "i")]
    Info(InfoCmd),

    /// Search the catalog
    #[command(visible_alias = "s")]
    Search(SearchCmd),

    /// Show the catalog's landing sections (spotlight, trending, top 10)
    Home(HomeCmd),
}

// =============================================================================
// Resolve Command
// =============================================================================

/// Resolve one episode of a title
#[derive(Args, Debug)]
pub struct ResolveCmd {
    /// Catalog title ID (e.g., frieren-18542)
    #[arg(required = true)]
    pub title_id: String,

    /// Episode number (1-based)
    #[arg(required = true, value_parser = parse_episode_number)]
    pub episode: EpisodeNumber,

    /// Streaming episode ID, skips identity resolution
    #[arg(long)]
    pub streaming_id: Option<String>,

    /// Catalog episode ID for the catalog subtitle feed
    #[arg(long)]
    pub catalog_episode_id: Option<String>,

    /// Print only the best source URL
    #[arg(long, short = 'u')]
    pub url_only: bool,
}

/// clap value parser for episode numbers ("3", "03", "3.0")
pub fn parse_episode_number(s: &str) -> Result<EpisodeNumber, String> {
    EpisodeNumber::parse(s).ok_or_else(|| format!("'{}' is not a positive episode number", s))
}

// =============================================================================
// Catalog Commands
// =============================================================================

/// List episodes of a title
#[derive(Args, Debug)]
pub struct EpisodesCmd {
    #[arg(required = true)]
    pub title_id: String,

    /// Hide filler episodes
    #[arg(long)]
    pub no_filler: bool,
}

/// Show the streaming provider's episode index
#[derive(Args, Debug)]
pub struct IndexCmd {
    #[arg(required = true)]
    pub title_id: String,
}

/// Fetch sources for a streaming episode ID
#[derive(Args, Debug)]
pub struct SourcesCmd {
    #[arg(required = true)]
    pub streaming_episode_id: String,
}

/// Get details for a title
#[derive(Args, Debug)]
pub struct InfoCmd {
    #[arg(required = true)]
    pub title_id: String,

    /// Swap the poster for an optimized variant
    #[arg(long)]
    pub optimize_poster: bool,
}

/// Show catalog landing sections
#[derive(Args, Debug)]
pub struct HomeCmd {
    /// Entries shown per section
    #[arg(long, short = 'n', default_value = "5")]
    pub limit: usize,
}

/// Search the catalog by keyword
#[derive(Args, Debug)]
pub struct SearchCmd {
    /// Search query (title, keywords)
    #[arg(required = true)]
    pub query: String,

    /// Result page (1-based)
    #[arg(long, short = 'p', default_value = "1")]
    pub page: u32,
}

// =============================================================================
// JSON Output Types
// =============================================================================

/// Generic JSON output wrapper with status
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    /// Create success output with data
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: 0,
        }
    }

    /// Create error output (no data)
    pub fn error_msg(msg: impl Into<String>, code: ExitCode) -> JsonOutput<()> {
        JsonOutput::<()> {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Output handler for consistent formatting
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Print success data
    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if self.json {
            let output = JsonOutput::success(data);
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Ok(())
    }

    /// Print human-readable lines, or `data` as JSON in JSON mode
    pub fn print_lines<T: Serialize>(&self, data: T, lines: &[String]) -> anyhow::Result<()> {
        if self.json {
            return self.print(data);
        }
        for line in lines {
            println!("{}", line);
        }
        Ok(())
    }

    /// Print error and return exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, code);
            if let Ok(json) = serde_json::to_string_pretty(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Report a pipeline error with its user-facing message
    pub fn resolve_error(&self, context: &str, error: &ResolveError) -> ExitCode {
        let kind = error.kind();
        self.error(
            format!("{}: {} ({})", context, kind.user_message(), error),
            ExitCode::from(kind),
        )
    }

    /// Print info message (suppressed in quiet mode)
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Title ID Validation
// =============================================================================

/// Validate a catalog title ID (non-empty, no whitespace or slashes)
pub fn validate_title_id(id: &str) -> Result<&str, &'static str> {
    let id = id.trim();
    if !id.is_empty() && !id.contains(|c: char| c.is_whitespace() || c == '/') {
        Ok(id)
    } else {
        Err("Invalid title ID (expected a slug like frieren-18542)")
    }
}

// =============================================================================
// Tests
// =============================================================================
