//! CLI - Command Line Interface for TubeTorrent
//!
//! Every command is scriptable. All output is JSON-parseable with `--json`.
//!
//! # Examples
//!
//! ```bash
//! # One-time setup
//! tubetorrent config set --api-url https://torrents.example.com --api-key KEY
//!
//! # Submit, wait, and save the .torrent
//! tubetorrent grab "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
//!
//! # Or step by step
//! tubetorrent submit "https://youtu.be/dQw4w9WgXcQ" --json
//! tubetorrent track 3f2a9c --stream
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::IsTerminal;
use std::path::PathBuf;

use tubetorrent::error::TrackerError;
use tubetorrent::tracker::TransportMode;

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
    /// Network or protocol error talking to the backend
    NetworkError = 3,
    /// Missing or invalid configuration
    ConfigError = 4,
    /// The job failed on the backend
    JobFailed = 5,
    /// The job did not finish before the deadline
    Timeout = 6,
    /// Interrupted by the user
    Cancelled = 130,
}

impl ExitCode {
    /// Exit code matching a tracker failure
    pub fn for_error(error: &TrackerError) -> Self {
        match error {
            TrackerError::Transport(_) | TrackerError::Protocol(_) => ExitCode::NetworkError,
            TrackerError::RemoteJob(_) => ExitCode::JobFailed,
            TrackerError::Timeout(_) => ExitCode::Timeout,
            TrackerError::EmptyJobId => ExitCode::InvalidArgs,
        }
    }
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

// =============================================================================
// Main CLI Structure
// =============================================================================

/// TubeTorrent - turn video watch pages into torrents
#[derive(Parser, Debug)]
#[command(
    name = "tubetorrent",
    version,
    about = "Turn video watch pages into torrents via a remote seeding backend",
    long_about = "Submits a watch page to a torrent backend, follows the job \
                  until the torrent is ready, and saves the .torrent file.",
    after_help = "EXAMPLES:\n\
                  tubetorrent config set --api-url URL --api-key KEY   Configure backend\n\
                  tubetorrent grab \"https://youtu.be/ID\"               Submit, wait, download\n\
                  tubetorrent track JOB_ID --stream                    Follow an existing job"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Log debug details to stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

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

    /// Default log filter for this invocation
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "tubetorrent=debug"
        } else {
            "tubetorrent=warn"
        }
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit a watch page to the backend
    #[command(visible_alias = "s")]
    Submit(SubmitCmd),

    /// Follow an existing job until it finishes
    #[command(visible_alias = "t")]
    Track(TrackCmd),

    /// Submit a watch page, wait for the torrent and download it
    #[command(visible_alias = "g")]
    Grab(GrabCmd),

    /// Upload browser cookies for restricted videos
    Cookies(CookiesCmd),

    /// Show or change settings
    Config(ConfigCmd),
}

/// Transport choice on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    Polling,
    Streaming,
}

impl From<TransportArg> for TransportMode {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Polling => TransportMode::Polling,
            TransportArg::Streaming => TransportMode::Streaming,
        }
    }
}

/// Options shared by commands that wait on a job
#[derive(Args, Debug, Clone, Default)]
pub struct TrackOptions {
    /// Use the event stream instead of polling
    #[arg(long, conflicts_with = "transport")]
    pub stream: bool,

    /// Transport to use (overrides config)
    #[arg(long, value_enum)]
    pub transport: Option<TransportArg>,

    /// Give up after this many seconds (overrides config)
    #[arg(long)]
    pub deadline: Option<u64>,
}

impl TrackOptions {
    /// Transport requested on the command line, if any
    pub fn transport_mode(&self) -> Option<TransportMode> {
        if self.stream {
            Some(TransportMode::Streaming)
        } else {
            self.transport.map(TransportMode::from)
        }
    }
}

/// Submit a watch page
#[derive(Args, Debug)]
pub struct SubmitCmd {
    /// Watch page URL
    #[arg(required = true)]
    pub url: String,
}

/// Track a job by id
#[derive(Args, Debug)]
pub struct TrackCmd {
    /// Job id returned by `submit`
    #[arg(required = true)]
    pub job_id: String,

    #[command(flatten)]
    pub options: TrackOptions,
}

/// Submit, track and download
#[derive(Args, Debug)]
pub struct GrabCmd {
    /// Watch page URL
    #[arg(required = true)]
    pub url: String,

    /// Directory to save the .torrent in (overrides config)
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,

    #[command(flatten)]
    pub options: TrackOptions,
}

/// Upload cookies
#[derive(Args, Debug)]
pub struct CookiesCmd {
    /// Cookies file in Netscape format, or `-` for stdin
    #[arg(required = true)]
    pub file: PathBuf,
}

/// Settings
#[derive(Args, Debug)]
pub struct ConfigCmd {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print current settings (API key masked)
    Show,

    /// Update settings
    Set(ConfigSetCmd),
}

#[derive(Args, Debug)]
pub struct ConfigSetCmd {
    /// Backend base URL
    #[arg(long)]
    pub api_url: Option<String>,

    /// API key
    #[arg(long)]
    pub api_key: Option<String>,

    /// Default transport
    #[arg(long, value_enum)]
    pub transport: Option<TransportArg>,

    /// Default download directory
    #[arg(long)]
    pub download_dir: Option<PathBuf>,
}

// =============================================================================
// JSON Output Structures
// =============================================================================

/// Standard JSON output wrapper
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

/// Status OK response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusOk {
    pub status: &'static str,
}

impl Default for StatusOk {
    fn default() -> Self {
        Self { status: "ok" }
    }
}

impl fmt::Display for StatusOk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status)
    }
}

/// Result of `grab`
#[derive(Debug, Serialize)]
pub struct GrabResponse {
    pub job_id: String,
    pub title: String,
    pub torrent_url: String,
    pub path: PathBuf,
}

impl fmt::Display for GrabResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "  Torrent: {}", self.torrent_url)?;
        write!(f, "  Saved:   {}", self.path.display())
    }
}

/// Settings as printed by `config show`
#[derive(Debug, Serialize)]
pub struct ConfigView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub transport: TransportMode,
    pub poll_interval_ms: u64,
    pub deadline_secs: u64,
    pub retry_budget: u32,
    pub request_timeout_secs: u64,
    pub download_dir: PathBuf,
}

impl fmt::Display for ConfigView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unset = "(not set)";
        if let Some(path) = &self.path {
            writeln!(f, "Config file:     {}", path.display())?;
        }
        writeln!(f, "API URL:         {}", self.api_url.as_deref().unwrap_or(unset))?;
        writeln!(f, "API key:         {}", self.api_key.as_deref().unwrap_or(unset))?;
        writeln!(f, "Transport:       {}", self.transport)?;
        writeln!(f, "Poll interval:   {}ms", self.poll_interval_ms)?;
        writeln!(f, "Deadline:        {}s", self.deadline_secs)?;
        writeln!(f, "Retry budget:    {}", self.retry_budget)?;
        writeln!(f, "Request timeout: {}s", self.request_timeout_secs)?;
        write!(f, "Download dir:    {}", self.download_dir.display())
    }
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Output handler for consistent formatting
#[derive(Debug, Clone, Copy)]
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
    pub fn print<T: Serialize + fmt::Display>(&self, data: T) -> anyhow::Result<()> {
        println!("{}", self.render(data)?);
        Ok(())
    }

    /// JSON envelope in JSON mode, the human-readable form otherwise
    pub fn render<T: Serialize + fmt::Display>(&self, data: T) -> serde_json::Result<String> {
        if self.json {
            serde_json::to_string_pretty(&JsonOutput::success(data))
        } else {
            Ok(data.to_string())
        }
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

    /// Print info message (suppressed in quiet mode)
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Watch URL Validation
// =============================================================================

/// Validate that `input` is a video watch page URL
pub fn validate_watch_url(input: &str) -> Result<&str, &'static str> {
    let url = url::Url::parse(input.trim()).map_err(|_| "Invalid URL")?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err("Watch URL must use http or https");
    }

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let is_youtube = host == "youtube.com" || host.ends_with(".youtube.com");

    let valid = if is_youtube {
        url.path() == "/watch" && url.query_pairs().any(|(k, v)| k == "v" && !v.is_empty())
    } else if host == "youtu.be" {
        url.path().len() > 1
    } else {
        false
    };

    if valid {
        Ok(input)
    } else {
        Err("Not a video watch page (expected youtube.com/watch?v=... or youtu.be/...)")
    }
}

// =============================================================================
// Tests
// =============================================================================
