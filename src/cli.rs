use clap::Parser;
use std::path::PathBuf;
use stream_assembler::config::Framing;

/// Replay an agent backend stream through the content assembler
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Play back a recorded stream from a file
    #[arg(long, conflicts_with = "stdin", required_unless_present = "stdin")]
    pub playback: Option<PathBuf>,

    /// Read the raw transport stream from stdin
    #[arg(long)]
    pub stdin: bool,

    /// Fast playback mode - ignore chunk timing when playing recordings
    #[arg(long)]
    pub fast_playback: bool,

    /// Transport framing; overrides the settings file
    #[arg(long, value_enum)]
    pub framing: Option<Framing>,

    /// Settings file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Fail the turn when no chunk arrives for this many seconds (0 disables)
    #[arg(long, default_value_t = 120)]
    pub idle_timeout: u64,

    /// Record the incoming chunks to a file
    #[arg(long)]
    pub record: Option<PathBuf>,

    /// User message to show before the streamed answer
    #[arg(long)]
    pub prompt: Option<String>,

    /// Print the final rendered markdown after the stream ends
    #[arg(long)]
    pub show_rendered: bool,

    /// Enable verbose logging (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Args {
    pub fn parse() -> Self {
        <Args as Parser>::parse()
    }
}
