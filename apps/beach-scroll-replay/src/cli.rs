use clap::{Args, Parser};
use std::path::PathBuf;

use crate::telemetry::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "beach-scroll-replay",
    about = "Replay a recorded touch gesture through the scrollback flow controller",
    version
)]
pub struct Cli {
    #[arg(long, value_name = "FILE", help = "JSON gesture trace to replay")]
    pub trace: PathBuf,

    #[arg(
        long,
        value_name = "FILE",
        env = "BEACH_TOUCH_SCROLL_CONFIG",
        help = "TOML scroll configuration (defaults apply to missing keys)"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, default_value_t = 24, help = "Visible terminal rows")]
    pub rows: u16,

    #[arg(long = "line-height", value_name = "PX", help = "Rendered line height in pixels")]
    pub line_height: Option<f64>,

    #[arg(
        long = "entry-latency-ms",
        default_value_t = 40,
        help = "Delay before the simulated remote confirms copy-mode entry"
    )]
    pub entry_latency_ms: u64,

    #[arg(
        long = "rtt-ms",
        default_value_t = 80,
        help = "Round trip before each scroll batch is confirmed"
    )]
    pub rtt_ms: u64,

    #[arg(long, help = "Emit JSON lines instead of text")]
    pub json: bool,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "BEACH_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "BEACH_LOG_FILE",
        help = "Write logs to the specified file instead of stderr"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}
