//! CLI command definitions and subcommands

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// LinkUp - group hangout planner
#[derive(Parser)]
#[command(
    name = "lu",
    about = "Plans group hangouts by driving remote agents over your group chats",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll every configured group until Ctrl+C
    Run,

    /// Run a single poll cycle and exit
    Once,

    /// Show the persisted session of every group
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List conversations in the message database
    Chats {
        /// Maximum number of chats to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Create or update the remote assistants from the embedded prompts
    Agents,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Path of the log file
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("linkup")
        .join("logs")
        .join("linkup.log")
}
