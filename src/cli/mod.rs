use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub mod commands;
pub mod output;

#[derive(Parser)]
#[command(
    name = "promote",
    version,
    about = "Move a TypeScript/JavaScript file or directory and rewrite every relative import of it"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root; nothing outside it is scanned or moved
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Config file (default: .promote/config.toml or promote.toml under the root)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Include only files matching this glob
    #[arg(long, global = true)]
    pub include: Vec<String>,

    /// Exclude files matching this glob
    #[arg(long, global = true)]
    pub exclude: Vec<String>,

    /// Worker threads for scanning and writing (default: one per core)
    #[arg(long, global = true)]
    pub jobs: Option<usize>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Move a unit and rewrite the references to it
    Move {
        /// Current path of the file or directory
        old: PathBuf,
        /// Destination path
        new: PathBuf,
        /// Plan and print the edits without writing
        #[arg(long)]
        dry_run: bool,
        /// Rewrite references but leave the files where they are
        #[arg(long)]
        no_move: bool,
    },

    /// List the files that reference a unit
    Deps {
        /// File or directory path
        path: PathBuf,
    },

    /// Show how a unit's parent directory would change
    Delta {
        old: PathBuf,
        new: PathBuf,
    },
}

#[derive(Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Compact,
}
