// src/cli/mod.rs — CLI definition (clap derive)

pub mod replay;
pub mod status;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "synapse",
    about = "Behavioral-sequence modeling and suggestion engine",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Database path (defaults to the data directory)
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Keep all state in memory; nothing is persisted
    #[arg(long, global = true)]
    pub memory: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream a JSONL event log through the engine, printing surfaced predictions
    Replay {
        /// Event log, one JSON event per line ("-" for stdin)
        file: String,
        /// Print every prediction, not only surfaced ones
        #[arg(long)]
        all: bool,
        /// Run a full training pass once the log is consumed
        #[arg(long)]
        train: bool,
    },
    /// Ingest an event log and force a full training pass
    Train {
        /// Event log, one JSON event per line ("-" for stdin)
        file: String,
    },
    /// List learned skills
    Skills {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show model and plugin status
    Status {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}
