use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "signloop",
    version,
    about = "Cycle a remote video catalog on an unattended display"
)]
pub struct Cli {
    /// Config file to load instead of ./signloop.toml
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum Command {
    /// Run the playback cycle until terminated (default)
    Run,
    /// Print the ordered catalog without downloading anything
    Catalog,
    /// Print persisted cycle progress
    Status,
}
