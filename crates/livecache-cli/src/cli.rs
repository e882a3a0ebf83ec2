use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "livecache",
    about = "livecache -- observable query cache demo host",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Host configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Store image to load and save
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Seed files, observe them, and watch the cache refresh
    Demo(DemoArgs),
    /// Insert or replace a file record
    Insert(InsertArgs),
    /// List file records
    List(ListArgs),
    /// Remove a file record by path
    Remove(RemoveArgs),
}

#[derive(Args)]
pub struct DemoArgs {
    /// Milliseconds to wait before the second batch of inserts
    #[arg(long, default_value = "500")]
    pub delay_ms: u64,
}

#[derive(Args)]
pub struct InsertArgs {
    pub path: String,
    pub name: String,
}

#[derive(Args)]
pub struct ListArgs {
    /// Only paths starting with this prefix
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Args)]
pub struct RemoveArgs {
    pub path: String,
}
