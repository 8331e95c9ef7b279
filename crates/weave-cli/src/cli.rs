use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "weave", about = "Weave: collaborative patcher documents", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Engine settings (TOML) used to read and write documents
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty patcher document
    New(NewArgs),
    /// Add an object to a document
    Add(AddArgs),
    /// Link two objects of a document
    Link(LinkArgs),
    /// Summarize a document
    Inspect(InspectArgs),
    /// Print the full document snapshot as JSON
    Dump(DumpArgs),
    /// Serve a document to editing peers
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct NewArgs {
    pub path: PathBuf,
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct AddArgs {
    pub path: PathBuf,
    /// Object text, e.g. "+ 1" or "print"
    pub text: String,
    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    pub x: f64,
    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    pub y: f64,
}

#[derive(Args)]
pub struct LinkArgs {
    pub path: PathBuf,
    /// Index of the sending object
    pub sender: usize,
    pub outlet: usize,
    /// Index of the receiving object
    pub receiver: usize,
    pub inlet: usize,
}

#[derive(Args)]
pub struct InspectArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct DumpArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Server settings (TOML)
    #[arg(long)]
    pub server_config: Option<PathBuf>,
    #[arg(long)]
    pub bind: Option<String>,
    /// Document file, loaded at start and autosaved
    #[arg(long)]
    pub snapshot: Option<PathBuf>,
}
