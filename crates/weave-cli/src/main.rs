use clap::Parser;

mod cli;
mod commands;

fn main() -> anyhow::Result<()> {
    // logs go to stderr so `dump` and `inspect --format json` stay parseable
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    commands::run_command(cli::Cli::parse())
}
