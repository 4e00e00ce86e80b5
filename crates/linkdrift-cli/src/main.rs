#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "linkdrift")]
#[command(author, version, about = "Detect version drift in npm-linked packages", long_about = None)]
struct Cli {
    /// Keep running and re-check a linked package whenever its repository
    /// HEAD moves
    #[arg(short, long)]
    watch: bool,

    /// Project directory containing package.json and node_modules
    #[arg(long, value_name = "PATH", default_value = ".")]
    cwd: PathBuf,

    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit one JSON result object on stdout instead of human output
    #[arg(long, conflicts_with = "watch")]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json);
    commands::check::run(&cli.cwd, cli.watch, cli.json)
}
