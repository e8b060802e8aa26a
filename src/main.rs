//! Sheaf - a self-healing asset bundler.

#![allow(dead_code)]

mod bundle;
mod cache;
mod cli;
mod config;
mod error;
mod hashing;
mod logger;
mod monitor;
mod process;
mod refs;
mod store;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    logger::set_verbose(cli.verbose);

    let config = Config::load(&cli.config)?;

    match &cli.command {
        Commands::Build => cli::build_bundles(&config),
        Commands::Watch => cli::watch_bundles(&config),
        Commands::Refs { output, debug } => cli::print_refs(&config, output, *debug),
    }
}
