//! Command-line interface definitions.

mod build;
mod refs;
mod watch;

pub use build::build_bundles;
pub use refs::print_refs;
pub use watch::watch_bundles;

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Sheaf asset bundler CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: sheaf.toml)
    #[arg(short = 'C', long, default_value = "sheaf.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build all configured bundles once
    #[command(visible_alias = "b")]
    Build,

    /// Build all bundles, then keep regenerating them as sources change
    #[command(visible_alias = "w")]
    Watch,

    /// Print reference markup for a bundle
    #[command(visible_alias = "r")]
    Refs {
        /// Output path of the bundle (as configured)
        output: String,

        /// Emit one reference per original source instead of the bundle
        #[arg(short, long)]
        debug: bool,
    },
}
