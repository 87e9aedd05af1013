//! scadview - live preview server for parametric CAD projects.

mod actor;
mod artifact;
mod cache;
mod cli;
mod config;
mod core;
mod export;
mod freshness;
mod logger;
mod pipeline;
mod reload;
mod utils;

use std::sync::Arc;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::ProjectConfig;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();
    logger::set_verbose(cli.verbose);

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    let config = Arc::new(ProjectConfig::load(&cli)?);

    match cli.command {
        Commands::Serve { .. } => {
            cli::build::warn_missing_programs(&config);
            cli::serve::serve(config)
        }
        Commands::Build { force, models } => cli::build::build(config, force, models),
        Commands::Export { model, scale } => cli::export::export(config, &model, scale),
        Commands::Check => cli::check::check(&config),
    }
}
