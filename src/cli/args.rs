//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Live preview server for parametric CAD projects
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: scadview.toml, searched upward)
    #[arg(short = 'C', long, global = true, default_value = "scadview.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Watch sources, render previews and stream updates to viewers
    #[command(visible_alias = "s")]
    Serve {
        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<std::net::IpAddr>,

        /// HTTP artifact server port
        #[arg(short, long)]
        port: Option<u16>,

        /// Live update WebSocket port
        #[arg(short = 'w', long)]
        ws_port: Option<u16>,
    },

    /// Run the pipeline once and exit
    #[command(visible_alias = "b")]
    Build {
        /// Re-render even when nothing changed
        #[arg(short, long)]
        force: bool,

        /// Only render these models (implies --force for them)
        #[arg(short, long = "model", value_name = "NAME")]
        models: Vec<String>,
    },

    /// Export one model to a 3D file
    #[command(visible_alias = "e")]
    Export {
        /// Model name as declared in the config
        model: String,

        /// Scale in percent (must be listed in [export] scales)
        #[arg(short, long, default_value_t = crate::config::DEFAULT_SCALE)]
        scale: u32,
    },

    /// Validate the config and print the resolved project
    #[command(visible_alias = "c")]
    Check,
}
