use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hlsforge")]
#[command(author, version, about = "Watch-folder HLS adaptive-bitrate packager")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the watcher, scheduler and HTTP server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Package source files and wait until every job has finished
    Package {
        /// Source files to package
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output root (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Probe a source file and display its metadata
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the rendition ladder planned for a source size
    Ladder {
        /// Source height in pixels
        #[arg(long)]
        height: u32,

        /// Source width in pixels (0 assumes 16:9)
        #[arg(long, default_value = "0")]
        width: u32,

        /// Quality profile: low, medium or high (defaults to config)
        #[arg(long)]
        profile: Option<String>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
