use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "watchforge")]
#[command(author, version, about = "Watch-folder DNxHR transcoding service")]
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
    /// Watch the input directory and serve the web UI
    Start(StartArgs),

    /// Probe a media file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
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

/// Overrides applied on top of the loaded configuration.
#[derive(clap::Args, Debug, Default)]
pub struct StartArgs {
    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory to watch for new videos
    #[arg(long)]
    pub watch_dir: Option<PathBuf>,

    /// Directory converted files are written to
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Staging directory for uploads
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,

    /// Maximum simultaneous conversions
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Run without the HTTP server
    #[arg(long)]
    pub headless: bool,

    /// Start with automatic conversion paused
    #[arg(long)]
    pub no_auto_convert: bool,

    /// Delete sources after a successful conversion
    #[arg(long)]
    pub delete_after: bool,

    /// Re-convert files whose output already exists
    #[arg(long)]
    pub overwrite: bool,
}

impl StartArgs {
    pub fn apply(self, config: &mut watchforge::config::Config) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = self.watch_dir {
            config.watch.dir = dir;
        }
        if let Some(dir) = self.output_dir {
            config.output.dir = dir;
        }
        if let Some(dir) = self.upload_dir {
            config.upload.dir = dir;
        }
        if let Some(n) = self.max_concurrent {
            config.conversion.max_concurrent = n;
        }
        if self.headless {
            config.server.headless = true;
        }
        if self.no_auto_convert {
            config.conversion.auto_convert = false;
        }
        if self.delete_after {
            config.conversion.delete_after = true;
        }
        if self.overwrite {
            config.conversion.overwrite_existing = true;
        }
    }
}
