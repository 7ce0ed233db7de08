mod runtime;
mod types;

pub use runtime::*;
pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./config.toml",
        "./watchforge.toml",
        "~/.config/watchforge/config.toml",
        "/etc/watchforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    // Return default config if no file found
    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.conversion.max_concurrent == 0 {
        anyhow::bail!("conversion.max_concurrent must be at least 1");
    }

    if config.conversion.max_queue_size == 0 {
        anyhow::bail!("conversion.max_queue_size must be at least 1");
    }

    if config.conversion.readiness_checks < 2 {
        anyhow::bail!("conversion.readiness_checks must be at least 2");
    }

    // Outputs carry a video extension, so a shared directory would feed
    // every converted file back into the pipeline.
    if same_dir(&config.watch.dir, &config.output.dir) {
        anyhow::bail!(
            "watch.dir and output.dir must differ (both are {:?})",
            config.watch.dir
        );
    }

    Ok(())
}

/// Equal as written, or resolving to the same existing directory.
fn same_dir(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
