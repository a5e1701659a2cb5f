use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "TRIPWIRE_CONFIG";

/// Paths searched, in order, when neither a flag nor `TRIPWIRE_CONFIG` names a file
pub const DEFAULT_PATHS: [&str; 2] = [
    "./tripwire.config.ron",
    "/etc/tripwire/tripwire.config.ron",
];

/// Find the configuration file using the following precedence:
/// 1. An explicit path (the `--config` flag)
/// 2. `TRIPWIRE_CONFIG` environment variable
/// 3. ./tripwire.config.ron (current working directory)
/// 4. /etc/tripwire/tripwire.config.ron (system-wide config)
///
/// # Errors
///
/// Fails if an explicitly named file does not exist, or if none of the
/// default locations hold a file.
pub fn find_config_file(
    explicit: Option<&Path>,
    env_path: Option<&str>,
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("--config points to non-existent file: {}", path.display());
    }

    if let Some(env_path) = env_path {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = DEFAULT_PATHS.map(PathBuf::from);

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

/// Read and parse the configuration at `path`
///
/// # Errors
///
/// Fails if the file cannot be read or is not valid RON for [`crate::controller::Tripwire`].
pub fn load(path: &Path) -> anyhow::Result<crate::controller::Tripwire> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
    })?;

    ron::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))
}
