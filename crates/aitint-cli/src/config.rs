//! YAML configuration loading for the `aitint` binary.
//!
//! Loads [`AitintConfig`] from a YAML file on disk. Missing sections and
//! fields take their defaults.

use aitint_core::AitintConfig;
use std::path::Path;

/// Load an [`AitintConfig`] from a YAML file at `path`.
///
/// The result is not validated; command-line overrides are applied first.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn load_config(path: &Path) -> anyhow::Result<AitintConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
    let config: AitintConfig = serde_yaml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {}", e))?;
    Ok(config)
}
