pub mod cluster;
pub mod topology;

pub use cluster::{
    parse_cluster_config, strip_comments, validate_cluster_config, ClusterConfig, DesignError,
    DesignFormat, DockerClientConfig, ImageDefinition, ImageRunOptions, InventorySource,
    OpenStackEndpoints, SshConfig, IMPLICIT_SECURITY_GROUP,
};
pub use topology::{
    BasicAuth, Direction, EndpointTest, NodeTemplatedRule, NodeTypeSpec, RuleFields,
    RuleTemplate, SecurityGroupSpec, StaticRule, VolumeTypeSpec,
};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors for file I/O operations (separate from pure parsing errors)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Design error: {0}")]
    DesignError(#[from] DesignError),

    #[error("Failed to expand '{0}': {1}")]
    ExpansionError(String, String),
}

/// Default design file location: ~/.clouddity/cluster.json
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".clouddity")
        .join("cluster.json")
}

/// Expand `~` in a user-supplied path
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

/// Expand `${VAR}` references in a configuration value from the environment
pub fn expand_env(value: &str) -> Result<String, ConfigError> {
    shellexpand::env(value)
        .map(|v| v.into_owned())
        .map_err(|e| ConfigError::ExpansionError(value.to_string(), e.to_string()))
}

// ============================================================================
// SBIO: I/O wrapper - thin layer over pure functions
// ============================================================================

/// Load, parse and validate a cluster design file from disk.
/// The format (JSON/JSONC or YAML) is chosen by extension.
pub fn load_cluster_file(path: &Path) -> Result<ClusterConfig, ConfigError> {
    let path = expand_path(path);
    let content = std::fs::read_to_string(&path)?;
    let format = DesignFormat::from_extension(path.extension().and_then(|e| e.to_str()));
    let config = ClusterConfig::from_str_with_format(&content, format)?;
    Ok(config)
}
