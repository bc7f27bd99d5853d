//! Cluster design file: parsing and validation
//!
//! SBIO pattern: everything here is pure. Reading the file lives in
//! `config::load_cluster_file`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::topology::{NodeTypeSpec, RuleTemplate, SecurityGroupSpec, VolumeTypeSpec};
use crate::cluster::naming::{
    validate_component, validate_volume_type, NamingError, SEP, VOLUME_SEP,
};

/// Security group every cloud tenancy provides; node types may attach it
/// without declaring it.
pub const IMPLICIT_SECURITY_GROUP: &str = "default";

/// Errors raised while parsing or validating a cluster design
#[derive(Error, Debug, PartialEq)]
pub enum DesignError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid name: {0}")]
    InvalidName(#[from] NamingError),

    #[error("Duplicate {kind} name: '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    #[error("Security group '{0}' referenced by node type '{1}' is not defined")]
    UndefinedSecurityGroup(String, String),

    #[error("Volume type '{0}' referenced by node type '{1}' is not defined")]
    UndefinedVolumeType(String, String),

    #[error("Image '{0}' referenced by node type '{1}' is not defined")]
    UndefinedImage(String, String),
}

/// The complete cluster design file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// Cluster name, prefix of every node and security group name
    pub cluster: String,

    #[serde(alias = "nodetypes", default)]
    pub node_types: Vec<NodeTypeSpec>,

    #[serde(alias = "securitygroups", default)]
    pub security_groups: Vec<SecurityGroupSpec>,

    #[serde(alias = "volumetypes", default)]
    pub volume_types: Vec<VolumeTypeSpec>,

    /// Docker images that can be deployed, by name
    #[serde(default)]
    pub images: HashMap<String, ImageDefinition>,

    /// Registry the images are pulled from (e.g. "registry.example.com:5000")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    #[serde(default)]
    pub docker: DockerClientConfig,

    #[serde(default)]
    pub ssh: SshConfig,

    /// Where the live inventory comes from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<InventorySource>,
}

/// A deployable Docker image
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ImageDefinition {
    /// Repository name without registry (e.g. "apache")
    pub repo: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// How containers of this image are created by the `run` task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<ImageRunOptions>,
}

/// Body fields for the Docker `POST /containers/create` call (`Cmd`,
/// `ExposedPorts`, `HostConfig`, ...). `Image` and `HostConfig.ExtraHosts`
/// are always set by the tool.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ImageRunOptions {
    #[serde(default)]
    pub create: serde_json::Map<String, serde_json::Value>,
}

/// How the Docker daemon on each node is reached
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DockerClientConfig {
    #[serde(default = "default_docker_protocol")]
    pub protocol: String,

    #[serde(default = "default_docker_port")]
    pub port: u16,
}

impl Default for DockerClientConfig {
    fn default() -> Self {
        Self {
            protocol: default_docker_protocol(),
            port: default_docker_port(),
        }
    }
}

fn default_docker_protocol() -> String {
    "http".to_string()
}

fn default_docker_port() -> u16 {
    2375
}

/// How nodes are reached over SSH
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_user")]
    pub user: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            port: default_ssh_port(),
        }
    }
}

fn default_ssh_user() -> String {
    "ubuntu".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

/// Source of the live inventory
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum InventorySource {
    /// OpenStack Nova/Neutron/Cinder REST endpoints
    Openstack(OpenStackEndpoints),
    /// A JSON snapshot of servers, security groups and volumes
    Snapshot { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenStackEndpoints {
    /// Compute (Nova) endpoint including the tenant path
    pub compute_url: String,

    /// Network (Neutron) endpoint
    pub network_url: String,

    /// Block storage (Cinder) endpoint including the tenant path
    pub volume_url: String,

    /// Pre-issued Keystone token; supports env var expansion: "${OS_TOKEN}"
    pub token: String,

    /// Network whose first address is used as the node address
    #[serde(default = "default_network_name")]
    pub network: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_network_name() -> String {
    "public".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

// ============================================================================
// SBIO: Pure parsing functions (no I/O)
// ============================================================================

/// Format of a design file, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesignFormat {
    Json,
    Yaml,
}

impl DesignFormat {
    pub fn from_extension(ext: Option<&str>) -> Self {
        match ext.map(|e| e.to_ascii_lowercase()) {
            Some(e) if e == "yaml" || e == "yml" => DesignFormat::Yaml,
            _ => DesignFormat::Json,
        }
    }
}

/// Remove `//` and `/* */` comments outside of string literals
pub fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                // Line comment: keep the newline so line numbers in errors hold
                for nc in chars.by_ref() {
                    if nc == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for nc in chars.by_ref() {
                    if prev == '*' && nc == '/' {
                        break;
                    }
                    prev = nc;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Parse a design file's content
pub fn parse_cluster_config(content: &str, format: DesignFormat) -> Result<ClusterConfig, DesignError> {
    match format {
        DesignFormat::Json => serde_json::from_str(&strip_comments(content))
            .map_err(|e| DesignError::ParseError(e.to_string())),
        DesignFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| DesignError::ParseError(e.to_string()))
        }
    }
}

fn check_unique<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a String>,
) -> Result<(), DesignError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(DesignError::DuplicateName {
                kind,
                name: name.clone(),
            });
        }
    }
    Ok(())
}

/// Validate a design for consistency.
/// This is a pure function - no I/O.
///
/// Templated rules may name node types the design does not declare (nodes
/// created by hand, such as a bastion); those only log a warning.
pub fn validate_cluster_config(config: &ClusterConfig) -> Result<(), DesignError> {
    let sep = SEP.to_string();

    validate_component("cluster name", &config.cluster, &sep)?;
    validate_component("cluster name", &config.cluster, VOLUME_SEP)?;
    // Node names open with the cluster name and follow the volume separator
    if config.cluster.starts_with('_') {
        return Err(NamingError::InvalidComponent {
            component: "cluster name",
            value: config.cluster.clone(),
            separator: VOLUME_SEP.to_string(),
        }
        .into());
    }
    for node_type in &config.node_types {
        validate_component("node type", &node_type.name, &sep)?;
        validate_component("node type", &node_type.name, VOLUME_SEP)?;
    }
    for group in &config.security_groups {
        validate_component("security group name", &group.name, &sep)?;
    }
    for volume in &config.volume_types {
        validate_volume_type(&volume.name)?;
    }

    check_unique("node type", config.node_types.iter().map(|n| &n.name))?;
    check_unique("security group", config.security_groups.iter().map(|g| &g.name))?;
    check_unique("volume type", config.volume_types.iter().map(|v| &v.name))?;

    let groups: HashSet<&str> = config.security_groups.iter().map(|g| g.name.as_str()).collect();
    let volumes: HashSet<&str> = config.volume_types.iter().map(|v| v.name.as_str()).collect();
    let node_types: HashSet<&str> = config.node_types.iter().map(|n| n.name.as_str()).collect();

    for node_type in &config.node_types {
        for group in &node_type.security_groups {
            if group != IMPLICIT_SECURITY_GROUP && !groups.contains(group.as_str()) {
                return Err(DesignError::UndefinedSecurityGroup(
                    group.clone(),
                    node_type.name.clone(),
                ));
            }
        }
        for volume in &node_type.volume_types {
            if !volumes.contains(volume.as_str()) {
                return Err(DesignError::UndefinedVolumeType(
                    volume.clone(),
                    node_type.name.clone(),
                ));
            }
        }
        for image in &node_type.images {
            if !config.images.contains_key(image) {
                return Err(DesignError::UndefinedImage(
                    image.clone(),
                    node_type.name.clone(),
                ));
            }
        }
    }

    for group in &config.security_groups {
        for rule in &group.rules {
            if let RuleTemplate::NodeTemplated(templated) = rule {
                for ty in &templated.remote_ip_node_types {
                    if !node_types.contains(ty.as_str()) {
                        warn!(
                            "Security group '{}' opens to node type '{}', which the design does not declare",
                            group.name, ty
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

impl ClusterConfig {
    /// Parse and validate.
    /// Pure function - no I/O.
    pub fn from_str_with_format(content: &str, format: DesignFormat) -> Result<Self, DesignError> {
        let config = parse_cluster_config(content, format)?;
        validate_cluster_config(&config)?;
        Ok(config)
    }

    pub fn node_type(&self, name: &str) -> Option<&NodeTypeSpec> {
        self.node_types.iter().find(|n| n.name == name)
    }

    pub fn volume_type_names(&self) -> Vec<String> {
        self.volume_types.iter().map(|v| v.name.clone()).collect()
    }
}
