//! Composite resource names
//!
//! Every cloud resource the tool manages is recognised by its name alone:
//!
//! - nodes: `<cluster>-<seq>-<type>` (e.g. `oa-1-computing`)
//! - security groups: `<cluster>-<group>` (e.g. `oa-http`)
//! - volumes: `<volume type>__<node name>` (e.g. `dbdata__oa-1-computing`)
//!
//! Names are built through validated constructors and decomposed by
//! [`NodeName::parse`] / [`SecurityGroupName::parse`] / [`VolumeName::parse`],
//! which reject anything that does not split into the expected field count.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between the fields of node and security group names
pub const SEP: char = '-';

/// Separator between the volume type and the node name in volume names
pub const VOLUME_SEP: &str = "__";

/// Errors raised when composing or decomposing names
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("Name '{name}' does not decompose into {expected} fields (found {found})")]
    AmbiguousName {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Invalid {component} '{value}': must be non-empty and must not contain '{separator}'")]
    InvalidComponent {
        component: &'static str,
        value: String,
        separator: String,
    },
}

/// Check that a name component can be embedded in a composite name
pub fn validate_component(
    component: &'static str,
    value: &str,
    separator: &str,
) -> Result<(), NamingError> {
    if value.is_empty() || value.contains(separator) {
        return Err(NamingError::InvalidComponent {
            component,
            value: value.to_string(),
            separator: separator.to_string(),
        });
    }
    Ok(())
}

fn sep_str() -> String {
    SEP.to_string()
}

fn split_exact<'a>(name: &'a str, sep: &str, expected: usize) -> Result<Vec<&'a str>, NamingError> {
    let fields: Vec<&str> = name.split(sep).collect();
    if fields.len() != expected || fields.iter().any(|f| f.is_empty()) {
        return Err(NamingError::AmbiguousName {
            name: name.to_string(),
            expected,
            found: fields.len(),
        });
    }
    Ok(fields)
}

// ============================================================================
// Nodes
// ============================================================================

/// Decomposed node name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeName {
    cluster: String,
    seq: u32,
    node_type: String,
}

impl NodeName {
    pub fn new(cluster: &str, node_type: &str, seq: u32) -> Result<Self, NamingError> {
        let sep = sep_str();
        validate_component("cluster name", cluster, &sep)?;
        validate_component("node type", node_type, &sep)?;
        Ok(Self {
            cluster: cluster.to_string(),
            seq,
            node_type: node_type.to_string(),
        })
    }

    pub fn parse(name: &str) -> Result<Self, NamingError> {
        let fields = split_exact(name, &sep_str(), 3)?;
        // Only the canonical decimal form round-trips ("01" and "+1" do not)
        let seq = fields[1]
            .parse::<u32>()
            .ok()
            .filter(|seq| seq.to_string() == fields[1])
            .ok_or_else(|| NamingError::InvalidComponent {
                component: "node sequence number",
                value: fields[1].to_string(),
                separator: sep_str(),
            })?;
        Ok(Self {
            cluster: fields[0].to_string(),
            seq,
            node_type: fields[2].to_string(),
        })
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEP}{}{SEP}{}", self.cluster, self.seq, self.node_type)
    }
}

/// Compose the name of the `seq`-th node of a type
pub fn node_name(cluster: &str, node_type: &str, seq: u32) -> Result<String, NamingError> {
    NodeName::new(cluster, node_type, seq).map(|n| n.to_string())
}

/// Type of a node given its name
pub fn node_type(name: &str) -> Result<String, NamingError> {
    NodeName::parse(name).map(|n| n.node_type)
}

/// Cluster of a node given its name
pub fn node_cluster(name: &str) -> Result<String, NamingError> {
    NodeName::parse(name).map(|n| n.cluster)
}

// ============================================================================
// Security groups
// ============================================================================

/// Decomposed security group name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurityGroupName {
    cluster: String,
    plain_name: String,
}

impl SecurityGroupName {
    pub fn new(cluster: &str, plain_name: &str) -> Result<Self, NamingError> {
        let sep = sep_str();
        validate_component("cluster name", cluster, &sep)?;
        validate_component("security group name", plain_name, &sep)?;
        Ok(Self {
            cluster: cluster.to_string(),
            plain_name: plain_name.to_string(),
        })
    }

    pub fn parse(name: &str) -> Result<Self, NamingError> {
        let fields = split_exact(name, &sep_str(), 2)?;
        Ok(Self {
            cluster: fields[0].to_string(),
            plain_name: fields[1].to_string(),
        })
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn plain_name(&self) -> &str {
        &self.plain_name
    }
}

impl fmt::Display for SecurityGroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEP}{}", self.cluster, self.plain_name)
    }
}

pub fn security_group_name(cluster: &str, plain_name: &str) -> Result<String, NamingError> {
    SecurityGroupName::new(cluster, plain_name).map(|g| g.to_string())
}

pub fn security_group_cluster(name: &str) -> Result<String, NamingError> {
    SecurityGroupName::parse(name).map(|g| g.cluster)
}

/// Name of a security group bar its cluster prefix
pub fn security_group_plain_name(name: &str) -> Result<String, NamingError> {
    SecurityGroupName::parse(name).map(|g| g.plain_name)
}

// ============================================================================
// Volumes
// ============================================================================

const VOLUME_SEP_CHAR: char = '_';

/// Check that a volume type can be embedded in a volume name. Besides
/// containing no `__`, it must not end in `_`, which would merge with the
/// separator and shift the split point.
pub fn validate_volume_type(volume_type: &str) -> Result<(), NamingError> {
    validate_component("volume type", volume_type, VOLUME_SEP)?;
    if volume_type.ends_with(VOLUME_SEP_CHAR) {
        return Err(NamingError::InvalidComponent {
            component: "volume type",
            value: volume_type.to_string(),
            separator: VOLUME_SEP.to_string(),
        });
    }
    Ok(())
}

/// Decomposed volume name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeName {
    volume_type: String,
    node_name: String,
}

impl VolumeName {
    pub fn new(volume_type: &str, node_name: &str) -> Result<Self, NamingError> {
        validate_volume_type(volume_type)?;
        validate_component("node name", node_name, VOLUME_SEP)?;
        if node_name.starts_with(VOLUME_SEP_CHAR) {
            return Err(NamingError::InvalidComponent {
                component: "node name",
                value: node_name.to_string(),
                separator: VOLUME_SEP.to_string(),
            });
        }
        Ok(Self {
            volume_type: volume_type.to_string(),
            node_name: node_name.to_string(),
        })
    }

    /// Decompose a volume name. Only names [`VolumeName::new`] could have
    /// produced are accepted, so `db___oa-1-computing` is rejected rather
    /// than read back as type `db`.
    pub fn parse(name: &str) -> Result<Self, NamingError> {
        let fields = split_exact(name, VOLUME_SEP, 2)?;
        Self::new(fields[0], fields[1])
    }

    pub fn volume_type(&self) -> &str {
        &self.volume_type
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }
}

impl fmt::Display for VolumeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{VOLUME_SEP}{}", self.volume_type, self.node_name)
    }
}

pub fn volume_name(volume_type: &str, node_name: &str) -> Result<String, NamingError> {
    VolumeName::new(volume_type, node_name).map(|v| v.to_string())
}

pub fn volume_type_from_volume_name(name: &str) -> Result<String, NamingError> {
    VolumeName::parse(name).map(|v| v.volume_type)
}

pub fn node_name_from_volume_name(name: &str) -> Result<String, NamingError> {
    VolumeName::parse(name).map(|v| v.node_name)
}
