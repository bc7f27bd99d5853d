//! Expansion of declarative node, security group and volume types into the
//! concrete entities they declare.

use serde::{Deserialize, Serialize};

use super::naming::{node_name, security_group_name, volume_name, NamingError};
use crate::config::{NodeTypeSpec, VolumeTypeSpec};

/// A node derived purely from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredNode {
    pub name: String,
    pub cluster: String,
    pub node_type: String,
    pub seq: u32,
    pub image_ref: Option<String>,
    pub flavor_ref: Option<String>,
    /// Security groups to attach at creation time
    pub security_groups: Vec<SecurityGroupRef>,
}

/// Reference shape used when attaching a security group to a new node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRef {
    pub name: String,
}

/// A volume derived purely from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredVolume {
    pub name: String,
    pub volume_type: String,
    pub node_name: String,
    pub size_gib: u32,
    pub fstype: String,
    pub mountpoint: String,
    pub availability_zone: Option<String>,
}

/// Expand node types into their declared nodes.
///
/// Output is type-major (input order), sequence-minor (1..=replication).
/// A type with a replication count of zero contributes nothing.
pub fn expand_nodes(
    cluster: &str,
    node_types: &[NodeTypeSpec],
) -> Result<Vec<DeclaredNode>, NamingError> {
    let mut nodes = Vec::new();

    for node_type in node_types {
        let security_groups =
            expand_security_groups_as_cloud_refs(cluster, &node_type.security_groups)?;

        for seq in 1..=node_type.replication_count {
            nodes.push(DeclaredNode {
                name: node_name(cluster, &node_type.name, seq)?,
                cluster: cluster.to_string(),
                node_type: node_type.name.clone(),
                seq,
                image_ref: node_type.image_ref.clone(),
                flavor_ref: node_type.flavor_ref.clone(),
                security_groups: security_groups.clone(),
            });
        }
    }

    Ok(nodes)
}

/// Map plain security group names to cluster-scoped cloud references
pub fn expand_security_groups_as_cloud_refs<S: AsRef<str>>(
    cluster: &str,
    names: &[S],
) -> Result<Vec<SecurityGroupRef>, NamingError> {
    names
        .iter()
        .map(|name| {
            security_group_name(cluster, name.as_ref()).map(|name| SecurityGroupRef { name })
        })
        .collect()
}

/// Declared security group names of a cluster, in declaration order
pub fn expand_security_group_names<S: AsRef<str>>(
    cluster: &str,
    names: &[S],
) -> Result<Vec<String>, NamingError> {
    names
        .iter()
        .map(|name| security_group_name(cluster, name.as_ref()))
        .collect()
}

/// Expand volumes: one per declared node and volume type attached to it.
///
/// Volume types referenced by a node type but missing from `volume_types`
/// are skipped.
pub fn expand_volumes(
    cluster: &str,
    node_types: &[NodeTypeSpec],
    volume_types: &[VolumeTypeSpec],
) -> Result<Vec<DeclaredVolume>, NamingError> {
    let mut volumes = Vec::new();

    for node in expand_nodes(cluster, node_types)? {
        let Some(spec) = node_types.iter().find(|t| t.name == node.node_type) else {
            continue;
        };
        for type_name in &spec.volume_types {
            let Some(volume_type) = volume_types.iter().find(|v| &v.name == type_name) else {
                continue;
            };
            volumes.push(DeclaredVolume {
                name: volume_name(&volume_type.name, &node.name)?,
                volume_type: volume_type.name.clone(),
                node_name: node.name.clone(),
                size_gib: volume_type.size_gib,
                fstype: volume_type.fstype.clone(),
                mountpoint: volume_type.mountpoint.clone(),
                availability_zone: volume_type.availability_zone.clone(),
            });
        }
    }

    Ok(volumes)
}
