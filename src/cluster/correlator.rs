//! Correlation of the live inventory with the declared cluster
//!
//! Correlation never fails: live entities whose names do not decompose under
//! the naming scheme, or that belong to another cluster, are filtered out.
//! Nodes of an undeclared type are kept with empty enrichment, since a cluster
//! may contain manually created members.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::inventory::{LiveGroup, LiveNode, LiveVolume};
use super::naming::{NodeName, SecurityGroupName, VolumeName};
use crate::config::{DockerClientConfig, NodeTypeSpec, SshConfig};

/// Docker remote API endpoint of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerEndpoint {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl DockerEndpoint {
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// SSH target of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshTarget {
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for SshTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// A live node joined with its declared type's configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedNode {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub status: String,
    pub cluster: String,
    pub node_type: String,
    pub seq: u32,
    /// Whether the node's type is declared in the cluster design
    pub declared: bool,
    /// Images deployed on the node, empty for undeclared types
    pub images: Vec<String>,
    /// Absent until the node has an address
    pub docker: Option<DockerEndpoint>,
    pub ssh: Option<SshTarget>,
}

/// Correlates inventory listings with one cluster's design
#[derive(Debug, Clone)]
pub struct ClusterCorrelator<'a> {
    cluster: &'a str,
    node_types: &'a [NodeTypeSpec],
    docker: DockerClientConfig,
    ssh: SshConfig,
}

impl<'a> ClusterCorrelator<'a> {
    pub fn new(cluster: &'a str, node_types: &'a [NodeTypeSpec]) -> Self {
        Self {
            cluster,
            node_types,
            docker: DockerClientConfig::default(),
            ssh: SshConfig::default(),
        }
    }

    pub fn with_docker(mut self, docker: DockerClientConfig) -> Self {
        self.docker = docker;
        self
    }

    pub fn with_ssh(mut self, ssh: SshConfig) -> Self {
        self.ssh = ssh;
        self
    }

    pub fn cluster(&self) -> &str {
        self.cluster
    }

    /// Live nodes of this cluster, enriched, in inventory order
    pub fn nodes(&self, live_nodes: &[LiveNode]) -> Vec<EnrichedNode> {
        live_nodes
            .iter()
            .filter_map(|node| self.enrich(node))
            .collect()
    }

    fn enrich(&self, node: &LiveNode) -> Option<EnrichedNode> {
        let parsed = match NodeName::parse(&node.name) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Skipping server '{}': {}", node.name, e);
                return None;
            }
        };
        if parsed.cluster() != self.cluster {
            return None;
        }

        let spec = self.node_types.iter().find(|t| t.name == parsed.node_type());
        if spec.is_none() {
            warn!(
                "Node '{}' has type '{}' which is not declared for cluster '{}'",
                node.name,
                parsed.node_type(),
                self.cluster
            );
        }

        let docker = node.address.as_ref().map(|host| DockerEndpoint {
            protocol: self.docker.protocol.clone(),
            host: host.clone(),
            port: self.docker.port,
        });
        let ssh = node.address.as_ref().map(|host| SshTarget {
            user: self.ssh.user.clone(),
            host: host.clone(),
            port: self.ssh.port,
        });

        Some(EnrichedNode {
            id: node.id.clone(),
            name: node.name.clone(),
            address: node.address.clone(),
            status: node.status.clone(),
            cluster: parsed.cluster().to_string(),
            node_type: parsed.node_type().to_string(),
            seq: parsed.seq(),
            declared: spec.is_some(),
            images: spec.map(|s| s.images.clone()).unwrap_or_default(),
            docker,
            ssh,
        })
    }

    /// Live security groups of this cluster, in inventory order
    pub fn security_groups(&self, live_groups: &[LiveGroup]) -> Vec<LiveGroup> {
        correlate_security_groups(self.cluster, live_groups)
    }

    /// Volumes of the declared types whose node belongs to this cluster
    pub fn volumes(&self, live_volumes: &[LiveVolume], volume_types: &[String]) -> Vec<LiveVolume> {
        correlate_cluster_volumes(self.cluster, live_volumes, volume_types)
    }
}

/// Live nodes of `cluster`, enriched with their type's configuration
pub fn correlate_nodes(
    cluster: &str,
    live_nodes: &[LiveNode],
    node_types: &[NodeTypeSpec],
) -> Vec<EnrichedNode> {
    ClusterCorrelator::new(cluster, node_types).nodes(live_nodes)
}

/// Live security groups whose name places them in `cluster`
pub fn correlate_security_groups(cluster: &str, live_groups: &[LiveGroup]) -> Vec<LiveGroup> {
    live_groups
        .iter()
        .filter(|group| match SecurityGroupName::parse(&group.name) {
            Ok(parsed) => parsed.cluster() == cluster,
            Err(e) => {
                debug!("Skipping security group '{}': {}", group.name, e);
                false
            }
        })
        .cloned()
        .collect()
}

/// Live volumes whose type is one of `volume_types`, regardless of cluster
pub fn correlate_volumes(live_volumes: &[LiveVolume], volume_types: &[String]) -> Vec<LiveVolume> {
    live_volumes
        .iter()
        .filter(|volume| match VolumeName::parse(&volume.name) {
            Ok(parsed) => volume_types.iter().any(|t| t == parsed.volume_type()),
            Err(e) => {
                debug!("Skipping volume '{}': {}", volume.name, e);
                false
            }
        })
        .cloned()
        .collect()
}

/// Like [`correlate_volumes`], additionally requiring the volume's node to
/// belong to `cluster`
pub fn correlate_cluster_volumes(
    cluster: &str,
    live_volumes: &[LiveVolume],
    volume_types: &[String],
) -> Vec<LiveVolume> {
    correlate_volumes(live_volumes, volume_types)
        .into_iter()
        .filter(|volume| {
            VolumeName::parse(&volume.name)
                .and_then(|v| NodeName::parse(v.node_name()))
                .map(|node| node.cluster() == cluster)
                .unwrap_or(false)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_types() -> Vec<NodeTypeSpec> {
        vec![
            NodeTypeSpec::new("computing", 3).with_images(["apache"]),
            NodeTypeSpec::new("loadbalancer", 1).with_images(["apache", "consul"]),
        ]
    }

    #[test]
    fn test_correlate_filters_other_clusters() {
        let live = vec![
            LiveNode::new("1", "oa-1-computing", Some("10.0.0.1")),
            LiveNode::new("2", "ext-1-other", Some("10.0.0.9")),
        ];
        let nodes = correlate_nodes("oa", &live, &node_types());
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].name, "oa-1-computing");
        assert_eq!(nodes[0].images, vec!["apache"]);
        assert!(nodes[0].declared);
    }

    #[test]
    fn test_correlate_skips_unparsable_names() {
        let live = vec![
            LiveNode::new("1", "jumphost", None),
            LiveNode::new("2", "oa-1-computing-old", None),
            LiveNode::new("3", "oa-1-loadbalancer", Some("10.0.0.2")),
        ];
        let nodes = correlate_nodes("oa", &live, &node_types());
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].images, vec!["apache", "consul"]);
    }

    #[test]
    fn test_correlate_undeclared_type_degrades() {
        let live = vec![LiveNode::new("7", "oa-1-manual", Some("10.0.0.7"))];
        let nodes = correlate_nodes("oa", &live, &node_types());
        assert_eq!(nodes.len(), 1);
        assert!(!nodes[0].declared);
        assert!(nodes[0].images.is_empty());
        assert_eq!(nodes[0].node_type, "manual");
    }

    #[test]
    fn test_correlate_preserves_inventory_order_and_fields() {
        let mut second = LiveNode::new("b", "oa-1-computing", Some("10.0.0.1"));
        second.status = "BUILD".to_string();
        let live = vec![LiveNode::new("a", "oa-2-computing", Some("10.0.0.2")), second];
        let nodes = correlate_nodes("oa", &live, &node_types());
        assert_eq!(nodes[0].id, "a");
        assert_eq!(nodes[1].id, "b");
        assert_eq!(nodes[1].status, "BUILD");
        assert_eq!(nodes[1].seq, 1);
    }

    #[test]
    fn test_endpoints_follow_address() {
        let types = node_types();
        let correlator = ClusterCorrelator::new("oa", &types)
            .with_docker(DockerClientConfig {
                protocol: "https".to_string(),
                port: 2376,
            })
            .with_ssh(SshConfig {
                user: "core".to_string(),
                port: 2222,
            });
        let live = vec![
            LiveNode::new("1", "oa-1-computing", Some("10.0.0.1")),
            LiveNode::new("2", "oa-2-computing", None),
        ];
        let nodes = correlator.nodes(&live);
        assert_eq!(
            nodes[0].docker.as_ref().map(|d| d.url()),
            Some("https://10.0.0.1:2376".to_string())
        );
        assert_eq!(
            nodes[0].ssh.as_ref().map(|s| s.to_string()),
            Some("core@10.0.0.1:2222".to_string())
        );
        assert!(nodes[1].docker.is_none());
        assert!(nodes[1].ssh.is_none());
    }

    #[test]
    fn test_correlate_security_groups() {
        let live = vec![
            LiveGroup::new("1", "oa-consul"),
            LiveGroup::new("2", "default"),
            LiveGroup::new("3", "vh-http"),
            LiveGroup::new("4", "oa-http"),
        ];
        let names: Vec<String> = correlate_security_groups("oa", &live)
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["oa-consul", "oa-http"]);
    }

    #[test]
    fn test_correlate_volumes_by_type() {
        let live = vec![
            LiveVolume::new("1", "dbdata__oa-1-computing"),
            LiveVolume::new("2", "logs__oa-1-computing"),
            LiveVolume::new("3", "dbdata__vh-1-computing"),
            LiveVolume::new("4", "scratch"),
        ];
        let types = vec!["dbdata".to_string()];

        let unscoped = correlate_volumes(&live, &types);
        assert_eq!(unscoped.len(), 2);

        let scoped = correlate_cluster_volumes("oa", &live, &types);
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id, "1");
    }
}
