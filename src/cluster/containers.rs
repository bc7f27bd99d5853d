//! Docker containers running on cluster nodes

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::correlator::{DockerEndpoint, EnrichedNode};
use super::fanout::FanoutItem;
use super::selection::Selection;
use crate::client::ClientError;
use crate::config::NodeTypeSpec;

/// A container as listed by the Docker remote API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "Names", default)]
    pub names: Vec<String>,

    #[serde(rename = "Image", default)]
    pub image: String,

    #[serde(rename = "State", default)]
    pub state: String,

    #[serde(rename = "Status", default)]
    pub status: String,
}

impl ContainerSummary {
    pub fn new(id: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            names: Vec::new(),
            image: image.into(),
            state: "running".to_string(),
            status: String::new(),
        }
    }

    /// Image name without registry and tag ("registry:5000/apache:2.4" -> "apache")
    pub fn image_name(&self) -> &str {
        let without_registry = self.image.rsplit('/').next().unwrap_or(&self.image);
        without_registry
            .split(':')
            .next()
            .unwrap_or(without_registry)
    }
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

#[async_trait]
pub trait ContainerClient: Send + Sync {
    /// All containers on the endpoint, stopped ones included
    async fn list_containers(
        &self,
        endpoint: &DockerEndpoint,
    ) -> Result<Vec<ContainerSummary>, ClientError>;

    /// Pull `repo` (`registry/name:tag`) onto the endpoint
    async fn pull_image(&self, endpoint: &DockerEndpoint, repo: &str) -> Result<(), ClientError>;

    /// Create a container from a creation request and start it; returns its id
    async fn run_container(
        &self,
        endpoint: &DockerEndpoint,
        request: &Value,
    ) -> Result<String, ClientError>;

    /// Stop the container if running, then remove it
    async fn remove_container(&self, endpoint: &DockerEndpoint, id: &str)
        -> Result<(), ClientError>;
}

/// One container on one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerWork {
    pub node: EnrichedNode,
    pub container: ContainerSummary,
}

impl FanoutItem for ContainerWork {
    fn label(&self) -> String {
        let short: String = self.container.id.chars().take(12).collect();
        format!("{}@{}", short, self.node.name)
    }
}

/// Pair a node with its containers, keeping those the selection admits
pub fn container_work(
    node: &EnrichedNode,
    containers: Vec<ContainerSummary>,
    selection: &Selection,
    node_types: &[NodeTypeSpec],
) -> Vec<ContainerWork> {
    containers
        .into_iter()
        .filter(|c| {
            selection.container_selected(
                &node.node_type,
                Some(&node.id),
                c.image_name(),
                Some(&c.id),
                node_types,
            )
        })
        .map(|container| ContainerWork {
            node: node.clone(),
            container,
        })
        .collect()
}
