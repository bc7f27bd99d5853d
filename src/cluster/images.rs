//! Per-node Docker image work and related node-derived lists

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::correlator::EnrichedNode;
use super::fanout::FanoutItem;
use crate::config::ImageDefinition;

/// `registry/image:version`, each optional part omitted when absent
pub fn qualified_image_name(image: &str, registry: Option<&str>, version: Option<&str>) -> String {
    let mut name = String::new();
    if let Some(registry) = registry.filter(|r| !r.is_empty()) {
        name.push_str(registry);
        name.push('/');
    }
    name.push_str(image);
    if let Some(version) = version.filter(|v| !v.is_empty()) {
        name.push(':');
        name.push_str(version);
    }
    name
}

/// One image to be handled on one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageWork {
    pub node: EnrichedNode,
    /// Catalogue name of the image
    pub image: String,
    /// Fully qualified repository reference to pull
    pub repo: String,
    /// Container creation fields from the catalogue
    #[serde(default)]
    pub create: Map<String, Value>,
}

impl FanoutItem for ImageWork {
    fn label(&self) -> String {
        format!("{}@{}", self.image, self.node.name)
    }
}

/// Expand nodes into image work items, in node order then deployed-image
/// order. Images absent from the catalogue are skipped.
pub fn expand_image_work(
    nodes: &[EnrichedNode],
    catalogue: &HashMap<String, ImageDefinition>,
    registry: Option<&str>,
) -> Vec<ImageWork> {
    let mut work = Vec::new();

    for node in nodes {
        for image in &node.images {
            let Some(definition) = catalogue.get(image) else {
                warn!(
                    "Image '{}' of node '{}' is not in the image catalogue, skipped",
                    image, node.name
                );
                continue;
            };
            work.push(ImageWork {
                node: node.clone(),
                image: image.clone(),
                repo: qualified_image_name(&definition.repo, registry, definition.tag.as_deref()),
                create: definition
                    .run
                    .as_ref()
                    .map(|run| run.create.clone())
                    .unwrap_or_default(),
            });
        }
    }

    work
}

/// Body of the container creation request for one image work item: the
/// catalogue fields with `Image` set to the qualified reference and the
/// cluster's host entries added to `HostConfig.ExtraHosts`.
pub fn create_request(work: &ImageWork, hosts: &[String]) -> Value {
    let mut body = work.create.clone();
    body.insert("Image".to_string(), Value::String(work.repo.clone()));

    let host_config = body
        .entry("HostConfig")
        .or_insert_with(|| Value::Object(Map::new()));
    if !host_config.is_object() {
        *host_config = Value::Object(Map::new());
    }
    if let Value::Object(host_config) = host_config {
        host_config.insert(
            "ExtraHosts".to_string(),
            Value::Array(hosts.iter().cloned().map(Value::String).collect()),
        );
    }

    Value::Object(body)
}

/// `name:address` host entries for every node with an address
pub fn extra_hosts(nodes: &[EnrichedNode]) -> Vec<String> {
    nodes
        .iter()
        .filter_map(|node| {
            node.address
                .as_ref()
                .map(|address| format!("{}:{}", node.name, address))
        })
        .collect()
}
