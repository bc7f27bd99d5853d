//! Selection of the nodes and containers a task processes
//!
//! With no filter set everything is selected. Otherwise an item is selected
//! when any of the set filters matches it.

use serde::{Deserialize, Serialize};

use crate::config::NodeTypeSpec;

/// User-supplied filters, usually from the command line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub node_type: Option<String>,
    pub node_id: Option<String>,
    pub container_id: Option<String>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_container_id(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }

    fn id_matches(filter: &Option<String>, value: Option<&str>) -> bool {
        matches!((filter, value), (Some(f), Some(v)) if f == v)
    }

    /// Whether a node of `node_type` with id `node_id` is to be processed.
    ///
    /// A node-type filter only matches types declared in `node_types`.
    pub fn node_selected(
        &self,
        node_type: &str,
        node_id: Option<&str>,
        node_types: &[NodeTypeSpec],
    ) -> bool {
        if self.node_type.is_none() && self.node_id.is_none() {
            return true;
        }
        Self::id_matches(&self.node_id, node_id)
            || (self.node_type.as_deref() == Some(node_type)
                && node_types.iter().any(|t| t.name == node_type))
    }

    /// Whether a container running `image` on a node is to be processed.
    ///
    /// A node-type filter additionally requires the image to be one the
    /// type deploys.
    pub fn container_selected(
        &self,
        node_type: &str,
        node_id: Option<&str>,
        image: &str,
        container_id: Option<&str>,
        node_types: &[NodeTypeSpec],
    ) -> bool {
        if self.node_type.is_none() && self.node_id.is_none() && self.container_id.is_none() {
            return true;
        }
        Self::id_matches(&self.container_id, container_id)
            || Self::id_matches(&self.node_id, node_id)
            || (self.node_type.as_deref() == Some(node_type)
                && node_types
                    .iter()
                    .find(|t| t.name == node_type)
                    .is_some_and(|t| t.images.iter().any(|i| i == image)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_types() -> Vec<NodeTypeSpec> {
        vec![
            NodeTypeSpec::new("computing", 2).with_images(["apache"]),
            NodeTypeSpec::new("loadbalancer", 1).with_images(["apache", "consul"]),
        ]
    }

    #[test]
    fn test_no_filter_selects_everything() {
        let types = node_types();
        let selection = Selection::all();
        assert!(selection.node_selected("anything", None, &types));
        assert!(selection.container_selected("computing", Some("abc"), "redis", None, &types));
    }

    #[test]
    fn test_node_type_filter() {
        let types = node_types();
        let selection = Selection::all().with_node_type("computing");
        assert!(selection.node_selected("computing", Some("abc"), &types));
        assert!(!selection.node_selected("loadbalancer", Some("abc"), &types));

        // undeclared types never match
        let selection = Selection::all().with_node_type("manual");
        assert!(!selection.node_selected("manual", Some("abc"), &types));
    }

    #[test]
    fn test_node_id_filter() {
        let types = node_types();
        let selection = Selection::all().with_node_id("abc");
        assert!(selection.node_selected("computing", Some("abc"), &types));
        assert!(!selection.node_selected("computing", Some("def"), &types));
        assert!(!selection.node_selected("computing", None, &types));
    }

    #[test]
    fn test_container_node_type_requires_deployed_image() {
        let types = node_types();
        let selection = Selection::all().with_node_type("computing");
        assert!(selection.container_selected("computing", Some("abc"), "apache", None, &types));
        assert!(!selection.container_selected("computing", Some("abc"), "consul", None, &types));
        assert!(!selection.container_selected("loadbalancer", Some("abc"), "apache", None, &types));
    }

    #[test]
    fn test_container_id_filter() {
        let types = node_types();
        let selection = Selection::all().with_container_id("123");
        assert!(selection.container_selected("computing", Some("abc"), "apache", Some("123"), &types));
        assert!(!selection.container_selected("computing", Some("abc"), "apache", Some("456"), &types));
    }

    #[test]
    fn test_container_node_id_filter() {
        let types = node_types();
        let selection = Selection::all().with_node_id("abc").with_container_id("999");
        assert!(selection.container_selected("computing", Some("abc"), "apache", Some("123"), &types));
        assert!(!selection.container_selected("computing", Some("def"), "apache", Some("123"), &types));
    }
}
