//! Declarative cluster design types
//!
//! These are the building blocks of a cluster design file. Field names follow
//! the camelCase spelling of the design file; aliases accept the lowercase
//! spellings of older Gruntfile-style configurations (`nodetypes`,
//! `replication`, `securitygroups`, ...).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A class of cluster member, replicated `replication_count` times
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeSpec {
    /// Unique, separator-free type name (e.g. "computing")
    pub name: String,

    /// Number of nodes of this type; zero declares no nodes
    #[serde(alias = "replication", default)]
    pub replication_count: u32,

    /// Image used to boot the nodes
    #[serde(alias = "imageref", skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,

    /// Flavor (size) of the nodes
    #[serde(alias = "flavorref", skip_serializing_if = "Option::is_none")]
    pub flavor_ref: Option<String>,

    /// Plain names of the security groups attached to every node
    #[serde(alias = "securitygroups", default)]
    pub security_groups: Vec<String>,

    /// Volume types attached to every node
    #[serde(alias = "volumes", default)]
    pub volume_types: Vec<String>,

    /// Docker images deployed on every node, in deployment order
    #[serde(default)]
    pub images: Vec<String>,

    /// Smoke tests run against every node of this type
    #[serde(alias = "test", default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<EndpointTest>,
}

impl NodeTypeSpec {
    pub fn new(name: impl Into<String>, replication_count: u32) -> Self {
        Self {
            name: name.into(),
            replication_count,
            image_ref: None,
            flavor_ref: None,
            security_groups: Vec::new(),
            volume_types: Vec::new(),
            images: Vec::new(),
            tests: Vec::new(),
        }
    }

    pub fn with_images<I, S>(mut self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.images = images.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_security_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.security_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_volume_types<I, S>(mut self, volume_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.volume_types = volume_types.into_iter().map(Into::into).collect();
        self
    }
}

/// HTTP smoke test run against a node once its containers are up
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointTest {
    pub name: String,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    pub port: u16,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default)]
    pub query: BTreeMap<String, String>,

    /// Expected prefix of the response body
    #[serde(default)]
    pub should_start_with: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<BasicAuth>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BasicAuth {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

// ============================================================================
// Security groups
// ============================================================================

/// Traffic direction of a firewall rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Ingress,
    Egress,
}

/// Fields shared by every rule variant
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleFields {
    #[serde(default)]
    pub direction: Direction,

    #[serde(default = "default_ethertype")]
    pub ethertype: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_range_min: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_range_max: Option<u16>,
}

impl RuleFields {
    pub fn tcp(port_min: u16, port_max: u16) -> Self {
        Self {
            direction: Direction::Ingress,
            ethertype: default_ethertype(),
            protocol: Some("tcp".to_string()),
            port_range_min: Some(port_min),
            port_range_max: Some(port_max),
        }
    }
}

fn default_ethertype() -> String {
    "IPv4".to_string()
}

/// Rule with a literal remote CIDR
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticRule {
    #[serde(flatten)]
    pub fields: RuleFields,
    pub remote_ip_prefix: String,
}

/// Rule whose remote addresses are those of every node of the listed types
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTemplatedRule {
    #[serde(flatten)]
    pub fields: RuleFields,
    pub remote_ip_node_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RuleTemplate {
    Static(StaticRule),
    NodeTemplated(NodeTemplatedRule),
}

impl RuleTemplate {
    pub fn fields(&self) -> &RuleFields {
        match self {
            RuleTemplate::Static(r) => &r.fields,
            RuleTemplate::NodeTemplated(r) => &r.fields,
        }
    }
}

/// A security group template, instantiated once per cluster
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "SecurityGroupDefinition")]
pub struct SecurityGroupSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub rules: Vec<RuleTemplate>,
}

#[derive(Error, Debug, PartialEq)]
pub enum RuleDefinitionError {
    #[error("Rule #{index} of security group '{group}' has neither a remote prefix nor remote node types")]
    NoRemote { group: String, index: usize },
}

/// One or many strings, as written in the design file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// A rule as written in the design file: it may carry both a literal prefix
/// (or list of prefixes) and node types at once.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleDefinition {
    #[serde(flatten)]
    fields: RuleFields,

    #[serde(default)]
    remote_ip_prefix: Option<OneOrMany>,

    #[serde(
        default,
        alias = "remoteIpNodePrefixes",
        alias = "remoteIpPrefixTemplate"
    )]
    remote_ip_node_types: Option<OneOrMany>,
}

#[derive(Debug, Clone, Deserialize)]
struct SecurityGroupDefinition {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    rules: Vec<RuleDefinition>,
}

impl TryFrom<SecurityGroupDefinition> for SecurityGroupSpec {
    type Error = RuleDefinitionError;

    fn try_from(def: SecurityGroupDefinition) -> Result<Self, Self::Error> {
        let mut rules = Vec::new();
        for (index, rule) in def.rules.into_iter().enumerate() {
            if rule.remote_ip_prefix.is_none() && rule.remote_ip_node_types.is_none() {
                return Err(RuleDefinitionError::NoRemote {
                    group: def.name.clone(),
                    index,
                });
            }
            if let Some(prefixes) = rule.remote_ip_prefix {
                for prefix in prefixes.into_vec() {
                    rules.push(RuleTemplate::Static(StaticRule {
                        fields: rule.fields.clone(),
                        remote_ip_prefix: prefix,
                    }));
                }
            }
            if let Some(types) = rule.remote_ip_node_types {
                rules.push(RuleTemplate::NodeTemplated(NodeTemplatedRule {
                    fields: rule.fields.clone(),
                    remote_ip_node_types: types.into_vec(),
                }));
            }
        }

        Ok(SecurityGroupSpec {
            name: def.name,
            description: def.description,
            rules,
        })
    }
}

// ============================================================================
// Volumes
// ============================================================================

/// An external volume attached to every node of the types listing it
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeTypeSpec {
    pub name: String,

    #[serde(rename = "sizeGiB", alias = "size")]
    pub size_gib: u32,

    #[serde(default = "default_fstype")]
    pub fstype: String,

    pub mountpoint: String,

    #[serde(alias = "availability_zone", skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_fstype() -> String {
    "ext4".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_type_with_legacy_keys() {
        let json = r#"{
            "name": "computing",
            "replication": 3,
            "imageRef": "81f6b78f",
            "flavorRef": "885227de",
            "securitygroups": ["default", "dockerd"],
            "images": ["apache"],
            "volumes": ["dbdata"]
        }"#;

        let spec: NodeTypeSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.name, "computing");
        assert_eq!(spec.replication_count, 3);
        assert_eq!(spec.image_ref.as_deref(), Some("81f6b78f"));
        assert_eq!(spec.security_groups, vec!["default", "dockerd"]);
        assert_eq!(spec.volume_types, vec!["dbdata"]);
        assert!(spec.tests.is_empty());
    }

    #[test]
    fn test_parse_endpoint_test_defaults() {
        let json = r#"{
            "name": "GetCapabilities",
            "port": 80,
            "path": "/wfs",
            "query": {"request": "GetCapabilities", "service": "wfs"},
            "shouldStartWith": "<ows:"
        }"#;

        let test: EndpointTest = serde_json::from_str(json).unwrap();
        assert_eq!(test.protocol, "http");
        assert_eq!(test.query.len(), 2);
        assert_eq!(test.should_start_with, "<ows:");
        assert!(test.auth.is_none());
    }

    #[test]
    fn test_parse_static_rule() {
        let json = r#"{
            "name": "dockerd",
            "description": "Docker daemon port",
            "rules": [{
                "direction": "ingress",
                "ethertype": "IPv4",
                "protocol": "tcp",
                "portRangeMin": 2375,
                "portRangeMax": 2375,
                "remoteIpPrefix": "10.0.0.0/24"
            }]
        }"#;

        let group: SecurityGroupSpec = serde_json::from_str(json).unwrap();
        assert_eq!(group.rules.len(), 1);
        match &group.rules[0] {
            RuleTemplate::Static(rule) => {
                assert_eq!(rule.remote_ip_prefix, "10.0.0.0/24");
                assert_eq!(rule.fields.port_range_min, Some(2375));
            }
            other => panic!("Expected static rule, got {:?}", other),
        }
    }

    #[test]
    fn test_mixed_rule_splits_into_templates() {
        let json = r#"{
            "name": "http",
            "rules": [{
                "protocol": "tcp",
                "portRangeMin": 80,
                "portRangeMax": 81,
                "remoteIpPrefix": ["10.1.0.0/16", "10.2.0.0/16"],
                "remoteIpNodePrefixes": ["loadbalancer", "computing"]
            }]
        }"#;

        let group: SecurityGroupSpec = serde_json::from_str(json).unwrap();
        assert_eq!(group.rules.len(), 3);
        assert!(matches!(group.rules[0], RuleTemplate::Static(_)));
        assert!(matches!(group.rules[1], RuleTemplate::Static(_)));
        match &group.rules[2] {
            RuleTemplate::NodeTemplated(rule) => {
                assert_eq!(rule.remote_ip_node_types, vec!["loadbalancer", "computing"]);
                assert_eq!(rule.fields.direction, Direction::Ingress);
                assert_eq!(rule.fields.ethertype, "IPv4");
            }
            other => panic!("Expected templated rule, got {:?}", other),
        }
    }

    #[test]
    fn test_single_template_alias() {
        let json = r#"{
            "name": "consul",
            "rules": [{"protocol": "tcp", "remoteIpPrefixTemplate": "computing"}]
        }"#;

        let group: SecurityGroupSpec = serde_json::from_str(json).unwrap();
        match &group.rules[0] {
            RuleTemplate::NodeTemplated(rule) => {
                assert_eq!(rule.remote_ip_node_types, vec!["computing"]);
            }
            other => panic!("Expected templated rule, got {:?}", other),
        }
    }

    #[test]
    fn test_rule_without_remote_is_rejected() {
        let json = r#"{"name": "broken", "rules": [{"protocol": "tcp"}]}"#;
        let result: Result<SecurityGroupSpec, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_volume_type() {
        let json = r#"{
            "name": "dbdata",
            "size": 1,
            "availability_zone": "melbourne-qh2",
            "mountpoint": "/hostvolume"
        }"#;

        let volume: VolumeTypeSpec = serde_json::from_str(json).unwrap();
        assert_eq!(volume.size_gib, 1);
        assert_eq!(volume.fstype, "ext4");
        assert_eq!(volume.availability_zone.as_deref(), Some("melbourne-qh2"));
    }
}
