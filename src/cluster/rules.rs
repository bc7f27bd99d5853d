//! Security group rule resolution
//!
//! Rules are materialised in two phases:
//!
//! 1. [`resolve_rules`] expands every group's rule templates once node
//!    addresses are known. A static rule yields itself; a node-templated rule
//!    yields one rule per matching node address.
//! 2. [`bind_rules`] attaches the live id of each group, which only exists
//!    once the groups have been created.
//!
//! Resolution performs no diffing against rules that already exist in the
//! cloud: submitting the output twice creates every rule twice.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::correlator::EnrichedNode;
use super::fanout::FanoutItem;
use super::inventory::LiveGroup;
use super::naming::{security_group_name, NamingError};
use crate::config::{Direction, RuleFields, RuleTemplate, SecurityGroupSpec};

/// Where a concrete rule's remote address came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RuleOrigin {
    Static,
    Node { name: String },
}

/// A concrete rule, not yet bound to a group id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRule {
    pub direction: Direction,
    pub ethertype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_range_min: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_range_max: Option<u16>,
    pub remote_ip_prefix: String,
    pub origin: RuleOrigin,
}

impl ResolvedRule {
    fn from_fields(fields: &RuleFields, remote_ip_prefix: String, origin: RuleOrigin) -> Self {
        Self {
            direction: fields.direction,
            ethertype: fields.ethertype.clone(),
            protocol: fields.protocol.clone(),
            port_range_min: fields.port_range_min,
            port_range_max: fields.port_range_max,
            remote_ip_prefix,
            origin,
        }
    }
}

/// The resolved rules of one security group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRules {
    /// Cluster-scoped group name (e.g. "oa-http")
    pub group: String,
    pub plain_name: String,
    pub rules: Vec<ResolvedRule>,
}

/// Resolve every group's rules against the cluster's nodes.
///
/// Output follows group declaration order, then rule declaration order, then
/// node order. Nodes without an address are skipped.
pub fn resolve_rules(
    cluster: &str,
    groups: &[SecurityGroupSpec],
    nodes: &[EnrichedNode],
) -> Result<Vec<GroupRules>, NamingError> {
    let mut resolved = Vec::with_capacity(groups.len());

    for group in groups {
        let mut rules = Vec::new();

        for template in &group.rules {
            match template {
                RuleTemplate::Static(rule) => {
                    rules.push(ResolvedRule::from_fields(
                        &rule.fields,
                        rule.remote_ip_prefix.clone(),
                        RuleOrigin::Static,
                    ));
                }
                RuleTemplate::NodeTemplated(rule) => {
                    let before = rules.len();
                    for node in nodes
                        .iter()
                        .filter(|n| rule.remote_ip_node_types.contains(&n.node_type))
                    {
                        let Some(address) = &node.address else {
                            warn!(
                                "Node '{}' has no address yet, skipped in rules of '{}'",
                                node.name, group.name
                            );
                            continue;
                        };
                        rules.push(ResolvedRule::from_fields(
                            &rule.fields,
                            address.clone(),
                            RuleOrigin::Node {
                                name: node.name.clone(),
                            },
                        ));
                    }
                    if rules.len() == before {
                        debug!(
                            "No nodes of type(s) {:?} for a rule of '{}'",
                            rule.remote_ip_node_types, group.name
                        );
                    }
                }
            }
        }

        resolved.push(GroupRules {
            group: security_group_name(cluster, &group.name)?,
            plain_name: group.name.clone(),
            rules,
        });
    }

    Ok(resolved)
}

/// A rule ready to be submitted to the network API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupRule {
    pub security_group_id: String,
    pub security_group: String,
    #[serde(flatten)]
    pub rule: ResolvedRule,
}

impl FanoutItem for SecurityGroupRule {
    fn label(&self) -> String {
        format!(
            "{} {} {}",
            self.security_group,
            self.rule.protocol.as_deref().unwrap_or("any"),
            self.rule.remote_ip_prefix
        )
    }
}

/// Outcome of binding resolved rules to live groups
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundRules {
    pub rules: Vec<SecurityGroupRule>,
    /// Groups with rules but no live counterpart (not created yet)
    pub missing_groups: Vec<String>,
}

/// Attach live security group ids to resolved rules
pub fn bind_rules(resolved: &[GroupRules], live_groups: &[LiveGroup]) -> BoundRules {
    let mut bound = BoundRules::default();

    for group in resolved {
        let Some(live) = live_groups.iter().find(|g| g.name == group.group) else {
            if !group.rules.is_empty() {
                warn!(
                    "Security group '{}' does not exist, {} rule(s) not bound",
                    group.group,
                    group.rules.len()
                );
                bound.missing_groups.push(group.group.clone());
            }
            continue;
        };

        bound
            .rules
            .extend(group.rules.iter().map(|rule| SecurityGroupRule {
                security_group_id: live.id.clone(),
                security_group: group.group.clone(),
                rule: rule.clone(),
            }));
    }

    bound
}
