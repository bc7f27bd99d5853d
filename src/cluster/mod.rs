//! # Cluster topology resolution
//!
//! A cluster is declared as node types (replicated N times), security groups
//! with rule templates, and volume types. This module turns that design into
//! concrete entities and reconciles them with what the cloud reports.
//!
//! ## Flow
//!
//! ```text
//!   ClusterConfig ──► topology::expand_* ──► declared nodes/groups/volumes
//!                                                │
//!   InventoryClient ──► live nodes/groups ──► correlator ──► EnrichedNode
//!                                                │
//!                       rules::resolve_rules ◄───┤
//!                                                ▼
//!                                  FanoutIterator (one item at a time)
//! ```
//!
//! ## Naming
//!
//! - Node: `cluster-seq-type` (e.g. `oa-1-computing`)
//! - Security group: `cluster-group` (e.g. `oa-http`)
//! - Volume: `type__node` (e.g. `dbdata__oa-1-computing`)

pub mod containers;
pub mod correlator;
pub mod fanout;
pub mod images;
pub mod inventory;
pub mod naming;
pub mod rules;
pub mod selection;
pub mod topology;

pub use containers::{container_work, ContainerClient, ContainerSummary, ContainerWork};
pub use correlator::{
    correlate_cluster_volumes, correlate_nodes, correlate_security_groups, correlate_volumes,
    ClusterCorrelator, DockerEndpoint, EnrichedNode, SshTarget,
};
pub use fanout::{
    ErrorPolicy, FanoutError, FanoutItem, FanoutIterator, FanoutReport, ItemRecord, ItemState,
    NestedReport,
};
pub use images::{
    create_request, expand_image_work, extra_hosts, qualified_image_name, ImageWork,
};
pub use inventory::{
    InventoryClient, InventoryError, LiveGroup, LiveNode, LiveVolume, StaticInventory,
};
pub use naming::{
    node_cluster, node_name, node_name_from_volume_name, node_type, security_group_cluster,
    security_group_name, security_group_plain_name, volume_name, volume_type_from_volume_name,
    NamingError, NodeName, SecurityGroupName, VolumeName, SEP, VOLUME_SEP,
};
pub use rules::{
    bind_rules, resolve_rules, BoundRules, GroupRules, ResolvedRule, RuleOrigin,
    SecurityGroupRule,
};
pub use selection::Selection;
pub use topology::{
    expand_nodes, expand_security_group_names, expand_security_groups_as_cloud_refs,
    expand_volumes, DeclaredNode, DeclaredVolume, SecurityGroupRef,
};
