//! Live cloud inventory
//!
//! The inventory is the source of truth for which servers, security groups
//! and volumes exist. This module only defines the read interface and an
//! in-memory implementation; the OpenStack REST client lives in
//! `client::openstack`.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by an inventory backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InventoryError {
    #[error("Inventory unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to decode inventory response: {0}")]
    Decode(String),
}

/// A server as reported by the cloud
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveNode {
    /// Cloud-assigned id, stable for the node's lifetime
    pub id: String,
    pub name: String,
    /// First address on the public network, if one has been assigned yet
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub status: String,
}

impl LiveNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, address: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.map(String::from),
            status: "ACTIVE".to_string(),
        }
    }
}

/// A security group as reported by the cloud
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl LiveGroup {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
        }
    }
}

/// A block storage volume as reported by the cloud
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveVolume {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size_gib: u32,
    #[serde(default)]
    pub status: String,
    /// Ids of the servers the volume is attached to
    #[serde(default)]
    pub attached_to: Vec<String>,
}

impl LiveVolume {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size_gib: 0,
            status: "available".to_string(),
            attached_to: Vec::new(),
        }
    }
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

/// Read side of the cloud inventory.
///
/// An empty tenancy yields empty lists; only transport failures are errors.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<LiveNode>, InventoryError>;

    async fn list_security_groups(&self) -> Result<Vec<LiveGroup>, InventoryError>;

    async fn list_volumes(&self) -> Result<Vec<LiveVolume>, InventoryError>;
}

// ============================================================================
// In-memory implementation (snapshots and tests)
// ============================================================================

/// Inventory held in memory, optionally loaded from a JSON snapshot
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StaticInventory {
    #[serde(default)]
    pub nodes: Vec<LiveNode>,

    #[serde(default, alias = "securityGroups")]
    pub security_groups: Vec<LiveGroup>,

    #[serde(default)]
    pub volumes: Vec<LiveVolume>,

    /// When set, every call fails as if the cloud were unreachable
    #[serde(skip)]
    unavailable: Option<String>,

    #[serde(skip)]
    calls: AtomicUsize,
}

impl StaticInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(mut self, nodes: Vec<LiveNode>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_security_groups(mut self, groups: Vec<LiveGroup>) -> Self {
        self.security_groups = groups;
        self
    }

    pub fn with_volumes(mut self, volumes: Vec<LiveVolume>) -> Self {
        self.volumes = volumes;
        self
    }

    /// An inventory whose every call fails with `Unavailable`
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            unavailable: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Parse a snapshot (`{"nodes": [...], "securityGroups": [...], "volumes": [...]}`)
    pub fn from_json(content: &str) -> Result<Self, InventoryError> {
        serde_json::from_str(content).map_err(|e| InventoryError::Decode(e.to_string()))
    }

    pub fn from_snapshot_file(path: &Path) -> Result<Self, InventoryError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            InventoryError::Unavailable(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Number of list calls served so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn serve<T: Clone>(&self, items: &[T]) -> Result<Vec<T>, InventoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.unavailable {
            Some(reason) => Err(InventoryError::Unavailable(reason.clone())),
            None => Ok(items.to_vec()),
        }
    }
}

#[async_trait]
impl InventoryClient for StaticInventory {
    async fn list_nodes(&self) -> Result<Vec<LiveNode>, InventoryError> {
        self.serve(&self.nodes)
    }

    async fn list_security_groups(&self) -> Result<Vec<LiveGroup>, InventoryError> {
        self.serve(&self.security_groups)
    }

    async fn list_volumes(&self) -> Result<Vec<LiveVolume>, InventoryError> {
        self.serve(&self.volumes)
    }
}
