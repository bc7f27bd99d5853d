//! OpenStack inventory over the Nova, Neutron and Cinder REST APIs
//!
//! Only listing is implemented. Authentication is out of scope: a token
//! issued beforehand is sent as `X-Auth-Token`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::cluster::{InventoryClient, InventoryError, LiveGroup, LiveNode, LiveVolume};
use crate::config::OpenStackEndpoints;

// ============================================================================
// Wire formats (pure, no I/O)
// ============================================================================

#[derive(Debug, Deserialize)]
struct ServersResponse {
    servers: Vec<Server>,
}

#[derive(Debug, Deserialize)]
struct Server {
    id: String,
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    addresses: HashMap<String, Vec<ServerAddress>>,
}

#[derive(Debug, Deserialize)]
struct ServerAddress {
    addr: String,
}

#[derive(Debug, Deserialize)]
struct SecurityGroupsResponse {
    security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Deserialize)]
struct SecurityGroup {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    volumes: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size: u32,
    #[serde(default)]
    status: String,
    #[serde(default)]
    attachments: Vec<VolumeAttachment>,
}

#[derive(Debug, Deserialize)]
struct VolumeAttachment {
    server_id: String,
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, InventoryError> {
    serde_json::from_str(body).map_err(|e| InventoryError::Decode(e.to_string()))
}

/// Decode `GET /servers/detail`, taking each server's first address on `network`
pub fn decode_servers(body: &str, network: &str) -> Result<Vec<LiveNode>, InventoryError> {
    let response: ServersResponse = decode(body)?;
    Ok(response
        .servers
        .into_iter()
        .map(|server| LiveNode {
            address: server
                .addresses
                .get(network)
                .and_then(|addresses| addresses.first())
                .map(|a| a.addr.clone()),
            id: server.id,
            name: server.name,
            status: server.status,
        })
        .collect())
}

/// Decode `GET /v2.0/security-groups`
pub fn decode_security_groups(body: &str) -> Result<Vec<LiveGroup>, InventoryError> {
    let response: SecurityGroupsResponse = decode(body)?;
    Ok(response
        .security_groups
        .into_iter()
        .map(|group| LiveGroup {
            id: group.id,
            name: group.name,
            description: group.description.unwrap_or_default(),
        })
        .collect())
}

/// Decode `GET /volumes/detail`; unnamed volumes get an empty name
pub fn decode_volumes(body: &str) -> Result<Vec<LiveVolume>, InventoryError> {
    let response: VolumesResponse = decode(body)?;
    Ok(response
        .volumes
        .into_iter()
        .map(|volume| LiveVolume {
            id: volume.id,
            name: volume.name.unwrap_or_default(),
            size_gib: volume.size,
            status: volume.status,
            attached_to: volume.attachments.into_iter().map(|a| a.server_id).collect(),
        })
        .collect())
}

// ============================================================================
// SBIO: I/O implementation (real HTTP client)
// ============================================================================

#[derive(Clone)]
pub struct OpenStackInventory {
    client: reqwest::Client,
    endpoints: OpenStackEndpoints,
}

impl OpenStackInventory {
    pub fn new(endpoints: OpenStackEndpoints) -> Result<Self, InventoryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(endpoints.timeout_secs))
            .build()
            .map_err(|e| InventoryError::Unavailable(e.to_string()))?;
        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &OpenStackEndpoints {
        &self.endpoints
    }

    async fn get(&self, base: &str, path: &str) -> Result<String, InventoryError> {
        let url = format!("{}{}", base.trim_end_matches('/'), path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("X-Auth-Token", &self.endpoints.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| InventoryError::Unavailable(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InventoryError::Unavailable(format!(
                "{} returned {}",
                url, status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| InventoryError::Unavailable(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl InventoryClient for OpenStackInventory {
    async fn list_nodes(&self) -> Result<Vec<LiveNode>, InventoryError> {
        let body = self.get(&self.endpoints.compute_url, "/servers/detail").await?;
        decode_servers(&body, &self.endpoints.network)
    }

    async fn list_security_groups(&self) -> Result<Vec<LiveGroup>, InventoryError> {
        let body = self
            .get(&self.endpoints.network_url, "/v2.0/security-groups")
            .await?;
        decode_security_groups(&body)
    }

    async fn list_volumes(&self) -> Result<Vec<LiveVolume>, InventoryError> {
        let body = self.get(&self.endpoints.volume_url, "/volumes/detail").await?;
        decode_volumes(&body)
    }
}
