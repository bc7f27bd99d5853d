//! Docker remote API client: containers and image pulls

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::ClientError;
use crate::cluster::{ContainerClient, ContainerSummary, DockerEndpoint};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct CreatedContainer {
    #[serde(rename = "Id")]
    id: String,
}

/// The first `error` reported in a pull progress stream (one JSON object
/// per line), if any
pub fn pull_stream_error(body: &str) -> Option<String> {
    body.lines()
        .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .find_map(|event| {
            event
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
}

#[derive(Clone)]
pub struct DockerHttpClient {
    client: reqwest::Client,
}

impl DockerHttpClient {
    pub fn new() -> Result<Self, ClientError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))?;
        Ok(Self { client })
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let response = req
            .send()
            .await
            .map_err(|e| ClientError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: text,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ContainerClient for DockerHttpClient {
    async fn list_containers(
        &self,
        endpoint: &DockerEndpoint,
    ) -> Result<Vec<ContainerSummary>, ClientError> {
        let url = format!("{}/containers/json", endpoint.url());
        self.send(self.client.get(&url).query(&[("all", "1")]))
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    async fn pull_image(&self, endpoint: &DockerEndpoint, repo: &str) -> Result<(), ClientError> {
        let url = format!("{}/images/create", endpoint.url());
        let body = self
            .send(self.client.post(&url).query(&[("fromImage", repo)]))
            .await?
            .text()
            .await
            .map_err(|e| ClientError::Http(e.to_string()))?;

        // The daemon answers 200 and reports failures inside the stream
        match pull_stream_error(&body) {
            Some(message) => Err(ClientError::Api {
                status: 200,
                message,
            }),
            None => Ok(()),
        }
    }

    async fn run_container(
        &self,
        endpoint: &DockerEndpoint,
        request: &Value,
    ) -> Result<String, ClientError> {
        let url = format!("{}/containers/create", endpoint.url());
        let created: CreatedContainer = self
            .send(self.client.post(&url).json(request))
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;
        debug!("Created container {} on {}", created.id, endpoint.host);

        let url = format!("{}/containers/{}/start", endpoint.url(), created.id);
        self.send(self.client.post(&url)).await?;
        Ok(created.id)
    }

    async fn remove_container(
        &self,
        endpoint: &DockerEndpoint,
        id: &str,
    ) -> Result<(), ClientError> {
        let url = format!("{}/containers/{}/stop", endpoint.url(), id);
        match self.send(self.client.post(&url)).await {
            Ok(_) => {}
            // Already stopped
            Err(ClientError::Api { status: 304, .. }) => {}
            Err(e) => warn!("Could not stop container {} on {}: {}", id, endpoint.host, e),
        }

        let url = format!("{}/containers/{}", endpoint.url(), id);
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================

pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves canned listings keyed by endpoint host and records every
    /// pull, run and remove as `"<op> <host> <target>"`. Unknown hosts fail,
    /// as do targets registered with [`MockContainerClient::failing`].
    #[derive(Default)]
    pub struct MockContainerClient {
        listings: HashMap<String, Vec<ContainerSummary>>,
        failing: HashSet<String>,
        operations: Mutex<Vec<String>>,
        call_count: AtomicUsize,
    }

    impl MockContainerClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_host(mut self, host: &str, containers: Vec<ContainerSummary>) -> Self {
            self.listings.insert(host.to_string(), containers);
            self
        }

        /// Make operations on a container id or image reference fail
        pub fn failing(mut self, target: &str) -> Self {
            self.failing.insert(target.to_string());
            self
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn operations(&self) -> Vec<String> {
            self.operations
                .lock()
                .map(|ops| ops.clone())
                .unwrap_or_default()
        }

        fn record(&self, op: &str, endpoint: &DockerEndpoint, target: &str) -> Result<(), ClientError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if !self.listings.contains_key(&endpoint.host) {
                return Err(ClientError::Http(format!(
                    "connection refused: {}",
                    endpoint.url()
                )));
            }
            if self.failing.contains(target) {
                return Err(ClientError::Api {
                    status: 500,
                    message: format!("{} {} failed", op, target),
                });
            }
            if let Ok(mut ops) = self.operations.lock() {
                ops.push(format!("{} {} {}", op, endpoint.host, target));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ContainerClient for MockContainerClient {
        async fn list_containers(
            &self,
            endpoint: &DockerEndpoint,
        ) -> Result<Vec<ContainerSummary>, ClientError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.listings
                .get(&endpoint.host)
                .cloned()
                .ok_or_else(|| ClientError::Http(format!("connection refused: {}", endpoint.url())))
        }

        async fn pull_image(
            &self,
            endpoint: &DockerEndpoint,
            repo: &str,
        ) -> Result<(), ClientError> {
            self.record("pull", endpoint, repo)
        }

        async fn run_container(
            &self,
            endpoint: &DockerEndpoint,
            request: &Value,
        ) -> Result<String, ClientError> {
            let image = request.get("Image").and_then(Value::as_str).unwrap_or_default();
            self.record("run", endpoint, image)?;
            Ok(format!("{}-{}", endpoint.host, image))
        }

        async fn remove_container(
            &self,
            endpoint: &DockerEndpoint,
            id: &str,
        ) -> Result<(), ClientError> {
            self.record("remove", endpoint, id)
        }
    }
}
