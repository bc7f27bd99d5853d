//! HTTP smoke tests against deployed endpoints

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use thiserror::Error;

use super::ClientError;
use crate::config::{BasicAuth, EndpointTest};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("Invalid endpoint URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Request to {url} failed: {source}")]
    Request { url: String, source: ClientError },

    #[error("Unexpected response from {url}: expected prefix '{expected}', got '{got}'")]
    UnexpectedBody {
        url: String,
        expected: String,
        got: String,
    },
}

// ============================================================================
// SBIO: Pure functions (no I/O)
// ============================================================================

/// `protocol://address:port/path?query` for a test against one node.
/// The query is form-encoded and a default port is normalised away.
pub fn endpoint_url(test: &EndpointTest, address: &str) -> Result<Url, ProbeError> {
    let path = if test.path.starts_with('/') {
        test.path.clone()
    } else {
        format!("/{}", test.path)
    };
    let base = format!("{}://{}:{}{}", test.protocol, address, test.port, path);
    let parsed = if test.query.is_empty() {
        Url::parse(&base)
    } else {
        Url::parse_with_params(&base, &test.query)
    };
    parsed.map_err(|e| ProbeError::InvalidUrl {
        url: base,
        message: e.to_string(),
    })
}

/// Check a response body against the test's expected prefix
pub fn check_body(test: &EndpointTest, url: &str, body: &str) -> Result<(), ProbeError> {
    if body.starts_with(&test.should_start_with) {
        Ok(())
    } else {
        Err(ProbeError::UnexpectedBody {
            url: url.to_string(),
            expected: test.should_start_with.clone(),
            got: body.chars().take(80).collect(),
        })
    }
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

#[async_trait]
pub trait EndpointProbe: Send + Sync {
    /// GET `url` and return the body
    async fn fetch(&self, url: &Url, auth: Option<&BasicAuth>) -> Result<String, ClientError>;

    /// Run one smoke test against a node address
    async fn run_test(&self, test: &EndpointTest, address: &str) -> Result<(), ProbeError> {
        let url = endpoint_url(test, address)?;
        let body = self
            .fetch(&url, test.auth.as_ref())
            .await
            .map_err(|source| ProbeError::Request {
                url: url.to_string(),
                source,
            })?;
        check_body(test, url.as_str(), &body)
    }
}

// ============================================================================
// SBIO: I/O implementation (real HTTP client)
// ============================================================================

#[derive(Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EndpointProbe for HttpProbe {
    async fn fetch(&self, url: &Url, auth: Option<&BasicAuth>) -> Result<String, ClientError> {
        let mut req = self.client.get(url.clone());
        if let Some(auth) = auth {
            req = req.basic_auth(&auth.username, auth.password.as_ref());
        }

        let response = req.send().await.map_err(|e| ClientError::Http(e.to_string()))?;

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

        response.text().await.map_err(|e| ClientError::Http(e.to_string()))
    }
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================

pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned bodies keyed by URL; unknown URLs fail
    #[derive(Default)]
    pub struct MockProbe {
        bodies: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    impl MockProbe {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_body(mut self, url: &str, body: &str) -> Self {
            self.bodies.insert(url.to_string(), body.to_string());
            self
        }

        pub fn requested(&self) -> Vec<String> {
            self.requested
                .lock()
                .map(|r| r.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl EndpointProbe for MockProbe {
        async fn fetch(&self, url: &Url, _auth: Option<&BasicAuth>) -> Result<String, ClientError> {
            if let Ok(mut requested) = self.requested.lock() {
                requested.push(url.to_string());
            }
            self.bodies
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| ClientError::Http(format!("connection refused: {}", url)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockProbe;
    use super::*;
    use std::collections::BTreeMap;

    fn test_case() -> EndpointTest {
        EndpointTest {
            name: "status".to_string(),
            protocol: "http".to_string(),
            port: 8080,
            path: "status".to_string(),
            query: BTreeMap::from([
                ("format".to_string(), "json".to_string()),
                ("q".to_string(), "a b".to_string()),
            ]),
            should_start_with: "{\"ok\"".to_string(),
            auth: None,
        }
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url(&test_case(), "10.0.0.1").unwrap().as_str(),
            "http://10.0.0.1:8080/status?format=json&q=a+b"
        );

        let mut bare = test_case();
        bare.query.clear();
        bare.path = "/".to_string();
        assert_eq!(
            endpoint_url(&bare, "10.0.0.1").unwrap().as_str(),
            "http://10.0.0.1:8080/"
        );

        bare.port = 80;
        assert_eq!(
            endpoint_url(&bare, "10.0.0.1").unwrap().as_str(),
            "http://10.0.0.1/"
        );
    }

    #[test]
    fn test_endpoint_url_encodes_reserved_characters() {
        let mut test = test_case();
        test.query = BTreeMap::from([("next".to_string(), "/a&b=c".to_string())]);
        let url = endpoint_url(&test, "10.0.0.1").unwrap();

        assert_eq!(url.query(), Some("next=%2Fa%26b%3Dc"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("next".to_string(), "/a&b=c".to_string())]);
    }

    #[test]
    fn test_endpoint_url_rejects_bad_address() {
        assert!(matches!(
            endpoint_url(&test_case(), "not a host"),
            Err(ProbeError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_check_body() {
        let test = test_case();
        assert!(check_body(&test, "u", "{\"ok\": true}").is_ok());
        assert!(matches!(
            check_body(&test, "u", "<html>error</html>"),
            Err(ProbeError::UnexpectedBody { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_test_with_mock() {
        let url = "http://10.0.0.1:8080/status?format=json&q=a+b";
        let probe = MockProbe::new().with_body(url, "{\"ok\": true}");

        assert!(probe.run_test(&test_case(), "10.0.0.1").await.is_ok());
        assert!(matches!(
            probe.run_test(&test_case(), "10.0.0.2").await,
            Err(ProbeError::Request { .. })
        ));
        assert_eq!(probe.requested().len(), 2);
    }
}
