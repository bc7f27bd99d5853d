//! HTTP clients for the services a cluster run talks to

pub mod docker;
pub mod openstack;
pub mod probe;

pub use docker::DockerHttpClient;
pub use openstack::OpenStackInventory;
pub use probe::{check_body, endpoint_url, EndpointProbe, HttpProbe, ProbeError};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Parse(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}
