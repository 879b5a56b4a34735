//! Production adapters for the reconciliation core
//!
//! - [`HCloudRestClient`]: the Hetzner Cloud REST API
//! - [`KubeClusterStore`]: HetznerCluster objects in the Kubernetes API
//! - [`KubeSecretCredentials`]: API tokens stored in Kubernetes secrets

pub mod error;
pub mod wire;
pub mod rest;
pub mod store;
pub mod credentials;

pub use credentials::KubeSecretCredentials;
pub use error::{ClientError, Result};
pub use rest::{HCloudRestClient, RestClientFactory, DEFAULT_ENDPOINT};
pub use store::KubeClusterStore;
