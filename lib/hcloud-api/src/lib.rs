//! Hetzner cluster API types for Kubernetes integration
//!
//! This library defines:
//! - HetznerCluster: the custom resource describing a cluster's shared
//!   Hetzner Cloud infrastructure (network, load balancer, placement groups)
//! - Typed handles and request options for the remote Hetzner Cloud
//!   resources the controller manages

pub mod v1beta1;
pub mod hcloud;

pub use v1beta1::{HetznerCluster, HetznerClusterSpec, HetznerClusterStatus};
