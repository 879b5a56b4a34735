//! Ownership labels on remote resources
//!
//! A resource is owned by a cluster iff its labels contain
//! `{cluster_tag_key(cluster): "owned"}`. The key is derived from the
//! cluster's namespace and name only, so it is stable across spec edits.

use hcloud_api::hcloud::Labels;
use sha2::{Digest, Sha256};
use std::fmt;

/// Prefix shared by the ownership keys of all clusters
pub const CLUSTER_TAG_PREFIX: &str = "caph-cluster-";

/// Label value marking ownership
pub const OWNED_VALUE: &str = "owned";

/// Maximum length of a label key name accepted by Hetzner Cloud
const MAX_LABEL_KEY_LEN: usize = 63;

/// Namespace and name of a cluster object
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterIdentity {
    pub namespace: String,
    pub name: String,
}

impl ClusterIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Ownership label key of this cluster
    pub fn tag_key(&self) -> String {
        cluster_tag_key(self)
    }

    pub fn ownership(&self) -> ResourceOwnership {
        ResourceOwnership::for_cluster(self)
    }
}

impl fmt::Display for ClusterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Compute the ownership label key of a cluster.
///
/// Namespaces cannot contain dots, so `<namespace>.<name>` is unambiguous.
/// Keys that would exceed the label length limit fall back to a digest of
/// the identity; digests never contain a dot and cannot collide with the
/// readable form.
pub fn cluster_tag_key(cluster: &ClusterIdentity) -> String {
    let readable = format!("{}{}.{}", CLUSTER_TAG_PREFIX, cluster.namespace, cluster.name);
    if readable.len() <= MAX_LABEL_KEY_LEN {
        return readable;
    }

    let mut hasher = Sha256::new();
    hasher.update(cluster.namespace.as_bytes());
    hasher.update(b"/");
    hasher.update(cluster.name.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}{}", CLUSTER_TAG_PREFIX, &digest[..32])
}

/// Whether the labels mark the resource as owned by the cluster
pub fn is_owned_by(labels: &Labels, cluster: &ClusterIdentity) -> bool {
    ResourceOwnership::for_cluster(cluster).is_owned(labels)
}

/// Result of inspecting a resource's labels
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ownership {
    /// Carries this cluster's ownership label
    Owned,
    /// Carries another cluster's ownership label
    Foreign { owner_key: String },
    /// Carries no ownership label at all
    Absent,
}

impl Ownership {
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned)
    }
}

/// The `{key: "owned"}` label of one cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceOwnership {
    key: String,
    value: &'static str,
}

impl ResourceOwnership {
    pub fn for_cluster(cluster: &ClusterIdentity) -> Self {
        Self {
            key: cluster_tag_key(cluster),
            value: OWNED_VALUE,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        self.value
    }

    /// Classify a resource by its labels
    pub fn classify(&self, labels: &Labels) -> Ownership {
        if labels.get(&self.key).map(String::as_str) == Some(self.value) {
            return Ownership::Owned;
        }

        labels
            .iter()
            .find(|(k, v)| {
                k.starts_with(CLUSTER_TAG_PREFIX) && *k != &self.key && v.as_str() == OWNED_VALUE
            })
            .map(|(k, _)| Ownership::Foreign {
                owner_key: k.clone(),
            })
            .unwrap_or(Ownership::Absent)
    }

    pub fn is_owned(&self, labels: &Labels) -> bool {
        self.classify(labels).is_owned()
    }

    /// Labels to set on a resource created by this cluster
    pub fn labels(&self) -> Labels {
        let mut labels = Labels::new();
        labels.insert(self.key.clone(), self.value.to_string());
        labels
    }

    /// Existing labels with the ownership label added
    pub fn claim(&self, existing: &Labels) -> Labels {
        let mut labels = existing.clone();
        labels.insert(self.key.clone(), self.value.to_string());
        labels
    }

    /// Label selector matching every resource owned by this cluster
    pub fn label_selector(&self) -> String {
        format!("{}={}", self.key, self.value)
    }
}
