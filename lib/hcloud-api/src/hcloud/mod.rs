/// Typed handles of remote Hetzner Cloud resources
///
/// These are the controller's view of the networks, load balancers and
/// placement groups living in a Hetzner Cloud project, together with the
/// options used to create and filter them.

pub mod network;
pub mod load_balancer;
pub mod placement_group;

pub use network::{Network, NetworkCreateOpts, NetworkSubnet};
pub use load_balancer::{LoadBalancer, LoadBalancerCreateOpts, LoadBalancerUpdateOpts};
pub use placement_group::{PlacementGroup, PlacementGroupCreateOpts};

use std::collections::BTreeMap;

/// Label map carried by every Hetzner Cloud resource
pub type Labels = BTreeMap<String, String>;

/// Filter for list calls
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListOpts {
    /// Exact resource name
    pub name: Option<String>,
    /// Label selector, e.g. "key=owned"
    pub label_selector: Option<String>,
}

impl ListOpts {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            label_selector: None,
        }
    }

    pub fn by_label_selector(selector: impl Into<String>) -> Self {
        Self {
            name: None,
            label_selector: Some(selector.into()),
        }
    }

    /// Whether a resource with this name and labels passes the filter.
    ///
    /// Only equality selectors (`k=v`, comma separated) are understood.
    pub fn matches(&self, name: &str, labels: &Labels) -> bool {
        if let Some(wanted) = &self.name {
            if wanted != name {
                return false;
            }
        }
        match &self.label_selector {
            Some(selector) => selector
                .split(',')
                .filter(|term| !term.is_empty())
                .all(|term| match term.split_once('=') {
                    Some((k, v)) => labels.get(k.trim()).map(String::as_str) == Some(v.trim()),
                    None => labels.contains_key(term.trim()),
                }),
            None => true,
        }
    }
}
