use super::Labels;

/// A placement group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacementGroup {
    pub id: i64,
    pub name: String,
    /// Group type, e.g. "spread"
    pub type_: String,
    pub labels: Labels,
    /// Servers currently in the group
    pub servers: Vec<i64>,
}

/// Options for creating a placement group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacementGroupCreateOpts {
    pub name: String,
    pub type_: String,
    pub labels: Labels,
}
