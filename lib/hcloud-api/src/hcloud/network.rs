use super::Labels;

/// A private network
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Network {
    pub id: i64,
    pub name: String,
    pub ip_range: String,
    pub labels: Labels,
}

/// Subnet created together with a network
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkSubnet {
    pub ip_range: String,
    pub network_zone: String,
}

/// Options for creating a network
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkCreateOpts {
    pub name: String,
    pub ip_range: String,
    pub subnets: Vec<NetworkSubnet>,
    pub labels: Labels,
}
