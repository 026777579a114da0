// Network placement handed to the database declarator

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetKind {
    Public,
    Private,
    Isolated,
}

impl fmt::Display for SubnetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubnetKind::Public => write!(f, "public"),
            SubnetKind::Private => write!(f, "private"),
            SubnetKind::Isolated => write!(f, "isolated"),
        }
    }
}

fn default_subnet_kind() -> SubnetKind {
    SubnetKind::Isolated
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub availability_zone: String,
    #[serde(default = "default_subnet_kind")]
    pub kind: SubnetKind,
}

/// An existing VPC and its subnets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPlacement {
    pub vpc_id: String,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubnetSelection {
    pub kind: SubnetKind,
    /// Keep only the first matching subnet in each availability zone
    pub one_per_az: bool,
}

impl NetworkPlacement {
    /// Subnets matching `selection`, in declaration order
    pub fn select(&self, selection: &SubnetSelection) -> Vec<&Subnet> {
        let mut seen_zones = HashSet::new();
        self.subnets
            .iter()
            .filter(|subnet| subnet.kind == selection.kind)
            .filter(|subnet| {
                !selection.one_per_az || seen_zones.insert(subnet.availability_zone.as_str())
            })
            .collect()
    }
}
