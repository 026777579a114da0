// Environment tiers and their database sizing profiles

use serde::Serialize;
use std::fmt;

use super::network::{SubnetKind, SubnetSelection};

/// Environment classification controlling sizing and redundancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    NonProduction,
    Production,
}

impl Tier {
    /// Environment tag that selects the production tier
    pub const PRODUCTION_TAG: &'static str = "prod";

    /// Map an environment tag to a tier
    ///
    /// Only the exact tag "prod" is production; every other tag
    /// (dev, staging, a typo) gets the non-production profile.
    pub fn from_env_tag(tag: &str) -> Self {
        if tag == Self::PRODUCTION_TAG {
            Tier::Production
        } else {
            Tier::NonProduction
        }
    }

    pub fn profile(self) -> &'static TierProfile {
        &PROFILES[self.index()]
    }

    const fn index(self) -> usize {
        match self {
            Tier::NonProduction => 0,
            Tier::Production => 1,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::NonProduction => write!(f, "non-production"),
            Tier::Production => write!(f, "production"),
        }
    }
}

/// The database parameters that differ between tiers
///
/// Changing instance class or storage on an existing stack can force the
/// instance to be replaced, so entries here must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierProfile {
    pub tier: Tier,
    pub instance_class: &'static str,
    pub allocated_storage_gb: u32,
    pub multi_az: bool,
    pub performance_insights: bool,
    pub subnets: SubnetSelection,
}

/// Sizing table, indexed by `Tier::index`
pub static PROFILES: [TierProfile; 2] = [
    TierProfile {
        tier: Tier::NonProduction,
        instance_class: "db.t3.micro",
        allocated_storage_gb: 20,
        multi_az: false,
        performance_insights: false,
        subnets: SubnetSelection {
            kind: SubnetKind::Isolated,
            one_per_az: false,
        },
    },
    TierProfile {
        tier: Tier::Production,
        instance_class: "db.r5.large",
        allocated_storage_gb: 100,
        multi_az: true,
        performance_insights: true,
        subnets: SubnetSelection {
            kind: SubnetKind::Isolated,
            one_per_az: true,
        },
    },
];
