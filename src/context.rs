// Synthesis context (account, region, app name, environment tag)

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::constructs::tier::Tier;

/// Values every declarator reads while assembling a stack.
///
/// Passed explicitly into each declarator; nothing reads it from global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// AWS account id (e.g., "123456789012")
    pub account: String,
    /// AWS region (e.g., "eu-west-1")
    pub region: String,
    /// Application name, also used as the database instance identifier
    pub app_name: String,
    /// Environment tag (e.g., "dev", "prod"); selects the tier
    pub env: String,
}

impl Context {
    pub fn new(
        account: impl Into<String>,
        region: impl Into<String>,
        app_name: impl Into<String>,
        env: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
            app_name: app_name.into(),
            env: env.into(),
        }
    }

    pub fn tier(&self) -> Tier {
        Tier::from_env_tag(&self.env)
    }

    /// Build a construct identifier scoped to this app and environment
    ///
    /// # Example
    /// With app_name = "orders" and env = "dev":
    /// `cid("Repository-api")` returns "orders-dev-Repository-api"
    pub fn cid(&self, name: &str) -> String {
        format!("{}-{}-{}", self.app_name, self.env, name)
    }

    /// Build a CloudFormation logical id from a construct path
    ///
    /// Logical ids must be alphanumeric, so every component is stripped of
    /// other characters and the result is suffixed with the first 8 hex
    /// digits of the SHA-256 of the full path. Two paths that strip to the
    /// same text still get distinct ids.
    pub fn logical_id(&self, path: &[&str]) -> String {
        let human: String = path
            .iter()
            .flat_map(|component| component.chars())
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        let digest = Sha256::digest(path.join("/").as_bytes());
        let suffix: String = digest
            .iter()
            .take(4)
            .map(|byte| format!("{:02X}", byte))
            .collect();

        format!("{}{}", human, suffix)
    }

    /// Registry host for this account and region
    pub fn registry_domain(&self) -> String {
        format!("{}.dkr.ecr.{}.amazonaws.com", self.account, self.region)
    }

    /// Tags applied to every taggable resource
    pub fn tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("app".to_string(), self.app_name.clone()),
            ("env".to_string(), self.env.clone()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::new("123456789012", "eu-west-1", "orders", "dev")
    }

    #[test]
    fn test_cid_is_scoped_to_app_and_env() {
        assert_eq!(ctx().cid("Repository-api"), "orders-dev-Repository-api");
    }

    #[test]
    fn test_logical_id_is_alphanumeric_and_deterministic() {
        let a = ctx().logical_id(&["Pipeline", "orders-dev-CodebuildProject-api"]);
        let b = ctx().logical_id(&["Pipeline", "orders-dev-CodebuildProject-api"]);

        assert_eq!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(a.starts_with("PipelineordersdevCodebuildProjectapi"));
        assert_eq!(a.len(), "PipelineordersdevCodebuildProjectapi".len() + 8);
    }

    #[test]
    fn test_logical_id_distinguishes_paths_that_strip_alike() {
        let a = ctx().logical_id(&["a-b"]);
        let b = ctx().logical_id(&["ab"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_registry_domain() {
        assert_eq!(
            ctx().registry_domain(),
            "123456789012.dkr.ecr.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn test_tier_follows_env_tag() {
        assert_eq!(ctx().tier(), Tier::NonProduction);

        let prod = Context::new("1", "us-east-1", "orders", "prod");
        assert_eq!(prod.tier(), Tier::Production);
    }
}
