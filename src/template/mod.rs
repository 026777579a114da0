// CloudFormation template model
//
// Declarators produce typed declarations; each declaration renders itself into
// a `Template`. The template keeps resources keyed by logical id and checks that
// every reference between them resolves before it is written out.

pub mod intrinsic;

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

pub const FORMAT_VERSION: &str = "2010-09-09";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("duplicate logical id '{0}'")]
    DuplicateLogicalId(String),

    #[error("'{from}' references '{target}', which is not declared in this template")]
    DanglingReference { from: String, target: String },

    #[error("construct '{construct}' selected no {kind} subnets for its placement")]
    NoSubnets { construct: String, kind: String },

    #[error("failed to render buildspec for '{construct}': {source}")]
    BuildSpec {
        construct: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A single resource entry
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    pub properties: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<DeletionPolicy>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, properties: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties,
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    /// Set both the deletion and the update-replace policy
    pub fn with_retention(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum DeletionPolicy {
    Retain,
    Snapshot,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub resources: BTreeMap<String, Resource>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
}

impl Default for Template {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Template {
    pub fn new(description: Option<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description,
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn add_resource(
        &mut self,
        logical_id: impl Into<String>,
        resource: Resource,
    ) -> Result<(), TemplateError> {
        let logical_id = logical_id.into();
        if self.resources.contains_key(&logical_id) {
            return Err(TemplateError::DuplicateLogicalId(logical_id));
        }
        debug!("Declared {} ({})", logical_id, resource.resource_type);
        self.resources.insert(logical_id, resource);
        Ok(())
    }

    pub fn add_output(
        &mut self,
        name: impl Into<String>,
        description: Option<&str>,
        value: Value,
    ) -> Result<(), TemplateError> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(TemplateError::DuplicateLogicalId(name));
        }
        self.outputs.insert(
            name,
            Output {
                description: description.map(str::to_string),
                value,
            },
        );
        Ok(())
    }

    /// Check that every `Ref` and `Fn::GetAtt` target is declared
    pub fn validate(&self) -> Result<(), TemplateError> {
        let declared: BTreeSet<&str> = self.resources.keys().map(String::as_str).collect();

        let dangling = |from: &str, targets: Vec<String>| {
            targets
                .into_iter()
                .find(|target| !declared.contains(target.as_str()))
                .map(|target| TemplateError::DanglingReference {
                    from: from.to_string(),
                    target,
                })
        };

        for (logical_id, resource) in &self.resources {
            let mut targets = Vec::new();
            intrinsic::referenced_ids(&resource.properties, &mut targets);
            if let Some(err) = dangling(logical_id, targets) {
                return Err(err);
            }
        }

        for (name, output) in &self.outputs {
            let mut targets = Vec::new();
            intrinsic::referenced_ids(&output.value, &mut targets);
            if let Some(err) = dangling(name, targets) {
                return Err(err);
            }
        }

        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Something that renders into template resources
pub trait Declaration {
    fn render(&self, template: &mut Template) -> Result<(), TemplateError>;
}
