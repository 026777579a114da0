// Image CI pipeline: ECR repository + GitHub-triggered CodeBuild project

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use super::buildspec::BuildSpec;
use crate::context::Context;
use crate::template::intrinsic::{get_att, join, reference, tags};
use crate::template::{Declaration, DeletionPolicy, Resource, Template, TemplateError};

pub const CODEBUILD_PRINCIPAL: &str = "codebuild.amazonaws.com";
pub const POWER_USER_POLICY: &str = "PowerUserAccess";

/// Names of the variables injected into every build
pub const ACCOUNT_VAR: &str = "AWS_ACCOUNT_ID";
pub const REGION_VAR: &str = "AWS_REGION";
pub const APP_NAME_VAR: &str = "APP_NAME";
pub const ENV_VAR: &str = "ENV";
pub const DOCKERFILE_VAR: &str = "DOCKERFILE";

const RESERVED_VARS: [&str; 5] = [ACCOUNT_VAR, REGION_VAR, APP_NAME_VAR, ENV_VAR, DOCKERFILE_VAR];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSourceRef {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl GitSourceRef {
    pub fn location(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.repo)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRef {
    pub repository_name: String,
    /// Image tag pushed by the pipeline; defaults to the environment tag
    #[serde(default)]
    pub tag: Option<String>,
}

fn default_build_image() -> String {
    "aws/codebuild/standard:7.0".to_string()
}

fn default_compute_type() -> String {
    "BUILD_GENERAL1_SMALL".to_string()
}

fn default_privileged() -> bool {
    true
}

fn default_dockerfile() -> String {
    "./Dockerfile".to_string()
}

/// Extra plaintext variable for the build container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableEntry {
    pub name: String,
    pub value: String,
}

/// Build container settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEnvironment {
    /// CodeBuild image (e.g., "aws/codebuild/standard:7.0")
    #[serde(default = "default_build_image")]
    pub image: String,
    /// CodeBuild compute type (e.g., "BUILD_GENERAL1_SMALL")
    #[serde(default = "default_compute_type")]
    pub compute_type: String,
    /// Docker-in-docker needs privileged mode
    #[serde(default = "default_privileged")]
    pub privileged: bool,
    /// Value of the DOCKERFILE variable
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    #[serde(default)]
    pub variables: Vec<VariableEntry>,
}

impl Default for BuildEnvironment {
    fn default() -> Self {
        Self {
            image: default_build_image(),
            compute_type: default_compute_type(),
            privileged: default_privileged(),
            dockerfile: default_dockerfile(),
            variables: Vec::new(),
        }
    }
}

/// Permissions granted to the build's service role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionPolicy {
    /// AWS managed PowerUserAccess: anything except IAM administration
    #[default]
    PowerUser,
    /// Push to the declared repository and write build logs, nothing else
    LeastPrivilege,
}

impl fmt::Display for ExecutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionPolicy::PowerUser => write!(f, "power-user"),
            ExecutionPolicy::LeastPrivilege => write!(f, "least-privilege"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCiProps {
    pub git: GitSourceRef,
    pub ecr: RegistryRef,
    /// Replaces the default image-push buildspec when set
    #[serde(default)]
    pub build_spec: Option<BuildSpec>,
    #[serde(default)]
    pub environment: BuildEnvironment,
    #[serde(default)]
    pub execution_policy: ExecutionPolicy,
}

/// Webhook event types understood by CodeBuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventAction {
    Push,
    PullRequestCreated,
    PullRequestUpdated,
    PullRequestMerged,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Push => "PUSH",
            EventAction::PullRequestCreated => "PULL_REQUEST_CREATED",
            EventAction::PullRequestUpdated => "PULL_REQUEST_UPDATED",
            EventAction::PullRequestMerged => "PULL_REQUEST_MERGED",
        }
    }
}

impl FromStr for EventAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "push" => Ok(EventAction::Push),
            "pull-request-created" => Ok(EventAction::PullRequestCreated),
            "pull-request-updated" => Ok(EventAction::PullRequestUpdated),
            "pull-request-merged" => Ok(EventAction::PullRequestMerged),
            _ => Err(anyhow::anyhow!(
                "Invalid event '{}'. Must be one of: push, pull-request-created, pull-request-updated, pull-request-merged",
                s
            )),
        }
    }
}

/// All conditions of a group must hold for the webhook to fire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterGroup {
    pub event: EventAction,
    /// HEAD_REF pattern; `None` accepts every ref
    pub head_ref: Option<String>,
}

impl FilterGroup {
    pub fn in_event_of(event: EventAction) -> Self {
        Self {
            event,
            head_ref: None,
        }
    }

    /// Restrict to exactly one branch
    pub fn and_branch_is(mut self, branch: &str) -> Self {
        self.head_ref = Some(format!("^refs/heads/{}$", regex::escape(branch)));
        self
    }

    pub fn matches(&self, event: EventAction, git_ref: &str) -> bool {
        if event != self.event {
            return false;
        }
        match &self.head_ref {
            None => true,
            Some(pattern) => Regex::new(pattern)
                .map(|re| re.is_match(git_ref))
                .unwrap_or(false),
        }
    }

    fn to_value(&self) -> Value {
        let mut filters = vec![json!({ "Type": "EVENT", "Pattern": self.event.as_str() })];
        if let Some(pattern) = &self.head_ref {
            filters.push(json!({ "Type": "HEAD_REF", "Pattern": pattern }));
        }
        Value::Array(filters)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubSource {
    pub git: GitSourceRef,
    pub webhook: bool,
    pub filter_groups: Vec<FilterGroup>,
}

impl GitHubSource {
    /// True when any filter group accepts the event
    pub fn triggers_on(&self, event: EventAction, git_ref: &str) -> bool {
        self.webhook
            && self
                .filter_groups
                .iter()
                .any(|group| group.matches(event, git_ref))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub logical_id: String,
    pub name: String,
    pub image_tag: String,
    /// `<account>.dkr.ecr.<region>.amazonaws.com/<name>`
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRole {
    pub logical_id: String,
    pub principal: String,
    pub policy: ExecutionPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableType {
    Plaintext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentVariable {
    pub value: String,
    pub kind: VariableType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildProject {
    pub logical_id: String,
    pub image: String,
    pub compute_type: String,
    pub privileged: bool,
    pub variables: BTreeMap<String, EnvironmentVariable>,
    pub build_spec: BuildSpec,
}

/// Everything one pipeline declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCiDeclaration {
    pub id: String,
    pub repository: Repository,
    pub source: GitHubSource,
    pub role: ServiceRole,
    pub project: BuildProject,
    pub region: String,
    pub account: String,
    pub tags: BTreeMap<String, String>,
}

fn plaintext(value: impl Into<String>) -> EnvironmentVariable {
    EnvironmentVariable {
        value: value.into(),
        kind: VariableType::Plaintext,
    }
}

/// Declare an image pipeline
pub fn declare_image_ci(ctx: &Context, id: &str, props: &ImageCiProps) -> ImageCiDeclaration {
    let repository_name = &props.ecr.repository_name;
    debug!("Declaring image pipeline {} for {}", id, repository_name);

    let repository = Repository {
        logical_id: ctx.logical_id(&[&ctx.cid(&format!("Repository-{}", repository_name))]),
        name: repository_name.clone(),
        image_tag: props.ecr.tag.clone().unwrap_or_else(|| ctx.env.clone()),
        uri: format!("{}/{}", ctx.registry_domain(), repository_name),
    };

    let source = GitHubSource {
        git: props.git.clone(),
        webhook: true,
        filter_groups: vec![
            FilterGroup::in_event_of(EventAction::Push).and_branch_is(&props.git.branch)
        ],
    };

    let role = ServiceRole {
        logical_id: ctx.logical_id(&[
            id,
            &ctx.cid(&format!("CodebuildServiceRole-{}", repository_name)),
        ]),
        principal: CODEBUILD_PRINCIPAL.to_string(),
        policy: props.execution_policy,
    };

    let mut variables: BTreeMap<String, EnvironmentVariable> = props
        .environment
        .variables
        .iter()
        .filter(|entry| {
            let reserved = RESERVED_VARS.contains(&entry.name.as_str());
            if reserved {
                warn!(
                    "Ignoring build variable {} on {}: it is set from the stack context",
                    entry.name, id
                );
            }
            !reserved
        })
        .map(|entry| (entry.name.clone(), plaintext(&entry.value)))
        .collect();
    variables.insert(ACCOUNT_VAR.to_string(), plaintext(&ctx.account));
    variables.insert(REGION_VAR.to_string(), plaintext(&ctx.region));
    variables.insert(APP_NAME_VAR.to_string(), plaintext(&ctx.app_name));
    variables.insert(ENV_VAR.to_string(), plaintext(&ctx.env));
    variables.insert(
        DOCKERFILE_VAR.to_string(),
        plaintext(&props.environment.dockerfile),
    );

    let project = BuildProject {
        logical_id: ctx.logical_id(&[
            id,
            &ctx.cid(&format!("CodebuildProject-{}", repository_name)),
        ]),
        image: props.environment.image.clone(),
        compute_type: props.environment.compute_type.clone(),
        privileged: props.environment.privileged,
        variables,
        build_spec: props.build_spec.clone().unwrap_or_default(),
    };

    ImageCiDeclaration {
        id: id.to_string(),
        repository,
        source,
        role,
        project,
        region: ctx.region.clone(),
        account: ctx.account.clone(),
        tags: ctx.tags(),
    }
}

impl ImageCiDeclaration {
    fn role_properties(&self) -> Value {
        let mut properties = json!({
            "AssumeRolePolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Action": "sts:AssumeRole",
                    "Effect": "Allow",
                    "Principal": { "Service": self.role.principal },
                }],
            },
            "Tags": tags(&self.tags),
        });

        match self.role.policy {
            ExecutionPolicy::PowerUser => {
                properties["ManagedPolicyArns"] = json!([join(vec![
                    json!("arn:"),
                    reference("AWS::Partition"),
                    json!(format!(":iam::aws:policy/{}", POWER_USER_POLICY)),
                ])]);
            }
            ExecutionPolicy::LeastPrivilege => {
                properties["Policies"] = json!([{
                    "PolicyName": format!("{}-build", self.repository.name),
                    "PolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [
                            {
                                "Effect": "Allow",
                                "Action": "ecr:GetAuthorizationToken",
                                "Resource": "*",
                            },
                            {
                                "Effect": "Allow",
                                "Action": [
                                    "ecr:BatchCheckLayerAvailability",
                                    "ecr:BatchGetImage",
                                    "ecr:CompleteLayerUpload",
                                    "ecr:GetDownloadUrlForLayer",
                                    "ecr:InitiateLayerUpload",
                                    "ecr:PutImage",
                                    "ecr:UploadLayerPart",
                                ],
                                "Resource": get_att(&self.repository.logical_id, "Arn"),
                            },
                            {
                                "Effect": "Allow",
                                "Action": [
                                    "logs:CreateLogGroup",
                                    "logs:CreateLogStream",
                                    "logs:PutLogEvents",
                                ],
                                "Resource": join(vec![
                                    json!("arn:"),
                                    reference("AWS::Partition"),
                                    json!(format!(
                                        ":logs:{}:{}:log-group:/aws/codebuild/*",
                                        self.region, self.account
                                    )),
                                ]),
                            },
                        ],
                    },
                }]);
            }
        }

        properties
    }

    fn project_properties(&self, build_spec: String) -> Value {
        let variables: Vec<Value> = self
            .project
            .variables
            .iter()
            .map(|(name, variable)| {
                let kind = match variable.kind {
                    VariableType::Plaintext => "PLAINTEXT",
                };
                json!({ "Name": name, "Type": kind, "Value": variable.value })
            })
            .collect();

        let filter_groups: Vec<Value> = self
            .source
            .filter_groups
            .iter()
            .map(FilterGroup::to_value)
            .collect();

        json!({
            "Source": {
                "Type": "GITHUB",
                "Location": self.source.git.location(),
                "ReportBuildStatus": true,
                "BuildSpec": build_spec,
            },
            "Triggers": {
                "Webhook": self.source.webhook,
                "FilterGroups": filter_groups,
            },
            "Artifacts": { "Type": "NO_ARTIFACTS" },
            "Environment": {
                "Type": "LINUX_CONTAINER",
                "Image": self.project.image,
                "ComputeType": self.project.compute_type,
                "PrivilegedMode": self.project.privileged,
                "ImagePullCredentialsType": "CODEBUILD",
                "EnvironmentVariables": variables,
            },
            "ServiceRole": get_att(&self.role.logical_id, "Arn"),
            "Tags": tags(&self.tags),
        })
    }
}

impl Declaration for ImageCiDeclaration {
    fn render(&self, template: &mut Template) -> Result<(), TemplateError> {
        if self.role.policy == ExecutionPolicy::PowerUser {
            warn!(
                "Pipeline {} builds with {}; the build role can act on most of account {}",
                self.id, POWER_USER_POLICY, self.account
            );
        }

        let build_spec =
            self.project
                .build_spec
                .to_yaml()
                .map_err(|source| TemplateError::BuildSpec {
                    construct: self.id.clone(),
                    source,
                })?;

        template.add_resource(
            &self.repository.logical_id,
            Resource::new(
                "AWS::ECR::Repository",
                json!({
                    "RepositoryName": self.repository.name,
                    "Tags": tags(&self.tags),
                }),
            )
            .with_retention(DeletionPolicy::Retain),
        )?;
        template.add_resource(
            &self.role.logical_id,
            Resource::new("AWS::IAM::Role", self.role_properties()),
        )?;
        template.add_resource(
            &self.project.logical_id,
            Resource::new(
                "AWS::CodeBuild::Project",
                self.project_properties(build_spec),
            ),
        )?;

        template.add_output(
            format!("{}RepositoryUri", self.repository.logical_id),
            Some("Registry URI the pipeline pushes to"),
            get_att(&self.repository.logical_id, "RepositoryUri"),
        )?;
        template.add_output(
            format!("{}ProjectName", self.project.logical_id),
            Some("CodeBuild project building the image"),
            reference(&self.project.logical_id),
        )?;

        Ok(())
    }
}
