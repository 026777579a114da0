// Stack definition file (rigging.toml / rigging.yaml)

use anyhow::{bail, Context as _, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::constructs::buildspec::BuildSpec;
use crate::constructs::image_ci::{BuildEnvironment, ExecutionPolicy, GitSourceRef, RegistryRef};
use crate::constructs::network::NetworkPlacement;
use crate::constructs::{ImageCiProps, MysqlProps};
use crate::context::Context;

/// Prefix for environment variable overrides, e.g. `RIGGING_CONTEXT__ENV=prod`
pub const ENV_PREFIX: &str = "RIGGING";

pub const DEFAULT_STACK_FILE: &str = "rigging.toml";

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("env var pattern is valid")
});

/// Root structure of a stack definition file
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct StackDefinition {
    /// Optional version (must be 1 if present)
    pub version: Option<u32>,

    /// Template description
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub context: ContextSettings,

    /// Image pipelines
    #[serde(default)]
    pub image_ci: Vec<ImageCiEntry>,

    /// Optional MySQL database
    #[serde(default)]
    pub database: Option<DatabaseEntry>,
}

/// Context values as read from the file, env and CLI; all required after merging
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct ContextSettings {
    pub account: Option<String>,
    pub region: Option<String>,
    pub app_name: Option<String>,
    pub env: Option<String>,
}

impl ContextSettings {
    pub fn resolve(&self) -> Result<Context> {
        let missing: Vec<&str> = [
            ("context.account", &self.account),
            ("context.region", &self.region),
            ("context.app_name", &self.app_name),
            ("context.env", &self.env),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
        .map(|(key, _)| key)
        .collect();

        if !missing.is_empty() {
            bail!(
                "Missing context values: {}. Set them in the stack file, via {}_CONTEXT__<KEY> or with --context key=value",
                missing.join(", "),
                ENV_PREFIX
            );
        }

        Ok(Context::new(
            self.account.clone().unwrap_or_default(),
            self.region.clone().unwrap_or_default(),
            self.app_name.clone().unwrap_or_default(),
            self.env.clone().unwrap_or_default(),
        ))
    }
}

/// One `[[image_ci]]` table
///
/// Not flattened over `ImageCiProps`: unknown keys inside the entry must
/// reach `serde_ignored`.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ImageCiEntry {
    /// Construct id, part of every logical id the pipeline declares
    pub id: String,
    pub git: GitSourceRef,
    pub ecr: RegistryRef,
    #[serde(default)]
    pub build_spec: Option<BuildSpec>,
    #[serde(default)]
    pub environment: BuildEnvironment,
    #[serde(default)]
    pub execution_policy: ExecutionPolicy,
}

impl ImageCiEntry {
    pub fn props(&self) -> ImageCiProps {
        ImageCiProps {
            git: self.git.clone(),
            ecr: self.ecr.clone(),
            build_spec: self.build_spec.clone(),
            environment: self.environment.clone(),
            execution_policy: self.execution_policy,
        }
    }
}

fn default_database_id() -> String {
    "Mysql".to_string()
}

/// The `[database]` table
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseEntry {
    #[serde(default = "default_database_id")]
    pub id: String,
    pub network: NetworkPlacement,
    pub database_name: String,
    pub master_username: String,
}

impl DatabaseEntry {
    pub fn props(&self) -> MysqlProps {
        MysqlProps {
            network: self.network.clone(),
            database_name: self.database_name.clone(),
            master_username: self.master_username.clone(),
        }
    }
}

/// Substitute environment variables in a string value
/// Replaces ${VAR_NAME} or ${VAR_NAME:-default} with environment variable values
fn substitute_env_vars_in_string(s: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(s, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match env::var(var_name) {
                Ok(val) => val,
                Err(_) => default_value.unwrap_or("").to_string(),
            }
        })
        .to_string()
}

/// Convert a config::Value to a serde_json::Value
///
/// With `substitute` set, `${VAR}` references in strings are replaced from the
/// environment. Only the `context` table is substituted; build commands and
/// build variables keep their `${...}` text for CodeBuild.
fn config_value_to_json(value: &config::Value, substitute: bool) -> serde_json::Value {
    use config::ValueKind;

    match &value.kind {
        ValueKind::Nil => serde_json::Value::Null,
        ValueKind::Boolean(b) => serde_json::Value::Bool(*b),
        ValueKind::I64(i) => serde_json::Value::Number((*i).into()),
        ValueKind::I128(i) => serde_json::Value::Number((*i as i64).into()),
        ValueKind::U64(u) => serde_json::Value::Number((*u).into()),
        ValueKind::U128(u) => serde_json::Value::Number((*u as u64).into()),
        ValueKind::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueKind::String(s) if substitute => {
            serde_json::Value::String(substitute_env_vars_in_string(s))
        }
        ValueKind::String(s) => serde_json::Value::String(s.clone()),
        ValueKind::Table(table) => serde_json::Value::Object(
            table
                .iter()
                .map(|(k, v)| (k.clone(), config_value_to_json(v, substitute)))
                .collect(),
        ),
        ValueKind::Array(arr) => serde_json::Value::Array(
            arr.iter()
                .map(|v| config_value_to_json(v, substitute))
                .collect(),
        ),
    }
}

/// Load a stack definition and resolve its context
///
/// Precedence (highest to lowest):
/// 1. `overrides` (from `--context key=value`)
/// 2. `RIGGING_`-prefixed environment variables (`RIGGING_CONTEXT__REGION`)
/// 3. The stack file
pub fn load_stack(path: &Path, overrides: &[(String, String)]) -> Result<(StackDefinition, Context)> {
    let (definition, unused_fields) = read_definition(path, overrides, None)?;

    for field in &unused_fields {
        warn!("Unknown field in {}: {}", path.display(), field);
    }

    if let Some(version) = definition.version {
        if version != 1 {
            bail!(
                "Unsupported stack file version: {}. This CLI supports version 1.",
                version
            );
        }
    } else {
        debug!("No version specified in {}, using latest", path.display());
    }

    let ctx = definition.context.resolve()?;
    Ok((definition, ctx))
}

/// Merge the configuration layers and deserialize, returning the paths of unused fields
///
/// `env_source` replaces the process environment when set.
fn read_definition(
    path: &Path,
    overrides: &[(String, String)],
    env_source: Option<config::Map<String, String>>,
) -> Result<(StackDefinition, Vec<String>)> {
    if !path.exists() {
        bail!("Stack file not found: {}", path.display());
    }
    info!("Loading stack definition from {}", path.display());

    let mut builder = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .source(env_source),
        );

    for (key, value) in overrides {
        debug!("Context override {}={}", key, value);
        builder = builder
            .set_override(format!("context.{}", key), value.as_str())
            .with_context(|| format!("Invalid context override '{}'", key))?;
    }

    let config = builder
        .build()
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let root_value = config
        .cache
        .into_table()
        .with_context(|| format!("{} must contain a table at its root", path.display()))?;

    let json_value = serde_json::Value::Object(
        root_value
            .iter()
            .map(|(k, v)| (k.clone(), config_value_to_json(v, k == "context")))
            .collect(),
    );

    // Deserialize and collect any unused fields
    let mut unused_fields = Vec::new();
    let definition: StackDefinition = serde_ignored::deserialize(json_value, |field| {
        unused_fields.push(field.to_string());
    })
    .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok((definition, unused_fields))
}

/// Starter stack definition written by `rigging init`
pub const STARTER_STACK: &str = r#"version = 1
description = "Image pipeline and MySQL database"

[context]
account = "${AWS_ACCOUNT_ID:-123456789012}"
region = "${AWS_REGION:-eu-west-1}"
app_name = "myapp"
env = "dev"

[[image_ci]]
id = "ImageCi"
execution_policy = "power-user"

[image_ci.git]
owner = "my-org"
repo = "myapp"
branch = "main"

[image_ci.ecr]
repository_name = "myapp"

[image_ci.environment]
image = "aws/codebuild/standard:7.0"
compute_type = "BUILD_GENERAL1_SMALL"
privileged = true
dockerfile = "./Dockerfile"

[database]
id = "Mysql"
database_name = "myapp"
master_username = "admin"

[database.network]
vpc_id = "vpc-00000000"
subnets = [
    { id = "subnet-00000001", availability_zone = "eu-west-1a", kind = "isolated" },
    { id = "subnet-00000002", availability_zone = "eu-west-1b", kind = "isolated" },
]
"#;

/// Write the starter stack definition into `dir`
pub fn write_starter_stack(dir: &str, force: bool) -> Result<std::path::PathBuf> {
    let path = Path::new(dir).join(DEFAULT_STACK_FILE);
    if path.exists() && !force {
        bail!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        );
    }
    std::fs::write(&path, STARTER_STACK)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote stack definition to {}", path.display());
    Ok(path)
}
