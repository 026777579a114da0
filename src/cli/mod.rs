// CLI command handlers

pub mod list;
pub mod synth;
pub mod trigger;

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use crate::config::{load_stack, StackDefinition, DEFAULT_STACK_FILE};
use crate::context::Context;

/// Arguments shared by every command that reads a stack definition
#[derive(Debug, Clone, Args)]
pub struct StackArgs {
    /// Stack definition file (.toml, .yaml or .yml)
    #[arg(long, short = 'f', default_value = DEFAULT_STACK_FILE)]
    pub file: PathBuf,

    /// Override a context value (format: key=value, can be specified multiple times)
    #[arg(long = "context", short = 'c', value_parser = parse_key_val::<String, String>)]
    pub context: Vec<(String, String)>,
}

impl StackArgs {
    pub fn load(&self) -> Result<(StackDefinition, Context)> {
        load_stack(&self.file, &self.context)
    }
}

/// Parse a single key-value pair
fn parse_key_val<T, U>(
    s: &str,
) -> Result<(T, U), Box<dyn std::error::Error + Send + Sync + 'static>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    U: std::str::FromStr,
    U::Err: std::error::Error + Send + Sync + 'static,
{
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{s}`"))?;
    Ok((s[..pos].parse()?, s[pos + 1..].parse()?))
}
