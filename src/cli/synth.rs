use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::Path;
use tracing::info;

use super::StackArgs;
use crate::stack::Stack;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

/// Synthesize the stack and write the template to `output` or stdout
pub fn synth(args: &StackArgs, format: OutputFormat, output: Option<&Path>) -> Result<()> {
    let (definition, ctx) = args.load()?;
    info!(
        "Synthesizing {} for {}/{} ({} tier)",
        ctx.app_name,
        ctx.account,
        ctx.region,
        ctx.tier()
    );

    let template = Stack::declare(&definition, &ctx)
        .synthesize()
        .context("Stack is not internally consistent")?;

    let rendered = match format {
        OutputFormat::Json => template.to_json().context("Failed to render template as JSON")?,
        OutputFormat::Yaml => template.to_yaml().context("Failed to render template as YAML")?,
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote template to {}", path.display());
        }
        None => println!("{}", rendered),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synth_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let stack_file = dir.path().join("rigging.toml");
        crate::config::write_starter_stack(dir.path().to_str().unwrap(), false).unwrap();

        let out = dir.path().join("template.json");
        let args = StackArgs {
            file: stack_file,
            context: vec![("env".to_string(), "prod".to_string())],
        };
        synth(&args, OutputFormat::Json, Some(&out)).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        let resources = value["Resources"].as_object().unwrap();
        let instance = resources
            .values()
            .find(|r| r["Type"] == "AWS::RDS::DBInstance")
            .unwrap();
        assert_eq!(instance["Properties"]["DBInstanceClass"], "db.r5.large");
        assert_eq!(instance["Properties"]["MultiAZ"], true);
    }
}
