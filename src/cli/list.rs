use anyhow::{Context, Result};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, Table};

use super::StackArgs;
use crate::constructs::tier::PROFILES;
use crate::constructs::ImageCiDeclaration;
use crate::stack::Stack;

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);
    table
}

/// Print every resource the stack declares
pub fn list_resources(args: &StackArgs) -> Result<()> {
    let (definition, ctx) = args.load()?;
    let stack = Stack::declare(&definition, &ctx);
    let template = stack
        .synthesize()
        .context("Stack is not internally consistent")?;

    let mut table = new_table();
    table.set_header(header(&["LOGICAL ID", "TYPE"]));
    for (logical_id, resource) in &template.resources {
        table.add_row(vec![
            Cell::new(logical_id),
            Cell::new(&resource.resource_type),
        ]);
    }
    println!("{}", table);

    for pipeline in &stack.pipelines {
        println!("{}", pipeline_summary(pipeline));
    }
    if let Some(database) = &stack.database {
        println!(
            "Database {}: {} {} on {} ({} tier, {} subnets)",
            database.id,
            database.instance.engine,
            database.instance.engine_version,
            database.instance.instance_class,
            database.tier,
            database.subnet_group.subnet_ids.len()
        );
    }

    Ok(())
}

/// One line per pipeline; the tag is the configured one, the buildspec decides what is pushed
fn pipeline_summary(pipeline: &ImageCiDeclaration) -> String {
    format!(
        "Pipeline {}: {}/{}@{} -> repository {} (configured tag {}, {} role)",
        pipeline.id,
        pipeline.source.git.owner,
        pipeline.source.git.repo,
        pipeline.source.git.branch,
        pipeline.repository.uri,
        pipeline.repository.image_tag,
        pipeline.role.policy
    )
}

/// Print the tier sizing table
pub fn list_profiles() -> Result<()> {
    let mut table = new_table();
    table.set_header(header(&[
        "TIER",
        "INSTANCE CLASS",
        "STORAGE (GB)",
        "MULTI-AZ",
        "PERFORMANCE INSIGHTS",
        "SUBNETS",
    ]));

    for profile in PROFILES.iter() {
        let subnets = if profile.subnets.one_per_az {
            format!("{}, one per AZ", profile.subnets.kind)
        } else {
            format!("{}, all", profile.subnets.kind)
        };
        table.add_row(vec![
            Cell::new(profile.tier),
            Cell::new(profile.instance_class),
            Cell::new(profile.allocated_storage_gb),
            Cell::new(profile.multi_az),
            Cell::new(profile.performance_insights),
            Cell::new(subnets),
        ]);
    }

    println!("{}", table);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructs::declare_image_ci;
    use crate::constructs::image_ci::{BuildEnvironment, ExecutionPolicy, GitSourceRef, RegistryRef};
    use crate::constructs::ImageCiProps;
    use crate::context::Context;

    #[test]
    fn test_pipeline_summary_labels_configured_tag() {
        let ctx = Context::new("123456789012", "eu-west-1", "orders", "dev");
        let props = ImageCiProps {
            git: GitSourceRef {
                owner: "acme".to_string(),
                repo: "app".to_string(),
                branch: "main".to_string(),
            },
            ecr: RegistryRef {
                repository_name: "acme-app".to_string(),
                tag: Some("latest".to_string()),
            },
            build_spec: None,
            environment: BuildEnvironment::default(),
            execution_policy: ExecutionPolicy::LeastPrivilege,
        };

        let summary = pipeline_summary(&declare_image_ci(&ctx, "Api", &props));
        assert_eq!(
            summary,
            "Pipeline Api: acme/app@main -> repository 123456789012.dkr.ecr.eu-west-1.amazonaws.com/acme-app (configured tag latest, least-privilege role)"
        );
        assert!(!summary.contains("acme-app:latest"));
    }
}
