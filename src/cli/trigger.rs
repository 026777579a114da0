use anyhow::{bail, Result};

use super::StackArgs;
use crate::constructs::image_ci::EventAction;
use crate::stack::Stack;

/// Report whether a pipeline's webhook would start a build for an event
///
/// `git_ref` accepts a full ref (`refs/heads/main`) or a bare branch name.
pub fn explain_trigger(args: &StackArgs, pipeline_id: &str, git_ref: &str, event: &str) -> Result<()> {
    let event: EventAction = event.parse()?;
    let (definition, ctx) = args.load()?;
    let stack = Stack::declare(&definition, &ctx);

    let Some(pipeline) = stack.pipelines.iter().find(|p| p.id == pipeline_id) else {
        let known: Vec<&str> = stack.pipelines.iter().map(|p| p.id.as_str()).collect();
        bail!(
            "No pipeline '{}' in {}. Known pipelines: {}",
            pipeline_id,
            args.file.display(),
            known.join(", ")
        );
    };

    let full_ref = qualify_ref(git_ref);
    let fires = pipeline.source.triggers_on(event, &full_ref);

    for group in &pipeline.source.filter_groups {
        println!(
            "filter: EVENT={} HEAD_REF={}",
            group.event.as_str(),
            group.head_ref.as_deref().unwrap_or("*")
        );
    }
    println!(
        "{} {} on {}: {}",
        event.as_str(),
        full_ref,
        pipeline.id,
        if fires { "build starts" } else { "filtered out" }
    );

    Ok(())
}

fn qualify_ref(git_ref: &str) -> String {
    if git_ref.starts_with("refs/") {
        git_ref.to_string()
    } else {
        format!("refs/heads/{}", git_ref)
    }
}
