use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod config;
mod constructs;
mod context;
mod stack;
mod template;

use cli::synth::OutputFormat;
use cli::StackArgs;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synthesize the CloudFormation template for a stack
    #[command(visible_alias = "s")]
    Synth {
        #[command(flatten)]
        stack: StackArgs,
        /// Template format
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        /// Write the template to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List the resources a stack declares
    #[command(visible_alias = "ls")]
    #[command(visible_alias = "l")]
    List {
        #[command(flatten)]
        stack: StackArgs,
    },
    /// Show the database sizing profile of each tier
    #[command(visible_alias = "p")]
    Profiles,
    /// Check whether a pipeline's webhook starts a build for a git event
    ExplainTrigger {
        #[command(flatten)]
        stack: StackArgs,
        /// Pipeline id (the `id` of an [[image_ci]] entry)
        pipeline: String,
        /// Git ref or branch name (e.g., main, refs/heads/feature/x)
        git_ref: String,
        /// Webhook event (push, pull-request-created, pull-request-updated, pull-request-merged)
        #[arg(long, default_value = "push")]
        event: String,
    },
    /// Write a starter stack definition
    Init {
        /// Directory to write rigging.toml into
        #[arg(default_value = ".")]
        path: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the template
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Synth {
            stack,
            format,
            output,
        } => cli::synth::synth(stack, *format, output.as_deref())?,
        Commands::List { stack } => cli::list::list_resources(stack)?,
        Commands::Profiles => cli::list::list_profiles()?,
        Commands::ExplainTrigger {
            stack,
            pipeline,
            git_ref,
            event,
        } => cli::trigger::explain_trigger(stack, pipeline, git_ref, event)?,
        Commands::Init { path, force } => {
            let written = config::write_starter_stack(path, *force)?;
            println!("Wrote {}", written.display());
        }
    }

    Ok(())
}
