//! Interaction screening - Main Entry Point

use clap::Parser;
use interaction_screening::cli::{cmd_info, cmd_run, Cli, Commands, RunOverrides};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "interaction_screening=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            root,
            data,
            target,
            interaction,
            grid_resolution,
            combine_policy,
            iterations,
            cv_folds,
            output_dir,
            top_k,
        } => {
            let overrides = RunOverrides {
                root,
                data,
                target,
                interaction,
                grid_resolution,
                combine_policy,
                iterations,
                cv_folds,
                output_dir,
                top_k,
            };
            cmd_run(config.as_deref(), overrides)?;
        }
        Commands::Info { data } => {
            cmd_info(&data)?;
        }
    }

    Ok(())
}
