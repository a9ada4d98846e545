use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use castnotes::config::{AppConfig, ProcessingOptions};
use castnotes::lifecycle::{self, ResourceManager};
use castnotes::orchestrator::ShowNotesPipeline;
use castnotes::{utils, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "castnotes=debug"
    } else {
        "castnotes=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Check for required external dependencies (non-fatal)
    if !cli.quiet {
        let missing_deps = utils::check_dependencies().await;
        if !missing_deps.is_empty() {
            eprintln!("⚠️  Dependency check warnings:");
            for dep in missing_deps {
                eprintln!("   • {}", dep);
            }
            eprintln!("   (Continuing anyway - tools may be available)");
        }
    }

    let app = match AppConfig::load() {
        Ok(app) => app,
        Err(error) => {
            eprintln!("Error: {error}");
            return ExitCode::FAILURE;
        }
    };

    let options = match ProcessingOptions::from_cli(cli, app) {
        Ok(options) => options,
        Err(error) => {
            eprintln!("Error: {error}");
            return ExitCode::FAILURE;
        }
    };

    let manager = ResourceManager::new();
    lifecycle::install_signal_handlers(manager.clone());

    let pipeline = match ShowNotesPipeline::new(options, manager) {
        Ok(pipeline) => pipeline,
        Err(error) => {
            eprintln!("Error: {error}");
            return ExitCode::FAILURE;
        }
    };

    match pipeline.run().await {
        Ok(results) => {
            tracing::debug!(items = results.len(), "run complete");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("Error: {error}");
            ExitCode::FAILURE
        }
    }
}
