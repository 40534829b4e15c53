mod args;
mod catalog;
mod client;
mod error;
mod layout;
mod pipeline;
mod statistics;

use clap::Parser as _;
use tracing_indicatif::style::ProgressStyle;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use crate::args::CatcherArgs;
use crate::error::CatcherError;
use crate::pipeline::CatchProcessor;

fn main() {
    let progress_style = ProgressStyle::with_template(
        "{span_child_prefix}{spinner} {span_name}{{{span_fields}}} {elapsed}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_spinner());

    let indicatif_layer =
        tracing_indicatif::IndicatifLayer::new().with_progress_style(progress_style);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_env("CAST_CATCHER_LOG"))
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stdout_writer()))
        .with(indicatif_layer)
        .init();

    let args = args::CatcherArgs::parse();

    let result = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build() {
        Ok(v) => v.block_on(async_main(args)),
        Err(err) => {
            tracing::error!("Failed to create tokio runtime: {:?}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = result {
        tracing::error!("Error: {}", err);
        std::process::exit(1);
    }
}

async fn async_main(args: CatcherArgs) -> Result<(), CatcherError> {
    tracing::trace!("args = {:#?}", args);

    let processor = CatchProcessor::new(&args).await?;

    tracing::info!("Starting to catch podcasts...");
    let statistics = processor.run().await?;

    tracing::info!("Done.");

    if !statistics.problems.is_empty() {
        tracing::warn!("Problems encountered:");
        for problem in &statistics.problems {
            tracing::warn!("- {}: {}", problem.task_name, problem.error);
        }
    }

    if !statistics.failures.is_empty() {
        tracing::error!("Failed tasks:");
        for failure in &statistics.failures {
            tracing::error!("- {}: {}", failure.task_name, failure.error);
        }
    }

    if !statistics.failed_downloads.is_empty() {
        tracing::error!("Failed downloads:");
        for download in &statistics.failed_downloads {
            tracing::error!("- {} -> {}", download.source, download.destination.display());
        }
    }

    tracing::info!("Encountered problems: {}", statistics.problems.len());
    tracing::info!("Failed tasks: {}", statistics.failures.len());
    tracing::info!("Succeeded tasks: {}", statistics.successful_tasks);

    Ok(())
}
