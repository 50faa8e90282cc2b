use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use photo_curator::config::ENV_ENDPOINT;
use photo_curator::grading::HttpGrader;
use photo_curator::media::{FsImageSource, JpegPreparer};
use photo_curator::{
    BatchEvaluator, Config, JsonSidecarStore, Library, Scheduler, SchedulerEvent,
};

/// Grade a folder of photos and keep the verdicts next to the images
#[derive(Debug, Parser)]
#[command(name = "photo-curator", version, about)]
struct Args {
    /// Folder to curate
    folder: PathBuf,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Grading service base URL
    #[arg(long, env = ENV_ENDPOINT)]
    endpoint: Option<String>,

    /// Move rejected images under archive/ once grading is done
    #[arg(long)]
    archive_rejects: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = {
        let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
        config.apply_overrides(args.endpoint.clone(), None);
        config
    };

    let default_filter = config
        .log_level
        .clone()
        .unwrap_or_else(|| "photo_curator=info".to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(fmt::layer())
        .init();

    tracing::info!("🎨 photo-curator {} starting", env!("CARGO_PKG_VERSION"));

    let library = Library::new(&args.folder)
        .with_context(|| format!("Cannot open {}", args.folder.display()))?;
    let store = Arc::new(JsonSidecarStore::new(library.root()));
    let (backlog, imported) = library.open(store.as_ref()).await.context("Folder scan failed")?;

    let grader = HttpGrader::new(&config.grading).context("Failed to build grading client")?;
    let evaluator = BatchEvaluator::new(
        Arc::new(FsImageSource::new(library.root())),
        Arc::new(JpegPreparer::new(config.prepare.max_edge, config.prepare.jpeg_quality)),
        Arc::new(grader),
        store,
    );

    let scheduler = Scheduler::new(backlog, evaluator, config.scheduler.clone());
    if scheduler.is_paused() {
        tracing::warn!("Configured to start paused; resuming for a command-line run");
        scheduler.resume();
    }

    let mut events = scheduler.subscribe();
    let shutdown = CancellationToken::new();
    let driver = tokio::spawn({
        let scheduler = scheduler.clone();
        let shutdown = shutdown.clone();
        async move { scheduler.run(shutdown).await }
    });

    let interrupted = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, finishing the batch in flight");
                break true;
            }
            event = events.recv() => match event {
                Ok(SchedulerEvent::BatchStarted { ids }) => {
                    tracing::debug!(batch_size = ids.len(), "Grading batch");
                }
                Ok(SchedulerEvent::BatchFinished { ids, keepers }) => {
                    tracing::info!("✅ Graded {} image(s), {} worth keeping", ids.len(), keepers);
                }
                Ok(SchedulerEvent::BatchFailed { ids, message }) => {
                    tracing::error!("❌ {} image(s) failed: {}", ids.len(), message);
                }
                Ok(SchedulerEvent::Drained { .. }) => break false,
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "Event receiver lagged");
                }
                Err(RecvError::Closed) => break false,
            },
        }
    };

    shutdown.cancel();
    driver.await.context("Scheduler task panicked")?;
    scheduler.wait_idle().await;

    if args.archive_rejects && !interrupted {
        let archived = library
            .archive_rejects(&scheduler)
            .await
            .context("Archiving rejects failed")?;
        println!("Archived {} rejected image(s) to {}", archived, library.archive_dir().display());
    }

    let summary = scheduler.summary().await;
    println!(
        "{}: {} images ({} already graded on open), {} done, {} keepers, {} errors, {} pending",
        library.root().display(),
        summary.total(),
        imported.graded_count,
        summary.done,
        summary.keepers,
        summary.error,
        summary.pending + summary.processing,
    );

    Ok(())
}
