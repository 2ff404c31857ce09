use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use console::style;
use shardlift_pipeline::{DryRunPublisher, ExtractionStrategy, GcloudPublisher, Orchestrator, Publisher, RunSummary};
use shardlift_platform::{CommandRunner, SystemRunner};
use shardlift_source::{ArchiveJob, DatasetHub, HubConfig, HuggingFaceHub, SourceError, classify, discover, jobs_for};

use crate::cli::{App, Commands, PullArg};
use crate::progress::JobProgress;
use crate::settings::Settings;

mod cli;
mod logging;
mod progress;
mod settings;

fn main() -> ExitCode {
    let app = App::parse();

    match run(&app) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("{} {e:#}", style("error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(app: &App) -> anyhow::Result<()> {
    let settings = Settings::load(app.global.config.as_deref(), &app.overrides())?;
    let show_progress = !app.global.no_progress && console::Term::stderr().is_term();
    logging::init(&settings.log_file, show_progress)?;

    match &app.cmd {
        Commands::Migrate(_) => migrate(&settings, show_progress),
        Commands::Pull(arg) => pull(&settings, arg, show_progress),
    }
}

fn migrate(settings: &Settings, show_progress: bool) -> anyhow::Result<()> {
    let destination = settings
        .destination()?
        .context("no destination given; pass --destination or set `destination` in the config file")?;

    let jobs = discover(&settings.source_root, &settings.pattern, &destination)?;
    execute(settings, jobs, true, show_progress)
}

fn pull(settings: &Settings, arg: &PullArg, show_progress: bool) -> anyhow::Result<()> {
    let hub = HuggingFaceHub::new(HubConfig {
        revision: arg.revision.clone(),
        ..HubConfig::from_env()
    })?;

    let listing = hub.list_files(&arg.dataset)?;
    let files = classify(&listing);
    if files.is_empty() {
        return Err(SourceError::NoMatch {
            pattern: format!("tar or parquet files in {}", arg.dataset),
        }
        .into());
    }
    tracing::info!(
        tabular = files.tabular.len(),
        archives = files.archives.len(),
        "classified dataset files"
    );

    let name = arg.dataset.rsplit('/').next().unwrap_or(&arg.dataset);
    let local_dir = settings.output_dir.join(name);
    std::fs::create_dir_all(&local_dir).with_context(|| format!("creating {}", local_dir.display()))?;
    hub.fetch(&arg.dataset, &files.selected(), &local_dir)?;

    let Some(destination) = settings.destination()? else {
        println!("Downloaded {} into {}", arg.dataset, local_dir.display());
        return Ok(());
    };

    let jobs = jobs_for(&local_dir, &files, &destination)?;
    execute(settings, jobs, false, show_progress)
}

fn execute(settings: &Settings, jobs: Vec<ArchiveJob>, keep_by_default: bool, show_progress: bool) -> anyhow::Result<()> {
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let publisher: Arc<dyn Publisher> = if settings.dry_run {
        Arc::new(DryRunPublisher::default())
    } else {
        Arc::new(GcloudPublisher::new(Arc::clone(&runner)))
    };

    let progress = Arc::new(JobProgress::new(show_progress));
    let orchestrator = Orchestrator::new(
        settings.pipeline_config(keep_by_default),
        ExtractionStrategy::new(Arc::clone(&runner)),
        publisher,
    )
    .with_runner(runner)
    .with_observer(progress.clone());

    let summary = orchestrator.run(jobs)?;
    progress.finish();

    print_summary(&summary, &settings.log_file);
    Ok(())
}

fn print_summary(summary: &RunSummary, log_file: &Path) {
    let headline = if summary.all_succeeded() {
        style("Run complete").green().bold()
    } else {
        style("Run complete with failures").yellow().bold()
    };
    println!("{headline}: {summary}");

    for (source, failure) in &summary.failures {
        println!("  {} {}: {failure}", style("failed").red(), source.display());
    }
    println!("Detailed log: {}", log_file.display());
}
