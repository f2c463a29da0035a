//! crawld - crawl target scheduler and job orchestrator
//!
//! CLI entry point for the scheduler daemon and target management.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use crawld::cli::{Cli, Command, TargetCommand};
use crawld::config::Config;
use crawld::dispatch::{Dispatcher, HttpRunner};
use crawld::domain::{JobStatus, TargetConfig};
use crawld::notify::{LogNotifier, Notifier, WebhookNotifier};
use crawld::scheduler::SchedulerLoop;
use crawld::state::StateManager;

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Run => cmd_run(&config, false).await,
        Command::Tick => cmd_run(&config, true).await,
        Command::Target { command } => match command {
            TargetCommand::Add {
                url,
                target_type,
                max_requests,
                max_files,
                no_downloads,
                file_types,
                ignore_robots_txt,
                interval_hours,
            } => {
                cmd_target_add(
                    &config,
                    TargetConfig {
                        url,
                        target_type,
                        max_requests,
                        max_files,
                        download_files: !no_downloads,
                        file_types,
                        ignore_robots_txt,
                        crawl_interval_hours: interval_hours,
                    },
                )
                .await
            }
            TargetCommand::Remove { url } => cmd_target_remove(&config, &url).await,
            TargetCommand::List => cmd_target_list(&config).await,
            TargetCommand::Crawl { url } => cmd_target_crawl(&config, &url).await,
        },
        Command::Jobs { target, status } => cmd_jobs(&config, target, status).await,
    }
}

fn open_state(config: &Config) -> Result<StateManager> {
    let store_dir = PathBuf::from(&config.storage.store_dir);
    fs::create_dir_all(&store_dir).context("Failed to create store directory")?;
    StateManager::spawn(store_dir)
}

fn build_scheduler(config: &Config, state: StateManager) -> Result<SchedulerLoop> {
    let runner = HttpRunner::from_config(&config.cluster)?;
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(runner),
        config.storage.data_prefix.clone(),
        config.notify.webhook_url.clone(),
        config.scheduler.job_timeout_hours,
        config.scheduler.submit_timeout(),
    ));

    let notifier: Arc<dyn Notifier> = match WebhookNotifier::from_config(&config.notify)? {
        Some(webhook) => Arc::new(webhook),
        None => Arc::new(LogNotifier),
    };

    Ok(SchedulerLoop::new(
        config.scheduler.clone(),
        state,
        dispatcher,
        notifier,
    ))
}

/// Run the scheduler: forever, or a single pass for cron setups
async fn cmd_run(config: &Config, single_tick: bool) -> Result<()> {
    let state = open_state(config)?;
    let scheduler = build_scheduler(config, state.clone())?;

    if single_tick {
        scheduler.tick().await?;
        state.shutdown().await?;
        return Ok(());
    }

    info!(cluster = %config.cluster.base_url, "crawld starting");
    scheduler.run().await
}

async fn cmd_target_add(config: &Config, target_config: TargetConfig) -> Result<()> {
    let state = open_state(config)?;
    let target = state.upsert_target(target_config).await?;

    let schedule = if target.is_scheduled() {
        format!("every {}h", target.crawl_interval_hours)
    } else {
        "manual".to_string()
    };
    println!("Registered {} ({}, {})", target.url, target.target_type, schedule);

    state.shutdown().await?;
    Ok(())
}

async fn cmd_target_remove(config: &Config, url: &str) -> Result<()> {
    let state = open_state(config)?;
    state.delete_target(url).await?;
    println!("Removed {}", url);

    state.shutdown().await?;
    Ok(())
}

async fn cmd_target_list(config: &Config) -> Result<()> {
    let state = open_state(config)?;
    let targets = state.list_targets().await?;

    if targets.is_empty() {
        println!("No targets registered");
    }
    for target in targets {
        let schedule = if target.is_scheduled() {
            format!("every {}h", target.crawl_interval_hours)
        } else {
            "manual".to_string()
        };
        let last = target.last_finished_job_id.as_deref().unwrap_or("-");
        println!("{}  {}  {}  last job: {}", target.url, target.target_type, schedule, last);
    }

    state.shutdown().await?;
    Ok(())
}

async fn cmd_target_crawl(config: &Config, url: &str) -> Result<()> {
    let state = open_state(config)?;
    let scheduler = build_scheduler(config, state.clone())?;

    let job_id = scheduler.trigger(url).await?;
    println!("Dispatched job {} for {}", job_id, url);

    state.shutdown().await?;
    Ok(())
}

async fn cmd_jobs(config: &Config, target: Option<String>, status: Option<JobStatus>) -> Result<()> {
    let state = open_state(config)?;
    let jobs = state.list_jobs(target, status.map(|s| s.to_string())).await?;

    if jobs.is_empty() {
        println!("No jobs found");
    }
    for job in jobs {
        let reason = job.exit_reason.as_deref().unwrap_or("-");
        println!(
            "{}  {}  attempt {}  {}  {}",
            job.target_url, job.job_id, job.attempt, job.status, reason
        );
    }

    state.shutdown().await?;
    Ok(())
}
