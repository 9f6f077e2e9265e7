use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use newscrawl::cli::{Cli, Command};
use newscrawl::config;
use newscrawl::discovery::{CancelFlag, DiscoveryEngine, DiscoveryOptions};
use newscrawl::housekeeping::{HousekeepingConfig, HousekeepingSweeper};
use newscrawl::models::PipelineStatus;
use newscrawl::pipeline::PipelineStateMachine;
use newscrawl::proxy::{DomainPacer, ProxyRouter};
use newscrawl::repository::{
    create_diesel_pool, init_schema, DieselArticleRepository, DieselCandidateRepository,
    DieselDatasetRepository, DieselSourceRepository,
};
use newscrawl::scheduler::SchedulerConfig;
use newscrawl::telemetry::TracingTelemetrySink;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut settings = config::load_settings().await;
    if let Some(data_dir) = &cli.data_dir {
        settings.data_dir = data_dir.clone();
    }
    settings.ensure_directories()?;

    let pool = create_diesel_pool(&settings.database_path())?;
    init_schema(pool.clone()).await?;

    let telemetry = Arc::new(TracingTelemetrySink);
    let articles = DieselArticleRepository::new(pool.clone());
    let candidates = DieselCandidateRepository::new(pool.clone());
    let datasets = DieselDatasetRepository::new(pool.clone());
    let sources = DieselSourceRepository::new(pool);

    match cli.command {
        Command::Discover {
            dataset,
            due_only,
            source_limit,
            concurrency,
        } => {
            let pacer = Arc::new(DomainPacer::new(settings.pacing_config()));
            let router = Arc::new(ProxyRouter::new(settings.router_config()?, pacer)?);

            let cancel = CancelFlag::new();
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::info!("interrupt received, finishing in-flight sources");
                        cancel.cancel();
                    }
                });
            }

            let engine = DiscoveryEngine::new(
                sources,
                candidates.clone(),
                datasets,
                router,
                telemetry,
                SchedulerConfig::default(),
                cancel,
            );
            let report = engine
                .run(&DiscoveryOptions {
                    dataset_id: dataset.clone(),
                    due_only,
                    source_limit,
                    concurrency: concurrency.unwrap_or(settings.discovery_concurrency),
                })
                .await?;

            let pending = candidates
                .count_by_status(&dataset, PipelineStatus::Candidate)
                .await?;

            println!("Discovery run complete:");
            println!("  sources considered: {}", report.sources_considered);
            println!("  succeeded:          {}", report.sources_succeeded);
            println!("  failed:             {}", report.sources_failed);
            println!("  skipped:            {}", report.sources_skipped);
            println!("  new candidates:     {}", report.new_candidates);
            println!("  pending in dataset: {pending}");
        }

        Command::Housekeeping {
            candidate_expiration_days,
            extraction_stall_hours,
            cleaning_stall_hours,
            verification_stall_hours,
            dry_run,
        } => {
            let machine = PipelineStateMachine::new(articles.clone(), telemetry.clone());
            let sweeper = HousekeepingSweeper::new(
                articles.clone(),
                candidates,
                machine,
                telemetry,
                HousekeepingConfig {
                    candidate_expiration: Duration::days(candidate_expiration_days),
                    extraction_stall: Duration::hours(extraction_stall_hours),
                    cleaning_stall: Duration::hours(cleaning_stall_hours),
                    verification_stall: Duration::hours(verification_stall_hours),
                    dry_run,
                },
            );
            let report = sweeper.run_sweep().await?;

            if dry_run {
                println!("Housekeeping sweep (dry run, nothing written):");
            } else {
                println!("Housekeeping sweep complete:");
            }
            println!("  null-text paused:     {}", report.null_text_paused);
            println!("  expired candidates:   {}", report.expired_candidates);
            println!("  stalled (extraction): {}", report.stalled_extraction);
            println!("  stalled (cleaning):   {}", report.stalled_cleaning);
            println!("  stalled (verify):     {}", report.stalled_verification);
            if report.record_failures > 0 {
                println!("  record failures:      {}", report.record_failures);
            }

            println!("Article backlog:");
            for status in [
                PipelineStatus::Candidate,
                PipelineStatus::Extracted,
                PipelineStatus::Cleaned,
                PipelineStatus::Verified,
                PipelineStatus::Paused,
                PipelineStatus::Expired,
            ] {
                let count = articles.count_by_status(status).await?;
                println!("  {:<10} {}", status.as_str(), count);
            }
        }
    }

    Ok(())
}
