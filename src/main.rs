use std::{process, sync::Arc};

use shelfwise::{
    application::{
        catalog::CatalogService,
        error::AppError,
        jobs::{PublicationPoller, ShutdownOutcome, StatsRecomputer, TaskSupervisor},
    },
    cache::{ResponseCache, run_sweeper},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        telemetry,
        upstream::{UpstreamClient, UpstreamSource},
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::PollOnce(_) => run_poll_once(settings).await,
        config::Command::RecomputeStats(args) => run_recompute_stats(settings, args).await,
    }
}

/// Everything the background workers need, built once per process.
struct WorkerContext {
    supervisor: TaskSupervisor,
    cache: Arc<ResponseCache>,
    poller: Arc<PublicationPoller>,
    stats: StatsRecomputer,
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let workers = build_worker_context(repositories.clone(), &settings)?;

    let sweeper_cache = workers.cache.clone();
    let sweep_interval = settings.cache.sweep_interval;
    let shutdown = workers.supervisor.shutdown_signal();
    workers.supervisor.spawn("cache_sweeper", async move {
        run_sweeper(sweeper_cache, sweep_interval, shutdown).await;
    });

    workers.poller.clone().start(&workers.supervisor);

    info!(
        target = "shelfwise::serve",
        upstream = %settings.upstream.base_url,
        cache_ttl_secs = settings.cache.ttl.as_secs(),
        poll_interval_secs = settings.poller.interval.as_secs(),
        stats_workers = settings.stats.worker_cap,
        "Background workers started"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(target = "shelfwise::serve", "Shutdown requested");
    match workers.supervisor.shutdown().await {
        ShutdownOutcome::Completed => {}
        ShutdownOutcome::Abandoned { remaining } => warn!(
            target = "shelfwise::serve",
            remaining,
            in_flight_stats = workers.stats.in_flight(),
            "Background tasks abandoned at shutdown"
        ),
    }

    repositories.close().await;
    Ok(())
}

async fn run_poll_once(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let workers = build_worker_context(repositories.clone(), &settings)?;

    let summary = workers.poller.poll_once().await;
    info!(
        target = "shelfwise::poll_once",
        authors = summary.authors,
        skipped = summary.skipped,
        grown = summary.grown,
        notifications = summary.notifications,
        "Publication poll complete"
    );

    workers.supervisor.shutdown().await;
    repositories.close().await;
    Ok(())
}

async fn run_recompute_stats(
    settings: config::Settings,
    args: config::RecomputeStatsArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let workers = build_worker_context(repositories.clone(), &settings)?;

    let mut failed = 0usize;
    for book_id in &args.book_ids {
        match workers.stats.recompute_now(*book_id).await {
            Ok(record) => info!(
                target = "shelfwise::recompute_stats",
                book_id = %book_id,
                ratings = record.counts.rating_count,
                average = record.average_rating(),
                "Book stats recomputed"
            ),
            Err(err) => {
                failed += 1;
                error!(
                    target = "shelfwise::recompute_stats",
                    book_id = %book_id,
                    error = %err,
                    "Book stats recomputation failed"
                );
            }
        }
    }

    workers.supervisor.shutdown().await;
    repositories.close().await;
    if failed > 0 {
        return Err(AppError::unexpected(format!(
            "{failed} of {} recomputations failed",
            args.book_ids.len()
        )));
    }
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let repositories =
        PostgresRepositories::open(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| InfraError::database(err.to_string()))?;

    Ok(Arc::new(repositories))
}

fn build_worker_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<WorkerContext, AppError> {
    let supervisor = TaskSupervisor::new(settings.shutdown.grace);

    let client = UpstreamClient::new(&settings.upstream)
        .map_err(|err| AppError::from(InfraError::upstream(err.to_string())))?;
    let source: Arc<dyn UpstreamSource> = Arc::new(client);
    let cache = Arc::new(ResponseCache::new(source, &settings.cache));
    let catalog = Arc::new(CatalogService::new(cache.clone()));

    let stats = StatsRecomputer::new(repositories.clone(), supervisor.clone(), &settings.stats);
    let poller = Arc::new(PublicationPoller::new(
        catalog,
        repositories.clone(),
        repositories.clone(),
        repositories,
        settings.poller,
    ));

    Ok(WorkerContext {
        supervisor,
        cache,
        poller,
        stats,
    })
}
