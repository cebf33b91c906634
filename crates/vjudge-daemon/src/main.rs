//! VJudge Daemon - dispatch and judging engine for virtual OJ submissions.
//!
//! Consumes submission ids and problem-refresh requests from durable Redis
//! queues, dispatches them through per-OJ `Submitter`/`StatusCrawler`/
//! `ProblemCrawler` workers, and persists results to Postgres.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vjudge_core::metrics::MetricsServer;
use vjudge_core::{accounts, Config, DurableQueue, RedisQueue, RegistryClientFactory, VJudge};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vjudge_daemon=debug,vjudge_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting VJudge daemon");

    let config = Config::from_env()?;
    tracing::info!(environment = %config.environment, "loaded configuration");

    tracing::info!("connecting to database...");
    let db_pool = sqlx::PgPool::connect(&config.database_url).await?;
    tracing::info!("database connected");

    tracing::info!("connecting to redis...");
    let redis_url = config.redis.connection_url();
    let redis_cfg = deadpool_redis::Config::from_url(&redis_url);
    let redis_pool = redis_cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
    tracing::info!("redis connected");

    let submit_queue: Arc<dyn DurableQueue> = Arc::new(RedisQueue::new(
        redis_pool.clone(),
        config.redis.submit_queue.clone(),
    ));
    let problem_queue: Arc<dyn DurableQueue> = Arc::new(RedisQueue::new(
        redis_pool.clone(),
        config.redis.problem_queue.clone(),
    ));

    let accounts = accounts::load(&config.oj_config_path).await?;

    let submission_repo = Arc::new(vjudge_core::db::PgSubmissionRepository::new(db_pool.clone()));
    let problem_repo = Arc::new(vjudge_core::db::PgProblemRepository::new(db_pool.clone()));

    // Concrete SiteClient adapters are external collaborators (spec §1);
    // a real deployment links the relevant adapter crates and registers
    // them here before `vjudge.start()`.
    let factory: Arc<dyn vjudge_common::SiteClientFactory> = Arc::new(RegistryClientFactory::new());

    let submitter_handler = vjudge_core::workers::SubmitterHandler::new(
        submit_queue,
        submission_repo,
        accounts.clone(),
        factory.clone(),
        config.policy.clone(),
    );
    let crawler_handler = vjudge_core::workers::CrawlerHandler::new(
        problem_queue,
        problem_repo,
        factory,
        config.policy.clone(),
    );

    let vjudge = VJudge::new(submitter_handler, crawler_handler, accounts);

    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = MetricsServer::run(metrics_port).await {
            tracing::error!(error = %e, "metrics server error");
        }
    });

    tracing::info!("VJudge ready, starting dispatch engine");

    tokio::select! {
        _ = vjudge.start() => {
            tracing::warn!("VJudge workers exited unexpectedly");
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, exiting");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
