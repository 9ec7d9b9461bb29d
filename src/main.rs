use anyhow::{Context as _, Result};
use aws_sdk_s3 as s3;
use clap::{Parser, Subcommand};
use lynex::alerts::store::RuleStore;
use lynex::alerts::RuleManager;
use lynex::analytics::AnalyticsWriter;
use lynex::archiver::Archiver;
use lynex::bus::RedisBus;
use lynex::config::Config;
use lynex::notifiers::{ChatNotifier, ConsoleNotifier, Notifier, WebhookNotifier};
use lynex::processor::Processor;
use lynex::AppContext;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "lynexd", about = "Lynex telemetry pipeline daemon", version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LYNEX_LOG", default_value = "info")]
    log: String,

    /// Emit logs as JSON instead of compact text.
    #[arg(long, env = "LYNEX_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the ingest admission HTTP server.
    Ingest,
    /// Run the processor loop, alert rule refresh task, and cold-tier archiver.
    Processor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log, args.log_json);

    info!(version = env!("CARGO_PKG_VERSION"), "lynex starting");
    let config = Arc::new(Config::from_env());

    match args.command {
        Command::Ingest => run_ingest(config).await,
        Command::Processor => run_processor(config).await,
    }
}

fn setup_logging(log_level: &str, json: bool) {
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .compact()
            .init();
    }
}

async fn build_pool(config: &Config) -> Result<sqlx::PgPool> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run database migrations")?;
    Ok(pool)
}

async fn build_redis(config: &Config) -> Result<redis::aio::ConnectionManager> {
    let client = redis::Client::open(config.redis_url.clone()).context("invalid REDIS_URL")?;
    redis::aio::ConnectionManager::new(client)
        .await
        .context("failed to connect to Redis")
}

async fn build_context(config: Arc<Config>) -> Result<Arc<AppContext>> {
    let pool = build_pool(&config).await?;
    let redis_for_bus = build_redis(&config).await?;
    let redis_for_usage = build_redis(&config).await?;

    let redis_bus = RedisBus::new(redis_for_bus, config.stream_max_len);
    let ctx = AppContext::new(config, pool, redis_bus, redis_for_usage);
    Ok(Arc::new(ctx))
}

async fn run_ingest(config: Arc<Config>) -> Result<()> {
    let ctx = build_context(config.clone()).await?;

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "ingest admission server listening");

    let app = lynex::ingest::router(ctx.ingest_context());
    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    // Bound the in-flight drain on shutdown at 2s; past that, stop waiting
    // and let the process exit rather than hang on a slow connection.
    match tokio::time::timeout(std::time::Duration::from_secs(2), serve).await {
        Ok(result) => result.context("ingest server failed")?,
        Err(_) => warn!("graceful shutdown drain exceeded 2s, forcing exit"),
    }

    Ok(())
}

async fn run_processor(config: Arc<Config>) -> Result<()> {
    let ctx = build_context(config.clone()).await?;

    let analytics = Arc::new(
        AnalyticsWriter::connect(
            &config.clickhouse.url(),
            &config.clickhouse.database,
            &config.clickhouse.user,
            &config.clickhouse.password,
        )
        .await
        .context("failed to connect to ClickHouse")?,
    );

    let rule_store = Arc::new(RuleStore::new(ctx.pool.clone()));
    let rules = RuleManager::load(rule_store)
        .await
        .context("failed to load initial alert rule set")?;
    rules.clone().spawn_reload_task(config.rule_reload_interval);

    let notifiers = build_notifiers();

    let processor = Arc::new(Processor::new(
        ctx.bus.clone(),
        analytics.clone(),
        rules,
        notifiers,
        ctx.metrics.clone(),
        config.claim_idle,
    ));

    if let Some(archiver) = build_archiver(&config, ctx.pool.clone(), ctx.metrics.clone()).await {
        tokio::spawn(archiver.run_forever());
    } else {
        warn!("archiver disabled: S3_ARCHIVE_BUCKET not set or AWS config unavailable");
    }

    let shutdown = processor.shutdown_handle();
    let run_handle = tokio::spawn(processor.run());

    shutdown_signal().await;
    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    if let Err(e) = run_handle.await {
        error!(err = %e, "processor task panicked");
    }

    Ok(())
}

fn build_notifiers() -> Vec<Arc<dyn Notifier>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(ConsoleNotifier)];

    if let Ok(url) = std::env::var("ALERT_WEBHOOK_URL") {
        if !url.is_empty() {
            notifiers.push(Arc::new(WebhookNotifier::new(url)));
        }
    }
    if let Ok(url) = std::env::var("ALERT_CHAT_WEBHOOK_URL") {
        if !url.is_empty() {
            notifiers.push(Arc::new(ChatNotifier::new(url)));
        }
    }

    notifiers
}

async fn build_archiver(
    config: &Config,
    pool: sqlx::PgPool,
    metrics: Arc<lynex::metrics::Metrics>,
) -> Option<Archiver> {
    config.archive.bucket.as_ref()?;

    let clickhouse = clickhouse::Client::default()
        .with_url(config.clickhouse.url())
        .with_database(&config.clickhouse.database)
        .with_user(&config.clickhouse.user)
        .with_password(&config.clickhouse.password);

    let mut aws_config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = &config.archive.region {
        aws_config_loader = aws_config_loader.region(s3::config::Region::new(region.clone()));
    }
    let aws_config = aws_config_loader.load().await;
    let s3_client = s3::Client::new(&aws_config);

    Some(Archiver::new(
        clickhouse,
        s3_client,
        pool,
        config.archive.clone(),
        metrics,
    ))
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
    info!("shutdown signal received");
}
