use {
    chainflow::{
        aggregator::UsageAggregator,
        classifier::Classifier,
        config::Config,
        poller::{Poller, PollerOptions},
        retention::{retention_task, RetentionPolicy},
        source::{BlockSource, GraphSource, RpcBlockSource},
        store::EventStore,
    },
    std::{sync::Arc, time::Duration},
    tokio::sync::{watch, Mutex},
};

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let config = Config::from_env()?;

    // Write logs to stderr so piped stdout stays clean
    let mut builder = if config.rust_log.is_some() {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
    } else {
        env_logger::Builder::from_default_env()
    };
    builder.target(env_logger::Target::Stderr).init();

    log::info!("🚀 Starting chainflow...");
    log::info!("📊 Configuration:");
    log::info!(
        "   RPC_URL: {}",
        config.rpc_url.as_deref().unwrap_or("(disabled)")
    );
    log::info!(
        "   GRAPH_URL: {}",
        config.graph_url.as_deref().unwrap_or("(disabled)")
    );
    log::info!("   DB_PATH: {}", config.db_path);
    log::info!(
        "   poll={}s window={}s retention={}s archive={}",
        config.poll_interval_secs,
        config.window_secs,
        config.retention_secs,
        config.archive_on_retention
    );

    let store = Arc::new(Mutex::new(EventStore::open(&config.db_path)?));
    let classifier = Arc::new(Classifier::new());

    // Seed in-memory usage from the durable counters so rankings survive
    // a restart.
    let aggregator = {
        let mut agg = UsageAggregator::new();
        let store = store.lock().await;
        let restored = store.load_program_usage()?;
        if !restored.is_empty() {
            log::info!("Restored usage for {} programs", restored.len());
            agg.seed(restored);
        }
        Arc::new(Mutex::new(agg))
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let options = PollerOptions::from_config(&config);
    let mut tasks = Vec::new();

    if let Some(url) = &config.graph_url {
        let source = Arc::new(GraphSource::new(url.clone())?);
        let start_ts = chrono::Utc::now().timestamp() - config.window_secs;
        let mut poller = Poller::new_window(
            source,
            Arc::clone(&store),
            Arc::clone(&classifier),
            Arc::clone(&aggregator),
            start_ts,
            options.clone(),
        );
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { poller.run(rx).await }));
        log::info!("📡 Windowed poller started from t={}", start_ts);
    }

    if let Some(url) = &config.rpc_url {
        let source = Arc::new(RpcBlockSource::new(url.clone())?);
        let start_slot = source.latest_slot().await?;
        let mut poller = Poller::new_block(
            source,
            Arc::clone(&store),
            Arc::clone(&classifier),
            Arc::clone(&aggregator),
            start_slot,
            options.clone(),
        );
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { poller.run(rx).await }));
        log::info!("📡 Block poller started from slot {}", start_slot);
    }

    let policy = RetentionPolicy {
        max_age_secs: config.retention_secs,
        sweep_interval: Duration::from_secs(config.retention_interval_secs),
        archive: config.archive_on_retention,
    };
    tasks.push(tokio::spawn(retention_task(
        Arc::clone(&store),
        policy,
        shutdown_rx.clone(),
    )));

    tokio::signal::ctrl_c().await?;
    log::info!("Shutdown requested, draining tasks...");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            log::warn!("Task ended abnormally: {}", e);
        }
    }

    // Final usage report.
    {
        let aggregator = aggregator.lock().await;
        let snapshot = aggregator.snapshot();
        log::info!(
            "📈 Session totals: {} programs, {} calls ({} with instruction)",
            snapshot.programs_tracked,
            snapshot.calls_recorded,
            snapshot.calls_with_instruction
        );
        for (rank, usage) in aggregator.top_programs(10).iter().enumerate() {
            log::info!(
                "   #{} {} - {} calls (first seen {})",
                rank + 1,
                usage.program_id,
                usage.total_calls,
                usage.first_seen
            );
        }
    }

    log::info!("✅ Shutdown complete");
    Ok(())
}
