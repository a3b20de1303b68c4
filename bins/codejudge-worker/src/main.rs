mod config;

use codejudge_common::redis;
use codejudge_common::types::JobResult;
use codejudge_harness::{run_test, HarnessRequest};
use config::{WorkerConfig, WorkerConfigManager};
use tokio::signal;
use tracing::{debug, error, info, instrument, warn};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true);

    if std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("codejudge worker booting...");

    let config_manager = WorkerConfigManager::load_default().map_err(|e| {
        error!("Failed to load worker configuration: {}", e);
        e
    })?;
    let config = config_manager.config().clone();

    match config_manager.source() {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("Using default configuration"),
    }
    info!(
        python = %config.harness.python_executable,
        default_timeout_s = config.harness.default_timeout_seconds,
        early_stop = config.harness.early_stop,
        "Harness configured"
    );
    warn!("The reliability guard is NOT a security sandbox; run this worker inside an isolated environment");
    info!("Queue: {}", config.queue_name);

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let client = ::redis::Client::open(redis_url.as_str())?;
    let mut redis_conn = ::redis::aio::ConnectionManager::new(client).await?;

    info!("Connected to Redis: {}", redis_url);

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        warn!("Received shutdown signal, stopping worker...");
    };

    tokio::select! {
        result = worker_loop(&mut redis_conn, &config) => result?,
        _ = shutdown => {},
    }

    info!("Worker shutdown complete");
    Ok(())
}

#[instrument(skip_all, fields(queue = %config.queue_name))]
async fn worker_loop(
    redis_conn: &mut ::redis::aio::ConnectionManager,
    config: &WorkerConfig,
) -> anyhow::Result<()> {
    loop {
        match redis::pop_job(redis_conn, &config.queue_name, config.poll_timeout_seconds).await {
            Ok(Some(job)) => {
                let job_id = job.id;
                info!(
                    job_id = %job_id,
                    timeout_s = ?job.timeout_seconds,
                    source_size = job.candidate_source.len(),
                    debug = job.debug,
                    "Received job"
                );

                let start = std::time::Instant::now();
                let report = run_test(&HarnessRequest::from(&job), &config.harness).await;
                let result = JobResult::from_report(job_id, report);

                info!(
                    job_id = %job_id,
                    status = ?result.overall_status,
                    passed = result.passed,
                    total = result.total,
                    execution_ms = start.elapsed().as_millis() as u64,
                    "Execution completed"
                );

                for (idx, verdict) in result.verdicts.iter().enumerate() {
                    debug!(job_id = %job_id, test_index = idx, %verdict, "Test verdict");
                }

                match redis::store_result(redis_conn, &result, config.result_ttl_seconds).await {
                    Ok(_) => info!(job_id = %job_id, "Result persisted to Redis"),
                    // non-fatal, the worker keeps draining the queue
                    Err(e) => error!(job_id = %job_id, error = %e, "Failed to persist result"),
                }
            }
            Ok(None) => continue,
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}
