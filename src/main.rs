use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vigil::config::init_config;
use vigil::db::Database;
use vigil::jobs::{run_missed_jobs, JobConfig, JobScheduler};
use vigil::ocserv::OcservController;

#[tokio::main]
async fn main() {
    // Load and validate configuration before anything else
    let config = match init_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize logging
    if config.logging.enabled {
        let filter = EnvFilter::try_new(&config.logging.level)
            .unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let db = match Database::new().await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open subscriber store: {}", e);
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let ctl = Arc::new(OcservController::from_config(&config.ocserv, shutdown.clone()));
    let job_config = JobConfig::from(&config.jobs);

    info!(mode = %config.ocserv.mode, "Vigil worker starting");

    // Replay anything missed while the process was down. A state persistence
    // failure here aborts startup.
    if let Err(e) = run_missed_jobs(&db, &ctl, job_config.max_workers, &job_config.state_file).await
    {
        error!("Startup reconciliation failed: {}", e);
        std::process::exit(1);
    }

    let mut scheduler = match JobScheduler::new(db, ctl, job_config, shutdown.clone()).await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("Failed to create job scheduler: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = scheduler.start().await {
        error!("Failed to start job scheduler: {}", e);
        std::process::exit(1);
    }

    // Run until ctrl-c or an internal fatal condition cancels the token
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received ctrl-c, shutting down");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {
            error!("Shutdown requested by scheduler");
        }
    }

    if let Err(e) = scheduler.shutdown().await {
        error!("Scheduler shutdown failed: {}", e);
        std::process::exit(1);
    }

    info!("Vigil worker stopped");
}
