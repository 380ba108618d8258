//! Background job scheduler for Vigil.
//!
//! This module provides the scheduled lifecycle jobs for VPN subscriber
//! accounts, plus the startup reconciliation that replays anything missed
//! while the process was down.
//!
//! # Available Jobs
//!
//! - **Account Expiry** (daily, 00:01): deactivates and locks accounts whose
//!   expiry date has passed
//!
//! - **Inactive Account Purge** (daily, 00:02): bulk-deletes accounts expired
//!   longer ago than the configured retention window
//!
//! - **Monthly Reactivation** (day 1 and 2 of month, 00:01): resets traffic
//!   counters and unlocks deactivated monthly-quota accounts
//!
//! The monthly trigger fires on two candidate days as a guard against a
//! single missed exact-time trigger; the job only selects accounts still
//! awaiting reactivation, so the second firing is a no-op.
//!
//! # Usage
//!
//! ```rust,ignore
//! use vigil::jobs::{JobConfig, JobScheduler};
//! use vigil::db::Database;
//! use vigil::ocserv::OcservController;
//! use tokio_util::sync::CancellationToken;
//!
//! let db = Database::new().await?;
//! let shutdown = CancellationToken::new();
//! let ctl = Arc::new(OcservController::from_config(&config.ocserv, shutdown.clone()));
//! let scheduler = JobScheduler::new(db, ctl, JobConfig::default(), shutdown).await?;
//! scheduler.start().await?;
//! ```

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler as TokioJobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::JobsConfig;
use crate::db::Database;
use crate::errors::VigilError;
use crate::ocserv::OcservController;

mod batch;
mod checkpoint;
mod expire;
mod monthly;
mod purge;
mod reconcile;

pub use batch::run_batch;
pub use checkpoint::Checkpoint;
pub use expire::run_expire_users;
pub use monthly::run_monthly_activation;
pub use purge::run_inactive_user_purge;
pub use reconcile::run_missed_jobs;

/// Configuration for background jobs.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Cron expression for the daily expiry pass (default: 00:01:00)
    pub expire_cron: String,
    /// Cron expression for the daily purge pass (default: 00:02:00)
    pub purge_cron: String,
    /// Cron expression for monthly reactivation (default: day 1 and 2, 00:01:00)
    pub monthly_cron: String,
    /// Maximum concurrent workers per batch pass (default: 10)
    pub max_workers: usize,
    /// Path of the persisted cron state file
    pub state_file: PathBuf,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            // Every day at 00:01:00
            expire_cron: "0 1 0 * * *".to_string(),
            // Every day at 00:02:00
            purge_cron: "0 2 0 * * *".to_string(),
            // First and second day of each month at 00:01:00
            monthly_cron: "0 1 0 1,2 * *".to_string(),
            max_workers: 10,
            state_file: PathBuf::from("cron-state.json"),
        }
    }
}

impl From<&JobsConfig> for JobConfig {
    fn from(config: &JobsConfig) -> Self {
        Self {
            expire_cron: config.expire_cron.clone(),
            purge_cron: config.purge_cron.clone(),
            monthly_cron: config.monthly_cron.clone(),
            max_workers: config.max_workers,
            state_file: PathBuf::from(&config.state_file),
        }
    }
}

/// Background job scheduler for Vigil.
///
/// Owns the single in-memory cron state instance for the process lifetime.
/// After each completed run the matching field is updated and persisted
/// unconditionally; the state is not re-read before firing. It exists to
/// support restart reconciliation, not to gate live triggers. The stated
/// schedules keep the job families apart on the clock; the state sits behind
/// a lock for the residual case of overlapping triggers.
pub struct JobScheduler {
    scheduler: TokioJobScheduler,
    db: Arc<Database>,
    ctl: Arc<OcservController>,
    config: JobConfig,
    state: Arc<Mutex<Checkpoint>>,
    shutdown: CancellationToken,
}

impl JobScheduler {
    /// Create a new job scheduler.
    pub async fn new(
        db: Arc<Database>,
        ctl: Arc<OcservController>,
        config: JobConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, JobError> {
        let scheduler = TokioJobScheduler::new()
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        let state = Arc::new(Mutex::new(Checkpoint::load(&config.state_file)));

        Ok(Self {
            scheduler,
            db,
            ctl,
            config,
            state,
            shutdown,
        })
    }

    /// Start the job scheduler with all configured jobs.
    pub async fn start(&self) -> Result<(), JobError> {
        info!("Starting Vigil job scheduler");

        // Add account expiry job
        self.add_expire_job().await?;

        // Add inactive account purge job
        self.add_purge_job().await?;

        // Add monthly reactivation job
        self.add_monthly_job().await?;

        // Start the scheduler
        self.scheduler
            .start()
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        info!("Vigil job scheduler started successfully");

        Ok(())
    }

    /// Stop the job scheduler.
    ///
    /// Stops issuing new triggers; an in-flight batch is not aborted, but its
    /// control plane calls fail fast once the shared shutdown signal is set.
    pub async fn shutdown(&mut self) -> Result<(), JobError> {
        info!("Shutting down Vigil job scheduler");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;
        Ok(())
    }

    /// Add the daily account expiry job.
    async fn add_expire_job(&self) -> Result<(), JobError> {
        let db = Arc::clone(&self.db);
        let ctl = Arc::clone(&self.ctl);
        let state = Arc::clone(&self.state);
        let state_file = self.config.state_file.clone();
        let shutdown = self.shutdown.clone();
        let max_workers = self.config.max_workers;

        let job = Job::new_async(self.config.expire_cron.as_str(), move |_uuid, _l| {
            let db = Arc::clone(&db);
            let ctl = Arc::clone(&ctl);
            let state = Arc::clone(&state);
            let state_file = state_file.clone();
            let shutdown = shutdown.clone();
            Box::pin(async move {
                let now = Utc::now().naive_utc();
                info!("Running account expiry pass at {}", now);

                match run_expire_users(&db, &ctl, max_workers).await {
                    Ok(count) => {
                        if count > 0 {
                            info!("Expiry pass: {} accounts processed", count);
                        }
                    }
                    Err(e) => {
                        error!("Expiry pass failed: {}", e);
                    }
                }

                let mut state = state.lock().await;
                state.daily_last_run = Some(now.date());
                if let Err(e) = state.save(&state_file) {
                    error!("Failed to save cron state, shutting down: {}", e);
                    shutdown.cancel();
                }
            })
        })
        .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        info!(
            "Added account expiry job (schedule: {})",
            self.config.expire_cron
        );

        Ok(())
    }

    /// Add the daily inactive account purge job.
    async fn add_purge_job(&self) -> Result<(), JobError> {
        let db = Arc::clone(&self.db);
        let state = Arc::clone(&self.state);
        let state_file = self.config.state_file.clone();
        let shutdown = self.shutdown.clone();

        let job = Job::new_async(self.config.purge_cron.as_str(), move |_uuid, _l| {
            let db = Arc::clone(&db);
            let state = Arc::clone(&state);
            let state_file = state_file.clone();
            let shutdown = shutdown.clone();
            Box::pin(async move {
                let now = Utc::now().naive_utc();
                info!("Running inactive account purge at {}", now);

                // Row counts are logged inside the job itself.
                if let Err(e) = run_inactive_user_purge(&db).await {
                    error!("Purge pass failed: {}", e);
                }

                let mut state = state.lock().await;
                state.daily_last_run = Some(now.date());
                if let Err(e) = state.save(&state_file) {
                    error!("Failed to save cron state, shutting down: {}", e);
                    shutdown.cancel();
                }
            })
        })
        .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        info!(
            "Added inactive account purge job (schedule: {})",
            self.config.purge_cron
        );

        Ok(())
    }

    /// Add the monthly reactivation job.
    async fn add_monthly_job(&self) -> Result<(), JobError> {
        let db = Arc::clone(&self.db);
        let ctl = Arc::clone(&self.ctl);
        let state = Arc::clone(&self.state);
        let state_file = self.config.state_file.clone();
        let shutdown = self.shutdown.clone();
        let max_workers = self.config.max_workers;

        let job = Job::new_async(self.config.monthly_cron.as_str(), move |_uuid, _l| {
            let db = Arc::clone(&db);
            let ctl = Arc::clone(&ctl);
            let state = Arc::clone(&state);
            let state_file = state_file.clone();
            let shutdown = shutdown.clone();
            Box::pin(async move {
                let now = Utc::now().naive_utc();
                info!("Running monthly reactivation at {}", now);

                match run_monthly_activation(&db, &ctl, max_workers).await {
                    Ok(count) => {
                        if count > 0 {
                            info!("Monthly pass: {} accounts processed", count);
                        }
                    }
                    Err(e) => {
                        error!("Monthly pass failed: {}", e);
                    }
                }

                let mut state = state.lock().await;
                state.monthly_last_run = Some(now.date());
                if let Err(e) = state.save(&state_file) {
                    error!("Failed to save cron state, shutting down: {}", e);
                    shutdown.cancel();
                }
            })
        })
        .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        info!(
            "Added monthly reactivation job (schedule: {})",
            self.config.monthly_cron
        );

        Ok(())
    }

    /// Run the expiry pass immediately (useful for testing or manual triggers).
    pub async fn run_expire_users_now(&self) -> Result<usize, JobError> {
        run_expire_users(&self.db, &self.ctl, self.config.max_workers).await
    }

    /// Run the monthly reactivation immediately (useful for testing or manual triggers).
    pub async fn run_monthly_activation_now(&self) -> Result<usize, JobError> {
        run_monthly_activation(&self.db, &self.ctl, self.config.max_workers).await
    }

    /// Run the inactive account purge immediately (useful for testing or manual triggers).
    pub async fn run_inactive_user_purge_now(&self) -> Result<u64, JobError> {
        run_inactive_user_purge(&self.db).await
    }
}

/// Errors that can occur in the job scheduler.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl From<VigilError> for JobError {
    fn from(err: VigilError) -> Self {
        match err {
            VigilError::ConfigError(msg) => JobError::ConfigError(msg),
            VigilError::StorageError(msg) => JobError::StorageError(msg),
            VigilError::ServerError(msg) => JobError::QueryError(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = JobConfig::default();
        assert_eq!(config.expire_cron, "0 1 0 * * *");
        assert_eq!(config.purge_cron, "0 2 0 * * *");
        assert_eq!(config.monthly_cron, "0 1 0 1,2 * *");
        assert_eq!(config.max_workers, 10);
    }

    #[test]
    fn job_config_from_jobs_config() {
        let source = JobsConfig::default();
        let config = JobConfig::from(&source);
        assert_eq!(config.expire_cron, source.expire_cron);
        assert_eq!(config.max_workers, source.max_workers);
        assert_eq!(config.state_file, PathBuf::from(&source.state_file));
    }
}
