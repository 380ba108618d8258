//! Startup reconciliation.
//!
//! Runs once before the live scheduler starts. If the process was down when a
//! trigger should have fired, the missed family runs here, synchronously, and
//! the cron state is brought up to date. The live scheduler never re-reads
//! the state before firing; it exists for exactly this catch-up path.

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use crate::db::Database;
use crate::ocserv::OcservController;

use super::checkpoint::Checkpoint;
use super::expire::run_expire_users;
use super::monthly::run_monthly_activation;
use super::purge::run_inactive_user_purge;
use super::JobError;

/// Detect and replay missed job families.
///
/// Daily family: when the last daily run precedes the current UTC day, runs
/// the expiry pass and then the purge, in that order; locking has to land
/// before purge eligibility is evaluated.
///
/// Monthly family: on the first day of a month the family has not run in,
/// runs the monthly reactivation.
///
/// A job failure during catch-up is logged and the family is still marked as
/// run for today; the affected accounts are re-selected on the next trigger.
/// Failing to persist the state afterwards is fatal: continuing would either
/// re-run or permanently skip the catch-up after the next restart.
pub async fn run_missed_jobs(
    db: &Arc<Database>,
    ctl: &Arc<OcservController>,
    max_workers: usize,
    state_file: &Path,
) -> Result<(), JobError> {
    let mut state = Checkpoint::load(state_file);
    let today = Utc::now().date_naive();

    info!("Checking for missed daily jobs");
    if state.daily_due(today) {
        info!("Running missed daily jobs");
        match run_expire_users(db, ctl, max_workers).await {
            Ok(count) => info!("Missed expiry pass processed {} accounts", count),
            Err(e) => error!(error = %e, "Expiry pass failed during catch-up"),
        }
        if let Err(e) = run_inactive_user_purge(db).await {
            error!(error = %e, "Purge pass failed during catch-up");
        }
        state.daily_last_run = Some(today);
    } else {
        info!("Daily jobs already ran today, skipping");
    }

    info!("Checking for missed monthly jobs");
    if state.monthly_due(today) {
        info!("Running missed monthly job");
        match run_monthly_activation(db, ctl, max_workers).await {
            Ok(count) => info!("Missed monthly pass processed {} accounts", count),
            Err(e) => error!(error = %e, "Monthly pass failed during catch-up"),
        }
        state.monthly_last_run = Some(today);
    }

    state.save(state_file)?;
    info!("Startup reconciliation completed");

    Ok(())
}
