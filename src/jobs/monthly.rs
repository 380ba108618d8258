//! Monthly quota reactivation job.
//!
//! At the start of a month, accounts on a monthly quota that were deactivated
//! (typically for exhausting the quota) get their counters reset and their
//! access restored.

use chrono::{NaiveTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::db::Database;
use crate::ocserv::OcservController;

use super::batch::run_batch;
use super::JobError;

/// Check for and reactivate monthly-quota accounts.
///
/// Queries for accounts where:
/// - `expire_at` is unset or later than the start of today
/// - `deactivated_at` is set
/// - `traffic_type` is a monthly quota mode
///
/// Per matching account, under the batch concurrency cap:
/// - Sets `rx = 0`, `tx = 0`, `deactivated_at = NULL`, `is_locked = false`
/// - Unlocks the account (best-effort)
///
/// The predicate only matches accounts still awaiting reactivation, so a
/// repeated run in the same month selects nothing new.
///
/// Returns the number of candidate accounts.
pub async fn run_monthly_activation(
    db: &Arc<Database>,
    ctl: &Arc<OcservController>,
    max_workers: usize,
) -> Result<usize, JobError> {
    let today = Utc::now().date_naive().and_time(NaiveTime::MIN);

    debug!("Checking for monthly accounts to reactivate as of {}", today);

    let users = db.get_monthly_candidates(today).await?;
    let count = users.len();

    let db = Arc::clone(db);
    let ctl = Arc::clone(ctl);

    run_batch(users, max_workers, move |user| {
        let db = Arc::clone(&db);
        let ctl = Arc::clone(&ctl);
        async move {
            if let Err(e) = db.reactivate_user(user.id).await {
                error!(username = %user.username, error = %e, "Failed to reactivate account");
                return;
            }

            if let Err(e) = ctl.unlock_user(&user.username).await {
                error!(username = %user.username, error = %e, "Failed to unlock account");
            }

            info!(username = %user.username, "Monthly account reactivated");
        }
    })
    .await;

    Ok(count)
}
