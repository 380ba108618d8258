//! Daily account expiry job.
//!
//! Finds accounts whose `expire_at` passed more than a day ago and are still
//! active, deactivates them, and locks them out of the VPN.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::db::Database;
use crate::ocserv::OcservController;

use super::batch::run_batch;
use super::JobError;

/// Check for and deactivate overdue accounts.
///
/// Queries for accounts where:
/// - `expire_at` is set and more than one day in the past
/// - `deactivated_at` is not set
///
/// Per matching account, under the batch concurrency cap:
/// - Sets `deactivated_at = NOW()`, `is_locked = true`
/// - Disconnects the active session, then locks the account (best-effort)
///
/// A failed row update skips that account's control plane calls; a failed
/// control plane call leaves the row update in place. Either way the rest of
/// the batch proceeds.
///
/// Returns the number of candidate accounts.
pub async fn run_expire_users(
    db: &Arc<Database>,
    ctl: &Arc<OcservController>,
    max_workers: usize,
) -> Result<usize, JobError> {
    let cutoff = Utc::now().naive_utc() - Duration::days(1);

    debug!("Checking for accounts expired before {}", cutoff);

    let users = db.get_expire_candidates(cutoff).await?;
    let count = users.len();

    let db = Arc::clone(db);
    let ctl = Arc::clone(ctl);

    run_batch(users, max_workers, move |user| {
        let db = Arc::clone(&db);
        let ctl = Arc::clone(&ctl);
        async move {
            let now = Utc::now().naive_utc();

            if let Err(e) = db.deactivate_user(user.id, now).await {
                error!(username = %user.username, error = %e, "Failed to deactivate account");
                return;
            }

            if let Err(e) = ctl.disconnect_user(&user.username).await {
                error!(username = %user.username, error = %e, "Failed to disconnect account");
            }
            if let Err(e) = ctl.lock_user(&user.username).await {
                error!(username = %user.username, error = %e, "Failed to lock account");
            }

            info!(username = %user.username, "Account expired and locked");
        }
    })
    .await;

    Ok(count)
}
