//! Inactive account purge job.
//!
//! Permanently deletes accounts whose expiry passed longer ago than the
//! configured retention window. This is a single set-based delete; no per-row
//! iteration and no control plane calls. VPN-side state for deleted accounts
//! is deliberately left alone.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::Database;

use super::JobError;

/// Check for and bulk-delete long-inactive accounts.
///
/// Reads the system settings row first; a missing row aborts this run only.
/// Two guards, each logged and skipped without escalation:
/// - `auto_delete_inactive_users` must be enabled
/// - `keep_inactive_user_days` must be at least 1
///
/// With both satisfied, deletes every account whose `expire_at` is set and
/// at or before `NOW() - keep_inactive_user_days`.
///
/// Returns the number of rows deleted.
pub async fn run_inactive_user_purge(db: &Arc<Database>) -> Result<u64, JobError> {
    let settings = match db.get_settings().await? {
        Some(settings) => settings,
        None => {
            return Err(JobError::ConfigError(
                "system settings row is missing".to_string(),
            ));
        }
    };

    if !settings.auto_delete_inactive_users {
        warn!("Account auto-delete is disabled");
        return Ok(0);
    }

    if settings.keep_inactive_user_days < 1 {
        warn!("Account retention window is shorter than 1 day");
        return Ok(0);
    }

    let cutoff = Utc::now().naive_utc() - Duration::days(settings.keep_inactive_user_days);
    let rows = db.delete_inactive_users(cutoff).await?;

    if rows > 0 {
        info!("Purge pass: {} inactive accounts deleted", rows);
    }

    Ok(rows)
}
