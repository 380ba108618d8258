//! Database abstraction for the subscriber store.
//!
//! The schema itself is owned by the management API; this crate only reads
//! and updates the columns involved in lifecycle transitions, plus the
//! singleton settings row that gates the inactive-user purge.

use chrono::NaiveDateTime;
use sqlx::{query, query_as, FromRow};
use std::sync::Arc;
use tracing::error;

#[cfg(feature = "sqlite")]
use sqlx::SqlitePool;

#[cfg(feature = "postgres")]
use sqlx::PgPool;

use crate::config::get_config;
use crate::errors::{VigilError, VigilResult};

/// Traffic accounting mode of a subscriber account.
///
/// Monthly modes carry a quota that resets at the start of each month;
/// total modes carry a lifetime quota; free accounts are unmetered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficType {
    Free,
    MonthlyReceive,
    MonthlyTransmit,
    TotalReceive,
    TotalTransmit,
}

impl TrafficType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficType::Free => "free",
            TrafficType::MonthlyReceive => "monthly_receive",
            TrafficType::MonthlyTransmit => "monthly_transmit",
            TrafficType::TotalReceive => "total_receive",
            TrafficType::TotalTransmit => "total_transmit",
        }
    }
}

impl std::fmt::Display for TrafficType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents a subscriber account row in the `ocserv_users` table.
#[derive(Debug, Clone, FromRow)]
pub struct VpnUser {
    pub id: i64,
    pub username: String,
    pub expire_at: Option<NaiveDateTime>,
    pub deactivated_at: Option<NaiveDateTime>,
    pub is_locked: bool,
    pub traffic_type: String,
    pub rx: i64,
    pub tx: i64,
}

/// Singleton system settings row controlling the inactive-user purge.
#[derive(Debug, Clone, FromRow)]
pub struct SystemSettings {
    pub auto_delete_inactive_users: bool,
    pub keep_inactive_user_days: i64,
}

/// Unified database abstraction over SQLite and Postgres.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

impl Database {
    /// Initialize the database connection based on configuration.
    ///
    /// Uses the global configuration from `config.toml` and environment
    /// variables. See `crate::config` for configuration options.
    pub async fn new() -> VigilResult<Arc<Self>> {
        let config = get_config()?;
        let db_config = &config.database;

        match db_config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let pool = SqlitePool::connect(&db_config.sqlite_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to SQLite: {e}");
                        VigilError::ServerError(format!("failed to connect to SQLite: {e}"))
                    })?;

                Ok(Arc::new(Database::SQLite(pool)))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(VigilError::ConfigError(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPool::connect(&db_config.postgres_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to PostgreSQL: {e}");
                        VigilError::ServerError(format!("failed to connect to PostgreSQL: {e}"))
                    })?;

                Ok(Arc::new(Database::Postgres(pool)))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(VigilError::ConfigError(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(VigilError::ConfigError(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// Fetch accounts due for expiry.
    ///
    /// Selects rows where:
    /// - `expire_at` is set and precedes `cutoff`
    /// - `deactivated_at` is not set
    pub async fn get_expire_candidates(
        &self,
        cutoff: NaiveDateTime,
    ) -> VigilResult<Vec<VpnUser>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let users = query_as::<_, VpnUser>(
                    "SELECT * FROM ocserv_users \
                     WHERE expire_at IS NOT NULL \
                       AND deactivated_at IS NULL \
                       AND expire_at < ?",
                )
                .bind(cutoff)
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    error!("SQLite get_expire_candidates failed: {e}");
                    VigilError::ServerError(format!("database error: {e}"))
                })?;

                Ok(users)
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let users = query_as::<_, VpnUser>(
                    "SELECT * FROM ocserv_users \
                     WHERE expire_at IS NOT NULL \
                       AND deactivated_at IS NULL \
                       AND expire_at < $1",
                )
                .bind(cutoff)
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    error!("Postgres get_expire_candidates failed: {e}");
                    VigilError::ServerError(format!("database error: {e}"))
                })?;

                Ok(users)
            }
        }
    }

    /// Mark an account as deactivated and locked.
    pub async fn deactivate_user(&self, id: i64, now: NaiveDateTime) -> VigilResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(
                    "UPDATE ocserv_users \
                     SET deactivated_at = ?, is_locked = ? \
                     WHERE id = ?",
                )
                .bind(now)
                .bind(true)
                .bind(id)
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("SQLite deactivate_user failed: {e}");
                    VigilError::ServerError(format!("database error: {e}"))
                })?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(
                    "UPDATE ocserv_users \
                     SET deactivated_at = $1, is_locked = $2 \
                     WHERE id = $3",
                )
                .bind(now)
                .bind(true)
                .bind(id)
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("Postgres deactivate_user failed: {e}");
                    VigilError::ServerError(format!("database error: {e}"))
                })?;
            }
        }

        Ok(())
    }

    /// Fetch deactivated monthly-quota accounts eligible for reactivation.
    ///
    /// Selects rows where:
    /// - `expire_at` is unset or later than `today`
    /// - `deactivated_at` is set
    /// - `traffic_type` is one of the monthly quota modes
    pub async fn get_monthly_candidates(
        &self,
        today: NaiveDateTime,
    ) -> VigilResult<Vec<VpnUser>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let users = query_as::<_, VpnUser>(
                    "SELECT * FROM ocserv_users \
                     WHERE (expire_at IS NULL OR expire_at > ?) \
                       AND deactivated_at IS NOT NULL \
                       AND traffic_type IN (?, ?)",
                )
                .bind(today)
                .bind(TrafficType::MonthlyReceive.as_str())
                .bind(TrafficType::MonthlyTransmit.as_str())
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    error!("SQLite get_monthly_candidates failed: {e}");
                    VigilError::ServerError(format!("database error: {e}"))
                })?;

                Ok(users)
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let users = query_as::<_, VpnUser>(
                    "SELECT * FROM ocserv_users \
                     WHERE (expire_at IS NULL OR expire_at > $1) \
                       AND deactivated_at IS NOT NULL \
                       AND traffic_type IN ($2, $3)",
                )
                .bind(today)
                .bind(TrafficType::MonthlyReceive.as_str())
                .bind(TrafficType::MonthlyTransmit.as_str())
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    error!("Postgres get_monthly_candidates failed: {e}");
                    VigilError::ServerError(format!("database error: {e}"))
                })?;

                Ok(users)
            }
        }
    }

    /// Reset an account's traffic counters and reactivate it.
    pub async fn reactivate_user(&self, id: i64) -> VigilResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(
                    "UPDATE ocserv_users \
                     SET rx = 0, tx = 0, deactivated_at = NULL, is_locked = ? \
                     WHERE id = ?",
                )
                .bind(false)
                .bind(id)
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("SQLite reactivate_user failed: {e}");
                    VigilError::ServerError(format!("database error: {e}"))
                })?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(
                    "UPDATE ocserv_users \
                     SET rx = 0, tx = 0, deactivated_at = NULL, is_locked = $1 \
                     WHERE id = $2",
                )
                .bind(false)
                .bind(id)
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("Postgres reactivate_user failed: {e}");
                    VigilError::ServerError(format!("database error: {e}"))
                })?;
            }
        }

        Ok(())
    }

    /// Delete every account whose `expire_at` is set and at or before `cutoff`.
    ///
    /// Returns the number of rows deleted.
    pub async fn delete_inactive_users(&self, cutoff: NaiveDateTime) -> VigilResult<u64> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query("DELETE FROM ocserv_users WHERE expire_at IS NOT NULL AND expire_at <= ?")
                    .bind(cutoff)
                    .execute(pool)
                    .await
                    .map_err(|e| {
                        error!("SQLite delete_inactive_users failed: {e}");
                        VigilError::ServerError(format!("database error: {e}"))
                    })?
                    .rows_affected()
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query("DELETE FROM ocserv_users WHERE expire_at IS NOT NULL AND expire_at <= $1")
                    .bind(cutoff)
                    .execute(pool)
                    .await
                    .map_err(|e| {
                        error!("Postgres delete_inactive_users failed: {e}");
                        VigilError::ServerError(format!("database error: {e}"))
                    })?
                    .rows_affected()
            }
        };

        Ok(rows_affected)
    }

    /// Fetch the singleton system settings row.
    ///
    /// Returns:
    /// - `Ok(Some(SystemSettings))` if the row exists
    /// - `Ok(None)` if settings were never written
    /// - `Err(VigilError::ServerError)` on DB failure
    pub async fn get_settings(&self) -> VigilResult<Option<SystemSettings>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let settings = query_as::<_, SystemSettings>(
                    "SELECT auto_delete_inactive_users, keep_inactive_user_days \
                     FROM system_settings LIMIT 1",
                )
                .fetch_optional(pool)
                .await
                .map_err(|e| {
                    error!("SQLite get_settings failed: {e}");
                    VigilError::ServerError(format!("database error: {e}"))
                })?;

                Ok(settings)
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let settings = query_as::<_, SystemSettings>(
                    "SELECT auto_delete_inactive_users, keep_inactive_user_days \
                     FROM system_settings LIMIT 1",
                )
                .fetch_optional(pool)
                .await
                .map_err(|e| {
                    error!("Postgres get_settings failed: {e}");
                    VigilError::ServerError(format!("database error: {e}"))
                })?;

                Ok(settings)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traffic_type_string_forms() {
        assert_eq!(TrafficType::Free.as_str(), "free");
        assert_eq!(TrafficType::MonthlyReceive.as_str(), "monthly_receive");
        assert_eq!(TrafficType::MonthlyTransmit.as_str(), "monthly_transmit");
        assert_eq!(TrafficType::TotalReceive.as_str(), "total_receive");
        assert_eq!(TrafficType::TotalTransmit.as_str(), "total_transmit");
    }
}
