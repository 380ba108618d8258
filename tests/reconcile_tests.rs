//! Integration tests for startup reconciliation.

#![cfg(feature = "sqlite")]

use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use vigil::db::{Database, TrafficType};
use vigil::jobs::{run_missed_jobs, Checkpoint, JobError};
use vigil::ocserv::{DirectOcctl, OcservController};

async fn setup_test_db() -> Arc<Database> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to create database");

    sqlx::query(
        r#"
        CREATE TABLE ocserv_users (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            username        TEXT NOT NULL UNIQUE,
            expire_at       TEXT,
            deactivated_at  TEXT,
            is_locked       INTEGER NOT NULL DEFAULT 0,
            traffic_type    TEXT NOT NULL DEFAULT 'free',
            rx              INTEGER NOT NULL DEFAULT 0,
            tx              INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(&pool)
    .await
    .expect("failed to create ocserv_users table");

    sqlx::query(
        r#"
        CREATE TABLE system_settings (
            id                          INTEGER PRIMARY KEY,
            auto_delete_inactive_users  INTEGER NOT NULL DEFAULT 0,
            keep_inactive_user_days     INTEGER NOT NULL DEFAULT 30
        )
        "#,
    )
    .execute(&pool)
    .await
    .expect("failed to create system_settings table");

    sqlx::query(
        "INSERT INTO system_settings (id, auto_delete_inactive_users, keep_inactive_user_days) \
         VALUES (1, 1, 30)",
    )
    .execute(&pool)
    .await
    .expect("failed to insert settings");

    Arc::new(Database::SQLite(pool))
}

async fn create_overdue_user(db: &Database, username: &str) {
    let expire_at = Utc::now().naive_utc() - Duration::days(3);
    match db {
        Database::SQLite(pool) => {
            sqlx::query(
                "INSERT INTO ocserv_users (username, expire_at, traffic_type) VALUES (?, ?, ?)",
            )
            .bind(username)
            .bind(expire_at)
            .bind(TrafficType::Free.as_str())
            .execute(pool)
            .await
            .expect("failed to insert user");
        }
        #[cfg(feature = "postgres")]
        Database::Postgres(_) => {
            panic!("PostgreSQL not supported in tests");
        }
    }
}

async fn is_deactivated(db: &Database, username: &str) -> bool {
    match db {
        Database::SQLite(pool) => {
            let row: (bool,) = sqlx::query_as(
                "SELECT deactivated_at IS NOT NULL FROM ocserv_users WHERE username = ?",
            )
            .bind(username)
            .fetch_one(pool)
            .await
            .expect("failed to fetch user");
            row.0
        }
        #[cfg(feature = "postgres")]
        Database::Postgres(_) => {
            panic!("PostgreSQL not supported in tests");
        }
    }
}

fn working_controller() -> Arc<OcservController> {
    Arc::new(OcservController::Direct(DirectOcctl::new(
        "true",
        "true",
        "/dev/null",
        CancellationToken::new(),
    )))
}

fn test_state_file(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("vigil-reconcile-{name}"));
    let _ = std::fs::remove_dir_all(&dir);
    dir.join("cron-state.json")
}

#[tokio::test]
async fn replays_a_missed_daily_run_exactly_once() {
    let db = setup_test_db().await;
    let state_file = test_state_file("missed-daily");

    let today = Utc::now().date_naive();
    let stale = Checkpoint {
        daily_last_run: Some(today - Duration::days(1)),
        monthly_last_run: Some(today),
    };
    stale.save(&state_file).expect("failed to seed state");

    create_overdue_user(&db, "alice").await;

    run_missed_jobs(&db, &working_controller(), 10, &state_file)
        .await
        .expect("reconciliation failed");

    assert!(is_deactivated(&db, "alice").await);
    let saved = Checkpoint::load(&state_file);
    assert_eq!(saved.daily_last_run, Some(today));

    // Same day, second invocation: the daily family must not run again.
    create_overdue_user(&db, "bob").await;

    run_missed_jobs(&db, &working_controller(), 10, &state_file)
        .await
        .expect("reconciliation failed");

    assert!(!is_deactivated(&db, "bob").await);
}

#[tokio::test]
async fn fresh_state_runs_the_daily_family() {
    let db = setup_test_db().await;
    let state_file = test_state_file("fresh-state");

    create_overdue_user(&db, "carol").await;

    // No state file at all: everything daily is considered missed.
    run_missed_jobs(&db, &working_controller(), 10, &state_file)
        .await
        .expect("reconciliation failed");

    assert!(is_deactivated(&db, "carol").await);
    let saved = Checkpoint::load(&state_file);
    assert_eq!(saved.daily_last_run, Some(Utc::now().date_naive()));
}

#[tokio::test]
async fn unsaveable_state_aborts_startup() {
    let db = setup_test_db().await;

    // /proc is not writable; the save at the end of reconciliation must fail
    // and the failure must escalate instead of being swallowed.
    let state_file = PathBuf::from("/proc/vigil-test/cron-state.json");

    let err = run_missed_jobs(&db, &working_controller(), 10, &state_file)
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::StorageError(_)));
}
