//! Persisted cron state for the daily and monthly job families.
//!
//! A single JSON record on disk holds the last day each family completed.
//! It is loaded once at startup, mutated only by the coordinating task, and
//! written back after every successful family run.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::errors::{VigilError, VigilResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last day the daily family (expiry + purge) completed.
    pub daily_last_run: Option<NaiveDate>,
    /// Last day the monthly reactivation completed.
    pub monthly_last_run: Option<NaiveDate>,
}

impl Checkpoint {
    /// Load the checkpoint from `path`.
    ///
    /// A missing file is not an error; it yields the zero-value checkpoint,
    /// which makes both families due. An unreadable record is treated the
    /// same way after a warning.
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };

        match serde_json::from_str(&raw) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable cron state, starting fresh");
                Self::default()
            }
        }
    }

    /// Persist the checkpoint to `path` atomically.
    ///
    /// Writes a sibling temp file and renames it over the target so a crash
    /// mid-write never leaves a torn record behind.
    pub fn save(&self, path: &Path) -> VigilResult<()> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| VigilError::StorageError(format!("failed to encode cron state: {e}")))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    VigilError::StorageError(format!(
                        "failed to create state directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, raw).map_err(|e| {
            VigilError::StorageError(format!("failed to write {}: {e}", tmp.display()))
        })?;
        fs::rename(&tmp, path).map_err(|e| {
            VigilError::StorageError(format!("failed to replace {}: {e}", path.display()))
        })?;

        Ok(())
    }

    /// Whether the daily family still has to run for `today`.
    pub fn daily_due(&self, today: NaiveDate) -> bool {
        match self.daily_last_run {
            Some(last) => last < today,
            None => true,
        }
    }

    /// Whether the monthly family still has to run for `today`.
    ///
    /// Only due on the first calendar day of a month the family has not yet
    /// run in.
    pub fn monthly_due(&self, today: NaiveDate) -> bool {
        if today.day() != 1 {
            return false;
        }
        match self.monthly_last_run {
            Some(last) => (last.year(), last.month()) != (today.year(), today.month()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn daily_is_due_when_never_run() {
        let checkpoint = Checkpoint::default();
        assert!(checkpoint.daily_due(date(2025, 6, 15)));
    }

    #[test]
    fn daily_is_due_after_a_gap() {
        let checkpoint = Checkpoint {
            daily_last_run: Some(date(2025, 6, 10)),
            monthly_last_run: None,
        };
        assert!(checkpoint.daily_due(date(2025, 6, 15)));
    }

    #[test]
    fn daily_is_not_due_twice_the_same_day() {
        let checkpoint = Checkpoint {
            daily_last_run: Some(date(2025, 6, 15)),
            monthly_last_run: None,
        };
        assert!(!checkpoint.daily_due(date(2025, 6, 15)));
    }

    #[test]
    fn monthly_only_fires_on_the_first() {
        let checkpoint = Checkpoint::default();
        assert!(checkpoint.monthly_due(date(2025, 6, 1)));
        assert!(!checkpoint.monthly_due(date(2025, 6, 2)));
        assert!(!checkpoint.monthly_due(date(2025, 6, 15)));
    }

    #[test]
    fn monthly_is_not_due_twice_in_one_month() {
        let checkpoint = Checkpoint {
            daily_last_run: None,
            monthly_last_run: Some(date(2025, 6, 1)),
        };
        assert!(!checkpoint.monthly_due(date(2025, 6, 1)));
        assert!(checkpoint.monthly_due(date(2025, 7, 1)));
    }

    #[test]
    fn monthly_distinguishes_same_month_across_years() {
        let checkpoint = Checkpoint {
            daily_last_run: None,
            monthly_last_run: Some(date(2024, 6, 1)),
        };
        assert!(checkpoint.monthly_due(date(2025, 6, 1)));
    }

    #[test]
    fn load_returns_default_when_file_is_missing() {
        let path = std::env::temp_dir().join("vigil-checkpoint-missing/cron-state.json");
        let checkpoint = Checkpoint::load(&path);
        assert_eq!(checkpoint, Checkpoint::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir().join("vigil-checkpoint-roundtrip");
        let path = dir.join("cron-state.json");
        let _ = fs::remove_dir_all(&dir);

        let checkpoint = Checkpoint {
            daily_last_run: Some(date(2025, 6, 15)),
            monthly_last_run: Some(date(2025, 6, 1)),
        };
        checkpoint.save(&path).expect("save failed");

        assert_eq!(Checkpoint::load(&path), checkpoint);

        // Overwrite in place, as the scheduler does after every run.
        let updated = Checkpoint {
            daily_last_run: Some(date(2025, 6, 16)),
            monthly_last_run: Some(date(2025, 6, 1)),
        };
        updated.save(&path).expect("second save failed");
        assert_eq!(Checkpoint::load(&path), updated);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn save_into_unwritable_path_is_a_storage_error() {
        let path = Path::new("/proc/vigil-cannot-write-here/cron-state.json");
        let err = Checkpoint::default().save(path).unwrap_err();
        assert!(matches!(err, VigilError::StorageError(_)));
    }
}
