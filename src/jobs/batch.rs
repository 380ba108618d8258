//! Bounded-concurrency batch executor.
//!
//! Every per-user job pass goes through [`run_batch`]: a fixed pool of
//! semaphore permits caps the number of in-flight units, and the call only
//! returns once every dispatched unit has finished. Units are independent;
//! a failing unit logs inside its own closure and never aborts the batch.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

use crate::db::VpnUser;

/// Run `work` over every user with at most `max_workers` units in flight.
///
/// Dispatch order follows the input sequence, but completion order is
/// unspecified. The returned future resolves only after the last unit has
/// completed, so callers can sequence checkpoint updates after it.
pub async fn run_batch<F, Fut>(users: Vec<VpnUser>, max_workers: usize, work: F)
where
    F: Fn(VpnUser) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let gate = Arc::new(Semaphore::new(max_workers.max(1)));
    let mut units = JoinSet::new();

    for user in users {
        // The gate is never closed, so acquisition only fails if the
        // semaphore is dropped, which cannot happen while we hold it.
        let permit = match Arc::clone(&gate).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let unit = work(user);
        units.spawn(async move {
            let _permit = permit;
            unit.await;
        });
    }

    // Join barrier: drain every unit before returning.
    while let Some(joined) = units.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Batch unit panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_user(id: i64) -> VpnUser {
        VpnUser {
            id,
            username: format!("user{id}"),
            expire_at: None,
            deactivated_at: None,
            is_locked: false,
            traffic_type: "free".to_string(),
            rx: 0,
            tx: 0,
        }
    }

    #[tokio::test]
    async fn caps_in_flight_units_and_processes_all() {
        let users: Vec<VpnUser> = (0..25).map(test_user).collect();

        let in_flight = Arc::new(AtomicUsize::new(0));
        let high_water = Arc::new(AtomicUsize::new(0));
        let processed = Arc::new(AtomicUsize::new(0));

        let in_flight_ref = Arc::clone(&in_flight);
        let high_water_ref = Arc::clone(&high_water);
        let processed_ref = Arc::clone(&processed);

        run_batch(users, 10, move |_user| {
            let in_flight = Arc::clone(&in_flight_ref);
            let high_water = Arc::clone(&high_water_ref);
            let processed = Arc::clone(&processed_ref);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                high_water.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                processed.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        assert_eq!(processed.load(Ordering::SeqCst), 25);
        assert!(high_water.load(Ordering::SeqCst) <= 10);
        // With 25 units and a 20ms hold the gate should actually fill up.
        assert!(high_water.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn returns_only_after_the_last_unit() {
        let users: Vec<VpnUser> = (0..5).map(test_user).collect();
        let done = Arc::new(AtomicUsize::new(0));

        let done_ref = Arc::clone(&done);
        run_batch(users, 2, move |user| {
            let done = Arc::clone(&done_ref);
            async move {
                // Stagger completions so the last one lands well after the first.
                tokio::time::sleep(Duration::from_millis(10 * (user.id as u64 + 1))).await;
                done.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        assert_eq!(done.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn one_failing_unit_does_not_block_the_rest() {
        let users: Vec<VpnUser> = (0..25).map(test_user).collect();
        let completed = Arc::new(AtomicUsize::new(0));

        let completed_ref = Arc::clone(&completed);
        run_batch(users, 10, move |user| {
            let completed = Arc::clone(&completed_ref);
            async move {
                if user.id == 13 {
                    // A unit that gives up early, the way a unit with a
                    // failed row update skips its control plane calls.
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
                completed.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        assert_eq!(completed.load(Ordering::SeqCst), 24);
    }

    #[tokio::test]
    async fn empty_candidate_set_returns_immediately() {
        run_batch(Vec::new(), 10, |_user| async {}).await;
    }
}
