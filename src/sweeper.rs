//! Background purge of expired sessions and stale login attempts.

use chrono::Duration;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::clock::Clock;
use crate::db::repository::Store;
use crate::Result;

const MIN_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: std::time::Duration,
    pub attempt_retention: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: std::time::Duration::from_secs(24 * 60 * 60),
            attempt_retention: Duration::days(30),
        }
    }
}

impl From<&crate::config::SweeperConfig> for SweeperConfig {
    fn from(settings: &crate::config::SweeperConfig) -> Self {
        Self {
            interval: std::time::Duration::from_secs(settings.interval_hours * 60 * 60),
            attempt_retention: Duration::days(settings.attempt_retention_days),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions_removed: u64,
    pub attempts_removed: u64,
}

pub struct ExpirySweeper {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    config: SweeperConfig,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: SweeperConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// One pass. The two deletes are independent: a failure in the first
    /// does not prevent the second, and the first error is returned.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let sessions = self.store.delete_expired_sessions(now).await;
        let attempts = self
            .store
            .delete_attempts_before(now - self.config.attempt_retention)
            .await;

        match (sessions, attempts) {
            (Ok(sessions_removed), Ok(attempts_removed)) => Ok(SweepReport {
                sessions_removed,
                attempts_removed,
            }),
            (Err(e), other) => {
                if let Err(second) = other {
                    error!("Failed to cleanup old login attempts: {}", second);
                }
                Err(e)
            }
            (Ok(_), Err(e)) => Err(e),
        }
    }

    /// Runs a pass immediately, then once per interval until stopped.
    /// Failed passes are logged and the schedule carries on.
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        // tokio's interval panics on a zero period
        let period = self.config.interval.max(MIN_INTERVAL);

        let join = tokio::spawn(async move {
            info!("Starting expiry sweeper (every {:?})", period);
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.sweep().await {
                            Ok(report) => {
                                if report.sessions_removed > 0 || report.attempts_removed > 0 {
                                    info!(
                                        "Cleaned up {} expired sessions and {} old login attempts",
                                        report.sessions_removed, report.attempts_removed
                                    );
                                }
                            }
                            Err(e) => error!("Expiry sweep failed: {}", e),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Expiry sweeper stopped");
        });

        SweeperHandle { shutdown_tx, join }
    }
}

pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the task and waits for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            error!("Expiry sweeper task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::memory::MemoryStore;
    use crate::db::models::{Account, FailReason, LoginAttempt, Origin, Session};
    use crate::db::repository::MockStore;
    use crate::error::{AppError, DatabaseError};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session_expiring_at(account: &Account, token: &str, at: chrono::DateTime<Utc>) -> Session {
        let lifetime = Duration::days(30);
        Session::new(
            account.id,
            format!("{token}-access"),
            format!("{token}-refresh"),
            Origin::new("10.0.0.1", "test-agent"),
            at - lifetime,
            lifetime,
        )
    }

    #[tokio::test]
    async fn test_sweep_removes_exactly_the_expired_session() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let clock = ManualClock::new(now);
        let account = Account::new("a@x.com".into(), "A".into(), "hash".into(), now);

        let expired = session_expiring_at(&account, "expired", now - Duration::minutes(1));
        let live = session_expiring_at(&account, "live", now + Duration::minutes(1));
        store.insert_session(&expired).await.unwrap();
        store.insert_session(&live).await.unwrap();

        let sweeper = ExpirySweeper::new(Arc::new(store.clone()), Arc::new(clock), SweeperConfig::default());
        let report = sweeper.sweep().await.unwrap();

        assert_eq!(report.sessions_removed, 1);
        assert!(store.find_session_by_access_token("expired-access").await.unwrap().is_none());
        assert!(store.find_session_by_access_token("live-access").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_applies_attempt_retention() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let stale = LoginAttempt::failed(
            "a@x.com".into(),
            "1.1.1.1".into(),
            FailReason::InvalidCredentials,
            now - Duration::days(31),
        );
        let recent = LoginAttempt::succeeded("a@x.com".into(), "1.1.1.1".into(), now - Duration::days(29));
        store.insert_login_attempt(&stale).await.unwrap();
        store.insert_login_attempt(&recent).await.unwrap();

        let sweeper = ExpirySweeper::new(
            Arc::new(store.clone()),
            Arc::new(ManualClock::new(now)),
            SweeperConfig::default(),
        );
        let report = sweeper.sweep().await.unwrap();

        assert_eq!(report.attempts_removed, 1);
        assert_eq!(store.login_attempts().await, vec![recent]);
    }

    #[tokio::test]
    async fn test_sweep_still_purges_attempts_when_sessions_fail() {
        let mut store = MockStore::new();
        store
            .expect_delete_expired_sessions()
            .returning(|_| Err(AppError::DatabaseError(DatabaseError::ConnectionError("down".into()))));
        store.expect_delete_attempts_before().times(1).returning(|_| Ok(3));

        let sweeper = ExpirySweeper::new(
            Arc::new(store),
            Arc::new(ManualClock::new(Utc::now())),
            SweeperConfig::default(),
        );
        assert!(sweeper.sweep().await.is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_schedule_survives_failures_and_stops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut store = MockStore::new();
        store.expect_delete_expired_sessions().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AppError::DatabaseError(DatabaseError::QueryError("boom".into())))
        });
        store.expect_delete_attempts_before().returning(|_| Ok(0));

        let sweeper = ExpirySweeper::new(
            Arc::new(store),
            Arc::new(ManualClock::new(Utc::now())),
            SweeperConfig {
                interval: std::time::Duration::from_millis(10),
                attempt_retention: Duration::days(30),
            },
        );

        let handle = sweeper.start();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        handle.stop().await;

        let runs = calls.load(Ordering::SeqCst);
        assert!(runs >= 2, "expected repeated passes despite failures, got {}", runs);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), runs, "no passes after stop");
    }

    #[tokio::test]
    async fn test_zero_interval_is_clamped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut store = MockStore::new();
        store.expect_delete_expired_sessions().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        });
        store.expect_delete_attempts_before().returning(|_| Ok(0));

        let handle = ExpirySweeper::new(
            Arc::new(store),
            Arc::new(ManualClock::new(Utc::now())),
            SweeperConfig {
                interval: std::time::Duration::ZERO,
                attempt_retention: Duration::days(30),
            },
        )
        .start();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.stop().await;

        // The first pass ran and the task did not panic on the zero period
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_pass_runs_at_start() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let account = Account::new("a@x.com".into(), "A".into(), "hash".into(), now);
        store
            .insert_session(&session_expiring_at(&account, "expired", now - Duration::minutes(1)))
            .await
            .unwrap();

        let sweeper = ExpirySweeper::new(
            Arc::new(store.clone()),
            Arc::new(ManualClock::new(now)),
            SweeperConfig::default(),
        );
        let handle = sweeper.start();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.stop().await;

        assert_eq!(store.session_count().await, 0);
    }
}
