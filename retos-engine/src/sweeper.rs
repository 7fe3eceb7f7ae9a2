//! Background lifecycle sweeper.
//!
//! Two periodic duties:
//! - finalize challenges whose end date has passed, each in its own
//!   transaction so one bad row cannot block the rest;
//! - purge notifications past the retention window (individual rows
//!   only once read; group rows purely by age, since their read state
//!   is spread across per-user records).
//!
//! Both duties are also callable directly for a run-now trigger.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use retos_core::{ChallengeId, ChallengeState, DomainEvent, EngineResult, NotificationId};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::Engine;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Sweeper configuration.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to run a sweep cycle.
    pub check_interval: Duration,
    /// Notification retention window in days.
    pub retention_days: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(3600),
            retention_days: 30,
        }
    }
}

impl SweeperConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            check_interval: std::env::var("RETOS_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.check_interval),
            retention_days: std::env::var("RETOS_NOTIFICATION_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retention_days),
        }
    }

    /// Short intervals for local development.
    pub fn development() -> Self {
        Self {
            check_interval: Duration::from_secs(10),
            retention_days: 1,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for sweeper activity.
#[derive(Debug, Default)]
pub struct SweeperMetrics {
    pub challenges_finalized: AtomicU64,
    pub notifications_purged: AtomicU64,
    pub sweep_cycles: AtomicU64,
    pub sweep_errors: AtomicU64,
}

/// Point-in-time snapshot of [`SweeperMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperMetricsSnapshot {
    pub challenges_finalized: u64,
    pub notifications_purged: u64,
    pub sweep_cycles: u64,
    pub sweep_errors: u64,
}

impl SweeperMetrics {
    pub fn snapshot(&self) -> SweeperMetricsSnapshot {
        SweeperMetricsSnapshot {
            challenges_finalized: self.challenges_finalized.load(Ordering::Relaxed),
            notifications_purged: self.notifications_purged.load(Ordering::Relaxed),
            sweep_cycles: self.sweep_cycles.load(Ordering::Relaxed),
            sweep_errors: self.sweep_errors.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// SWEEP DUTIES
// ============================================================================

/// Finalize every active challenge whose end date has passed.
///
/// Each challenge is finalized in its own transaction: the state flip,
/// the group notification and the audit record commit together, and a
/// failure on one challenge is logged and skipped. Idempotent: an
/// already-finished challenge is never picked up again.
pub fn finalize_expired_challenges(engine: &Engine) -> EngineResult<u64> {
    let now = Utc::now();
    let expired: Vec<ChallengeId> = engine.store.read(|tx| {
        tx.challenges()
            .filter(|c| c.state == ChallengeState::Active && c.ends_at <= now)
            .map(|c| c.challenge_id)
            .collect()
    })?;

    let mut finalized = 0u64;
    for challenge_id in expired {
        let result = engine.store.transaction(|tx| {
            // Re-check under the write lock.
            let challenge = match tx.challenge_mut(challenge_id) {
                Some(c) if c.state == ChallengeState::Active => c,
                _ => return Ok(None),
            };
            challenge.state = ChallengeState::Finished;
            let outcome = engine
                .pipeline
                .dispatch(tx, None, DomainEvent::ChallengeFinished { challenge_id })?;
            Ok(Some(outcome))
        });
        match result {
            Ok(Some(outcome)) => {
                finalized += 1;
                engine.push_live(&outcome);
                tracing::info!(%challenge_id, "Challenge finalized");
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(%challenge_id, error = %err, "Failed to finalize challenge");
            }
        }
    }
    Ok(finalized)
}

/// Purge notifications past the retention window.
///
/// Individual rows must be read before they are eligible; group rows
/// are purged purely by age along with their per-user read records.
pub fn purge_stale_notifications(engine: &Engine, retention_days: i64) -> EngineResult<u64> {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);
    engine.store.transaction(|tx| {
        let stale: Vec<NotificationId> = tx
            .notifications()
            .filter(|n| n.created_at < cutoff)
            .filter(|n| n.is_group() || n.read)
            .map(|n| n.notification_id)
            .collect();
        for notification_id in &stale {
            tx.notification_delete(*notification_id);
        }
        if !stale.is_empty() {
            tracing::info!(purged = stale.len(), "Purged stale notifications");
        }
        Ok(stale.len() as u64)
    })
}

fn run_sweep(engine: &Engine, config: &SweeperConfig, metrics: &SweeperMetrics) {
    match finalize_expired_challenges(engine) {
        Ok(count) => {
            metrics
                .challenges_finalized
                .fetch_add(count, Ordering::Relaxed);
        }
        Err(err) => {
            metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %err, "Challenge finalization sweep failed");
        }
    }
    match purge_stale_notifications(engine, config.retention_days) {
        Ok(count) => {
            metrics
                .notifications_purged
                .fetch_add(count, Ordering::Relaxed);
        }
        Err(err) => {
            metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %err, "Notification purge sweep failed");
        }
    }
    metrics.sweep_cycles.fetch_add(1, Ordering::Relaxed);
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Run the sweeper until the shutdown signal flips to true.
pub async fn sweeper_task(
    engine: Engine,
    config: SweeperConfig,
    metrics: Arc<SweeperMetrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::info!(
        interval_secs = config.check_interval.as_secs(),
        retention_days = config.retention_days,
        "Lifecycle sweeper started"
    );
    let mut interval = tokio::time::interval(config.check_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_sweep(&engine, &config, &metrics);
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Lifecycle sweeper shutting down");
                    break;
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{catalog, participation};
    use retos_core::NotificationKind;

    fn engine_with_expired_challenge() -> (Engine, ChallengeId) {
        let engine = Engine::new();
        let creator = catalog::create_user(&engine, "ana").unwrap();
        let challenge = catalog::create_challenge(
            &engine,
            creator.user_id,
            "reto caducado",
            Utc::now() - chrono::Duration::days(10),
            Utc::now() - chrono::Duration::days(1),
        )
        .unwrap();
        (engine, challenge.challenge_id)
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let (engine, challenge_id) = engine_with_expired_challenge();

        assert_eq!(finalize_expired_challenges(&engine).unwrap(), 1);
        assert_eq!(finalize_expired_challenges(&engine).unwrap(), 0);

        let state = engine
            .store
            .read(|tx| tx.challenge_get(challenge_id).unwrap().state)
            .unwrap();
        assert_eq!(state, ChallengeState::Finished);
    }

    #[test]
    fn test_finalize_notifies_participants_once() {
        let (engine, challenge_id) = engine_with_expired_challenge();
        let member = catalog::create_user(&engine, "leo").unwrap();
        participation::join_challenge(&engine, challenge_id, member.user_id).unwrap();

        finalize_expired_challenges(&engine).unwrap();
        finalize_expired_challenges(&engine).unwrap();

        let group_rows = engine
            .store
            .read(|tx| {
                tx.notifications()
                    .filter(|n| n.kind == NotificationKind::ChallengeFinished)
                    .count()
            })
            .unwrap();
        assert_eq!(group_rows, 1);
    }

    #[test]
    fn test_purge_respects_read_state_and_age() {
        let engine = Engine::new();
        let user = catalog::create_user(&engine, "ana").unwrap();

        engine
            .store
            .transaction(|tx| {
                // Old and read: purged.
                let mut old_read = crate::notify::notify_user(
                    tx,
                    user.user_id,
                    NotificationKind::TaskAssigned,
                    serde_json::json!({}),
                )?;
                old_read.read = true;
                old_read.created_at = Utc::now() - chrono::Duration::days(60);
                let id = old_read.notification_id;
                *tx.notification_mut(id).unwrap() = old_read;

                // Old but unread: kept.
                let mut old_unread = crate::notify::notify_user(
                    tx,
                    user.user_id,
                    NotificationKind::TaskAssigned,
                    serde_json::json!({}),
                )?;
                old_unread.created_at = Utc::now() - chrono::Duration::days(60);
                let id = old_unread.notification_id;
                *tx.notification_mut(id).unwrap() = old_unread;

                // Recent and read: kept.
                let mut recent = crate::notify::notify_user(
                    tx,
                    user.user_id,
                    NotificationKind::TaskAssigned,
                    serde_json::json!({}),
                )?;
                recent.read = true;
                let id = recent.notification_id;
                *tx.notification_mut(id).unwrap() = recent;
                Ok(())
            })
            .unwrap();

        assert_eq!(purge_stale_notifications(&engine, 30).unwrap(), 1);
        let remaining = engine.store.read(|tx| tx.notifications().count()).unwrap();
        assert_eq!(remaining, 2);
    }

    #[test]
    fn test_purge_drops_old_group_rows_regardless_of_reads() {
        let engine = Engine::new();
        let challenge_id = retos_core::new_entity_id();

        engine
            .store
            .transaction(|tx| {
                let mut group = crate::notify::notify_group(
                    tx,
                    challenge_id,
                    NotificationKind::ChallengeFinished,
                    serde_json::json!({}),
                )?;
                group.created_at = Utc::now() - chrono::Duration::days(45);
                let id = group.notification_id;
                *tx.notification_mut(id).unwrap() = group;
                Ok(())
            })
            .unwrap();

        assert_eq!(purge_stale_notifications(&engine, 30).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_task_honors_shutdown() {
        let engine = Engine::new();
        let metrics = Arc::new(SweeperMetrics::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(sweeper_task(
            engine,
            SweeperConfig {
                check_interval: Duration::from_millis(10),
                retention_days: 30,
            },
            metrics.clone(),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(metrics.snapshot().sweep_cycles >= 1);
    }
}
