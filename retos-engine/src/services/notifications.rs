//! Notification queries and read-state operations.

use retos_core::{AuditRecord, EngineResult, Notification, NotificationId, UserId};

use crate::audit::{self, AuditFilter};
use crate::{notify, Engine};

/// Notifications visible to a user, newest first, paged. The limit is
/// clamped to the configured page-size ceiling.
pub fn list_notifications(
    engine: &Engine,
    user_id: UserId,
    limit: usize,
    offset: usize,
) -> EngineResult<Vec<Notification>> {
    let limit = limit.min(engine.config.max_page_size);
    engine
        .store
        .read(|tx| notify::list_notifications(tx, user_id, limit, offset))
}

pub fn unread_count(engine: &Engine, user_id: UserId) -> EngineResult<i64> {
    engine.store.read(|tx| notify::unread_count(tx, user_id))
}

pub fn mark_read(
    engine: &Engine,
    notification_id: NotificationId,
    user_id: UserId,
) -> EngineResult<()> {
    engine
        .store
        .transaction(|tx| notify::mark_read(tx, notification_id, user_id))
}

/// Mark everything visible and unread as read; returns the count.
pub fn mark_all_read(engine: &Engine, user_id: UserId) -> EngineResult<usize> {
    engine
        .store
        .transaction(|tx| notify::mark_all_read(tx, user_id))
}

/// Query the audit trail, newest first.
pub fn query_audit(engine: &Engine, filter: &AuditFilter) -> EngineResult<Vec<AuditRecord>> {
    engine.store.read(|tx| audit::query(tx, filter))
}
