//! Notification dispatch and read-state tracking.
//!
//! Notifications are persisted rows first; the live push the service
//! layer performs after commit is best-effort on top. Two addressing
//! modes: individually addressed rows carry their own `read` flag,
//! group rows (addressed to a challenge's participants) track reads
//! through per-user [`NotificationRead`] records so the shared row is
//! never mutated.

use chrono::Utc;
use retos_core::{
    new_entity_id, ChallengeId, ConflictError, DomainEvent, EngineResult, Notification,
    NotificationId, NotificationKind, NotificationRead, StorageError, UserId,
};
use retos_storage::{Tables, TABLE_NOTIFICATIONS};
use serde_json::json;

use crate::live::LiveEvent;
use crate::pipeline::{
    CreatedNotification, CrossingDirection, EventContext, Reaction, ReactionOutcome,
};

pub struct NotificationDispatcher;

impl Reaction for NotificationDispatcher {
    fn name(&self) -> &'static str {
        "notifications"
    }

    fn react(
        &self,
        tx: &mut Tables,
        ctx: &EventContext,
        outcome: &mut ReactionOutcome,
    ) -> EngineResult<()> {
        // Completion crossings recorded by the progress state machine.
        let crossings = outcome.crossings.clone();
        for crossing in crossings {
            if crossing.direction != CrossingDirection::Completed {
                continue;
            }
            let notification = notify_user(
                tx,
                crossing.user_id,
                NotificationKind::ChallengeCompleted,
                json!({ "challenge_id": crossing.challenge_id }),
            )?;
            outcome.notifications.push(CreatedNotification {
                recipient_id: Some(crossing.user_id),
                kind: NotificationKind::ChallengeCompleted,
            });
            outcome.live_events.push((
                crossing.user_id,
                LiveEvent::ChallengeCompleted {
                    challenge_id: crossing.challenge_id,
                    user_id: crossing.user_id,
                },
            ));
            outcome.live_events.push((
                crossing.user_id,
                LiveEvent::NotificationCreated { notification },
            ));
        }

        // Grants recorded by the reward evaluator.
        let grants = outcome.grants.clone();
        for grant in grants {
            let notification = notify_user(
                tx,
                grant.user_id,
                NotificationKind::RewardGranted,
                json!({ "reward_id": grant.reward_id, "name": grant.name }),
            )?;
            outcome.notifications.push(CreatedNotification {
                recipient_id: Some(grant.user_id),
                kind: NotificationKind::RewardGranted,
            });
            outcome.live_events.push((
                grant.user_id,
                LiveEvent::RewardGranted {
                    user_id: grant.user_id,
                    reward_id: grant.reward_id,
                    name: grant.name.clone(),
                },
            ));
            outcome.live_events.push((
                grant.user_id,
                LiveEvent::NotificationCreated { notification },
            ));
        }

        match ctx.event {
            DomainEvent::TaskPrincipalReassigned {
                task_id,
                assignee: Some(assignee),
                ..
            } => {
                let notification = notify_user(
                    tx,
                    assignee,
                    NotificationKind::TaskAssigned,
                    json!({ "task_id": task_id }),
                )?;
                outcome.notifications.push(CreatedNotification {
                    recipient_id: Some(assignee),
                    kind: NotificationKind::TaskAssigned,
                });
                outcome
                    .live_events
                    .push((assignee, LiveEvent::NotificationCreated { notification }));
            }
            DomainEvent::ChallengeFinished { challenge_id } => {
                let notification = notify_group(
                    tx,
                    challenge_id,
                    NotificationKind::ChallengeFinished,
                    json!({ "challenge_id": challenge_id }),
                )?;
                outcome.notifications.push(CreatedNotification {
                    recipient_id: None,
                    kind: NotificationKind::ChallengeFinished,
                });
                let participants: Vec<UserId> = tx
                    .participations_by_challenge(challenge_id)
                    .iter()
                    .map(|p| p.user_id)
                    .collect();
                for user_id in participants {
                    outcome.live_events.push((
                        user_id,
                        LiveEvent::NotificationCreated {
                            notification: notification.clone(),
                        },
                    ));
                }
            }
            _ => {}
        }

        Ok(())
    }
}

/// Persist an individually addressed notification.
pub fn notify_user(
    tx: &mut Tables,
    recipient_id: UserId,
    kind: NotificationKind,
    payload: serde_json::Value,
) -> EngineResult<Notification> {
    let notification = Notification {
        notification_id: new_entity_id(),
        recipient_id: Some(recipient_id),
        group_id: None,
        kind,
        payload,
        read: false,
        created_at: Utc::now(),
    };
    tx.notification_insert(notification.clone())?;
    Ok(notification)
}

/// Persist one group notification visible to all participants of a
/// challenge.
pub fn notify_group(
    tx: &mut Tables,
    group_id: ChallengeId,
    kind: NotificationKind,
    payload: serde_json::Value,
) -> EngineResult<Notification> {
    let notification = Notification {
        notification_id: new_entity_id(),
        recipient_id: None,
        group_id: Some(group_id),
        kind,
        payload,
        read: false,
        created_at: Utc::now(),
    };
    tx.notification_insert(notification.clone())?;
    Ok(notification)
}

fn visible_to(tx: &Tables, notification: &Notification, user_id: UserId) -> bool {
    match notification.recipient_id {
        Some(recipient) => recipient == user_id,
        None => notification
            .group_id
            .map(|group| tx.participation_get(group, user_id).is_some())
            .unwrap_or(false),
    }
}

fn is_unread_for(tx: &Tables, notification: &Notification, user_id: UserId) -> bool {
    if notification.is_group() {
        !tx.notification_has_read(notification.notification_id, user_id)
    } else {
        !notification.read
    }
}

/// Mark one notification read for one user. For an individual row the
/// caller must be the recipient; for a group row they must be a
/// current participant of the group. Repeating is a no-op.
pub fn mark_read(
    tx: &mut Tables,
    notification_id: NotificationId,
    user_id: UserId,
) -> EngineResult<()> {
    let (recipient_id, group_id) = {
        let notification =
            tx.notification_get(notification_id)
                .ok_or(StorageError::NotFound {
                    table: TABLE_NOTIFICATIONS,
                    id: notification_id,
                })?;
        (notification.recipient_id, notification.group_id)
    };

    match recipient_id {
        Some(recipient) if recipient == user_id => {
            if let Some(notification) = tx.notification_mut(notification_id) {
                notification.read = true;
            }
            Ok(())
        }
        Some(_) => Err(ConflictError::NotRecipient {
            notification_id,
            user_id,
        }
        .into()),
        None => {
            let member = group_id
                .map(|group| tx.participation_get(group, user_id).is_some())
                .unwrap_or(false);
            if !member {
                return Err(ConflictError::NotRecipient {
                    notification_id,
                    user_id,
                }
                .into());
            }
            // Idempotent per-user read record.
            tx.notification_read_insert_if_absent(NotificationRead {
                notification_id,
                user_id,
                read_at: Utc::now(),
            });
            Ok(())
        }
    }
}

/// Mark everything currently visible and unread for a user as read.
/// Returns the number of rows affected.
pub fn mark_all_read(tx: &mut Tables, user_id: UserId) -> EngineResult<usize> {
    let unread: Vec<NotificationId> = tx
        .notifications()
        .filter(|n| visible_to(tx, n, user_id) && is_unread_for(tx, n, user_id))
        .map(|n| n.notification_id)
        .collect();
    for notification_id in &unread {
        mark_read(tx, *notification_id, user_id)?;
    }
    Ok(unread.len())
}

/// Unread count across both addressing modes.
pub fn unread_count(tx: &Tables, user_id: UserId) -> i64 {
    tx.notifications()
        .filter(|n| visible_to(tx, n, user_id) && is_unread_for(tx, n, user_id))
        .count() as i64
}

/// Notifications visible to a user, newest first, paged.
pub fn list_notifications(
    tx: &Tables,
    user_id: UserId,
    limit: usize,
    offset: usize,
) -> Vec<Notification> {
    let mut visible: Vec<Notification> = tx
        .notifications()
        .filter(|n| visible_to(tx, n, user_id))
        .cloned()
        .collect();
    visible.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then(b.notification_id.cmp(&a.notification_id))
    });
    visible.into_iter().skip(offset).take(limit).collect()
}

// =============================================================================
// TESTS
// =============================================================================
