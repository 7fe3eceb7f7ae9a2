//! Entity row types for the Retos engine.
//!
//! These mirror the relational layout: one struct per table, with the
//! derived aggregate columns (`points_total`, `participant_count`,
//! `rating_avg`) stored denormalized and kept consistent by the engine.

use crate::enums::*;
use crate::{
    ChallengeId, CommentId, NoteId, NotificationId, RewardId, TaskId, Timestamp, UserId,
    POINTS_PER_LEVEL,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// ============================================================================
// POLYMORPHIC REFERENCE
// ============================================================================

/// Tagged reference to an entity of a known kind.
///
/// Replaces the string "entity kind + id" column pair used by comments,
/// attachments and notifications; validated through the per-kind
/// existence registry before being accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

// ============================================================================
// USERS
// ============================================================================

/// Platform user. Score is adjusted only by the rewards evaluator and
/// the progress state machine; level is derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub name: String,
    pub score: i64,
    pub created_at: Timestamp,
}

impl User {
    /// Derived level: `score / 100 + 1`.
    pub fn level(&self) -> i64 {
        self.score / POINTS_PER_LEVEL + 1
    }
}

// ============================================================================
// CHALLENGES & TASKS
// ============================================================================

/// A time-boxed set of tasks users can join and complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: ChallengeId,
    pub creator_id: UserId,
    pub title: String,
    pub state: ChallengeState,
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    /// Derived: sum of this challenge's task points.
    pub points_total: i64,
    /// Derived: number of participation rows for this challenge.
    pub participant_count: i64,
    pub created_at: Timestamp,
}

/// Additional assignee on a task, with a role tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignee {
    pub user_id: UserId,
    pub role: AssigneeRole,
}

/// A task belonging to a challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub challenge_id: ChallengeId,
    pub title: String,
    pub points: i64,
    pub principal_assignee: Option<UserId>,
    pub assignees: Vec<TaskAssignee>,
    pub created_at: Timestamp,
}

// ============================================================================
// PARTICIPATION & COMPLETIONS
// ============================================================================

/// A user's membership and progress record within a challenge.
/// Keyed by (challenge_id, user_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participation {
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    /// In [0, 100]. 100 iff `state == Completed`.
    pub progress: i32,
    pub state: ParticipationState,
    pub joined_at: Timestamp,
    /// Set iff `state == Completed`.
    pub completed_at: Option<Timestamp>,
}

/// Record that a specific user finished a specific task.
/// Keyed by (task_id, user_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub progress: i32,
    pub completed_at: Timestamp,
    pub comment: Option<String>,
}

/// Append-only `historial_progreso` row written by the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressHistory {
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    pub old_progress: i32,
    pub new_progress: i32,
    pub event: ProgressEventKind,
    pub recorded_at: Timestamp,
}

// ============================================================================
// NOTES & RATINGS
// ============================================================================

/// Shared note (apunte) that users can rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub note_id: NoteId,
    pub author_id: UserId,
    pub challenge_id: Option<ChallengeId>,
    pub title: String,
    /// Derived: average of this note's rating values, 0.0 when unrated.
    pub rating_avg: f64,
    /// Derived: number of rating rows for this note.
    pub rating_count: i64,
    pub created_at: Timestamp,
}

/// One user's rating of a note. Keyed by (note_id, user_id);
/// re-rating replaces the previous row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub note_id: NoteId,
    pub user_id: UserId,
    /// In [0, 5].
    pub value: i32,
    pub comment: Option<String>,
    pub rated_at: Timestamp,
}

// ============================================================================
// REWARDS
// ============================================================================

/// Cataloged reward rule. `condition` holds the raw eligibility
/// predicate data; it is parsed at evaluation time and a malformed
/// condition skips only this rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub reward_id: RewardId,
    pub name: String,
    pub kind: RewardKind,
    pub value: i64,
    pub trigger: RewardTrigger,
    pub condition: Option<JsonValue>,
    pub active: bool,
}

/// Durable record that a user received a reward.
/// Keyed by (user_id, reward_id); never mutated, only deleted on revoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardGrant {
    pub user_id: UserId,
    pub reward_id: RewardId,
    pub granted_at: Timestamp,
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

/// Persisted notification row.
///
/// Individually addressed rows carry the `read` flag. Group rows
/// (`recipient_id == None`, `group_id == Some`) are never mutated for
/// read state; a separate [`NotificationRead`] record per user marks
/// that user as having read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: NotificationId,
    pub recipient_id: Option<UserId>,
    pub group_id: Option<ChallengeId>,
    pub kind: NotificationKind,
    pub payload: JsonValue,
    pub read: bool,
    pub created_at: Timestamp,
}

impl Notification {
    pub fn is_group(&self) -> bool {
        self.recipient_id.is_none() && self.group_id.is_some()
    }
}

/// Per-user read marker for a group notification. Mere existence of
/// the row marks the user as having read the notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRead {
    pub notification_id: NotificationId,
    pub user_id: UserId,
    pub read_at: Timestamp,
}

// ============================================================================
// AUDIT
// ============================================================================

/// Immutable audit record of one tracked mutation.
/// `actor_id` is None for system actions (sweeper jobs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_id: crate::AuditId,
    pub actor_id: Option<UserId>,
    pub action: AuditAction,
    pub table: String,
    pub target_id: Uuid,
    pub payload: JsonValue,
    pub recorded_at: Timestamp,
}

// ============================================================================
// COMMENTS
// ============================================================================

/// Comment in the id-indexed arena. Replies reference their parent by
/// id rather than holding a live object graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: CommentId,
    pub target: EntityRef,
    pub parent_id: Option<CommentId>,
    pub author_id: UserId,
    pub body: String,
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_entity_id;
    use chrono::Utc;

    #[test]
    fn test_user_level_derivation() {
        let mut user = User {
            user_id: new_entity_id(),
            name: "ana".to_string(),
            score: 0,
            created_at: Utc::now(),
        };
        assert_eq!(user.level(), 1);
        user.score = 99;
        assert_eq!(user.level(), 1);
        user.score = 100;
        assert_eq!(user.level(), 2);
        user.score = 250;
        assert_eq!(user.level(), 3);
    }

    #[test]
    fn test_notification_is_group() {
        let group = Notification {
            notification_id: new_entity_id(),
            recipient_id: None,
            group_id: Some(new_entity_id()),
            kind: NotificationKind::ChallengeFinished,
            payload: serde_json::Value::Null,
            read: false,
            created_at: Utc::now(),
        };
        assert!(group.is_group());

        let individual = Notification {
            recipient_id: Some(new_entity_id()),
            group_id: None,
            ..group.clone()
        };
        assert!(!individual.is_group());
    }

    #[test]
    fn test_entity_ref_display() {
        let id = new_entity_id();
        let reference = EntityRef::new(EntityKind::Note, id);
        assert_eq!(format!("{}", reference), format!("apunte/{}", id));
    }
}
