//! Domain events driving the reaction pipeline.
//!
//! Every tracked mutation is expressed as one of these typed events and
//! dispatched through the engine's ordered reaction handlers inside the
//! same transaction as the mutation itself. The serialized form doubles
//! as the audit payload snapshot.

use crate::{ChallengeId, CommentId, EntityRef, NoteId, TaskId, UserId};
use serde::{Deserialize, Serialize};

/// Typed domain event for a tracked mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    // ========================================================================
    // TASK EVENTS
    // ========================================================================
    /// A task was added to a challenge.
    TaskCreated {
        challenge_id: ChallengeId,
        task_id: TaskId,
    },

    /// A task's point value changed.
    TaskPointsUpdated {
        challenge_id: ChallengeId,
        task_id: TaskId,
        old_points: i64,
        new_points: i64,
    },

    /// A task was removed along with its completions.
    TaskDeleted {
        challenge_id: ChallengeId,
        task_id: TaskId,
    },

    /// The principal assignee changed. The previous assignee's
    /// completion was removed and is not transferred.
    TaskPrincipalReassigned {
        challenge_id: ChallengeId,
        task_id: TaskId,
        previous: Option<UserId>,
        assignee: Option<UserId>,
    },

    // ========================================================================
    // COMPLETION & PROGRESS EVENTS
    // ========================================================================
    /// A user recorded a task completion.
    TaskCompleted {
        challenge_id: ChallengeId,
        task_id: TaskId,
        user_id: UserId,
        progress: i32,
    },

    /// A user withdrew a task completion.
    TaskUncompleted {
        challenge_id: ChallengeId,
        task_id: TaskId,
        user_id: UserId,
    },

    /// Participation progress was set directly.
    ProgressSet {
        challenge_id: ChallengeId,
        user_id: UserId,
        progress: i32,
    },

    // ========================================================================
    // PARTICIPATION EVENTS
    // ========================================================================
    /// A user joined a challenge.
    ChallengeJoined {
        challenge_id: ChallengeId,
        user_id: UserId,
    },

    /// A user left a challenge; their participation row and task
    /// completions for the challenge were removed.
    ChallengeLeft {
        challenge_id: ChallengeId,
        user_id: UserId,
    },

    /// A challenge was deleted by its creator.
    ChallengeDeleted { challenge_id: ChallengeId },

    /// A challenge passed its end date and was finalized by the sweeper.
    ChallengeFinished { challenge_id: ChallengeId },

    // ========================================================================
    // RATING EVENTS
    // ========================================================================
    /// A user rated a note; `replaced` marks an upsert over a prior row.
    NoteRated {
        note_id: NoteId,
        user_id: UserId,
        value: i32,
        replaced: bool,
    },

    // ========================================================================
    // COMMENT EVENTS
    // ========================================================================
    /// A comment was added to the arena.
    CommentAdded {
        comment_id: CommentId,
        target: EntityRef,
        author_id: UserId,
    },
}

impl DomainEvent {
    /// Get the event type as a string for logging/debugging.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::TaskCreated { .. } => "TaskCreated",
            DomainEvent::TaskPointsUpdated { .. } => "TaskPointsUpdated",
            DomainEvent::TaskDeleted { .. } => "TaskDeleted",
            DomainEvent::TaskPrincipalReassigned { .. } => "TaskPrincipalReassigned",
            DomainEvent::TaskCompleted { .. } => "TaskCompleted",
            DomainEvent::TaskUncompleted { .. } => "TaskUncompleted",
            DomainEvent::ProgressSet { .. } => "ProgressSet",
            DomainEvent::ChallengeJoined { .. } => "ChallengeJoined",
            DomainEvent::ChallengeLeft { .. } => "ChallengeLeft",
            DomainEvent::ChallengeDeleted { .. } => "ChallengeDeleted",
            DomainEvent::ChallengeFinished { .. } => "ChallengeFinished",
            DomainEvent::NoteRated { .. } => "NoteRated",
            DomainEvent::CommentAdded { .. } => "CommentAdded",
        }
    }

    /// Reward trigger fired directly by this event, if any.
    /// Challenge completion is not listed here: it is produced by the
    /// progress state machine when the 100 boundary is first crossed.
    pub fn reward_trigger(&self) -> Option<(crate::RewardTrigger, UserId)> {
        match self {
            DomainEvent::TaskCompleted { user_id, .. } => {
                Some((crate::RewardTrigger::CompleteTask, *user_id))
            }
            DomainEvent::NoteRated { user_id, .. } => {
                Some((crate::RewardTrigger::RateNote, *user_id))
            }
            DomainEvent::ChallengeJoined { user_id, .. } => {
                Some((crate::RewardTrigger::JoinChallenge, *user_id))
            }
            _ => None,
        }
    }
}
