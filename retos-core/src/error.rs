//! Error types for Retos engine operations.

use crate::{ChallengeId, EntityRef, NotificationId, UserId};
use thiserror::Error;
use uuid::Uuid;

/// Input validation errors. Surfaced to the caller before any mutation
/// is attempted.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Value out of range for {field}: {got} not in [{min}, {max}]")]
    OutOfRange {
        field: String,
        min: i64,
        max: i64,
        got: i64,
    },

    #[error("Unknown entity reference: {reference}")]
    UnknownReference { reference: EntityRef },
}

/// Business conflicts: duplicate joins and operations rejected by
/// lifecycle rules. Duplicate reward grants and duplicate group-read
/// inserts are no-ops, not conflicts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConflictError {
    #[error("User {user_id} already joined challenge {challenge_id}")]
    AlreadyJoined {
        challenge_id: ChallengeId,
        user_id: UserId,
    },

    #[error("User {user_id} has not joined challenge {challenge_id}")]
    NotJoined {
        challenge_id: ChallengeId,
        user_id: UserId,
    },

    #[error("Creator may not abandon their own challenge {challenge_id}")]
    CreatorCannotLeave { challenge_id: ChallengeId },

    #[error("Only the creator may delete challenge {challenge_id}")]
    NotCreator {
        challenge_id: ChallengeId,
        actor: UserId,
    },

    #[error("Challenge {challenge_id} still has {count} active participants")]
    ActiveParticipants {
        challenge_id: ChallengeId,
        count: i64,
    },

    #[error("Challenge {challenge_id} is still a draft")]
    NotPublished { challenge_id: ChallengeId },

    #[error("User {user_id} is not a recipient of notification {notification_id}")]
    NotRecipient {
        notification_id: NotificationId,
        user_id: UserId,
    },
}

/// An aggregate recomputation or state transition hit an impossible
/// state. Fatal: aborts the enclosing transaction and must never be
/// silently absorbed, since it signals a broken invariant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsistencyViolation {
    #[error("Aggregate owner missing: {table} {id}")]
    MissingAggregateOwner { table: &'static str, id: Uuid },

    #[error("Aggregate counter went negative: {table} {id}")]
    NegativeAggregate { table: &'static str, id: Uuid },

    #[error("Participation missing for challenge {challenge_id}, user {user_id}")]
    MissingParticipation {
        challenge_id: ChallengeId,
        user_id: UserId,
    },

    #[error("User row missing: {user_id}")]
    MissingUser { user_id: UserId },
}

/// Table-layer errors from the store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Row not found in {table}: {id}")]
    NotFound { table: &'static str, id: Uuid },

    #[error("Duplicate key in {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Reward rule evaluation errors. A malformed condition skips the
/// single rule carrying it with a warning; it never aborts the
/// triggering mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("Malformed reward condition: {reason}")]
    MalformedCondition { reason: String },
}

/// Master error type for all Retos engine errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Consistency violation: {0}")]
    Consistency(#[from] ConsistencyViolation),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),
}

/// Result type alias for Retos engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// TESTS
// =============================================================================
