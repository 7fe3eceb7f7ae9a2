//! Participation lifecycle: join, leave, challenge deletion, direct
//! progress updates.

use chrono::Utc;
use retos_core::{
    ChallengeId, ChallengeState, ConflictError, ConsistencyViolation, DomainEvent, EngineError,
    EngineResult, EntityKind, EntityRef, Participation, ParticipationState, StorageError, TaskId,
    UserId, ValidationError,
};
use retos_storage::{Tables, TABLE_PARTICIPATIONS, TABLE_USERS};

use crate::validation::ValidateRange;
use crate::Engine;

fn require_challenge(tx: &Tables, challenge_id: ChallengeId) -> EngineResult<()> {
    if !tx.challenge_exists(challenge_id) {
        return Err(ValidationError::UnknownReference {
            reference: EntityRef::new(EntityKind::Challenge, challenge_id),
        }
        .into());
    }
    Ok(())
}

fn require_user(tx: &Tables, user_id: UserId) -> EngineResult<()> {
    if tx.user_get(user_id).is_none() {
        return Err(StorageError::NotFound {
            table: TABLE_USERS,
            id: user_id,
        }
        .into());
    }
    Ok(())
}

/// Join a challenge. The unique (challenge, user) key makes a repeat
/// join a conflict, and the serialized transaction keeps concurrent
/// joins from double-inserting.
pub fn join_challenge(
    engine: &Engine,
    challenge_id: ChallengeId,
    user_id: UserId,
) -> EngineResult<Participation> {
    let (participation, outcome) = engine.store.transaction(|tx| {
        require_challenge(tx, challenge_id)?;
        require_user(tx, user_id)?;
        let draft = tx
            .challenge_get(challenge_id)
            .map(|c| c.state == ChallengeState::Draft)
            .unwrap_or(false);
        if draft {
            return Err(ConflictError::NotPublished { challenge_id }.into());
        }

        let participation = Participation {
            challenge_id,
            user_id,
            progress: 0,
            state: ParticipationState::Active,
            joined_at: Utc::now(),
            completed_at: None,
        };
        tx.participation_insert(participation.clone()).map_err(|err| {
            match err {
                EngineError::Storage(StorageError::DuplicateKey { table, .. })
                    if table == TABLE_PARTICIPATIONS =>
                {
                    ConflictError::AlreadyJoined {
                        challenge_id,
                        user_id,
                    }
                    .into()
                }
                other => other,
            }
        })?;

        let outcome = engine.pipeline.dispatch(
            tx,
            Some(user_id),
            DomainEvent::ChallengeJoined {
                challenge_id,
                user_id,
            },
        )?;
        Ok((participation, outcome))
    })?;
    engine.push_live(&outcome);
    Ok(participation)
}

/// Leave a challenge. The creator may not abandon their own challenge.
/// The user's task completions for this challenge are removed, so a
/// re-join starts fresh.
pub fn leave_challenge(
    engine: &Engine,
    challenge_id: ChallengeId,
    user_id: UserId,
) -> EngineResult<()> {
    let outcome = engine.store.transaction(|tx| {
        require_challenge(tx, challenge_id)?;
        let creator_id = tx
            .challenge_get(challenge_id)
            .ok_or(ConsistencyViolation::MissingAggregateOwner {
                table: retos_storage::TABLE_CHALLENGES,
                id: challenge_id,
            })?
            .creator_id;
        if creator_id == user_id {
            return Err(ConflictError::CreatorCannotLeave { challenge_id }.into());
        }
        if tx.participation_delete(challenge_id, user_id).is_none() {
            return Err(ConflictError::NotJoined {
                challenge_id,
                user_id,
            }
            .into());
        }

        let task_ids: Vec<TaskId> = tx
            .tasks_by_challenge(challenge_id)
            .iter()
            .map(|t| t.task_id)
            .collect();
        for task_id in task_ids {
            tx.completion_delete(task_id, user_id);
        }

        engine.pipeline.dispatch(
            tx,
            Some(user_id),
            DomainEvent::ChallengeLeft {
                challenge_id,
                user_id,
            },
        )
    })?;
    engine.push_live(&outcome);
    Ok(())
}

/// Delete a challenge. Only the creator may, and only while no other
/// participants remain; everything belonging to the challenge goes
/// with it.
pub fn delete_challenge(
    engine: &Engine,
    challenge_id: ChallengeId,
    actor: UserId,
) -> EngineResult<()> {
    let outcome = engine.store.transaction(|tx| {
        require_challenge(tx, challenge_id)?;
        let creator_id = tx
            .challenge_get(challenge_id)
            .ok_or(ConsistencyViolation::MissingAggregateOwner {
                table: retos_storage::TABLE_CHALLENGES,
                id: challenge_id,
            })?
            .creator_id;
        if creator_id != actor {
            return Err(ConflictError::NotCreator {
                challenge_id,
                actor,
            }
            .into());
        }

        let others = tx
            .participations_by_challenge(challenge_id)
            .iter()
            .filter(|p| p.user_id != creator_id)
            .count() as i64;
        if others > 0 {
            return Err(ConflictError::ActiveParticipants {
                challenge_id,
                count: others,
            }
            .into());
        }

        tx.participation_delete(challenge_id, creator_id);
        let task_ids: Vec<TaskId> = tx
            .tasks_by_challenge(challenge_id)
            .iter()
            .map(|t| t.task_id)
            .collect();
        for task_id in task_ids {
            tx.completions_delete_by_task(task_id);
            tx.task_delete(task_id);
        }
        tx.challenge_delete(challenge_id);

        engine
            .pipeline
            .dispatch(tx, Some(actor), DomainEvent::ChallengeDeleted { challenge_id })
    })?;
    engine.push_live(&outcome);
    Ok(())
}

/// Set a participation's progress directly. The state machine handles
/// the boundary transitions and history.
pub fn set_participation_progress(
    engine: &Engine,
    challenge_id: ChallengeId,
    user_id: UserId,
    progress: i32,
) -> EngineResult<Participation> {
    progress.validate_range("progress", 0, 100)?;
    let (participation, outcome) = engine.store.transaction(|tx| {
        if tx.participation_get(challenge_id, user_id).is_none() {
            return Err(ConflictError::NotJoined {
                challenge_id,
                user_id,
            }
            .into());
        }
        let outcome = engine.pipeline.dispatch(
            tx,
            Some(user_id),
            DomainEvent::ProgressSet {
                challenge_id,
                user_id,
                progress,
            },
        )?;
        let participation = tx
            .participation_get(challenge_id, user_id)
            .cloned()
            .ok_or(ConsistencyViolation::MissingParticipation {
                challenge_id,
                user_id,
            })?;
        Ok((participation, outcome))
    })?;
    engine.push_live(&outcome);
    Ok(participation)
}
