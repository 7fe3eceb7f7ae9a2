//! Aggregate maintenance.
//!
//! Keeps the denormalized columns consistent with their source rows
//! inside the mutating transaction: `points_total` on challenges,
//! `rating_avg`/`rating_count` on notes, `participant_count` on
//! challenges. Sum and average columns are recomputed set-based from
//! the source rows rather than adjusted incrementally; the participant
//! counter uses guarded increments, which the serialized transaction
//! makes safe.

use retos_core::{
    ChallengeId, ConsistencyViolation, DomainEvent, EngineResult, NoteId,
};
use retos_storage::{Tables, TABLE_CHALLENGES, TABLE_NOTES};

use crate::pipeline::{EventContext, Reaction, ReactionOutcome};

pub struct AggregateMaintainer;

impl Reaction for AggregateMaintainer {
    fn name(&self) -> &'static str {
        "aggregates"
    }

    fn react(
        &self,
        tx: &mut Tables,
        ctx: &EventContext,
        _outcome: &mut ReactionOutcome,
    ) -> EngineResult<()> {
        match ctx.event {
            DomainEvent::TaskCreated { challenge_id, .. }
            | DomainEvent::TaskPointsUpdated { challenge_id, .. }
            | DomainEvent::TaskDeleted { challenge_id, .. } => {
                recompute_points_total(tx, challenge_id)
            }
            DomainEvent::ChallengeJoined { challenge_id, .. } => {
                bump_participant_count(tx, challenge_id, 1)
            }
            DomainEvent::ChallengeLeft { challenge_id, .. } => {
                bump_participant_count(tx, challenge_id, -1)
            }
            DomainEvent::NoteRated { note_id, .. } => recompute_rating_avg(tx, note_id),
            _ => Ok(()),
        }
    }
}

/// Recompute `points_total` from the challenge's task rows.
pub fn recompute_points_total(tx: &mut Tables, challenge_id: ChallengeId) -> EngineResult<()> {
    let total: i64 = tx
        .tasks_by_challenge(challenge_id)
        .iter()
        .map(|t| t.points)
        .sum();
    let challenge = tx.challenge_mut(challenge_id).ok_or(
        ConsistencyViolation::MissingAggregateOwner {
            table: TABLE_CHALLENGES,
            id: challenge_id,
        },
    )?;
    challenge.points_total = total;
    Ok(())
}

/// Guarded adjustment of `participant_count`. A result below zero
/// means a participation row vanished without its event and aborts
/// the transaction.
pub fn bump_participant_count(
    tx: &mut Tables,
    challenge_id: ChallengeId,
    delta: i64,
) -> EngineResult<()> {
    let challenge = tx.challenge_mut(challenge_id).ok_or(
        ConsistencyViolation::MissingAggregateOwner {
            table: TABLE_CHALLENGES,
            id: challenge_id,
        },
    )?;
    let next = challenge.participant_count + delta;
    if next < 0 {
        return Err(ConsistencyViolation::NegativeAggregate {
            table: TABLE_CHALLENGES,
            id: challenge_id,
        }
        .into());
    }
    challenge.participant_count = next;
    Ok(())
}

/// Recompute `rating_avg` and `rating_count` from the note's rating
/// rows. An unrated note reads 0.0 / 0.
pub fn recompute_rating_avg(tx: &mut Tables, note_id: NoteId) -> EngineResult<()> {
    let ratings = tx.ratings_by_note(note_id);
    let count = ratings.len() as i64;
    let avg = if count == 0 {
        0.0
    } else {
        ratings.iter().map(|r| r.value as f64).sum::<f64>() / count as f64
    };
    let note = tx
        .note_mut(note_id)
        .ok_or(ConsistencyViolation::MissingAggregateOwner {
            table: TABLE_NOTES,
            id: note_id,
        })?;
    note.rating_avg = avg;
    note.rating_count = count;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use retos_core::{new_entity_id, Challenge, ChallengeState, EngineError, Note, Rating, Task};

    fn seed_challenge(tx: &mut Tables) -> ChallengeId {
        let challenge = Challenge {
            challenge_id: new_entity_id(),
            creator_id: new_entity_id(),
            title: "reto".to_string(),
            state: ChallengeState::Active,
            starts_at: Utc::now(),
            ends_at: Utc::now() + chrono::Duration::days(7),
            points_total: 0,
            participant_count: 0,
            created_at: Utc::now(),
        };
        let id = challenge.challenge_id;
        tx.challenge_insert(challenge).unwrap();
        id
    }

    fn seed_task(tx: &mut Tables, challenge_id: ChallengeId, points: i64) {
        tx.task_insert(Task {
            task_id: new_entity_id(),
            challenge_id,
            title: "tarea".to_string(),
            points,
            principal_assignee: None,
            assignees: vec![],
            created_at: Utc::now(),
        })
        .unwrap();
    }

    #[test]
    fn test_points_total_recomputed_from_tasks() {
        let mut tx = Tables::default();
        let challenge_id = seed_challenge(&mut tx);
        seed_task(&mut tx, challenge_id, 10);
        seed_task(&mut tx, challenge_id, 20);
        seed_task(&mut tx, challenge_id, 30);

        recompute_points_total(&mut tx, challenge_id).unwrap();
        assert_eq!(tx.challenge_get(challenge_id).unwrap().points_total, 60);
    }

    #[test]
    fn test_points_total_missing_owner_is_fatal() {
        let mut tx = Tables::default();
        let err = recompute_points_total(&mut tx, new_entity_id()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Consistency(ConsistencyViolation::MissingAggregateOwner { .. })
        ));
    }

    #[test]
    fn test_participant_count_never_goes_negative() {
        let mut tx = Tables::default();
        let challenge_id = seed_challenge(&mut tx);
        bump_participant_count(&mut tx, challenge_id, 1).unwrap();
        bump_participant_count(&mut tx, challenge_id, -1).unwrap();

        let err = bump_participant_count(&mut tx, challenge_id, -1).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Consistency(ConsistencyViolation::NegativeAggregate { .. })
        ));
        // The owner row is intact; only the counter invariant broke.
        assert_eq!(tx.challenge_get(challenge_id).unwrap().participant_count, 0);
    }

    #[test]
    fn test_rating_avg_recomputed_as_average() {
        let mut tx = Tables::default();
        let note = Note {
            note_id: new_entity_id(),
            author_id: new_entity_id(),
            challenge_id: None,
            title: "apunte".to_string(),
            rating_avg: 0.0,
            rating_count: 0,
            created_at: Utc::now(),
        };
        let note_id = note.note_id;
        tx.note_insert(note).unwrap();
        for value in [2, 4] {
            tx.rating_upsert(Rating {
                note_id,
                user_id: new_entity_id(),
                value,
                comment: None,
                rated_at: Utc::now(),
            });
        }

        recompute_rating_avg(&mut tx, note_id).unwrap();
        let note = tx.note_get(note_id).unwrap();
        assert_eq!(note.rating_avg, 3.0);
        assert_eq!(note.rating_count, 2);
    }
}
