//! Participation progress state machine.
//!
//! Progress is a value in [0, 100] with a single meaningful boundary:
//! the first crossing to 100 flips the participation to `Completed`,
//! stamps `completed_at`, writes a `historial_progreso` row, awards
//! the challenge's `points_total` to the user's score and queues the
//! challenge-completion reward trigger. Dropping back below 100
//! reverts the state without revoking anything already granted.
//!
//! Progress feeds from two sources: direct sets (`ProgressSet`) and
//! the derived recomputation that runs whenever the user's completions
//! or the challenge's task set change.

use chrono::Utc;
use retos_core::{
    ChallengeId, ConsistencyViolation, DomainEvent, EngineResult, ParticipationState,
    ProgressEventKind, ProgressHistory, RewardTrigger, UserId,
};
use retos_storage::{Tables, TABLE_CHALLENGES};

use crate::pipeline::{
    CompletionCrossing, CrossingDirection, EventContext, Reaction, ReactionOutcome,
};

pub struct ProgressStateMachine;

impl Reaction for ProgressStateMachine {
    fn name(&self) -> &'static str {
        "progress"
    }

    fn react(
        &self,
        tx: &mut Tables,
        ctx: &EventContext,
        outcome: &mut ReactionOutcome,
    ) -> EngineResult<()> {
        match ctx.event {
            DomainEvent::TaskCompleted {
                challenge_id,
                user_id,
                ..
            }
            | DomainEvent::TaskUncompleted {
                challenge_id,
                user_id,
                ..
            } => {
                let progress = derived_progress(tx, challenge_id, user_id);
                apply_progress(tx, challenge_id, user_id, progress, outcome)
            }
            DomainEvent::ProgressSet {
                challenge_id,
                user_id,
                progress,
            } => apply_progress(tx, challenge_id, user_id, progress, outcome),
            // The denominator changed: re-derive every participant.
            DomainEvent::TaskCreated { challenge_id, .. }
            | DomainEvent::TaskPointsUpdated { challenge_id, .. }
            | DomainEvent::TaskDeleted { challenge_id, .. } => {
                rederive_all(tx, challenge_id, outcome)
            }
            DomainEvent::TaskPrincipalReassigned {
                challenge_id,
                previous: Some(previous),
                ..
            } => {
                // The previous assignee lost their completion row.
                if tx.participation_get(challenge_id, previous).is_some() {
                    let progress = derived_progress(tx, challenge_id, previous);
                    apply_progress(tx, challenge_id, previous, progress, outcome)
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

/// Points-weighted derived progress for one participant.
///
/// `completed_points * 100 / points_total`, integer division. When the
/// challenge's tasks carry no points at all, falls back to the
/// completed-task count over the task count. No tasks means 0.
pub fn derived_progress(tx: &Tables, challenge_id: ChallengeId, user_id: UserId) -> i32 {
    let tasks = tx.tasks_by_challenge(challenge_id);
    if tasks.is_empty() {
        return 0;
    }
    let total: i64 = tasks.iter().map(|t| t.points).sum();
    if total == 0 {
        let done = tasks
            .iter()
            .filter(|t| tx.completion_get(t.task_id, user_id).is_some())
            .count();
        return ((done * 100) / tasks.len()) as i32;
    }
    let done_points: i64 = tasks
        .iter()
        .filter(|t| tx.completion_get(t.task_id, user_id).is_some())
        .map(|t| t.points)
        .sum();
    ((done_points * 100) / total) as i32
}

fn rederive_all(
    tx: &mut Tables,
    challenge_id: ChallengeId,
    outcome: &mut ReactionOutcome,
) -> EngineResult<()> {
    let participants: Vec<UserId> = tx
        .participations_by_challenge(challenge_id)
        .iter()
        .map(|p| p.user_id)
        .collect();
    for user_id in participants {
        let progress = derived_progress(tx, challenge_id, user_id);
        apply_progress(tx, challenge_id, user_id, progress, outcome)?;
    }
    Ok(())
}

/// Apply a new progress value to a participation, recording history
/// and handling the completion boundary in both directions.
pub fn apply_progress(
    tx: &mut Tables,
    challenge_id: ChallengeId,
    user_id: UserId,
    new_progress: i32,
    outcome: &mut ReactionOutcome,
) -> EngineResult<()> {
    let now = Utc::now();

    let (old_progress, event_kind) = {
        let participation = tx.participation_mut(challenge_id, user_id).ok_or(
            ConsistencyViolation::MissingParticipation {
                challenge_id,
                user_id,
            },
        )?;
        let old = participation.progress;
        if old == new_progress {
            return Ok(());
        }
        participation.progress = new_progress;
        let kind = if old < 100 && new_progress == 100 {
            participation.state = ParticipationState::Completed;
            participation.completed_at = Some(now);
            ProgressEventKind::Completed
        } else if old == 100 && new_progress < 100 {
            participation.state = ParticipationState::Active;
            participation.completed_at = None;
            ProgressEventKind::Reverted
        } else {
            ProgressEventKind::Updated
        };
        (old, kind)
    };

    tx.history_append(ProgressHistory {
        challenge_id,
        user_id,
        old_progress,
        new_progress,
        event: event_kind,
        recorded_at: now,
    });

    match event_kind {
        ProgressEventKind::Completed => {
            let points = tx
                .challenge_get(challenge_id)
                .ok_or(ConsistencyViolation::MissingAggregateOwner {
                    table: TABLE_CHALLENGES,
                    id: challenge_id,
                })?
                .points_total;
            tx.user_mut(user_id)
                .map_err(|_| ConsistencyViolation::MissingUser { user_id })?
                .score += points;
            outcome
                .pending_triggers
                .push((RewardTrigger::CompleteChallenge, user_id));
            outcome.crossings.push(CompletionCrossing {
                challenge_id,
                user_id,
                direction: CrossingDirection::Completed,
            });
            tracing::info!(%challenge_id, %user_id, points, "Challenge completed");
        }
        ProgressEventKind::Reverted => {
            outcome.crossings.push(CompletionCrossing {
                challenge_id,
                user_id,
                direction: CrossingDirection::Reverted,
            });
            tracing::info!(%challenge_id, %user_id, "Challenge completion reverted");
        }
        ProgressEventKind::Updated => {}
    }

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
