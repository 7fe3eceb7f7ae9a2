//! Catalog operations: users, challenges, notes, reward rules.
//!
//! These mutate outside the event pipeline (nothing reacts to a bare
//! insert of a user or a catalog rule), so they write their audit
//! records directly.

use chrono::Utc;
use retos_core::{
    new_entity_id, AuditAction, Challenge, ChallengeId, ChallengeState, ConflictError,
    EngineResult, EntityKind, EntityRef, Note, Reward, RewardId, RewardKind, RewardTrigger,
    StorageError, Timestamp, User, UserId, ValidationError,
};
use retos_storage::{
    TABLE_CHALLENGES, TABLE_GRANTS, TABLE_NOTES, TABLE_REWARDS, TABLE_USERS,
};
use serde_json::json;

use crate::validation::{ValidateNonEmpty, ValidateRange};
use crate::{audit, rewards, Engine};

pub fn create_user(engine: &Engine, name: &str) -> EngineResult<User> {
    name.validate_non_empty("name")?;
    engine.store.transaction(|tx| {
        let user = User {
            user_id: new_entity_id(),
            name: name.to_string(),
            score: 0,
            created_at: Utc::now(),
        };
        tx.user_insert(user.clone())?;
        audit::record(
            tx,
            None,
            AuditAction::Insert,
            TABLE_USERS,
            user.user_id,
            json!({ "name": user.name }),
        );
        Ok(user)
    })
}

/// Create a challenge directly in `Active` state, open for joins.
pub fn create_challenge(
    engine: &Engine,
    creator_id: UserId,
    title: &str,
    starts_at: Timestamp,
    ends_at: Timestamp,
) -> EngineResult<Challenge> {
    create_challenge_in_state(
        engine,
        creator_id,
        title,
        starts_at,
        ends_at,
        ChallengeState::Active,
    )
}

/// Create a challenge as a draft: invisible to joins until published.
pub fn create_draft_challenge(
    engine: &Engine,
    creator_id: UserId,
    title: &str,
    starts_at: Timestamp,
    ends_at: Timestamp,
) -> EngineResult<Challenge> {
    create_challenge_in_state(
        engine,
        creator_id,
        title,
        starts_at,
        ends_at,
        ChallengeState::Draft,
    )
}

fn create_challenge_in_state(
    engine: &Engine,
    creator_id: UserId,
    title: &str,
    starts_at: Timestamp,
    ends_at: Timestamp,
    state: ChallengeState,
) -> EngineResult<Challenge> {
    title.validate_non_empty("title")?;
    if ends_at <= starts_at {
        return Err(ValidationError::OutOfRange {
            field: "ends_at".to_string(),
            min: starts_at.timestamp(),
            max: i64::MAX,
            got: ends_at.timestamp(),
        }
        .into());
    }

    engine.store.transaction(|tx| {
        if tx.user_get(creator_id).is_none() {
            return Err(StorageError::NotFound {
                table: TABLE_USERS,
                id: creator_id,
            }
            .into());
        }
        let challenge = Challenge {
            challenge_id: new_entity_id(),
            creator_id,
            title: title.to_string(),
            state,
            starts_at,
            ends_at,
            points_total: 0,
            participant_count: 0,
            created_at: Utc::now(),
        };
        tx.challenge_insert(challenge.clone())?;
        audit::record(
            tx,
            Some(creator_id),
            AuditAction::Insert,
            TABLE_CHALLENGES,
            challenge.challenge_id,
            json!({ "title": challenge.title }),
        );
        Ok(challenge)
    })
}

/// Publish a draft challenge, opening it for joins. Creator only;
/// publishing an already-published challenge is a no-op.
pub fn publish_challenge(
    engine: &Engine,
    challenge_id: ChallengeId,
    actor: UserId,
) -> EngineResult<Challenge> {
    engine.store.transaction(|tx| {
        let (creator_id, state) = {
            let challenge = tx.challenge_get(challenge_id).ok_or(
                ValidationError::UnknownReference {
                    reference: EntityRef::new(EntityKind::Challenge, challenge_id),
                },
            )?;
            (challenge.creator_id, challenge.state)
        };
        if creator_id != actor {
            return Err(ConflictError::NotCreator {
                challenge_id,
                actor,
            }
            .into());
        }
        if state == ChallengeState::Draft {
            if let Some(challenge) = tx.challenge_mut(challenge_id) {
                challenge.state = ChallengeState::Active;
            }
            audit::record(
                tx,
                Some(actor),
                AuditAction::Update,
                TABLE_CHALLENGES,
                challenge_id,
                json!({ "state": "active" }),
            );
        }
        tx.challenge_get(challenge_id)
            .cloned()
            .ok_or_else(|| {
                ValidationError::UnknownReference {
                    reference: EntityRef::new(EntityKind::Challenge, challenge_id),
                }
                .into()
            })
    })
}

pub fn create_note(
    engine: &Engine,
    author_id: UserId,
    challenge_id: Option<ChallengeId>,
    title: &str,
) -> EngineResult<Note> {
    title.validate_non_empty("title")?;
    engine.store.transaction(|tx| {
        if tx.user_get(author_id).is_none() {
            return Err(StorageError::NotFound {
                table: TABLE_USERS,
                id: author_id,
            }
            .into());
        }
        if let Some(challenge_id) = challenge_id {
            if !tx.challenge_exists(challenge_id) {
                return Err(ValidationError::UnknownReference {
                    reference: EntityRef::new(EntityKind::Challenge, challenge_id),
                }
                .into());
            }
        }
        let note = Note {
            note_id: new_entity_id(),
            author_id,
            challenge_id,
            title: title.to_string(),
            rating_avg: 0.0,
            rating_count: 0,
            created_at: Utc::now(),
        };
        tx.note_insert(note.clone())?;
        audit::record(
            tx,
            Some(author_id),
            AuditAction::Insert,
            TABLE_NOTES,
            note.note_id,
            json!({ "title": note.title }),
        );
        Ok(note)
    })
}

/// Define a reward rule. The condition is stored as-is; a malformed
/// one is flagged here with a warning but only skipped at evaluation
/// time, matching how pre-existing bad rows behave.
pub fn define_reward(
    engine: &Engine,
    name: &str,
    kind: RewardKind,
    value: i64,
    trigger: RewardTrigger,
    condition: Option<serde_json::Value>,
) -> EngineResult<Reward> {
    name.validate_non_empty("name")?;
    value.validate_non_negative("value")?;
    if let Some(condition) = &condition {
        if let Err(err) = retos_core::EligibilityPredicate::parse(condition) {
            tracing::warn!(reward = name, error = %err, "Storing reward with malformed condition");
        }
    }

    engine.store.transaction(|tx| {
        let reward = Reward {
            reward_id: new_entity_id(),
            name: name.to_string(),
            kind,
            value,
            trigger,
            condition: condition.clone(),
            active: true,
        };
        tx.reward_insert(reward.clone())?;
        audit::record(
            tx,
            None,
            AuditAction::Insert,
            TABLE_REWARDS,
            reward.reward_id,
            json!({ "name": reward.name, "trigger": trigger.as_str() }),
        );
        Ok(reward)
    })
}

/// Deactivate a reward rule so it stops matching future triggers.
/// Existing grants are untouched.
pub fn deactivate_reward(engine: &Engine, reward_id: RewardId) -> EngineResult<()> {
    engine.store.transaction(|tx| {
        tx.reward_mut(reward_id)?.active = false;
        audit::record(
            tx,
            None,
            AuditAction::Update,
            TABLE_REWARDS,
            reward_id,
            json!({ "active": false }),
        );
        Ok(())
    })
}

/// Explicitly revoke a grant: the grant row goes away and point
/// rewards are clawed back, clamped at zero. Returns false when no
/// grant existed.
pub fn revoke_reward(engine: &Engine, user_id: UserId, reward_id: RewardId) -> EngineResult<bool> {
    engine.store.transaction(|tx| {
        let reverted = rewards::revert_grant(tx, user_id, reward_id)?;
        if reverted {
            audit::record(
                tx,
                None,
                AuditAction::Delete,
                TABLE_GRANTS,
                reward_id,
                json!({ "user_id": user_id }),
            );
        }
        Ok(reverted)
    })
}
