//! Reward rule evaluation.
//!
//! On every triggering event the evaluator walks the active catalog
//! rules for that trigger, parses each rule's eligibility condition,
//! and grants the reward to eligible users. Grants are idempotent on
//! (user, reward): a duplicate is a silent no-op, never an error. A
//! malformed condition skips only the rule that carries it, with a
//! warning; the triggering mutation is unaffected.

use chrono::Utc;
use retos_core::{
    ConsistencyViolation, EligibilityPredicate, EngineResult, RewardGrant, RewardId, RewardKind,
    RewardTrigger, UserId,
};
use retos_storage::Tables;

use crate::pipeline::{EventContext, GrantedReward, Reaction, ReactionOutcome};

pub struct RewardRuleEvaluator;

impl Reaction for RewardRuleEvaluator {
    fn name(&self) -> &'static str {
        "rewards"
    }

    fn react(
        &self,
        tx: &mut Tables,
        ctx: &EventContext,
        outcome: &mut ReactionOutcome,
    ) -> EngineResult<()> {
        let mut triggers: Vec<(RewardTrigger, UserId)> = Vec::new();
        if let Some(direct) = ctx.event.reward_trigger() {
            triggers.push(direct);
        }
        // Triggers queued by earlier handlers (challenge completion
        // from the progress state machine).
        triggers.append(&mut std::mem::take(&mut outcome.pending_triggers));

        for (trigger, user_id) in triggers {
            evaluate(tx, trigger, user_id, outcome)?;
        }
        Ok(())
    }
}

/// Evaluate all active rules for one trigger against one user.
pub fn evaluate(
    tx: &mut Tables,
    trigger: RewardTrigger,
    user_id: UserId,
    outcome: &mut ReactionOutcome,
) -> EngineResult<()> {
    for reward in tx.rewards_by_trigger(trigger) {
        let predicate = match &reward.condition {
            Some(condition) => match EligibilityPredicate::parse(condition) {
                Ok(predicate) => predicate,
                Err(err) => {
                    tracing::warn!(
                        reward_id = %reward.reward_id,
                        reward = %reward.name,
                        error = %err,
                        "Skipping reward rule with malformed condition"
                    );
                    continue;
                }
            },
            None => EligibilityPredicate::always(),
        };

        let user = tx
            .user_get(user_id)
            .ok_or(ConsistencyViolation::MissingUser { user_id })?;
        if !predicate.satisfied_by(user) {
            continue;
        }

        // Idempotent: an existing grant makes this a no-op.
        let granted = tx.grant_insert_if_absent(RewardGrant {
            user_id,
            reward_id: reward.reward_id,
            granted_at: Utc::now(),
        });
        if !granted {
            continue;
        }

        if reward.kind == RewardKind::Points {
            tx.user_mut(user_id)
                .map_err(|_| ConsistencyViolation::MissingUser { user_id })?
                .score += reward.value;
        }

        tracing::info!(
            %user_id,
            reward_id = %reward.reward_id,
            reward = %reward.name,
            trigger = trigger.as_str(),
            "Reward granted"
        );
        outcome.grants.push(GrantedReward {
            user_id,
            reward_id: reward.reward_id,
            name: reward.name.clone(),
            kind: reward.kind,
            value: reward.value,
        });
    }
    Ok(())
}

/// Explicitly revoke a grant. Removes the grant row and, for point
/// rewards, subtracts the value from the user's score, clamped at
/// zero. Returns false when no grant existed.
pub fn revert_grant(tx: &mut Tables, user_id: UserId, reward_id: RewardId) -> EngineResult<bool> {
    if tx.grant_remove(user_id, reward_id).is_none() {
        return Ok(false);
    }
    let reward = tx.reward_get(reward_id).cloned();
    if let Some(reward) = reward {
        if reward.kind == RewardKind::Points {
            let user = tx
                .user_mut(user_id)
                .map_err(|_| ConsistencyViolation::MissingUser { user_id })?;
            user.score = (user.score - reward.value).max(0);
        }
    }
    tracing::info!(%user_id, %reward_id, "Reward grant reverted");
    Ok(true)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use retos_core::{new_entity_id, Reward, User};
    use serde_json::json;

    fn seed_user(tx: &mut Tables, score: i64) -> UserId {
        let user = User {
            user_id: new_entity_id(),
            name: "leo".to_string(),
            score,
            created_at: Utc::now(),
        };
        let id = user.user_id;
        tx.user_insert(user).unwrap();
        id
    }

    fn seed_reward(
        tx: &mut Tables,
        kind: RewardKind,
        value: i64,
        trigger: RewardTrigger,
        condition: Option<serde_json::Value>,
    ) -> RewardId {
        let reward = Reward {
            reward_id: new_entity_id(),
            name: "insignia".to_string(),
            kind,
            value,
            trigger,
            condition,
            active: true,
        };
        let id = reward.reward_id;
        tx.reward_insert(reward).unwrap();
        id
    }

    #[test]
    fn test_point_reward_adds_score_and_records_grant() {
        let mut tx = Tables::default();
        let user_id = seed_user(&mut tx, 0);
        let reward_id = seed_reward(&mut tx, RewardKind::Points, 25, RewardTrigger::RateNote, None);
        let mut outcome = ReactionOutcome::default();

        evaluate(&mut tx, RewardTrigger::RateNote, user_id, &mut outcome).unwrap();

        assert_eq!(tx.user_get(user_id).unwrap().score, 25);
        assert!(tx.grant_get(user_id, reward_id).is_some());
        assert_eq!(outcome.grants.len(), 1);
    }

    #[test]
    fn test_duplicate_grant_is_silent_noop() {
        let mut tx = Tables::default();
        let user_id = seed_user(&mut tx, 0);
        seed_reward(&mut tx, RewardKind::Points, 25, RewardTrigger::RateNote, None);
        let mut outcome = ReactionOutcome::default();

        evaluate(&mut tx, RewardTrigger::RateNote, user_id, &mut outcome).unwrap();
        evaluate(&mut tx, RewardTrigger::RateNote, user_id, &mut outcome).unwrap();

        assert_eq!(tx.user_get(user_id).unwrap().score, 25);
        assert_eq!(outcome.grants.len(), 1);
    }

    #[test]
    fn test_condition_gates_eligibility() {
        let mut tx = Tables::default();
        let novice = seed_user(&mut tx, 0);
        let veteran = seed_user(&mut tx, 250);
        let reward_id = seed_reward(
            &mut tx,
            RewardKind::Badge,
            0,
            RewardTrigger::CompleteTask,
            Some(json!({"min_level": 3})),
        );
        let mut outcome = ReactionOutcome::default();

        evaluate(&mut tx, RewardTrigger::CompleteTask, novice, &mut outcome).unwrap();
        evaluate(&mut tx, RewardTrigger::CompleteTask, veteran, &mut outcome).unwrap();

        assert!(tx.grant_get(novice, reward_id).is_none());
        assert!(tx.grant_get(veteran, reward_id).is_some());
    }

    #[test]
    fn test_malformed_condition_skips_only_that_rule() {
        let mut tx = Tables::default();
        let user_id = seed_user(&mut tx, 0);
        let broken = seed_reward(
            &mut tx,
            RewardKind::Badge,
            0,
            RewardTrigger::JoinChallenge,
            Some(json!("not an object")),
        );
        let sound = seed_reward(
            &mut tx,
            RewardKind::Points,
            10,
            RewardTrigger::JoinChallenge,
            None,
        );
        let mut outcome = ReactionOutcome::default();

        evaluate(&mut tx, RewardTrigger::JoinChallenge, user_id, &mut outcome).unwrap();

        assert!(tx.grant_get(user_id, broken).is_none());
        assert!(tx.grant_get(user_id, sound).is_some());
        assert_eq!(tx.user_get(user_id).unwrap().score, 10);
    }

    #[test]
    fn test_inactive_rules_are_ignored() {
        let mut tx = Tables::default();
        let user_id = seed_user(&mut tx, 0);
        let reward = Reward {
            reward_id: new_entity_id(),
            name: "retirada".to_string(),
            kind: RewardKind::Points,
            value: 99,
            trigger: RewardTrigger::RateNote,
            condition: None,
            active: false,
        };
        tx.reward_insert(reward).unwrap();
        let mut outcome = ReactionOutcome::default();

        evaluate(&mut tx, RewardTrigger::RateNote, user_id, &mut outcome).unwrap();
        assert_eq!(tx.user_get(user_id).unwrap().score, 0);
        assert!(outcome.grants.is_empty());
    }

    #[test]
    fn test_revert_grant_clamps_score_at_zero() {
        let mut tx = Tables::default();
        let user_id = seed_user(&mut tx, 0);
        let reward_id = seed_reward(&mut tx, RewardKind::Points, 30, RewardTrigger::RateNote, None);
        let mut outcome = ReactionOutcome::default();
        evaluate(&mut tx, RewardTrigger::RateNote, user_id, &mut outcome).unwrap();

        // Score was spent down elsewhere in the meantime.
        tx.user_mut(user_id).unwrap().score = 10;

        assert!(revert_grant(&mut tx, user_id, reward_id).unwrap());
        assert_eq!(tx.user_get(user_id).unwrap().score, 0);
        assert!(!revert_grant(&mut tx, user_id, reward_id).unwrap());
    }
}
