//! Reaction Pipeline
//!
//! Every tracked mutation is expressed as a typed [`DomainEvent`] and
//! dispatched through a fixed, ordered set of reaction handlers inside
//! the same transaction as the mutation itself: aggregates first, then
//! the progress state machine, then reward evaluation, notifications,
//! and finally the audit trail. This is the explicit replacement for
//! the database-native triggers of the original rule network.
//!
//! A `ConsistencyViolation` from any handler propagates out of
//! `dispatch` and rolls back the whole unit of work.

use retos_core::{
    ChallengeId, DomainEvent, EngineResult, NotificationKind, RewardKind, RewardId,
    RewardTrigger, UserId,
};
use retos_storage::Tables;

use crate::live::LiveEvent;

/// Context shared by all reactions for one dispatched event.
#[derive(Debug, Clone)]
pub struct EventContext {
    /// Acting user; None for system actions (sweeper jobs).
    pub actor: Option<UserId>,
    pub event: DomainEvent,
}

/// Direction of a completion-boundary crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingDirection {
    Completed,
    Reverted,
}

/// A participation that crossed the completion boundary during this
/// unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionCrossing {
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    pub direction: CrossingDirection,
}

/// A reward granted during this unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantedReward {
    pub user_id: UserId,
    pub reward_id: RewardId,
    pub name: String,
    pub kind: RewardKind,
    pub value: i64,
}

/// A notification created during this unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedNotification {
    pub recipient_id: Option<UserId>,
    pub kind: NotificationKind,
}

/// Accumulated results of the reactions for one event.
///
/// Earlier handlers leave work for later ones here (the state machine
/// queues reward triggers; the evaluator records grants the dispatcher
/// turns into notifications), and the service layer drains
/// `live_events` for post-commit best-effort push.
#[derive(Debug, Default)]
pub struct ReactionOutcome {
    pub crossings: Vec<CompletionCrossing>,
    pub grants: Vec<GrantedReward>,
    pub notifications: Vec<CreatedNotification>,
    pub live_events: Vec<(UserId, LiveEvent)>,
    /// Reward triggers produced mid-pipeline, consumed by the
    /// evaluator in the same dispatch.
    pub pending_triggers: Vec<(RewardTrigger, UserId)>,
}

/// One registered reaction handler.
pub trait Reaction: Send + Sync {
    /// Handler name for logging.
    fn name(&self) -> &'static str;

    /// React to an event inside the enclosing transaction.
    fn react(
        &self,
        tx: &mut Tables,
        ctx: &EventContext,
        outcome: &mut ReactionOutcome,
    ) -> EngineResult<()>;
}

/// Ordered set of reaction handlers.
pub struct Pipeline {
    reactions: Vec<Box<dyn Reaction>>,
}

impl Pipeline {
    /// The standard rule network in dependency order.
    pub fn standard() -> Self {
        Self {
            reactions: vec![
                Box::new(crate::aggregates::AggregateMaintainer),
                Box::new(crate::progress::ProgressStateMachine),
                Box::new(crate::rewards::RewardRuleEvaluator),
                Box::new(crate::notify::NotificationDispatcher),
                Box::new(crate::audit::AuditRecorder),
            ],
        }
    }

    /// Run all handlers for one event, in order, inside the caller's
    /// transaction. Any error aborts the remaining handlers and, via
    /// the transaction, everything already done.
    pub fn dispatch(
        &self,
        tx: &mut Tables,
        actor: Option<UserId>,
        event: DomainEvent,
    ) -> EngineResult<ReactionOutcome> {
        let ctx = EventContext { actor, event };
        let mut outcome = ReactionOutcome::default();
        for reaction in &self.reactions {
            reaction.react(tx, &ctx, &mut outcome)?;
            tracing::trace!(
                handler = reaction.name(),
                event = ctx.event.event_type(),
                "Reaction applied"
            );
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_pipeline_order() {
        let pipeline = Pipeline::standard();
        let names: Vec<&'static str> = pipeline.reactions.iter().map(|r| r.name()).collect();
        assert_eq!(
            names,
            vec![
                "aggregates",
                "progress",
                "rewards",
                "notifications",
                "audit"
            ]
        );
    }
}
