//! Audit trail.
//!
//! Every tracked mutation leaves an immutable record in the same
//! transaction: actor (None for system actions), action kind, target
//! table and id, and a serialized snapshot of the triggering event.
//! Snapshot serialization is best-effort; a failure degrades the
//! payload to null rather than aborting the mutation.

use chrono::Utc;
use retos_core::{
    new_entity_id, AuditAction, AuditRecord, DomainEvent, EngineResult, Timestamp, UserId,
};
use retos_storage::{
    Tables, TABLE_CHALLENGES, TABLE_COMMENTS, TABLE_COMPLETIONS, TABLE_PARTICIPATIONS,
    TABLE_RATINGS, TABLE_TASKS,
};
use uuid::Uuid;

use crate::pipeline::{EventContext, Reaction, ReactionOutcome};

pub struct AuditRecorder;

impl Reaction for AuditRecorder {
    fn name(&self) -> &'static str {
        "audit"
    }

    fn react(
        &self,
        tx: &mut Tables,
        ctx: &EventContext,
        _outcome: &mut ReactionOutcome,
    ) -> EngineResult<()> {
        let (action, table, target_id) = classify(&ctx.event);
        let payload = match serde_json::to_value(&ctx.event) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(
                    event = ctx.event.event_type(),
                    error = %err,
                    "Audit payload serialization failed; recording null"
                );
                serde_json::Value::Null
            }
        };
        record(tx, ctx.actor, action, table, target_id, payload);
        Ok(())
    }
}

/// Action, table and target for one event.
fn classify(event: &DomainEvent) -> (AuditAction, &'static str, Uuid) {
    match *event {
        DomainEvent::TaskCreated { task_id, .. } => (AuditAction::Insert, TABLE_TASKS, task_id),
        DomainEvent::TaskPointsUpdated { task_id, .. } => {
            (AuditAction::Update, TABLE_TASKS, task_id)
        }
        DomainEvent::TaskDeleted { task_id, .. } => (AuditAction::Delete, TABLE_TASKS, task_id),
        DomainEvent::TaskPrincipalReassigned { task_id, .. } => {
            (AuditAction::Update, TABLE_TASKS, task_id)
        }
        DomainEvent::TaskCompleted { task_id, .. } => {
            (AuditAction::Insert, TABLE_COMPLETIONS, task_id)
        }
        DomainEvent::TaskUncompleted { task_id, .. } => {
            (AuditAction::Delete, TABLE_COMPLETIONS, task_id)
        }
        DomainEvent::ProgressSet { challenge_id, .. } => {
            (AuditAction::Update, TABLE_PARTICIPATIONS, challenge_id)
        }
        DomainEvent::ChallengeJoined { challenge_id, .. } => {
            (AuditAction::Insert, TABLE_PARTICIPATIONS, challenge_id)
        }
        DomainEvent::ChallengeLeft { challenge_id, .. } => {
            (AuditAction::Delete, TABLE_PARTICIPATIONS, challenge_id)
        }
        DomainEvent::ChallengeDeleted { challenge_id } => {
            (AuditAction::Delete, TABLE_CHALLENGES, challenge_id)
        }
        DomainEvent::ChallengeFinished { challenge_id } => {
            (AuditAction::Update, TABLE_CHALLENGES, challenge_id)
        }
        DomainEvent::NoteRated {
            note_id, replaced, ..
        } => {
            let action = if replaced {
                AuditAction::Update
            } else {
                AuditAction::Insert
            };
            (action, TABLE_RATINGS, note_id)
        }
        DomainEvent::CommentAdded { comment_id, .. } => {
            (AuditAction::Insert, TABLE_COMMENTS, comment_id)
        }
    }
}

/// Append one audit record. Also used directly by catalog operations
/// that mutate outside the event pipeline.
pub fn record(
    tx: &mut Tables,
    actor_id: Option<UserId>,
    action: AuditAction,
    table: &str,
    target_id: Uuid,
    payload: serde_json::Value,
) {
    tx.audit_append(AuditRecord {
        audit_id: new_entity_id(),
        actor_id,
        action,
        table: table.to_string(),
        target_id,
        payload,
        recorded_at: Utc::now(),
    });
}

/// Filter for audit queries. All fields are conjunctive; unset fields
/// match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    pub actor_id: Option<UserId>,
    pub table: Option<String>,
    pub action: Option<AuditAction>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Query the audit trail, newest first.
pub fn query(tx: &Tables, filter: &AuditFilter) -> Vec<AuditRecord> {
    let mut records: Vec<AuditRecord> = tx
        .audit_records()
        .iter()
        .filter(|r| filter.from.map_or(true, |from| r.recorded_at >= from))
        .filter(|r| filter.to.map_or(true, |to| r.recorded_at <= to))
        .filter(|r| filter.actor_id.map_or(true, |actor| r.actor_id == Some(actor)))
        .filter(|r| filter.table.as_deref().map_or(true, |t| r.table == t))
        .filter(|r| filter.action.map_or(true, |a| r.action == a))
        .cloned()
        .collect();
    records.sort_by(|a, b| {
        b.recorded_at
            .cmp(&a.recorded_at)
            .then(b.audit_id.cmp(&a.audit_id))
    });
    records
        .into_iter()
        .skip(filter.offset)
        .take(filter.limit.unwrap_or(usize::MAX))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use retos_core::new_entity_id;
    use serde_json::json;

    #[test]
    fn test_classify_rating_upsert() {
        let note_id = new_entity_id();
        let fresh = DomainEvent::NoteRated {
            note_id,
            user_id: new_entity_id(),
            value: 4,
            replaced: false,
        };
        assert_eq!(classify(&fresh), (AuditAction::Insert, TABLE_RATINGS, note_id));

        let replaced = DomainEvent::NoteRated {
            note_id,
            user_id: new_entity_id(),
            value: 5,
            replaced: true,
        };
        assert_eq!(
            classify(&replaced),
            (AuditAction::Update, TABLE_RATINGS, note_id)
        );
    }

    #[test]
    fn test_query_filters_conjunctively() {
        let mut tx = Tables::default();
        let ana = new_entity_id();
        let leo = new_entity_id();
        record(
            &mut tx,
            Some(ana),
            AuditAction::Insert,
            TABLE_TASKS,
            new_entity_id(),
            json!({}),
        );
        record(
            &mut tx,
            Some(ana),
            AuditAction::Delete,
            TABLE_TASKS,
            new_entity_id(),
            json!({}),
        );
        record(
            &mut tx,
            Some(leo),
            AuditAction::Insert,
            TABLE_RATINGS,
            new_entity_id(),
            json!({}),
        );

        let filter = AuditFilter {
            actor_id: Some(ana),
            action: Some(AuditAction::Insert),
            ..Default::default()
        };
        let records = query(&tx, &filter);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].actor_id, Some(ana));
        assert_eq!(records[0].table, TABLE_TASKS);
    }

    #[test]
    fn test_query_is_newest_first_and_paged() {
        let mut tx = Tables::default();
        for _ in 0..5 {
            record(
                &mut tx,
                None,
                AuditAction::Insert,
                TABLE_TASKS,
                new_entity_id(),
                json!({}),
            );
        }
        let filter = AuditFilter {
            limit: Some(2),
            offset: 1,
            ..Default::default()
        };
        let records = query(&tx, &filter);
        assert_eq!(records.len(), 2);
        assert!(records[0].recorded_at >= records[1].recorded_at);
    }

    #[test]
    fn test_system_actions_record_no_actor() {
        let mut tx = Tables::default();
        record(
            &mut tx,
            None,
            AuditAction::Update,
            TABLE_CHALLENGES,
            new_entity_id(),
            json!({}),
        );
        assert_eq!(tx.audit_records()[0].actor_id, None);
    }
}
