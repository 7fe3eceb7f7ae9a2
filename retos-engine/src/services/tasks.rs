//! Task lifecycle and completion recording.

use chrono::Utc;
use retos_core::{
    new_entity_id, ChallengeId, ConflictError, DomainEvent, EngineResult, EntityKind, EntityRef,
    StorageError, Task, TaskCompletion, TaskId, UserId, ValidationError,
};
use retos_storage::{Tables, TABLE_TASKS, TABLE_USERS};

use crate::validation::{ValidateNonEmpty, ValidateRange};
use crate::Engine;

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

/// Create a task in a challenge. The aggregate reaction folds the new
/// points into `points_total` in the same transaction.
pub fn create_task(
    engine: &Engine,
    actor: UserId,
    challenge_id: ChallengeId,
    title: &str,
    points: i64,
    principal_assignee: Option<UserId>,
) -> EngineResult<Task> {
    title.validate_non_empty("title")?;
    points.validate_non_negative("points")?;

    let (task, outcome) = engine.store.transaction(|tx| {
        if !tx.challenge_exists(challenge_id) {
            return Err(ValidationError::UnknownReference {
                reference: EntityRef::new(EntityKind::Challenge, challenge_id),
            }
            .into());
        }
        if let Some(assignee) = principal_assignee {
            require_user(tx, assignee)?;
        }

        let task = Task {
            task_id: new_entity_id(),
            challenge_id,
            title: title.to_string(),
            points,
            principal_assignee,
            assignees: vec![],
            created_at: Utc::now(),
        };
        tx.task_insert(task.clone())?;

        let outcome = engine.pipeline.dispatch(
            tx,
            Some(actor),
            DomainEvent::TaskCreated {
                challenge_id,
                task_id: task.task_id,
            },
        )?;
        Ok((task, outcome))
    })?;
    engine.push_live(&outcome);
    Ok(task)
}

/// Change a task's point value. Downstream this re-derives
/// `points_total` and every participant's progress.
pub fn update_task_points(
    engine: &Engine,
    actor: UserId,
    task_id: TaskId,
    points: i64,
) -> EngineResult<Task> {
    points.validate_non_negative("points")?;

    let (task, outcome) = engine.store.transaction(|tx| {
        let (challenge_id, old_points) = {
            let task = tx.task_mut(task_id)?;
            let old = task.points;
            task.points = points;
            (task.challenge_id, old)
        };
        let outcome = engine.pipeline.dispatch(
            tx,
            Some(actor),
            DomainEvent::TaskPointsUpdated {
                challenge_id,
                task_id,
                old_points,
                new_points: points,
            },
        )?;
        let task = tx
            .task_get(task_id)
            .cloned()
            .ok_or(StorageError::NotFound {
                table: TABLE_TASKS,
                id: task_id,
            })?;
        Ok((task, outcome))
    })?;
    engine.push_live(&outcome);
    Ok(task)
}

/// Delete a task along with all its completion rows.
pub fn delete_task(engine: &Engine, actor: UserId, task_id: TaskId) -> EngineResult<()> {
    let outcome = engine.store.transaction(|tx| {
        let challenge_id = tx.task_get(task_id).map(|t| t.challenge_id).ok_or(
            StorageError::NotFound {
                table: TABLE_TASKS,
                id: task_id,
            },
        )?;
        tx.completions_delete_by_task(task_id);
        tx.task_delete(task_id);
        engine.pipeline.dispatch(
            tx,
            Some(actor),
            DomainEvent::TaskDeleted {
                challenge_id,
                task_id,
            },
        )
    })?;
    engine.push_live(&outcome);
    Ok(())
}

/// Reassign the principal assignee. The previous assignee's completion
/// row is removed, not transferred, and the new assignee is notified.
pub fn reassign_task_principal(
    engine: &Engine,
    actor: UserId,
    task_id: TaskId,
    assignee: Option<UserId>,
) -> EngineResult<Task> {
    let (task, outcome) = engine.store.transaction(|tx| {
        if let Some(assignee) = assignee {
            require_user(tx, assignee)?;
        }
        let (challenge_id, previous) = {
            let task = tx.task_mut(task_id)?;
            let previous = task.principal_assignee;
            task.principal_assignee = assignee;
            (task.challenge_id, previous)
        };
        if let Some(previous) = previous {
            tx.completion_delete(task_id, previous);
        }

        let outcome = engine.pipeline.dispatch(
            tx,
            Some(actor),
            DomainEvent::TaskPrincipalReassigned {
                challenge_id,
                task_id,
                previous,
                assignee,
            },
        )?;
        let task = tx
            .task_get(task_id)
            .cloned()
            .ok_or(StorageError::NotFound {
                table: TABLE_TASKS,
                id: task_id,
            })?;
        Ok((task, outcome))
    })?;
    engine.push_live(&outcome);
    Ok(task)
}

/// Record that a user finished a task. Requires an active
/// participation in the task's challenge; repeating replaces the row.
pub fn record_task_completion(
    engine: &Engine,
    user_id: UserId,
    task_id: TaskId,
    progress: i32,
    comment: Option<String>,
) -> EngineResult<TaskCompletion> {
    progress.validate_range("progress", 0, 100)?;

    let (completion, outcome) = engine.store.transaction(|tx| {
        let challenge_id = tx.task_get(task_id).map(|t| t.challenge_id).ok_or(
            StorageError::NotFound {
                table: TABLE_TASKS,
                id: task_id,
            },
        )?;
        require_user(tx, user_id)?;
        if tx.participation_get(challenge_id, user_id).is_none() {
            return Err(ConflictError::NotJoined {
                challenge_id,
                user_id,
            }
            .into());
        }

        let completion = TaskCompletion {
            task_id,
            user_id,
            progress,
            completed_at: Utc::now(),
            comment,
        };
        tx.completion_upsert(completion.clone());

        let outcome = engine.pipeline.dispatch(
            tx,
            Some(user_id),
            DomainEvent::TaskCompleted {
                challenge_id,
                task_id,
                user_id,
                progress,
            },
        )?;
        Ok((completion, outcome))
    })?;
    engine.push_live(&outcome);
    Ok(completion)
}

/// Withdraw a completion. Lenient: returns false when there was
/// nothing to withdraw, and dispatches nothing in that case.
pub fn uncomplete_task(engine: &Engine, user_id: UserId, task_id: TaskId) -> EngineResult<bool> {
    let result = engine.store.transaction(|tx| {
        let challenge_id = tx.task_get(task_id).map(|t| t.challenge_id).ok_or(
            StorageError::NotFound {
                table: TABLE_TASKS,
                id: task_id,
            },
        )?;
        if tx.completion_delete(task_id, user_id).is_none() {
            return Ok(None);
        }
        let outcome = engine.pipeline.dispatch(
            tx,
            Some(user_id),
            DomainEvent::TaskUncompleted {
                challenge_id,
                task_id,
                user_id,
            },
        )?;
        Ok(Some(outcome))
    })?;
    match result {
        Some(outcome) => {
            engine.push_live(&outcome);
            Ok(true)
        }
        None => Ok(false),
    }
}
