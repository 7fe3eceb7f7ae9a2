//! Retos Storage - Relational Store and Atomic Unit-of-Work
//!
//! Typed tables mirroring the relational layout, plus [`Store`], whose
//! `transaction` method gives every engine operation an all-or-nothing
//! unit of work: the business mutation and all its reactions commit
//! together or not at all.
//!
//! The in-memory implementation holds all tables behind a single
//! `RwLock`. A transaction takes the write lock for its whole duration,
//! which serializes concurrent writers; this is what makes the
//! progress state machine's "first crossing to 100" deterministic and
//! lets `participant_count` use guarded increments safely. A
//! Postgres-backed store is a deployment concern, not part of this
//! crate.

use retos_core::{
    AuditRecord, Challenge, ChallengeId, Comment, CommentId, EngineResult, EntityRef, Note,
    NoteId, Notification, NotificationId, NotificationRead, Participation, ProgressHistory,
    Rating, Reward, RewardGrant, RewardId, RewardTrigger, StorageError, Task, TaskCompletion,
    TaskId, User, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

// ============================================================================
// TABLE NAMES
// ============================================================================

pub const TABLE_USERS: &str = "usuarios";
pub const TABLE_CHALLENGES: &str = "retos";
pub const TABLE_TASKS: &str = "tareas";
pub const TABLE_PARTICIPATIONS: &str = "participaciones";
pub const TABLE_COMPLETIONS: &str = "tareas_completadas";
pub const TABLE_NOTES: &str = "apuntes";
pub const TABLE_RATINGS: &str = "valoraciones";
pub const TABLE_REWARDS: &str = "recompensas";
pub const TABLE_GRANTS: &str = "recompensas_obtenidas";
pub const TABLE_NOTIFICATIONS: &str = "notificaciones";
pub const TABLE_HISTORY: &str = "historial_progreso";
pub const TABLE_COMMENTS: &str = "comentarios";

// ============================================================================
// TABLES
// ============================================================================

/// All relational tables. Cloned wholesale for the transaction
/// snapshot; every collection here must stay cheap to clone at the
/// engine's working-set sizes.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    users: HashMap<UserId, User>,
    challenges: HashMap<ChallengeId, Challenge>,
    tasks: HashMap<TaskId, Task>,
    participations: HashMap<(ChallengeId, UserId), Participation>,
    completions: HashMap<(TaskId, UserId), TaskCompletion>,
    notes: HashMap<NoteId, Note>,
    ratings: HashMap<(NoteId, UserId), Rating>,
    rewards: HashMap<RewardId, Reward>,
    grants: HashMap<(UserId, RewardId), RewardGrant>,
    notifications: HashMap<NotificationId, Notification>,
    notification_reads: HashMap<(NotificationId, UserId), NotificationRead>,
    audit: Vec<AuditRecord>,
    history: Vec<ProgressHistory>,
    comments: HashMap<CommentId, Comment>,
}

impl Tables {
    // ========================================================================
    // USERS
    // ========================================================================

    pub fn user_insert(&mut self, user: User) -> EngineResult<()> {
        if self.users.contains_key(&user.user_id) {
            return Err(StorageError::DuplicateKey {
                table: TABLE_USERS,
                key: user.user_id.to_string(),
            }
            .into());
        }
        self.users.insert(user.user_id, user);
        Ok(())
    }

    pub fn user_get(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn user_mut(&mut self, id: UserId) -> EngineResult<&mut User> {
        self.users.get_mut(&id).ok_or_else(|| {
            StorageError::NotFound {
                table: TABLE_USERS,
                id,
            }
            .into()
        })
    }

    // ========================================================================
    // CHALLENGES
    // ========================================================================

    pub fn challenge_insert(&mut self, challenge: Challenge) -> EngineResult<()> {
        if self.challenges.contains_key(&challenge.challenge_id) {
            return Err(StorageError::DuplicateKey {
                table: TABLE_CHALLENGES,
                key: challenge.challenge_id.to_string(),
            }
            .into());
        }
        self.challenges.insert(challenge.challenge_id, challenge);
        Ok(())
    }

    pub fn challenge_get(&self, id: ChallengeId) -> Option<&Challenge> {
        self.challenges.get(&id)
    }

    pub fn challenge_mut(&mut self, id: ChallengeId) -> Option<&mut Challenge> {
        self.challenges.get_mut(&id)
    }

    pub fn challenge_delete(&mut self, id: ChallengeId) -> Option<Challenge> {
        self.challenges.remove(&id)
    }

    pub fn challenges(&self) -> impl Iterator<Item = &Challenge> {
        self.challenges.values()
    }

    // ========================================================================
    // TASKS
    // ========================================================================

    pub fn task_insert(&mut self, task: Task) -> EngineResult<()> {
        if self.tasks.contains_key(&task.task_id) {
            return Err(StorageError::DuplicateKey {
                table: TABLE_TASKS,
                key: task.task_id.to_string(),
            }
            .into());
        }
        self.tasks.insert(task.task_id, task);
        Ok(())
    }

    pub fn task_get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn task_mut(&mut self, id: TaskId) -> EngineResult<&mut Task> {
        self.tasks.get_mut(&id).ok_or_else(|| {
            StorageError::NotFound {
                table: TABLE_TASKS,
                id,
            }
            .into()
        })
    }

    pub fn task_delete(&mut self, id: TaskId) -> Option<Task> {
        self.tasks.remove(&id)
    }

    pub fn tasks_by_challenge(&self, challenge_id: ChallengeId) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.challenge_id == challenge_id)
            .collect();
        tasks.sort_by_key(|t| t.task_id);
        tasks
    }

    // ========================================================================
    // PARTICIPATIONS
    // ========================================================================

    /// Insert a participation; the (challenge, user) key is unique, so
    /// a second insert reports a duplicate rather than overwriting.
    pub fn participation_insert(&mut self, participation: Participation) -> EngineResult<()> {
        let key = (participation.challenge_id, participation.user_id);
        if self.participations.contains_key(&key) {
            return Err(StorageError::DuplicateKey {
                table: TABLE_PARTICIPATIONS,
                key: format!("({}, {})", key.0, key.1),
            }
            .into());
        }
        self.participations.insert(key, participation);
        Ok(())
    }

    pub fn participation_get(
        &self,
        challenge_id: ChallengeId,
        user_id: UserId,
    ) -> Option<&Participation> {
        self.participations.get(&(challenge_id, user_id))
    }

    pub fn participation_mut(
        &mut self,
        challenge_id: ChallengeId,
        user_id: UserId,
    ) -> Option<&mut Participation> {
        self.participations.get_mut(&(challenge_id, user_id))
    }

    pub fn participation_delete(
        &mut self,
        challenge_id: ChallengeId,
        user_id: UserId,
    ) -> Option<Participation> {
        self.participations.remove(&(challenge_id, user_id))
    }

    pub fn participations_by_challenge(&self, challenge_id: ChallengeId) -> Vec<&Participation> {
        self.participations
            .values()
            .filter(|p| p.challenge_id == challenge_id)
            .collect()
    }

    pub fn participation_count(&self, challenge_id: ChallengeId) -> i64 {
        self.participations
            .keys()
            .filter(|(c, _)| *c == challenge_id)
            .count() as i64
    }

    // ========================================================================
    // TASK COMPLETIONS
    // ========================================================================

    /// Upsert a completion; repeating a completion replaces the row
    /// instead of duplicating it. Returns the replaced row, if any.
    pub fn completion_upsert(&mut self, completion: TaskCompletion) -> Option<TaskCompletion> {
        self.completions
            .insert((completion.task_id, completion.user_id), completion)
    }

    pub fn completion_get(&self, task_id: TaskId, user_id: UserId) -> Option<&TaskCompletion> {
        self.completions.get(&(task_id, user_id))
    }

    pub fn completion_delete(
        &mut self,
        task_id: TaskId,
        user_id: UserId,
    ) -> Option<TaskCompletion> {
        self.completions.remove(&(task_id, user_id))
    }

    /// Remove every completion row for a task (task deleted).
    pub fn completions_delete_by_task(&mut self, task_id: TaskId) -> usize {
        let keys: Vec<(TaskId, UserId)> = self
            .completions
            .keys()
            .filter(|(t, _)| *t == task_id)
            .copied()
            .collect();
        for key in &keys {
            self.completions.remove(key);
        }
        keys.len()
    }

    pub fn completions_by_user(&self, user_id: UserId) -> Vec<&TaskCompletion> {
        self.completions
            .values()
            .filter(|c| c.user_id == user_id)
            .collect()
    }

    // ========================================================================
    // NOTES & RATINGS
    // ========================================================================

    pub fn note_insert(&mut self, note: Note) -> EngineResult<()> {
        if self.notes.contains_key(&note.note_id) {
            return Err(StorageError::DuplicateKey {
                table: TABLE_NOTES,
                key: note.note_id.to_string(),
            }
            .into());
        }
        self.notes.insert(note.note_id, note);
        Ok(())
    }

    pub fn note_get(&self, id: NoteId) -> Option<&Note> {
        self.notes.get(&id)
    }

    pub fn note_mut(&mut self, id: NoteId) -> Option<&mut Note> {
        self.notes.get_mut(&id)
    }

    /// Upsert a rating; a second rating by the same user replaces the
    /// first. Returns the replaced row, if any.
    pub fn rating_upsert(&mut self, rating: Rating) -> Option<Rating> {
        self.ratings.insert((rating.note_id, rating.user_id), rating)
    }

    pub fn ratings_by_note(&self, note_id: NoteId) -> Vec<&Rating> {
        self.ratings
            .values()
            .filter(|r| r.note_id == note_id)
            .collect()
    }

    // ========================================================================
    // REWARDS & GRANTS
    // ========================================================================

    pub fn reward_insert(&mut self, reward: Reward) -> EngineResult<()> {
        if self.rewards.contains_key(&reward.reward_id) {
            return Err(StorageError::DuplicateKey {
                table: TABLE_REWARDS,
                key: reward.reward_id.to_string(),
            }
            .into());
        }
        self.rewards.insert(reward.reward_id, reward);
        Ok(())
    }

    pub fn reward_get(&self, id: RewardId) -> Option<&Reward> {
        self.rewards.get(&id)
    }

    pub fn reward_mut(&mut self, id: RewardId) -> EngineResult<&mut Reward> {
        self.rewards.get_mut(&id).ok_or_else(|| {
            StorageError::NotFound {
                table: TABLE_REWARDS,
                id,
            }
            .into()
        })
    }

    /// Active catalog rules matching a trigger, cloned so the caller
    /// can mutate user/grant tables while iterating.
    pub fn rewards_by_trigger(&self, trigger: RewardTrigger) -> Vec<Reward> {
        let mut rewards: Vec<Reward> = self
            .rewards
            .values()
            .filter(|r| r.active && r.trigger == trigger)
            .cloned()
            .collect();
        rewards.sort_by_key(|r| r.reward_id);
        rewards
    }

    /// Idempotent grant insert: returns false (no-op) when the
    /// (user, reward) grant already exists.
    pub fn grant_insert_if_absent(&mut self, grant: RewardGrant) -> bool {
        let key = (grant.user_id, grant.reward_id);
        if self.grants.contains_key(&key) {
            return false;
        }
        self.grants.insert(key, grant);
        true
    }

    pub fn grant_get(&self, user_id: UserId, reward_id: RewardId) -> Option<&RewardGrant> {
        self.grants.get(&(user_id, reward_id))
    }

    pub fn grant_remove(&mut self, user_id: UserId, reward_id: RewardId) -> Option<RewardGrant> {
        self.grants.remove(&(user_id, reward_id))
    }

    pub fn grants_by_user(&self, user_id: UserId) -> Vec<&RewardGrant> {
        self.grants
            .values()
            .filter(|g| g.user_id == user_id)
            .collect()
    }

    // ========================================================================
    // NOTIFICATIONS
    // ========================================================================

    pub fn notification_insert(&mut self, notification: Notification) -> EngineResult<()> {
        if self
            .notifications
            .contains_key(&notification.notification_id)
        {
            return Err(StorageError::DuplicateKey {
                table: TABLE_NOTIFICATIONS,
                key: notification.notification_id.to_string(),
            }
            .into());
        }
        self.notifications
            .insert(notification.notification_id, notification);
        Ok(())
    }

    pub fn notification_get(&self, id: NotificationId) -> Option<&Notification> {
        self.notifications.get(&id)
    }

    pub fn notification_mut(&mut self, id: NotificationId) -> Option<&mut Notification> {
        self.notifications.get_mut(&id)
    }

    pub fn notification_delete(&mut self, id: NotificationId) -> Option<Notification> {
        let removed = self.notifications.remove(&id);
        if removed.is_some() {
            self.notification_reads.retain(|(n, _), _| *n != id);
        }
        removed
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.values()
    }

    /// Idempotent per-user read record insert for group notifications.
    /// Returns false (no-op) when the record already exists.
    pub fn notification_read_insert_if_absent(&mut self, read: NotificationRead) -> bool {
        let key = (read.notification_id, read.user_id);
        if self.notification_reads.contains_key(&key) {
            return false;
        }
        self.notification_reads.insert(key, read);
        true
    }

    pub fn notification_has_read(&self, notification_id: NotificationId, user_id: UserId) -> bool {
        self.notification_reads
            .contains_key(&(notification_id, user_id))
    }

    // ========================================================================
    // AUDIT & HISTORY (append-only)
    // ========================================================================

    pub fn audit_append(&mut self, record: AuditRecord) {
        self.audit.push(record);
    }

    pub fn audit_records(&self) -> &[AuditRecord] {
        &self.audit
    }

    pub fn history_append(&mut self, row: ProgressHistory) {
        self.history.push(row);
    }

    pub fn history_records(&self) -> &[ProgressHistory] {
        &self.history
    }

    pub fn history_for(&self, challenge_id: ChallengeId, user_id: UserId) -> Vec<&ProgressHistory> {
        self.history
            .iter()
            .filter(|h| h.challenge_id == challenge_id && h.user_id == user_id)
            .collect()
    }

    // ========================================================================
    // COMMENTS
    // ========================================================================

    pub fn comment_insert(&mut self, comment: Comment) -> EngineResult<()> {
        if self.comments.contains_key(&comment.comment_id) {
            return Err(StorageError::DuplicateKey {
                table: TABLE_COMMENTS,
                key: comment.comment_id.to_string(),
            }
            .into());
        }
        self.comments.insert(comment.comment_id, comment);
        Ok(())
    }

    pub fn comment_get(&self, id: CommentId) -> Option<&Comment> {
        self.comments.get(&id)
    }

    pub fn comments_by_target(&self, target: EntityRef) -> Vec<&Comment> {
        let mut comments: Vec<&Comment> = self
            .comments
            .values()
            .filter(|c| c.target == target)
            .collect();
        comments.sort_by_key(|c| c.comment_id);
        comments
    }

    /// Existence check helpers used by the per-kind existence registry.
    pub fn challenge_exists(&self, id: Uuid) -> bool {
        self.challenges.contains_key(&id)
    }

    pub fn task_exists(&self, id: Uuid) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn note_exists(&self, id: Uuid) -> bool {
        self.notes.contains_key(&id)
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Handle over the shared tables with transactional access.
#[derive(Debug, Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<Tables>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run an atomic unit of work. The closure runs under the write
    /// lock (transactions are serialized); if it returns an error the
    /// tables are restored to the pre-transaction snapshot and nothing
    /// persists.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let snapshot = guard.clone();
        match f(&mut guard) {
            Ok(value) => Ok(value),
            Err(err) => {
                *guard = snapshot;
                Err(err)
            }
        }
    }

    /// Read-only access outside any transaction.
    pub fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> EngineResult<T> {
        let guard = self.inner.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(f(&guard))
    }
}

// =============================================================================
// TESTS
// =============================================================================
