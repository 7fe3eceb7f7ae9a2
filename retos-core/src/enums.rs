//! Enum types shared across the Retos engine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a challenge (reto).
///
/// Draft challenges are closed to joins until the creator publishes
/// them; the sweeper moves expired active challenges to `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeState {
    Draft,
    Active,
    Finished,
}

/// State of a user's participation within a challenge.
///
/// Invariant: `Completed` iff the stored progress is exactly 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationState {
    Active,
    Completed,
}

/// What a cataloged reward grants when its rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    /// Adds `value` to the user's score.
    Points,
    /// Durable badge, no score effect.
    Badge,
    /// Cosmetic level marker, no score effect.
    Level,
}

/// Role tag for additional (non-principal) task assignees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssigneeRole {
    Collaborator,
    Reviewer,
}

/// Domain events that reward rules can be triggered by.
///
/// This vocabulary is fixed; the serialized tags match the catalog's
/// stored trigger column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RewardTrigger {
    #[serde(rename = "completar_reto")]
    CompleteChallenge,
    #[serde(rename = "completar_tarea")]
    CompleteTask,
    #[serde(rename = "valorar_apunte")]
    RateNote,
    #[serde(rename = "unirse_reto")]
    JoinChallenge,
}

impl RewardTrigger {
    /// Stable wire tag for this trigger.
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardTrigger::CompleteChallenge => "completar_reto",
            RewardTrigger::CompleteTask => "completar_tarea",
            RewardTrigger::RateNote => "valorar_apunte",
            RewardTrigger::JoinChallenge => "unirse_reto",
        }
    }
}

/// Kind tag carried by a persisted notification row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "tarea_asignada")]
    TaskAssigned,
    #[serde(rename = "reto_completado")]
    ChallengeCompleted,
    #[serde(rename = "recompensa_obtenida")]
    RewardGranted,
    #[serde(rename = "reto_finalizado")]
    ChallengeFinished,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TaskAssigned => "tarea_asignada",
            NotificationKind::ChallengeCompleted => "reto_completado",
            NotificationKind::RewardGranted => "recompensa_obtenida",
            NotificationKind::ChallengeFinished => "reto_finalizado",
        }
    }
}

/// Mutation class recorded by the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Insert,
    Update,
    Delete,
}

/// Event tag stored with each `historial_progreso` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProgressEventKind {
    /// First crossing to 100.
    #[serde(rename = "completar_reto")]
    Completed,
    /// Drop below 100 after a completion.
    #[serde(rename = "revertir_reto")]
    Reverted,
    /// Ordinary value change with no transition.
    #[serde(rename = "actualizar_progreso")]
    Updated,
}

/// Entity kind discriminator for polymorphic references.
///
/// Comments, attachments, notifications and audit targets point at one
/// of these kinds; the serialized tags are the wire/table values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "reto")]
    Challenge,
    #[serde(rename = "tarea")]
    Task,
    #[serde(rename = "apunte")]
    Note,
    #[serde(rename = "plan_estudio")]
    StudyPlan,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Challenge => "reto",
            EntityKind::Task => "tarea",
            EntityKind::Note => "apunte",
            EntityKind::StudyPlan => "plan_estudio",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
