//! Per-kind existence registry for polymorphic references.
//!
//! A polymorphic [`EntityRef`] (comments, attachments) is only
//! accepted after its kind's registered check confirms the target row
//! exists. A kind with no registered check is rejected outright, which
//! keeps unknown kinds from slipping through as dangling references.

use retos_core::{EngineResult, EntityKind, EntityRef, ValidationError};
use retos_storage::Tables;
use std::collections::HashMap;
use uuid::Uuid;

type ExistenceCheck = Box<dyn Fn(&Tables, Uuid) -> bool + Send + Sync>;

pub struct ExistenceRegistry {
    checks: HashMap<EntityKind, ExistenceCheck>,
}

impl ExistenceRegistry {
    pub fn empty() -> Self {
        Self {
            checks: HashMap::new(),
        }
    }

    /// Registry covering the kinds the engine stores itself.
    /// `StudyPlan` rows live in another subsystem, so that kind stays
    /// unregistered here.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(EntityKind::Challenge, Tables::challenge_exists);
        registry.register(EntityKind::Task, Tables::task_exists);
        registry.register(EntityKind::Note, Tables::note_exists);
        registry
    }

    pub fn register(
        &mut self,
        kind: EntityKind,
        check: impl Fn(&Tables, Uuid) -> bool + Send + Sync + 'static,
    ) {
        self.checks.insert(kind, Box::new(check));
    }

    /// Verify a reference points at an existing row of a known kind.
    pub fn verify(&self, tx: &Tables, reference: EntityRef) -> EngineResult<()> {
        match self.checks.get(&reference.kind) {
            Some(check) if check(tx, reference.id) => Ok(()),
            _ => Err(ValidationError::UnknownReference { reference }.into()),
        }
    }
}

impl Default for ExistenceRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use retos_core::{new_entity_id, EngineError, Note};

    #[test]
    fn test_verify_accepts_existing_row() {
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

        let registry = ExistenceRegistry::standard();
        registry
            .verify(&tx, EntityRef::new(EntityKind::Note, note_id))
            .unwrap();
    }

    #[test]
    fn test_verify_rejects_missing_row() {
        let tx = Tables::default();
        let registry = ExistenceRegistry::standard();
        let reference = EntityRef::new(EntityKind::Challenge, new_entity_id());
        let err = registry.verify(&tx, reference).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::UnknownReference { .. })
        ));
    }

    #[test]
    fn test_unregistered_kind_is_rejected() {
        let tx = Tables::default();
        let registry = ExistenceRegistry::standard();
        let reference = EntityRef::new(EntityKind::StudyPlan, new_entity_id());
        assert!(registry.verify(&tx, reference).is_err());
    }

    #[test]
    fn test_custom_registration_extends_coverage() {
        let tx = Tables::default();
        let mut registry = ExistenceRegistry::empty();
        registry.register(EntityKind::StudyPlan, |_, _| true);
        registry
            .verify(&tx, EntityRef::new(EntityKind::StudyPlan, new_entity_id()))
            .unwrap();
    }
}
