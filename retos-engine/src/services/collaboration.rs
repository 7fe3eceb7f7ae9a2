//! Collaboration features: note ratings and the comment arena.

use chrono::Utc;
use retos_core::{
    Comment, CommentId, DomainEvent, EngineResult, EntityKind, EntityRef, NoteId, Rating,
    StorageError, UserId, ValidationError,
};
use retos_storage::TABLE_USERS;

use crate::validation::ValidateRange;
use crate::{comments, Engine};

/// Rate a note. A second rating by the same user replaces the first;
/// the note's `rating_avg`/`rating_count` are recomputed in the same
/// transaction.
pub fn rate_note(
    engine: &Engine,
    note_id: NoteId,
    user_id: UserId,
    value: i32,
    comment: Option<String>,
) -> EngineResult<Rating> {
    value.validate_range("value", 0, 5)?;

    let (rating, outcome) = engine.store.transaction(|tx| {
        if !tx.note_exists(note_id) {
            return Err(ValidationError::UnknownReference {
                reference: EntityRef::new(EntityKind::Note, note_id),
            }
            .into());
        }
        if tx.user_get(user_id).is_none() {
            return Err(StorageError::NotFound {
                table: TABLE_USERS,
                id: user_id,
            }
            .into());
        }

        let rating = Rating {
            note_id,
            user_id,
            value,
            comment,
            rated_at: Utc::now(),
        };
        let replaced = tx.rating_upsert(rating.clone()).is_some();

        let outcome = engine.pipeline.dispatch(
            tx,
            Some(user_id),
            DomainEvent::NoteRated {
                note_id,
                user_id,
                value,
                replaced,
            },
        )?;
        Ok((rating, outcome))
    })?;
    engine.push_live(&outcome);
    Ok(rating)
}

/// Add a comment (or reply) to any registered entity kind.
pub fn add_comment(
    engine: &Engine,
    target: EntityRef,
    author_id: UserId,
    parent_id: Option<CommentId>,
    body: &str,
) -> EngineResult<Comment> {
    let (comment, outcome) = engine.store.transaction(|tx| {
        let comment = comments::add_comment(tx, &engine.existence, target, author_id, parent_id, body)?;
        let outcome = engine.pipeline.dispatch(
            tx,
            Some(author_id),
            DomainEvent::CommentAdded {
                comment_id: comment.comment_id,
                target,
                author_id,
            },
        )?;
        Ok((comment, outcome))
    })?;
    engine.push_live(&outcome);
    Ok(comment)
}

/// All comments on a target.
pub fn comment_thread(engine: &Engine, target: EntityRef) -> EngineResult<Vec<Comment>> {
    engine.store.read(|tx| comments::thread(tx, target))
}

/// Direct replies to one comment.
pub fn comment_replies(engine: &Engine, parent_id: CommentId) -> EngineResult<Vec<Comment>> {
    engine.store.read(|tx| comments::replies(tx, parent_id))
}
