//! Comment arena.
//!
//! Comments attach to any registered entity kind through a validated
//! [`EntityRef`] and reference their parent by id, so a reply thread
//! is a flat id-indexed set rather than an owned tree. Replies must
//! stay on the same target as their parent.

use chrono::Utc;
use retos_core::{
    new_entity_id, Comment, CommentId, EngineResult, EntityRef, StorageError, UserId,
    ValidationError,
};
use retos_storage::{Tables, TABLE_COMMENTS, TABLE_USERS};

use crate::existence::ExistenceRegistry;
use crate::validation::ValidateNonEmpty;

/// Insert a comment after validating author, target and parent.
pub fn add_comment(
    tx: &mut Tables,
    existence: &ExistenceRegistry,
    target: EntityRef,
    author_id: UserId,
    parent_id: Option<CommentId>,
    body: &str,
) -> EngineResult<Comment> {
    body.validate_non_empty("body")?;
    existence.verify(tx, target)?;
    if tx.user_get(author_id).is_none() {
        return Err(StorageError::NotFound {
            table: TABLE_USERS,
            id: author_id,
        }
        .into());
    }
    if let Some(parent) = parent_id {
        let parent_comment = tx.comment_get(parent).ok_or(StorageError::NotFound {
            table: TABLE_COMMENTS,
            id: parent,
        })?;
        if parent_comment.target != target {
            return Err(ValidationError::UnknownReference { reference: target }.into());
        }
    }

    let comment = Comment {
        comment_id: new_entity_id(),
        target,
        parent_id,
        author_id,
        body: body.to_string(),
        created_at: Utc::now(),
    };
    tx.comment_insert(comment.clone())?;
    Ok(comment)
}

/// All comments on a target, stable order.
pub fn thread(tx: &Tables, target: EntityRef) -> Vec<Comment> {
    tx.comments_by_target(target)
        .into_iter()
        .cloned()
        .collect()
}

/// Direct replies to one comment.
pub fn replies(tx: &Tables, parent_id: CommentId) -> Vec<Comment> {
    match tx.comment_get(parent_id) {
        Some(parent) => thread(tx, parent.target)
            .into_iter()
            .filter(|c| c.parent_id == Some(parent_id))
            .collect(),
        None => Vec::new(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
