//! Retos Core - Entity Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types - no business logic.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod entities;
pub mod enums;
pub mod error;
pub mod event;
pub mod predicate;

pub use entities::*;
pub use enums::*;
pub use error::*;
pub use event::*;
pub use predicate::*;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

pub type UserId = Uuid;
pub type ChallengeId = Uuid;
pub type TaskId = Uuid;
pub type NoteId = Uuid;
pub type RewardId = Uuid;
pub type NotificationId = Uuid;
pub type CommentId = Uuid;
pub type AuditId = Uuid;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Points required per user level. A user's level is `score / 100 + 1`.
pub const POINTS_PER_LEVEL: i64 = 100;
