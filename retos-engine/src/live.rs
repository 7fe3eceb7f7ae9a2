//! Live connection registry.
//!
//! Tracks which users currently have a live session attached and
//! pushes post-commit events to them over broadcast channels. Delivery
//! is strictly best-effort: a user without a connection, or whose
//! receiver lagged away, simply misses the push. The persisted
//! notification row is the durable record either way.

use dashmap::DashMap;
use retos_core::{ChallengeId, Notification, RewardId, UserId};
use serde::Serialize;
use tokio::sync::broadcast;

/// Event pushed to a connected user after the transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    /// A notification row addressed to (or visible to) this user was
    /// created.
    NotificationCreated { notification: Notification },

    /// This user's participation crossed the completion boundary.
    ChallengeCompleted {
        challenge_id: ChallengeId,
        user_id: UserId,
    },

    /// This user was granted a reward.
    RewardGranted {
        user_id: UserId,
        reward_id: RewardId,
        name: String,
    },
}

impl LiveEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            LiveEvent::NotificationCreated { .. } => "NotificationCreated",
            LiveEvent::ChallengeCompleted { .. } => "ChallengeCompleted",
            LiveEvent::RewardGranted { .. } => "RewardGranted",
        }
    }
}

/// Registry of live per-user channels.
pub struct ConnectionRegistry {
    capacity: usize,
    channels: DashMap<UserId, broadcast::Sender<LiveEvent>>,
}

impl ConnectionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: DashMap::new(),
        }
    }

    /// Attach a session for a user. Multiple sessions share one
    /// channel; each gets its own receiver.
    pub fn connect(&self, user_id: UserId) -> broadcast::Receiver<LiveEvent> {
        let sender = self
            .channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        sender.subscribe()
    }

    /// Drop the user's channel. Outstanding receivers see the stream
    /// close.
    pub fn disconnect(&self, user_id: UserId) {
        self.channels.remove(&user_id);
    }

    pub fn is_connected(&self, user_id: UserId) -> bool {
        self.channels.contains_key(&user_id)
    }

    pub fn connection_count(&self) -> usize {
        self.channels.len()
    }

    /// Best-effort push. Returns false when the user has no connection
    /// or no live receiver; never an error.
    pub fn push(&self, user_id: UserId, event: LiveEvent) -> bool {
        match self.channels.get(&user_id) {
            Some(sender) => match sender.send(event) {
                Ok(_) => true,
                Err(_) => {
                    tracing::debug!(%user_id, "Live push dropped: no active receivers");
                    false
                }
            },
            None => {
                tracing::debug!(%user_id, "Live push skipped: user not connected");
                false
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
