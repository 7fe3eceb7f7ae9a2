//! Retos Engine - Reactive Consistency and Rewards Engine
//!
//! The engine sits between the outer API surface and the store and
//! guarantees that every tracked mutation, its derived aggregates, the
//! progress state machine, reward evaluation, notifications and the
//! audit trail all commit in one atomic unit of work. Live pushes to
//! connected users happen after commit, best-effort.
//!
//! Structure:
//! - [`pipeline`]: event dispatch through the ordered reaction handlers
//! - [`aggregates`]: denormalized column maintenance
//! - [`progress`]: participation progress state machine
//! - [`rewards`]: reward rule evaluation and grants
//! - [`notify`]: notification rows and read-state tracking
//! - [`audit`]: immutable audit trail
//! - [`comments`]: polymorphic comment arena
//! - [`existence`]: per-kind existence registry
//! - [`live`]: live connection registry (post-commit push)
//! - [`services`]: the operations the outer layers call
//! - [`sweeper`]: background lifecycle job

pub mod aggregates;
pub mod audit;
pub mod comments;
pub mod config;
pub mod existence;
pub mod live;
pub mod notify;
pub mod pipeline;
pub mod progress;
pub mod rewards;
pub mod services;
pub mod sweeper;
pub mod validation;

pub use config::EngineConfig;
pub use live::{ConnectionRegistry, LiveEvent};
pub use pipeline::{Pipeline, Reaction, ReactionOutcome};

use retos_storage::Store;
use std::sync::Arc;

/// Shared engine handle. Cheap to clone; all clones share the same
/// store and live registry.
#[derive(Clone)]
pub struct Engine {
    pub(crate) store: Store,
    pub(crate) pipeline: Arc<Pipeline>,
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) existence: Arc<existence::ExistenceRegistry>,
    pub(crate) config: EngineConfig,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            store: Store::new(),
            pipeline: Arc::new(Pipeline::standard()),
            registry: Arc::new(ConnectionRegistry::new(config.live_channel_capacity)),
            existence: Arc::new(existence::ExistenceRegistry::standard()),
            config,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Push the accumulated live events of a committed unit of work.
    /// Best-effort by construction; failures only affect the push.
    pub(crate) fn push_live(&self, outcome: &ReactionOutcome) {
        for (user_id, event) in &outcome.live_events {
            self.registry.push(*user_id, event.clone());
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
