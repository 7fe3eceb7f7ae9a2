//! Engine configuration.

/// Tunables for the engine itself. Sweeper scheduling has its own
/// config in [`crate::sweeper`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Buffered events per live broadcast channel.
    pub live_channel_capacity: usize,
    /// Upper bound applied to notification page sizes.
    pub max_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            live_channel_capacity: 256,
            max_page_size: 500,
        }
    }
}

impl EngineConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            live_channel_capacity: std::env::var("RETOS_LIVE_CHANNEL_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.live_channel_capacity),
            max_page_size: std::env::var("RETOS_MAX_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_page_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.live_channel_capacity, 256);
        assert_eq!(config.max_page_size, 500);
    }
}
