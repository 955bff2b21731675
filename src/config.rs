//! Runtime configuration parsed from environment variables.
//!
//! The presence core never picks its own throttle interval; the default
//! lives here, on the caller side, and is applied when a config is built.

pub const DEFAULT_THROTTLE_MS: u64 = 50;
pub const DEFAULT_USERNAME: &str = "anonymous";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_RELAY_SUBSCRIBER_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("room name is required")]
    MissingRoom,
}

// =============================================================================
// CURSOR CONFIG
// =============================================================================

/// What one live-cursor participant needs to join a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorConfig {
    /// Selects the broadcast channel.
    pub room_name: String,
    /// Display label only, never an identity key.
    pub username: String,
    /// Minimum interval between published samples. Zero disables throttling.
    pub throttle_ms: u64,
}

impl CursorConfig {
    pub fn new(room_name: impl Into<String>, username: impl Into<String>) -> Self {
        Self { room_name: room_name.into(), username: username.into(), throttle_ms: DEFAULT_THROTTLE_MS }
    }

    #[must_use]
    pub fn with_throttle_ms(mut self, throttle_ms: u64) -> Self {
        self.throttle_ms = throttle_ms;
        self
    }

    /// Build from the environment.
    ///
    /// Required:
    /// - `CURSOR_ROOM`
    ///
    /// Optional:
    /// - `CURSOR_USERNAME`: default `anonymous`
    /// - `CURSOR_THROTTLE_MS`: default 50
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRoom`] if `CURSOR_ROOM` is unset or blank.
    pub fn from_env() -> Result<Self, ConfigError> {
        let room_name = std::env::var("CURSOR_ROOM").map_err(|_| ConfigError::MissingRoom)?;
        let username = std::env::var("CURSOR_USERNAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USERNAME.to_owned());
        let config = Self { room_name, username, throttle_ms: env_parse("CURSOR_THROTTLE_MS", DEFAULT_THROTTLE_MS) };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRoom`] for an empty or blank room name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.room_name.trim().is_empty() {
            return Err(ConfigError::MissingRoom);
        }
        Ok(())
    }
}

// =============================================================================
// RELAY CONFIG
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    pub port: u16,
    /// Per-connection outbound queue size.
    pub subscriber_capacity: usize,
}

impl RelayConfig {
    /// Optional:
    /// - `PORT`: default 3000
    /// - `RELAY_SUBSCRIBER_CAPACITY`: default 256
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            subscriber_capacity: env_parse("RELAY_SUBSCRIBER_CAPACITY", DEFAULT_RELAY_SUBSCRIBER_CAPACITY),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT, subscriber_capacity: DEFAULT_RELAY_SUBSCRIBER_CAPACITY }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
