//! Cursor event — the value broadcast once per emitted pointer sample.
//!
//! DESIGN
//! ======
//! One event is one observed pointer sample: who sent it, where the pointer
//! was, the sender's session color, and the wall-clock emission time. Events
//! are immutable once built; the store keeps whole events, never patches them.
//!
//! WIRE SHAPE
//! ==========
//! `{ position: {x, y}, user: {id, name}, color, timestamp }`. Peers on other
//! stacks send numeric user ids, so ids deserialize from either a JSON string
//! or a JSON number and are normalized to a string.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize};

use crate::identity::Session;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Broadcast kind tag carried by every cursor-move envelope.
pub const CURSOR_MOVE_EVENT: &str = "realtime-cursor-move";

// =============================================================================
// TYPES
// =============================================================================

/// Opaque, session-stable participant identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<uuid::Uuid> for ParticipantId {
    fn from(id: uuid::Uuid) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for ParticipantId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Text(s) if s.is_empty() => Err(serde::de::Error::custom("empty participant id")),
            RawId::Text(s) => Ok(Self(s)),
            RawId::Number(n) => Ok(Self(n.to_string())),
        }
    }
}

/// Pointer position in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Who sent an event. `name` is a display label only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    #[serde(rename = "name", default, deserialize_with = "null_as_default")]
    pub display_name: String,
}

/// One broadcast pointer sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorEvent {
    #[serde(rename = "user")]
    pub participant: Participant,
    pub position: Position,
    #[serde(default, deserialize_with = "null_as_default")]
    pub color: String,
    /// Milliseconds since Unix epoch at emission.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: i64,
}

/// Optional fields sent as explicit `null` fall back to their default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept integer or fractional milliseconds; fractions are truncated and
/// `null` reads as zero.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<serde_json::Number>::deserialize(deserializer)? else {
        return Ok(0);
    };
    if let Some(ms) = raw.as_i64() {
        return Ok(ms);
    }
    #[allow(clippy::cast_possible_truncation)]
    let truncated = raw.as_f64().map_or(0, |ms| ms as i64);
    Ok(truncated)
}

// =============================================================================
// ERRORS
// =============================================================================

/// Inbound payload that does not carry a usable participant id and position.
#[derive(Debug, thiserror::Error)]
#[error("malformed cursor payload: {0}")]
pub struct MalformedMessage(#[from] serde_json::Error);

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl CursorEvent {
    /// Build an event for the local session at `position`, stamped now.
    #[must_use]
    pub fn from_session(session: &Session, position: Position) -> Self {
        Self::at(session, position, now_ms())
    }

    /// Build an event with an explicit timestamp.
    #[must_use]
    pub fn at(session: &Session, position: Position, timestamp: i64) -> Self {
        Self {
            participant: Participant { id: session.id().clone(), display_name: session.display_name().to_owned() },
            position,
            color: session.color().to_owned(),
            timestamp,
        }
    }

    /// Parse an inbound transport payload. Never trusts its shape.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedMessage`] when `user.id` or `position` is missing
    /// or has the wrong type.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, MalformedMessage> {
        Ok(Self::deserialize(payload)?)
    }

    /// Serialize to the broadcast payload shape.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a float cannot be represented.
    pub fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
