//! Local participant identity.
//!
//! DESIGN
//! ======
//! A `Session` is built once when the adapter activates and never mutated.
//! The id is a random v4 UUID; collisions across concurrent participants
//! would make one cursor overwrite another in remote tables, which is
//! tolerated for presence. The color is a random hue at fixed saturation
//! and lightness so cursors stay distinguishable on light backgrounds.

use rand::Rng;
use uuid::Uuid;

use crate::event::ParticipantId;

const COLOR_SATURATION_PCT: u8 = 100;
const COLOR_LIGHTNESS_PCT: u8 = 70;

/// Generate a presence color from a uniformly sampled hue.
#[must_use]
pub fn random_color() -> String {
    let hue: u16 = rand::rng().random_range(0..360);
    hsl_color(hue)
}

pub(crate) fn hsl_color(hue: u16) -> String {
    format!("hsl({}, {COLOR_SATURATION_PCT}%, {COLOR_LIGHTNESS_PCT}%)", hue % 360)
}

/// The local participant: `{ id, display_name, color }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: ParticipantId,
    display_name: String,
    color: String,
}

impl Session {
    /// Create a fresh session with a random id and color.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self { id: ParticipantId::from(Uuid::new_v4()), display_name: display_name.into(), color: random_color() }
    }

    /// Create a session from known parts. Used by tests and by hosts that
    /// already own an identity.
    pub fn from_parts(id: ParticipantId, display_name: impl Into<String>, color: impl Into<String>) -> Self {
        Self { id, display_name: display_name.into(), color: color.into() }
    }

    #[must_use]
    pub fn id(&self) -> &ParticipantId {
        &self.id
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn color(&self) -> &str {
        &self.color
    }
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
