//! Opaque audio handles
//!
//! The core never touches samples. Capture, synthesis and playback exchange
//! [`AudioRef`] handles; the concrete audio store lives behind the capability
//! traits.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to a piece of audio held by an external capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRef {
    /// Opaque handle identity
    pub id: Uuid,
    /// Duration of the referenced audio in milliseconds
    pub duration_ms: u64,
}

impl AudioRef {
    /// Create a handle for audio of the given duration
    pub fn new(duration_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            duration_ms,
        }
    }

    /// A zero-length handle. Providers returning this are treated as failed.
    pub fn empty() -> Self {
        Self::new(0)
    }

    /// Check whether the handle points at zero-length audio
    pub fn is_empty(&self) -> bool {
        self.duration_ms == 0
    }
}

impl std::fmt::Display for AudioRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "audio:{}({}ms)", self.id, self.duration_ms)
    }
}
