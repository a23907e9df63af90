//! High-water mark bounding incremental fetches.

use std::fmt;
use std::time::Duration;

use meshsync_core::Timestamp;

/// Last modification time seen by a cache, on the store clock.
///
/// The cursor only moves forward while a cache lives. [`Cursor::reset`] is
/// the single way back to the epoch, used together with an index reset to
/// force a full reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    position: Timestamp,
}

impl Cursor {
    /// A cursor at the epoch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current position.
    #[inline]
    pub fn position(&self) -> Timestamp {
        self.position
    }

    /// Position to hand to the store, moved back by the rollback window.
    #[inline]
    pub fn fetch_position(&self, rollback: Duration) -> Timestamp {
        self.position.saturating_sub(rollback)
    }

    /// Move to `observed` if it lies ahead. Returns whether the cursor moved.
    pub fn advance(&mut self, observed: Timestamp) -> bool {
        if observed > self.position {
            self.position = observed;
            true
        } else {
            false
        }
    }

    /// Back to the epoch.
    pub fn reset(&mut self) {
        self.position = Timestamp::ZERO;
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.position)
    }
}
