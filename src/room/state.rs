//! Room connection state

use serde::{Deserialize, Serialize};

/// Connection state of a room
///
/// ```text
/// Disconnected --login--> Connecting --ack--> Connected
///                              ^                  |
///                              +--- link lost ----+
/// Connecting | Connected --logout | fatal error--> Disconnected
/// ```
///
/// Reconnecting after a transient link loss is reported as `Connecting`, the
/// same as a first login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoomState {
    /// Not logged in, logged out, or rejected
    #[default]
    Disconnected,
    /// Login sent, or the link was lost and is being re-established
    Connecting,
    /// Logged in, membership and stream updates flowing
    Connected,
}

impl RoomState {
    /// Whether the room still exists from the application's point of view
    pub fn is_active(self) -> bool {
        self != RoomState::Disconnected
    }
}
