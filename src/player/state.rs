//! Play state

use serde::{Deserialize, Serialize};

/// Playback state of one remote stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayerState {
    /// Not playing, stopped, or rejected
    #[default]
    NoPlay,
    /// Waiting for the stream to exist or for the link to come back
    PlayRequesting,
    /// Media is being received
    Playing,
}

impl PlayerState {
    pub fn is_active(self) -> bool {
        self != PlayerState::NoPlay
    }
}

/// Stall and recovery notifications while playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerMediaEvent {
    AudioBreakOccur,
    AudioBreakResume,
    VideoBreakOccur,
    VideoBreakResume,
}
