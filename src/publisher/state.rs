//! Publish state

use serde::{Deserialize, Serialize};

/// Publish state of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PublisherState {
    /// Not publishing, stopped, or rejected
    #[default]
    NoPublish,
    /// Publish sent, waiting for the room, or retrying after link loss
    PublishRequesting,
    /// Stream is live
    Publishing,
}

impl PublisherState {
    /// Whether a stream is bound to the channel
    pub fn is_active(self) -> bool {
        self != PublisherState::NoPublish
    }
}

/// Capture/publish pipeline
///
/// Channels are engine-wide: a channel publishes in at most one room at a
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum PublishChannel {
    /// Camera and microphone
    #[default]
    Main,
    /// Secondary source, such as screen sharing
    Aux,
}

impl PublishChannel {
    /// All channels in index order
    pub const ALL: [PublishChannel; 2] = [PublishChannel::Main, PublishChannel::Aux];

    /// Position in per-channel tables
    pub fn index(self) -> usize {
        match self {
            PublishChannel::Main => 0,
            PublishChannel::Aux => 1,
        }
    }
}
