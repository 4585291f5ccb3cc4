//! Playback session of one remote stream

use serde::{Deserialize, Serialize};

use crate::ids::{RoomId, StreamId};
use crate::media::Canvas;
use crate::signaling::RequestId;

use super::state::PlayerState;

/// Pull a stream from a CDN instead of the engine's own servers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnConfig {
    pub url: String,
    /// Authentication query appended by the CDN
    pub auth_param: String,
}

impl CdnConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_param: String::new(),
        }
    }

    pub fn auth_param(mut self, param: impl Into<String>) -> Self {
        self.auth_param = param.into();
        self
    }
}

/// Options for `start_playing_stream`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub cdn_config: Option<CdnConfig>,
}

impl PlayerConfig {
    /// Pull through a CDN
    pub fn cdn(mut self, config: CdnConfig) -> Self {
        self.cdn_config = Some(config);
        self
    }
}

/// Default playback volume
pub const DEFAULT_PLAY_VOLUME: u32 = 100;

pub(crate) struct PlayerSession {
    pub(crate) state: PlayerState,
    /// Outstanding or acknowledged play request; survives interruptions
    pub(crate) request: Option<RequestId>,
    pub(crate) canvas: Option<Canvas>,
    pub(crate) config: PlayerConfig,
    pub(crate) volume: u32,
    pub(crate) audio_muted: bool,
    pub(crate) video_muted: bool,
}

impl PlayerSession {
    pub(crate) fn new(canvas: Option<Canvas>, config: PlayerConfig) -> Self {
        Self {
            state: PlayerState::PlayRequesting,
            request: None,
            canvas,
            config,
            volume: DEFAULT_PLAY_VOLUME,
            audio_muted: false,
            video_muted: false,
        }
    }

    pub(crate) fn via_cdn(&self) -> bool {
        self.config.cdn_config.is_some()
    }
}

/// Snapshot of a playback session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub room_id: RoomId,
    pub stream_id: StreamId,
    pub state: PlayerState,
    pub canvas: Option<Canvas>,
    pub volume: u32,
    pub audio_muted: bool,
    pub video_muted: bool,
    pub via_cdn: bool,
}
