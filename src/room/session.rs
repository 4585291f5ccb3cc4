//! Per-room session data

use std::collections::BTreeMap;

use crate::engine::rate_limit::RateLimiter;
use crate::ids::{RoomId, StreamId, StreamInfo, User, UserId};
use crate::player::PlayerSession;
use crate::publisher::{PublishChannel, PublisherSession};
use crate::signaling::RequestId;

use super::config::RoomConfig;
use super::state::RoomState;

/// One joined room and everything scoped to it
///
/// Dropping the session drops its publisher and player sessions; nothing
/// outlives the room.
pub(crate) struct RoomSession {
    pub(crate) room_id: RoomId,
    pub(crate) user: User,
    pub(crate) config: RoomConfig,
    pub(crate) token: Option<String>,
    pub(crate) state: RoomState,

    /// Outstanding login request
    pub(crate) login_seq: Option<RequestId>,

    /// Whether a login was ever acknowledged; later acks are reconnects
    pub(crate) has_connected: bool,

    /// Re-login after a link loss not yet acknowledged
    pub(crate) reconnecting: bool,

    /// Other members, as last reported
    pub(crate) users: BTreeMap<UserId, User>,

    /// Streams published by other members, as last reported
    pub(crate) streams: BTreeMap<StreamId, StreamInfo>,

    pub(crate) publishers: BTreeMap<PublishChannel, PublisherSession>,
    pub(crate) players: BTreeMap<StreamId, PlayerSession>,

    /// Broadcast messages and custom commands
    pub(crate) im_limiter: RateLimiter,
}

impl RoomSession {
    pub(crate) fn new(
        room_id: RoomId,
        user: User,
        config: RoomConfig,
        token: Option<String>,
        im_limiter: RateLimiter,
    ) -> Self {
        Self {
            room_id,
            user,
            config,
            token,
            state: RoomState::Disconnected,
            login_seq: None,
            has_connected: false,
            reconnecting: false,
            users: BTreeMap::new(),
            streams: BTreeMap::new(),
            publishers: BTreeMap::new(),
            players: BTreeMap::new(),
            im_limiter,
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state == RoomState::Connected
    }

    /// Channel publishing in this room, if any, for a stream
    pub(crate) fn channel_of(&self, stream_id: &StreamId) -> Option<PublishChannel> {
        self.publishers
            .iter()
            .find(|(_, p)| p.state.is_active() && p.stream_id.as_ref() == Some(stream_id))
            .map(|(channel, _)| *channel)
    }

    /// Whether a channel has a stream bound in this room
    pub(crate) fn holds_channel(&self, channel: PublishChannel) -> bool {
        self.publishers
            .get(&channel)
            .map_or(false, |p| p.state.is_active())
    }
}
