//! Application handle to a joined room

use crate::engine::{Completion, Engine};
use crate::error::{ErrorCode, Result};
use crate::ids::{RoomId, StreamId, StreamInfo, User, UserId};
use crate::media::Canvas;
use crate::player::PlayerConfig;
use crate::publisher::PublishChannel;

use super::im::BarrageSendResult;
use super::state::RoomState;

/// A room joined through [`Engine::login_room`]
///
/// The handle only names the room; it stays valid after logout, and calls
/// on a room that is no longer joined are answered the way the engine
/// answers them for any unknown room.
#[derive(Clone)]
pub struct Room {
    engine: Engine,
    room_id: RoomId,
}

impl Room {
    pub(crate) fn new(engine: Engine, room_id: RoomId) -> Self {
        Self { engine, room_id }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn state(&self) -> RoomState {
        self.engine.room_state(self.room_id.as_str())
    }

    /// Other members as last reported by the service
    pub fn users(&self) -> Vec<User> {
        self.engine.query(|state| {
            state
                .rooms
                .get(&self.room_id)
                .map(|room| room.users.values().cloned().collect())
                .unwrap_or_default()
        })
    }

    /// Streams of other members as last reported by the service
    pub fn streams(&self) -> Vec<StreamInfo> {
        self.engine.query(|state| {
            state
                .rooms
                .get(&self.room_id)
                .map(|room| room.streams.values().cloned().collect())
                .unwrap_or_default()
        })
    }

    pub fn logout(&self) -> Result<()> {
        self.engine.logout_room(self.room_id.as_str())
    }

    /// Publish the channel's capture as `stream_id`
    ///
    /// The outcome arrives through `on_publisher_state_update`.
    pub fn start_publishing_stream(&self, stream_id: &str, channel: PublishChannel) -> Result<()> {
        self.engine.call("start_publishing_stream", |state, out| {
            state.start_publishing(&self.room_id, StreamId::new(stream_id)?, channel, out);
            Ok(())
        })
    }

    /// Play a remote stream, optionally rendering it on `canvas`
    ///
    /// Calling again for a stream already played only moves it to the new
    /// canvas. The stream does not need to exist yet.
    pub fn start_playing_stream(
        &self,
        stream_id: &str,
        canvas: Option<Canvas>,
        config: PlayerConfig,
    ) -> Result<()> {
        self.engine.call("start_playing_stream", |state, out| {
            state.start_playing(&self.room_id, StreamId::new(stream_id)?, canvas, config, out);
            Ok(())
        })
    }

    /// Send a message to every member
    pub fn send_broadcast_message(&self, message: impl Into<String>) -> Result<Completion<ErrorCode>> {
        self.engine.call("send_broadcast_message", |state, out| {
            state.send_broadcast_message(&self.room_id, message.into(), out)
        })
    }

    /// Send a barrage message; the completion carries its service-assigned ID
    pub fn send_barrage_message(&self, message: impl Into<String>) -> Result<Completion<BarrageSendResult>> {
        self.engine.call("send_barrage_message", |state, out| {
            state.send_barrage_message(&self.room_id, message.into(), out)
        })
    }

    /// Send a command to `to_users`, or to everyone if empty
    pub fn send_custom_command(
        &self,
        command: impl Into<String>,
        to_users: &[UserId],
    ) -> Result<Completion<ErrorCode>> {
        self.engine.call("send_custom_command", |state, out| {
            state.send_custom_command(&self.room_id, command.into(), to_users.to_vec(), out)
        })
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room").field("room_id", &self.room_id).finish()
    }
}
