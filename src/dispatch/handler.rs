//! Observer trait

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::ErrorCode;
use crate::ids::{RoomId, StreamId, StreamInfo, TaskId, User};
use crate::media::{RemoteDeviceState, Size};
use crate::player::{PlayerMediaEvent, PlayerState};
use crate::publisher::{PublishChannel, PublisherState};
use crate::relay::RelayCdnInfo;
use crate::room::{BarrageMessageInfo, MessageInfo, RoomState};
use crate::stats::{PlayStreamQuality, PublishStreamQuality};

use super::event::{Event, ExtendedData, UpdateType};

/// Receives engine events
///
/// Every method has a no-op default, so an observer implements only what it
/// cares about. The engine calls [`on_event`](EventHandler::on_event) for
/// every event; its default routes to the typed methods. Overriding
/// `on_event` receives the raw [`Event`] instead.
///
/// Callbacks run on the engine's delivery task, one event at a time, in
/// registration order across observers. They may call back into the engine,
/// including removing themselves.
#[allow(unused_variables)]
pub trait EventHandler: Send + Sync {
    /// Entry point for every event
    fn on_event(&self, event: &Event) {
        event.route(self);
    }

    /// A call was rejected locally; `func_name` names the rejected call
    fn on_debug_error(&self, error_code: ErrorCode, func_name: &str, info: &str) {}

    // Room

    fn on_room_state_update(
        &self,
        state: RoomState,
        error_code: ErrorCode,
        extended_data: &ExtendedData,
        room_id: &RoomId,
    ) {
    }

    /// Only delivered when the room was joined with `is_user_status_notify`
    fn on_room_user_update(&self, update_type: UpdateType, users: &[User], room_id: &RoomId) {}

    /// The first delivery after `Connected` is the full stream list
    fn on_room_stream_update(
        &self,
        update_type: UpdateType,
        streams: &[StreamInfo],
        room_id: &RoomId,
    ) {
    }

    fn on_room_stream_extra_info_update(&self, streams: &[StreamInfo], room_id: &RoomId) {}

    // Publisher

    fn on_publisher_state_update(
        &self,
        state: PublisherState,
        error_code: ErrorCode,
        extended_data: &ExtendedData,
        stream_id: &StreamId,
        channel: PublishChannel,
    ) {
    }

    fn on_publisher_quality_update(
        &self,
        quality: &PublishStreamQuality,
        stream_id: &StreamId,
        channel: PublishChannel,
    ) {
    }

    fn on_publisher_captured_audio_first_frame(&self) {}

    fn on_publisher_captured_video_first_frame(&self, channel: PublishChannel) {}

    fn on_publisher_video_size_changed(&self, size: Size, channel: PublishChannel) {}

    /// Full relay list of a published stream after any entry changed
    fn on_publisher_relay_cdn_state_update(&self, infos: &[RelayCdnInfo], stream_id: &StreamId) {}

    // Player

    fn on_player_state_update(
        &self,
        state: PlayerState,
        error_code: ErrorCode,
        extended_data: &ExtendedData,
        stream_id: &StreamId,
    ) {
    }

    fn on_player_quality_update(&self, quality: &PlayStreamQuality, stream_id: &StreamId) {}

    fn on_player_media_event(&self, event: PlayerMediaEvent, stream_id: &StreamId) {}

    fn on_player_recv_audio_first_frame(&self, stream_id: &StreamId) {}

    fn on_player_recv_video_first_frame(&self, stream_id: &StreamId) {}

    fn on_player_render_video_first_frame(&self, stream_id: &StreamId) {}

    fn on_player_video_size_changed(&self, size: Size, stream_id: &StreamId) {}

    fn on_player_recv_sei(&self, data: &Bytes, stream_id: &StreamId) {}

    fn on_remote_camera_state_update(&self, state: RemoteDeviceState, stream_id: &StreamId) {}

    fn on_remote_mic_state_update(&self, state: RemoteDeviceState, stream_id: &StreamId) {}

    // Mixer

    fn on_mixer_relay_cdn_state_update(&self, infos: &[RelayCdnInfo], task_id: &TaskId) {}

    fn on_mixer_sound_level_update(&self, levels: &BTreeMap<u32, f32>) {}

    // IM

    fn on_im_recv_broadcast_message(&self, messages: &[MessageInfo], room_id: &RoomId) {}

    fn on_im_recv_barrage_message(&self, messages: &[BarrageMessageInfo], room_id: &RoomId) {}

    fn on_im_recv_custom_command(&self, command: &str, from_user: &User, room_id: &RoomId) {}
}
