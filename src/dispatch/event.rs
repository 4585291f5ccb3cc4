//! Events delivered to observers
//!
//! Every state transition and notification the engine reports is one
//! [`Event`]. Observers either implement the typed methods of
//! [`EventHandler`](super::EventHandler) or take the raw event through
//! `on_event`.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::ids::{RoomId, StreamId, StreamInfo, TaskId, User};
use crate::media::{RemoteDeviceState, Size};
use crate::player::{PlayerMediaEvent, PlayerState};
use crate::publisher::{PublishChannel, PublisherState};
use crate::relay::RelayCdnInfo;
use crate::room::{BarrageMessageInfo, MessageInfo, RoomState};
use crate::stats::{PlayStreamQuality, PublishStreamQuality};

use super::handler::EventHandler;

/// Extra key/value data attached to a completion (for example CDN URL lists)
pub type ExtendedData = BTreeMap<String, Vec<String>>;

/// Whether a membership or stream delta adds or removes entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateType {
    Add,
    Delete,
}

/// A notification for observers
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A call was rejected locally
    DebugError {
        error_code: ErrorCode,
        func_name: String,
        info: String,
    },

    RoomStateUpdate {
        room_id: RoomId,
        state: RoomState,
        error_code: ErrorCode,
        extended_data: ExtendedData,
    },
    RoomUserUpdate {
        room_id: RoomId,
        update_type: UpdateType,
        users: Vec<User>,
    },
    RoomStreamUpdate {
        room_id: RoomId,
        update_type: UpdateType,
        streams: Vec<StreamInfo>,
    },
    RoomStreamExtraInfoUpdate {
        room_id: RoomId,
        streams: Vec<StreamInfo>,
    },

    PublisherStateUpdate {
        stream_id: StreamId,
        channel: PublishChannel,
        state: PublisherState,
        error_code: ErrorCode,
        extended_data: ExtendedData,
    },
    PublisherQualityUpdate {
        stream_id: StreamId,
        channel: PublishChannel,
        quality: PublishStreamQuality,
    },
    PublisherCapturedAudioFirstFrame,
    PublisherCapturedVideoFirstFrame {
        channel: PublishChannel,
    },
    PublisherVideoSizeChanged {
        channel: PublishChannel,
        size: Size,
    },
    PublisherRelayCdnStateUpdate {
        stream_id: StreamId,
        infos: Vec<RelayCdnInfo>,
    },

    PlayerStateUpdate {
        stream_id: StreamId,
        state: PlayerState,
        error_code: ErrorCode,
        extended_data: ExtendedData,
    },
    PlayerQualityUpdate {
        stream_id: StreamId,
        quality: PlayStreamQuality,
    },
    PlayerMediaEvent {
        stream_id: StreamId,
        event: PlayerMediaEvent,
    },
    PlayerRecvAudioFirstFrame {
        stream_id: StreamId,
    },
    PlayerRecvVideoFirstFrame {
        stream_id: StreamId,
    },
    PlayerRenderVideoFirstFrame {
        stream_id: StreamId,
    },
    PlayerVideoSizeChanged {
        stream_id: StreamId,
        size: Size,
    },
    PlayerRecvSei {
        stream_id: StreamId,
        data: Bytes,
    },
    RemoteCameraStateUpdate {
        stream_id: StreamId,
        state: RemoteDeviceState,
    },
    RemoteMicStateUpdate {
        stream_id: StreamId,
        state: RemoteDeviceState,
    },

    MixerRelayCdnStateUpdate {
        task_id: TaskId,
        infos: Vec<RelayCdnInfo>,
    },
    /// Sound level per mixer input, keyed by the input's sound-level ID
    MixerSoundLevelUpdate {
        levels: BTreeMap<u32, f32>,
    },

    ImRecvBroadcastMessage {
        room_id: RoomId,
        messages: Vec<MessageInfo>,
    },
    ImRecvBarrageMessage {
        room_id: RoomId,
        messages: Vec<BarrageMessageInfo>,
    },
    ImRecvCustomCommand {
        room_id: RoomId,
        from_user: User,
        command: String,
    },
}

impl Event {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Event::DebugError { .. } => "debug_error",
            Event::RoomStateUpdate { .. } => "room_state_update",
            Event::RoomUserUpdate { .. } => "room_user_update",
            Event::RoomStreamUpdate { .. } => "room_stream_update",
            Event::RoomStreamExtraInfoUpdate { .. } => "room_stream_extra_info_update",
            Event::PublisherStateUpdate { .. } => "publisher_state_update",
            Event::PublisherQualityUpdate { .. } => "publisher_quality_update",
            Event::PublisherCapturedAudioFirstFrame => "publisher_captured_audio_first_frame",
            Event::PublisherCapturedVideoFirstFrame { .. } => {
                "publisher_captured_video_first_frame"
            }
            Event::PublisherVideoSizeChanged { .. } => "publisher_video_size_changed",
            Event::PublisherRelayCdnStateUpdate { .. } => "publisher_relay_cdn_state_update",
            Event::PlayerStateUpdate { .. } => "player_state_update",
            Event::PlayerQualityUpdate { .. } => "player_quality_update",
            Event::PlayerMediaEvent { .. } => "player_media_event",
            Event::PlayerRecvAudioFirstFrame { .. } => "player_recv_audio_first_frame",
            Event::PlayerRecvVideoFirstFrame { .. } => "player_recv_video_first_frame",
            Event::PlayerRenderVideoFirstFrame { .. } => "player_render_video_first_frame",
            Event::PlayerVideoSizeChanged { .. } => "player_video_size_changed",
            Event::PlayerRecvSei { .. } => "player_recv_sei",
            Event::RemoteCameraStateUpdate { .. } => "remote_camera_state_update",
            Event::RemoteMicStateUpdate { .. } => "remote_mic_state_update",
            Event::MixerRelayCdnStateUpdate { .. } => "mixer_relay_cdn_state_update",
            Event::MixerSoundLevelUpdate { .. } => "mixer_sound_level_update",
            Event::ImRecvBroadcastMessage { .. } => "im_recv_broadcast_message",
            Event::ImRecvBarrageMessage { .. } => "im_recv_barrage_message",
            Event::ImRecvCustomCommand { .. } => "im_recv_custom_command",
        }
    }

    /// Invoke the matching typed method of `handler`
    pub fn route<H: EventHandler + ?Sized>(&self, handler: &H) {
        match self {
            Event::DebugError {
                error_code,
                func_name,
                info,
            } => handler.on_debug_error(*error_code, func_name, info),
            Event::RoomStateUpdate {
                room_id,
                state,
                error_code,
                extended_data,
            } => handler.on_room_state_update(*state, *error_code, extended_data, room_id),
            Event::RoomUserUpdate {
                room_id,
                update_type,
                users,
            } => handler.on_room_user_update(*update_type, users, room_id),
            Event::RoomStreamUpdate {
                room_id,
                update_type,
                streams,
            } => handler.on_room_stream_update(*update_type, streams, room_id),
            Event::RoomStreamExtraInfoUpdate { room_id, streams } => {
                handler.on_room_stream_extra_info_update(streams, room_id)
            }
            Event::PublisherStateUpdate {
                stream_id,
                channel,
                state,
                error_code,
                extended_data,
            } => handler.on_publisher_state_update(
                *state,
                *error_code,
                extended_data,
                stream_id,
                *channel,
            ),
            Event::PublisherQualityUpdate {
                stream_id,
                channel,
                quality,
            } => handler.on_publisher_quality_update(quality, stream_id, *channel),
            Event::PublisherCapturedAudioFirstFrame => {
                handler.on_publisher_captured_audio_first_frame()
            }
            Event::PublisherCapturedVideoFirstFrame { channel } => {
                handler.on_publisher_captured_video_first_frame(*channel)
            }
            Event::PublisherVideoSizeChanged { channel, size } => {
                handler.on_publisher_video_size_changed(*size, *channel)
            }
            Event::PublisherRelayCdnStateUpdate { stream_id, infos } => {
                handler.on_publisher_relay_cdn_state_update(infos, stream_id)
            }
            Event::PlayerStateUpdate {
                stream_id,
                state,
                error_code,
                extended_data,
            } => handler.on_player_state_update(*state, *error_code, extended_data, stream_id),
            Event::PlayerQualityUpdate { stream_id, quality } => {
                handler.on_player_quality_update(quality, stream_id)
            }
            Event::PlayerMediaEvent { stream_id, event } => {
                handler.on_player_media_event(*event, stream_id)
            }
            Event::PlayerRecvAudioFirstFrame { stream_id } => {
                handler.on_player_recv_audio_first_frame(stream_id)
            }
            Event::PlayerRecvVideoFirstFrame { stream_id } => {
                handler.on_player_recv_video_first_frame(stream_id)
            }
            Event::PlayerRenderVideoFirstFrame { stream_id } => {
                handler.on_player_render_video_first_frame(stream_id)
            }
            Event::PlayerVideoSizeChanged { stream_id, size } => {
                handler.on_player_video_size_changed(*size, stream_id)
            }
            Event::PlayerRecvSei { stream_id, data } => handler.on_player_recv_sei(data, stream_id),
            Event::RemoteCameraStateUpdate { stream_id, state } => {
                handler.on_remote_camera_state_update(*state, stream_id)
            }
            Event::RemoteMicStateUpdate { stream_id, state } => {
                handler.on_remote_mic_state_update(*state, stream_id)
            }
            Event::MixerRelayCdnStateUpdate { task_id, infos } => {
                handler.on_mixer_relay_cdn_state_update(infos, task_id)
            }
            Event::MixerSoundLevelUpdate { levels } => handler.on_mixer_sound_level_update(levels),
            Event::ImRecvBroadcastMessage { room_id, messages } => {
                handler.on_im_recv_broadcast_message(messages, room_id)
            }
            Event::ImRecvBarrageMessage { room_id, messages } => {
                handler.on_im_recv_barrage_message(messages, room_id)
            }
            Event::ImRecvCustomCommand {
                room_id,
                from_user,
                command,
            } => handler.on_im_recv_custom_command(command, from_user, room_id),
        }
    }
}
