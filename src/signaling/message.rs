//! Messages exchanged with the signaling service

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;

use crate::dispatch::{ExtendedData, UpdateType};
use crate::error::ErrorCode;
use crate::ids::{RoomId, StreamId, StreamInfo, TaskId, User, UserId};
use crate::media::{RemoteDeviceState, Size};
use crate::mixer::MixerTask;
use crate::player::{CdnConfig, PlayerMediaEvent};
use crate::publisher::PublishChannel;
use crate::relay::RelayCdnInfo;
use crate::room::{BarrageMessageInfo, MessageInfo, RoomConfig};
use crate::stats::{PlayStreamQuality, PublishStreamQuality};

/// Correlates a reply with the request that caused it
pub type RequestId = u64;

/// What a publish request carries besides the stream ID
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishParams {
    pub extra_info: String,
    pub audio_muted: bool,
    pub video_muted: bool,
    pub cdn_urls: BTreeSet<String>,
}

/// Client to service
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Login {
        seq: RequestId,
        room_id: RoomId,
        user: User,
        config: RoomConfig,
        token: Option<String>,
    },
    Logout {
        room_id: RoomId,
    },

    Publish {
        seq: RequestId,
        room_id: RoomId,
        channel: PublishChannel,
        stream_id: StreamId,
        params: PublishParams,
    },
    StopPublish {
        room_id: RoomId,
        stream_id: StreamId,
    },
    /// Answered with `RequestResult`
    SetExtraInfo {
        seq: RequestId,
        room_id: RoomId,
        stream_id: StreamId,
        extra_info: String,
    },
    MutePublish {
        room_id: RoomId,
        stream_id: StreamId,
        audio_muted: bool,
        video_muted: bool,
    },
    /// Answered with `RequestResult`, then relay updates
    AddCdnUrl {
        seq: RequestId,
        stream_id: StreamId,
        url: String,
    },
    /// Answered with `RequestResult`, then relay updates
    RemoveCdnUrl {
        seq: RequestId,
        stream_id: StreamId,
        url: String,
    },
    SendSei {
        stream_id: StreamId,
        data: Bytes,
    },

    /// Answered with `PlayResult` once the stream exists, however long that takes
    Play {
        seq: RequestId,
        room_id: RoomId,
        stream_id: StreamId,
        cdn: Option<CdnConfig>,
    },
    StopPlay {
        room_id: RoomId,
        stream_id: StreamId,
    },

    /// Answered with `RequestResult`
    BroadcastMessage {
        seq: RequestId,
        room_id: RoomId,
        message: String,
    },
    /// Answered with `BarrageResult`
    BarrageMessage {
        seq: RequestId,
        room_id: RoomId,
        message: String,
    },
    /// Answered with `RequestResult`; an empty `to_users` targets the whole room
    CustomCommand {
        seq: RequestId,
        room_id: RoomId,
        to_users: Vec<UserId>,
        command: String,
    },

    /// Answered with `MixerStartResult`
    StartMixer {
        seq: RequestId,
        task: MixerTask,
    },
    /// Answered with `RequestResult`
    StopMixer {
        seq: RequestId,
        task_id: TaskId,
    },
}

impl Request {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Login { .. } => "login",
            Request::Logout { .. } => "logout",
            Request::Publish { .. } => "publish",
            Request::StopPublish { .. } => "stop_publish",
            Request::SetExtraInfo { .. } => "set_extra_info",
            Request::MutePublish { .. } => "mute_publish",
            Request::AddCdnUrl { .. } => "add_cdn_url",
            Request::RemoveCdnUrl { .. } => "remove_cdn_url",
            Request::SendSei { .. } => "send_sei",
            Request::Play { .. } => "play",
            Request::StopPlay { .. } => "stop_play",
            Request::BroadcastMessage { .. } => "broadcast_message",
            Request::BarrageMessage { .. } => "barrage_message",
            Request::CustomCommand { .. } => "custom_command",
            Request::StartMixer { .. } => "start_mixer",
            Request::StopMixer { .. } => "stop_mixer",
        }
    }
}

/// Notices produced by the local media pipeline or reported by the service
/// about remote media
#[derive(Debug, Clone, PartialEq)]
pub enum MediaNotice {
    CapturedAudioFirstFrame,
    CapturedVideoFirstFrame {
        channel: PublishChannel,
    },
    PublisherVideoSizeChanged {
        channel: PublishChannel,
        size: Size,
    },
    PublisherQuality {
        channel: PublishChannel,
        quality: PublishStreamQuality,
    },
    PlayerQuality {
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
    RemoteCameraState {
        stream_id: StreamId,
        state: RemoteDeviceState,
    },
    RemoteMicState {
        stream_id: StreamId,
        state: RemoteDeviceState,
    },
}

/// Service to client
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The transport lost its connection and is retrying
    LinkDown,
    /// The transport is connected again
    LinkUp,

    LoginResult {
        seq: RequestId,
        room_id: RoomId,
        error_code: ErrorCode,
        /// Other members at the time of login
        users: Vec<User>,
        /// Streams in the room at the time of login
        streams: Vec<StreamInfo>,
    },
    /// Forced logout, for example the same user ID logged in elsewhere
    Kicked {
        room_id: RoomId,
        error_code: ErrorCode,
    },
    UserUpdate {
        room_id: RoomId,
        update_type: UpdateType,
        users: Vec<User>,
    },
    StreamUpdate {
        room_id: RoomId,
        update_type: UpdateType,
        streams: Vec<StreamInfo>,
    },
    StreamExtraInfoUpdate {
        room_id: RoomId,
        streams: Vec<StreamInfo>,
    },

    PublishResult {
        seq: RequestId,
        error_code: ErrorCode,
        extended_data: ExtendedData,
    },
    PlayResult {
        seq: RequestId,
        error_code: ErrorCode,
        extended_data: ExtendedData,
    },
    /// A played stream went away; the play request stays pending on the service
    PlayInterrupted {
        room_id: RoomId,
        stream_id: StreamId,
    },
    PublisherRelayCdnUpdate {
        stream_id: StreamId,
        infos: Vec<RelayCdnInfo>,
    },
    Sei {
        room_id: RoomId,
        stream_id: StreamId,
        data: Bytes,
    },

    /// Generic acknowledgement of a request that has no richer reply
    RequestResult {
        seq: RequestId,
        error_code: ErrorCode,
    },
    BarrageResult {
        seq: RequestId,
        error_code: ErrorCode,
        message_id: String,
    },
    BroadcastMessage {
        room_id: RoomId,
        messages: Vec<MessageInfo>,
    },
    BarrageMessage {
        room_id: RoomId,
        messages: Vec<BarrageMessageInfo>,
    },
    CustomCommand {
        room_id: RoomId,
        from_user: User,
        command: String,
    },

    MixerStartResult {
        seq: RequestId,
        error_code: ErrorCode,
        extended_data: ExtendedData,
    },
    MixerRelayCdnUpdate {
        task_id: TaskId,
        infos: Vec<RelayCdnInfo>,
    },
    MixerSoundLevel {
        levels: BTreeMap<u32, f32>,
    },

    Media(MediaNotice),
}

impl Inbound {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Inbound::LinkDown => "link_down",
            Inbound::LinkUp => "link_up",
            Inbound::LoginResult { .. } => "login_result",
            Inbound::Kicked { .. } => "kicked",
            Inbound::UserUpdate { .. } => "user_update",
            Inbound::StreamUpdate { .. } => "stream_update",
            Inbound::StreamExtraInfoUpdate { .. } => "stream_extra_info_update",
            Inbound::PublishResult { .. } => "publish_result",
            Inbound::PlayResult { .. } => "play_result",
            Inbound::PlayInterrupted { .. } => "play_interrupted",
            Inbound::PublisherRelayCdnUpdate { .. } => "publisher_relay_cdn_update",
            Inbound::Sei { .. } => "sei",
            Inbound::RequestResult { .. } => "request_result",
            Inbound::BarrageResult { .. } => "barrage_result",
            Inbound::BroadcastMessage { .. } => "broadcast_message",
            Inbound::BarrageMessage { .. } => "barrage_message",
            Inbound::CustomCommand { .. } => "custom_command",
            Inbound::MixerStartResult { .. } => "mixer_start_result",
            Inbound::MixerRelayCdnUpdate { .. } => "mixer_relay_cdn_update",
            Inbound::MixerSoundLevel { .. } => "mixer_sound_level",
            Inbound::Media(_) => "media",
        }
    }
}
