//! Rooms, streams and plays of the loopback service
//!
//! A stream is published into one room and played by stream ID. Plays for
//! a stream that does not exist wait until it does; plays of a stream that
//! goes away fall back to waiting with the same request ID, so the player's
//! original request resolves again when the stream returns.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::time::Instant;

use crate::dispatch::{ExtendedData, UpdateType};
use crate::error::ErrorCode;
use crate::ids::{RoomId, StreamId, StreamInfo, User, UserId};
use crate::media::RemoteDeviceState;
use crate::publisher::PublishChannel;
use crate::relay::{RelayCdnInfo, RelayCdnState, RelayCdnUpdateReason};
use crate::room::{BarrageMessageInfo, MessageInfo, RoomConfig};
use crate::signaling::{Inbound, MediaNotice, PublishParams, RequestId};

use super::server::{ClientId, Hub};

pub(super) struct Member {
    pub(super) client: ClientId,
    pub(super) user: User,
}

pub(super) struct RoomEntry {
    /// Set by the login that created the room (0 = unlimited)
    max_member_count: u32,
    pub(super) members: BTreeMap<UserId, Member>,
}

impl RoomEntry {
    pub(super) fn has_client(&self, client: ClientId) -> bool {
        self.members.values().any(|m| m.client == client)
    }

    fn member_of(&self, client: ClientId) -> Option<&User> {
        self.members
            .values()
            .find(|m| m.client == client)
            .map(|m| &m.user)
    }

    fn clients_except(&self, client: ClientId) -> Vec<ClientId> {
        self.members
            .values()
            .map(|m| m.client)
            .filter(|c| *c != client)
            .collect()
    }
}

pub(super) struct StreamEntry {
    pub(super) room_id: RoomId,
    pub(super) owner: ClientId,
    user: User,
    channel: PublishChannel,
    params: PublishParams,
    /// When the owner's link dropped (for grace period tracking)
    pub(super) disconnected_at: Option<Instant>,
}

impl StreamEntry {
    fn info(&self, stream_id: &StreamId) -> StreamInfo {
        StreamInfo {
            user: self.user.clone(),
            stream_id: stream_id.clone(),
            extra_info: self.params.extra_info.clone(),
        }
    }
}

pub(super) struct PlayEntry {
    room_id: RoomId,
    seq: RequestId,
    playing: bool,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn device_state(muted: bool) -> RemoteDeviceState {
    if muted {
        RemoteDeviceState::Mute
    } else {
        RemoteDeviceState::Open
    }
}

impl Hub {
    fn room_clients_except(&self, room_id: &RoomId, client: ClientId) -> Vec<ClientId> {
        self.rooms
            .get(room_id)
            .map(|room| room.clients_except(client))
            .unwrap_or_default()
    }

    fn fan_out(&mut self, clients: Vec<ClientId>, message: Inbound) {
        for client in clients {
            self.deliver(client, message.clone());
        }
    }

    fn players_of(&self, stream_id: &StreamId) -> Vec<(ClientId, RoomId)> {
        self.plays
            .iter()
            .filter(|((_, id), play)| id == stream_id && play.playing)
            .map(|((client, _), play)| (*client, play.room_id.clone()))
            .collect()
    }

    fn owns(&self, client: ClientId, stream_id: &StreamId) -> bool {
        self.streams
            .get(stream_id)
            .is_some_and(|stream| stream.owner == client)
    }

    // Rooms

    pub(super) fn login(
        &mut self,
        client: ClientId,
        seq: RequestId,
        room_id: RoomId,
        user: User,
        config: RoomConfig,
        token: Option<String>,
    ) {
        let reject = |hub: &mut Hub, error_code: ErrorCode| {
            tracing::info!(client = %client, room = %room_id, error_code = %error_code, "Login rejected");
            hub.deliver(
                client,
                Inbound::LoginResult {
                    seq,
                    room_id: room_id.clone(),
                    error_code,
                    users: Vec::new(),
                    streams: Vec::new(),
                },
            );
        };

        if let Some(required) = &self.config.required_token {
            if token.as_deref() != Some(required.as_str()) {
                return reject(self, ErrorCode::ROOM_AUTH_FAILED);
            }
        }

        let room = self.rooms.entry(room_id.clone()).or_insert_with(|| RoomEntry {
            max_member_count: config.max_member_count,
            members: BTreeMap::new(),
        });

        let existing = room.members.get(&user.user_id).map(|m| m.client);
        let rejoin = existing == Some(client);
        if existing.is_none()
            && room.max_member_count > 0
            && room.members.len() >= room.max_member_count as usize
        {
            return reject(self, ErrorCode::ROOM_FULL);
        }

        if let Some(earlier) = existing.filter(|c| *c != client) {
            tracing::info!(
                room = %room_id,
                user = %user.user_id,
                earlier = %earlier,
                client = %client,
                "User logged in elsewhere, kicking earlier client"
            );
            self.deliver(
                earlier,
                Inbound::Kicked {
                    room_id: room_id.clone(),
                    error_code: ErrorCode::ROOM_KICKED_LOGIN_ELSEWHERE,
                },
            );
            self.leave(earlier, &room_id, false);
        }

        // The kicked client may have been the last member
        let room = self.rooms.entry(room_id.clone()).or_insert_with(|| RoomEntry {
            max_member_count: config.max_member_count,
            members: BTreeMap::new(),
        });
        let users: Vec<User> = room
            .members
            .values()
            .filter(|m| m.client != client)
            .map(|m| m.user.clone())
            .collect();
        let others = room.clients_except(client);
        room.members.insert(
            user.user_id.clone(),
            Member {
                client,
                user: user.clone(),
            },
        );

        let streams: Vec<StreamInfo> = self
            .streams
            .iter()
            .filter(|(_, s)| s.room_id == room_id && s.owner != client)
            .map(|(id, s)| s.info(id))
            .collect();

        tracing::info!(
            client = %client,
            room = %room_id,
            user = %user.user_id,
            rejoin = rejoin,
            "Login accepted"
        );
        self.deliver(
            client,
            Inbound::LoginResult {
                seq,
                room_id: room_id.clone(),
                error_code: ErrorCode::SUCCESS,
                users,
                streams,
            },
        );

        if existing.is_none() {
            self.fan_out(
                others,
                Inbound::UserUpdate {
                    room_id,
                    update_type: UpdateType::Add,
                    users: vec![user],
                },
            );
        }
    }

    pub(super) fn logout(&mut self, client: ClientId, room_id: &RoomId) {
        self.leave(client, room_id, true);
    }

    /// Remove a client from a room along with its streams and plays there
    pub(super) fn leave(&mut self, client: ClientId, room_id: &RoomId, notify_members: bool) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        let Some(user_id) = room
            .members
            .iter()
            .find(|(_, m)| m.client == client)
            .map(|(id, _)| id.clone())
        else {
            return;
        };
        let user = room.members.remove(&user_id).map(|m| m.user);
        let others = room.clients_except(client);
        if room.members.is_empty() {
            self.rooms.remove(room_id);
        }

        let owned: Vec<StreamId> = self
            .streams
            .iter()
            .filter(|(_, s)| s.owner == client && &s.room_id == room_id)
            .map(|(id, _)| id.clone())
            .collect();
        for stream_id in owned {
            self.withdraw(&stream_id);
        }
        self.plays
            .retain(|(player, _), play| !(*player == client && &play.room_id == room_id));

        tracing::info!(client = %client, room = %room_id, user = %user_id, "Member left");
        if let (true, Some(user)) = (notify_members, user) {
            self.fan_out(
                others,
                Inbound::UserUpdate {
                    room_id: room_id.clone(),
                    update_type: UpdateType::Delete,
                    users: vec![user],
                },
            );
        }
    }

    // Streams

    pub(super) fn publish(
        &mut self,
        client: ClientId,
        seq: RequestId,
        room_id: RoomId,
        channel: PublishChannel,
        stream_id: StreamId,
        params: PublishParams,
    ) {
        let result = |error_code| Inbound::PublishResult {
            seq,
            error_code,
            extended_data: ExtendedData::new(),
        };

        let Some(user) = self
            .rooms
            .get(&room_id)
            .and_then(|room| room.member_of(client))
            .cloned()
        else {
            return self.deliver(client, result(ErrorCode::PUBLISHER_NOT_IN_ROOM));
        };

        let reclaim = match self.streams.get(&stream_id) {
            Some(stream) if stream.owner != client => {
                tracing::info!(stream = %stream_id, client = %client, "Stream already published");
                return self.deliver(client, result(ErrorCode::PUBLISHER_DUPLICATE_STREAM));
            }
            Some(_) => true,
            None => false,
        };

        let cdn_urls: Vec<String> = params.cdn_urls.iter().cloned().collect();
        let entry = StreamEntry {
            room_id: room_id.clone(),
            owner: client,
            user,
            channel,
            params,
            disconnected_at: None,
        };
        let info = entry.info(&stream_id);
        self.streams.insert(stream_id.clone(), entry);

        tracing::info!(
            client = %client,
            room = %room_id,
            stream = %stream_id,
            channel = ?channel,
            reclaim = reclaim,
            "Stream published"
        );
        self.deliver(client, result(ErrorCode::SUCCESS));

        if !cdn_urls.is_empty() {
            let infos: Vec<RelayCdnInfo> = cdn_urls
                .into_iter()
                .map(|url| {
                    RelayCdnInfo::new(url, RelayCdnState::Start, RelayCdnUpdateReason::None, self.stamp())
                })
                .collect();
            self.deliver(client, Inbound::PublisherRelayCdnUpdate { stream_id: stream_id.clone(), infos });
        }

        if !reclaim {
            let others = self.room_clients_except(&room_id, client);
            self.fan_out(
                others,
                Inbound::StreamUpdate {
                    room_id,
                    update_type: UpdateType::Add,
                    streams: vec![info],
                },
            );
        }

        self.resolve_plays(&stream_id);
        self.mixer_input_available(&stream_id);
    }

    pub(super) fn stop_publish(&mut self, client: ClientId, room_id: &RoomId, stream_id: &StreamId) {
        match self.streams.get(stream_id) {
            Some(stream) if stream.owner == client && &stream.room_id == room_id => {
                self.withdraw(stream_id)
            }
            _ => tracing::debug!(client = %client, stream = %stream_id, "Stop for unknown stream ignored"),
        }
    }

    /// Take a stream out of its room
    fn withdraw(&mut self, stream_id: &StreamId) {
        let Some(stream) = self.streams.remove(stream_id) else {
            return;
        };
        tracing::info!(stream = %stream_id, room = %stream.room_id, channel = ?stream.channel, "Stream withdrawn");

        let others = self.room_clients_except(&stream.room_id, stream.owner);
        self.fan_out(
            others,
            Inbound::StreamUpdate {
                room_id: stream.room_id.clone(),
                update_type: UpdateType::Delete,
                streams: vec![stream.info(stream_id)],
            },
        );

        for (client, room_id) in self.players_of(stream_id) {
            if let Some(play) = self.plays.get_mut(&(client, stream_id.clone())) {
                play.playing = false;
            }
            self.deliver(
                client,
                Inbound::PlayInterrupted {
                    room_id,
                    stream_id: stream_id.clone(),
                },
            );
        }

        self.mixer_input_lost(stream_id);
    }

    pub(super) fn set_extra_info(
        &mut self,
        client: ClientId,
        seq: RequestId,
        room_id: &RoomId,
        stream_id: &StreamId,
        extra_info: String,
    ) {
        let Some(stream) = self.streams.get_mut(stream_id).filter(|s| s.owner == client) else {
            return self.deliver(
                client,
                Inbound::RequestResult {
                    seq,
                    error_code: ErrorCode::PUBLISHER_NOT_PUBLISHING,
                },
            );
        };
        stream.params.extra_info = extra_info;
        let info = stream.info(stream_id);

        self.deliver(
            client,
            Inbound::RequestResult {
                seq,
                error_code: ErrorCode::SUCCESS,
            },
        );
        let others = self.room_clients_except(room_id, client);
        self.fan_out(
            others,
            Inbound::StreamExtraInfoUpdate {
                room_id: room_id.clone(),
                streams: vec![info],
            },
        );
    }

    pub(super) fn mute_publish(
        &mut self,
        client: ClientId,
        stream_id: &StreamId,
        audio_muted: bool,
        video_muted: bool,
    ) {
        let Some(stream) = self.streams.get_mut(stream_id).filter(|s| s.owner == client) else {
            return;
        };
        let audio_changed = stream.params.audio_muted != audio_muted;
        let video_changed = stream.params.video_muted != video_muted;
        stream.params.audio_muted = audio_muted;
        stream.params.video_muted = video_muted;

        for (player, _) in self.players_of(stream_id) {
            if audio_changed {
                self.deliver(
                    player,
                    Inbound::Media(MediaNotice::RemoteMicState {
                        stream_id: stream_id.clone(),
                        state: device_state(audio_muted),
                    }),
                );
            }
            if video_changed {
                self.deliver(
                    player,
                    Inbound::Media(MediaNotice::RemoteCameraState {
                        stream_id: stream_id.clone(),
                        state: device_state(video_muted),
                    }),
                );
            }
        }
    }

    pub(super) fn update_cdn_url(
        &mut self,
        client: ClientId,
        seq: RequestId,
        stream_id: &StreamId,
        url: String,
        add: bool,
    ) {
        let Some(stream) = self.streams.get_mut(stream_id).filter(|s| s.owner == client) else {
            return self.deliver(
                client,
                Inbound::RequestResult {
                    seq,
                    error_code: ErrorCode::PUBLISHER_NOT_PUBLISHING,
                },
            );
        };
        let changed = if add {
            stream.params.cdn_urls.insert(url.clone())
        } else {
            stream.params.cdn_urls.remove(&url)
        };

        self.deliver(
            client,
            Inbound::RequestResult {
                seq,
                error_code: ErrorCode::SUCCESS,
            },
        );
        if changed {
            let (state, reason) = if add {
                (RelayCdnState::Start, RelayCdnUpdateReason::None)
            } else {
                (RelayCdnState::Stop, RelayCdnUpdateReason::Disconnected)
            };
            let info = RelayCdnInfo::new(url, state, reason, self.stamp());
            self.deliver(
                client,
                Inbound::PublisherRelayCdnUpdate {
                    stream_id: stream_id.clone(),
                    infos: vec![info],
                },
            );
        }
    }

    pub(super) fn forward_sei(&mut self, client: ClientId, stream_id: &StreamId, data: Bytes) {
        if !self.owns(client, stream_id) {
            return;
        }
        for (player, room_id) in self.players_of(stream_id) {
            self.deliver(
                player,
                Inbound::Sei {
                    room_id,
                    stream_id: stream_id.clone(),
                    data: data.clone(),
                },
            );
        }
    }

    // Plays

    pub(super) fn play(&mut self, client: ClientId, seq: RequestId, room_id: RoomId, stream_id: StreamId) {
        if !self.rooms.get(&room_id).is_some_and(|room| room.has_client(client)) {
            return self.deliver(
                client,
                Inbound::PlayResult {
                    seq,
                    error_code: ErrorCode::PLAYER_NOT_IN_ROOM,
                    extended_data: ExtendedData::new(),
                },
            );
        }

        tracing::debug!(client = %client, stream = %stream_id, seq = seq, "Play requested");
        self.plays.insert(
            (client, stream_id.clone()),
            PlayEntry {
                room_id,
                seq,
                playing: false,
            },
        );
        if self.streams.contains_key(&stream_id) {
            self.resolve_plays(&stream_id);
        }
    }

    pub(super) fn stop_play(&mut self, client: ClientId, stream_id: &StreamId) {
        self.plays.remove(&(client, stream_id.clone()));
    }

    /// Answer every waiting play of a stream that now exists
    fn resolve_plays(&mut self, stream_id: &StreamId) {
        let Some((audio_muted, video_muted)) = self
            .streams
            .get(stream_id)
            .map(|s| (s.params.audio_muted, s.params.video_muted))
        else {
            return;
        };

        let waiting: Vec<(ClientId, RequestId)> = self
            .plays
            .iter_mut()
            .filter(|((_, id), play)| id == stream_id && !play.playing)
            .map(|((client, _), play)| {
                play.playing = true;
                (*client, play.seq)
            })
            .collect();

        for (client, seq) in waiting {
            tracing::debug!(client = %client, stream = %stream_id, seq = seq, "Play resolved");
            self.deliver(
                client,
                Inbound::PlayResult {
                    seq,
                    error_code: ErrorCode::SUCCESS,
                    extended_data: ExtendedData::new(),
                },
            );
            if audio_muted {
                self.deliver(
                    client,
                    Inbound::Media(MediaNotice::RemoteMicState {
                        stream_id: stream_id.clone(),
                        state: RemoteDeviceState::Mute,
                    }),
                );
            }
            if video_muted {
                self.deliver(
                    client,
                    Inbound::Media(MediaNotice::RemoteCameraState {
                        stream_id: stream_id.clone(),
                        state: RemoteDeviceState::Mute,
                    }),
                );
            }
        }
    }

    /// Withdraw streams whose owner stayed offline past the grace period
    pub(super) fn sweep_streams(&mut self, now: Instant) {
        let grace = self.config.publisher_grace_period;
        let expired: Vec<StreamId> = self
            .streams
            .iter()
            .filter(|(_, s)| s.disconnected_at.is_some_and(|at| now.duration_since(at) > grace))
            .map(|(id, _)| id.clone())
            .collect();

        for stream_id in expired {
            tracing::info!(stream = %stream_id, "Publisher grace period expired");
            self.withdraw(&stream_id);
        }
    }

    // IM

    fn sender(&self, client: ClientId, room_id: &RoomId) -> Option<User> {
        self.rooms
            .get(room_id)
            .and_then(|room| room.member_of(client))
            .cloned()
    }

    pub(super) fn broadcast_message(&mut self, client: ClientId, seq: RequestId, room_id: &RoomId, message: String) {
        let Some(from_user) = self.sender(client, room_id) else {
            return self.deliver(
                client,
                Inbound::RequestResult {
                    seq,
                    error_code: ErrorCode::ROOM_NOT_LOGGED_IN,
                },
            );
        };

        self.deliver(
            client,
            Inbound::RequestResult {
                seq,
                error_code: ErrorCode::SUCCESS,
            },
        );
        let others = self.room_clients_except(room_id, client);
        self.fan_out(
            others,
            Inbound::BroadcastMessage {
                room_id: room_id.clone(),
                messages: vec![MessageInfo {
                    message,
                    send_time: now_millis(),
                    from_user,
                }],
            },
        );
    }

    pub(super) fn barrage_message(&mut self, client: ClientId, seq: RequestId, room_id: &RoomId, message: String) {
        let Some(from_user) = self.sender(client, room_id) else {
            return self.deliver(
                client,
                Inbound::BarrageResult {
                    seq,
                    error_code: ErrorCode::ROOM_NOT_LOGGED_IN,
                    message_id: String::new(),
                },
            );
        };

        let message_id = self.next_message_id();
        self.deliver(
            client,
            Inbound::BarrageResult {
                seq,
                error_code: ErrorCode::SUCCESS,
                message_id: message_id.clone(),
            },
        );
        let others = self.room_clients_except(room_id, client);
        self.fan_out(
            others,
            Inbound::BarrageMessage {
                room_id: room_id.clone(),
                messages: vec![BarrageMessageInfo {
                    message,
                    message_id,
                    send_time: now_millis(),
                    from_user,
                }],
            },
        );
    }

    pub(super) fn custom_command(
        &mut self,
        client: ClientId,
        seq: RequestId,
        room_id: &RoomId,
        to_users: &[UserId],
        command: String,
    ) {
        let Some(from_user) = self.sender(client, room_id) else {
            return self.deliver(
                client,
                Inbound::RequestResult {
                    seq,
                    error_code: ErrorCode::ROOM_NOT_LOGGED_IN,
                },
            );
        };

        let targets: Vec<ClientId> = self
            .rooms
            .get(room_id)
            .map(|room| {
                room.members
                    .iter()
                    .filter(|(id, m)| m.client != client && (to_users.is_empty() || to_users.contains(*id)))
                    .map(|(_, m)| m.client)
                    .collect()
            })
            .unwrap_or_default();

        self.deliver(
            client,
            Inbound::RequestResult {
                seq,
                error_code: ErrorCode::SUCCESS,
            },
        );
        self.fan_out(
            targets,
            Inbound::CustomCommand {
                room_id: room_id.clone(),
                from_user,
                command,
            },
        );
    }
}
