//! Room connection lifecycle
//!
//! `Disconnected -> Connecting -> Connected`, with transient link loss taking
//! a connected room back to `Connecting` until the transport recovers. A room
//! is torn down on logout, kick, login rejection, login timeout or an expired
//! reconnect window; teardown reports every publisher and player in the room
//! as stopped before the room itself reports `Disconnected`.

use std::collections::BTreeMap;

use crate::dispatch::{Event, ExtendedData, UpdateType};
use crate::engine::rate_limit::RateLimiter;
use crate::engine::state::{EngineState, Outbox, TimerEvent};
use crate::error::ErrorCode;
use crate::ids::{RoomId, StreamId, StreamInfo, User, UserId};
use crate::player::PlayerState;
use crate::publisher::PublisherState;
use crate::signaling::{Request, RequestId};

use super::config::RoomConfig;
use super::session::RoomSession;
use super::state::RoomState;

pub(crate) fn room_state_event(room_id: &RoomId, state: RoomState, error_code: ErrorCode) -> Event {
    Event::RoomStateUpdate {
        room_id: room_id.clone(),
        state,
        error_code,
        extended_data: ExtendedData::new(),
    }
}

impl EngineState {
    /// Start joining a room
    pub(crate) fn login(
        &mut self,
        room_id: RoomId,
        user: User,
        config: RoomConfig,
        token: Option<String>,
        out: &mut Outbox,
    ) {
        if let Some(room) = self.rooms.get(&room_id) {
            tracing::warn!(room = %room_id, state = ?room.state, "Already in room, login ignored");
            return;
        }

        let limiter = RateLimiter::new(self.config.im_rate_limit, self.config.im_rate_window);
        let mut room = RoomSession::new(room_id.clone(), user, config, token, limiter);
        room.state = RoomState::Connecting;

        tracing::info!(room = %room_id, user = %room.user.user_id, "Logging in");

        self.rooms.insert(room_id.clone(), room);
        out.emit(room_state_event(&room_id, RoomState::Connecting, ErrorCode::SUCCESS));
        self.send_login(&room_id, out);
    }

    /// Issue a login request for a room and arm its timeout
    fn send_login(&mut self, room_id: &RoomId, out: &mut Outbox) {
        let seq = self.next_seq();
        let link_up = self.link_up;
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };

        room.login_seq = Some(seq);
        if link_up {
            out.send(Request::Login {
                seq,
                room_id: room_id.clone(),
                user: room.user.clone(),
                config: room.config.clone(),
                token: room.token.clone(),
            });
        }
        out.schedule(
            self.config.login_timeout,
            TimerEvent::LoginTimeout {
                room_id: room_id.clone(),
                seq,
            },
        );
    }

    /// Leave a room
    pub(crate) fn logout(&mut self, room_id: &RoomId, out: &mut Outbox) {
        let Some(room) = self.rooms.remove(room_id) else {
            tracing::warn!(room = %room_id, "Logout from unknown room ignored");
            return;
        };

        if self.link_up {
            out.send(Request::Logout {
                room_id: room_id.clone(),
            });
        } else {
            self.orphaned.push(room_id.clone());
        }

        tracing::info!(room = %room_id, "Logged out");
        self.teardown(room, ErrorCode::SUCCESS, out);
    }

    /// Report every session of a removed room as stopped, then the room
    fn teardown(&mut self, room: RoomSession, error_code: ErrorCode, out: &mut Outbox) {
        for (channel, publisher) in &room.publishers {
            if let (true, Some(stream_id)) = (publisher.state.is_active(), &publisher.stream_id) {
                out.emit(Event::PublisherStateUpdate {
                    stream_id: stream_id.clone(),
                    channel: *channel,
                    state: PublisherState::NoPublish,
                    error_code,
                    extended_data: ExtendedData::new(),
                });
            }
        }
        for stream_id in room.players.keys() {
            out.emit(Event::PlayerStateUpdate {
                stream_id: stream_id.clone(),
                state: PlayerState::NoPlay,
                error_code,
                extended_data: ExtendedData::new(),
            });
        }
        out.emit(room_state_event(&room.room_id, RoomState::Disconnected, error_code));

        self.completions.fail_room(&room.room_id, ErrorCode::REQUEST_CANCELLED);
        for channel in room.publishers.keys() {
            self.release_capture(*channel);
        }

        tracing::info!(
            room = %room.room_id,
            error_code = %error_code,
            publishers = room.publishers.len(),
            players = room.players.len(),
            "Room torn down"
        );
    }

    pub(crate) fn on_login_result(
        &mut self,
        seq: RequestId,
        room_id: &RoomId,
        error_code: ErrorCode,
        users: Vec<User>,
        streams: Vec<StreamInfo>,
        out: &mut Outbox,
    ) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            tracing::debug!(room = %room_id, seq = seq, "Login result for unknown room dropped");
            return;
        };
        if room.login_seq != Some(seq) {
            tracing::debug!(room = %room_id, seq = seq, "Stale login result dropped");
            return;
        }
        room.login_seq = None;

        if !error_code.is_success() {
            tracing::warn!(room = %room_id, error_code = %error_code, "Login rejected");
            if let Some(room) = self.rooms.remove(room_id) {
                self.teardown(room, error_code, out);
            }
            return;
        }

        room.state = RoomState::Connected;
        out.emit(room_state_event(room_id, RoomState::Connected, ErrorCode::SUCCESS));

        let own = room.user.user_id.clone();
        let users: BTreeMap<UserId, User> = users
            .into_iter()
            .filter(|u| u.user_id != own)
            .map(|u| (u.user_id.clone(), u))
            .collect();
        let streams: BTreeMap<StreamId, StreamInfo> = streams
            .into_iter()
            .filter(|s| s.user.user_id != own)
            .map(|s| (s.stream_id.clone(), s))
            .collect();

        if room.has_connected {
            emit_reconnect_diff(room, &users, &streams, out);
        } else {
            if room.config.is_user_status_notify && !users.is_empty() {
                out.emit(Event::RoomUserUpdate {
                    room_id: room_id.clone(),
                    update_type: UpdateType::Add,
                    users: users.values().cloned().collect(),
                });
            }
            if !streams.is_empty() {
                out.emit(Event::RoomStreamUpdate {
                    room_id: room_id.clone(),
                    update_type: UpdateType::Add,
                    streams: streams.values().cloned().collect(),
                });
            }
        }

        tracing::info!(
            room = %room_id,
            users = users.len(),
            streams = streams.len(),
            reconnect = room.has_connected,
            "Room connected"
        );

        room.users = users;
        room.streams = streams;
        room.has_connected = true;
        room.reconnecting = false;

        self.resume_sessions(room_id, out);
    }

    /// Send the requests of sessions that were waiting for the room
    fn resume_sessions(&mut self, room_id: &RoomId, out: &mut Outbox) {
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        let publishers: Vec<_> = room
            .publishers
            .iter()
            .filter(|(_, p)| p.state.is_active() && p.request.is_none())
            .map(|(channel, _)| *channel)
            .collect();
        let players: Vec<StreamId> = room
            .players
            .iter()
            .filter(|(_, p)| p.request.is_none())
            .map(|(stream_id, _)| stream_id.clone())
            .collect();

        for channel in publishers {
            self.send_publish(room_id, channel, out);
        }
        for stream_id in players {
            self.send_play(room_id, &stream_id, out);
        }
    }

    pub(crate) fn on_kicked(&mut self, room_id: &RoomId, error_code: ErrorCode, out: &mut Outbox) {
        let Some(room) = self.rooms.remove(room_id) else {
            tracing::debug!(room = %room_id, "Kick for unknown room dropped");
            return;
        };

        tracing::warn!(room = %room_id, error_code = %error_code, "Kicked out of room");
        self.teardown(room, error_code, out);
    }

    pub(crate) fn on_login_timeout(&mut self, room_id: &RoomId, seq: RequestId, out: &mut Outbox) {
        let expired = self
            .rooms
            .get(room_id)
            .map_or(false, |r| r.login_seq == Some(seq));
        if !expired {
            return;
        }

        // A re-login is bounded by the reconnect window, not the login timeout
        if self.rooms.get(room_id).map_or(false, |r| r.reconnecting) {
            tracing::warn!(room = %room_id, seq = seq, "Re-login timed out, retrying");
            self.send_login(room_id, out);
            return;
        }

        let Some(room) = self.rooms.remove(room_id) else {
            return;
        };
        if self.link_up {
            out.send(Request::Logout {
                room_id: room_id.clone(),
            });
        }

        tracing::warn!(room = %room_id, seq = seq, "Login timed out");
        self.teardown(room, ErrorCode::ROOM_LOGIN_TIMEOUT, out);
    }

    /// The transport lost its connection; everything waits for it to return
    pub(crate) fn on_link_down(&mut self, out: &mut Outbox) {
        if !self.link_up {
            return;
        }
        self.link_up = false;
        self.reconnect_epoch += 1;
        out.schedule(
            self.config.reconnect_timeout,
            TimerEvent::ReconnectExpired {
                epoch: self.reconnect_epoch,
            },
        );

        tracing::warn!(rooms = self.rooms.len(), "Link down, waiting to reconnect");

        for room in self.rooms.values_mut() {
            room.login_seq = None;
            room.reconnecting = room.has_connected;
            if room.state == RoomState::Connected {
                room.state = RoomState::Connecting;
                out.emit(room_state_event(&room.room_id, RoomState::Connecting, ErrorCode::SUCCESS));
            }
            for (channel, publisher) in room.publishers.iter_mut() {
                publisher.request = None;
                if publisher.state != PublisherState::Publishing {
                    continue;
                }
                publisher.state = PublisherState::PublishRequesting;
                if let Some(stream_id) = &publisher.stream_id {
                    out.emit(Event::PublisherStateUpdate {
                        stream_id: stream_id.clone(),
                        channel: *channel,
                        state: PublisherState::PublishRequesting,
                        error_code: ErrorCode::SUCCESS,
                        extended_data: ExtendedData::new(),
                    });
                }
            }
            for (stream_id, player) in room.players.iter_mut() {
                player.request = None;
                if player.state == PlayerState::Playing {
                    player.state = PlayerState::PlayRequesting;
                    out.emit(Event::PlayerStateUpdate {
                        stream_id: stream_id.clone(),
                        state: PlayerState::PlayRequesting,
                        error_code: ErrorCode::SUCCESS,
                        extended_data: ExtendedData::new(),
                    });
                }
            }
        }

        self.mixer.on_link_down();
        self.completions.fail_all(ErrorCode::NETWORK_INTERRUPTED);
    }

    /// The transport is back; log every room in again
    pub(crate) fn on_link_up(&mut self, out: &mut Outbox) {
        if self.link_up {
            return;
        }
        self.link_up = true;

        for room_id in self.orphaned.drain(..) {
            out.send(Request::Logout { room_id });
        }

        tracing::info!(rooms = self.rooms.len(), "Link up, logging rooms back in");

        let room_ids: Vec<RoomId> = self.rooms.keys().cloned().collect();
        for room_id in room_ids {
            self.send_login(&room_id, out);
        }
    }

    pub(crate) fn on_reconnect_expired(&mut self, epoch: u64, out: &mut Outbox) {
        if epoch != self.reconnect_epoch {
            return;
        }

        // With the link back, only rooms still waiting for their re-login expire
        let link_up = self.link_up;
        let expired: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, room)| !link_up || room.reconnecting)
            .map(|(room_id, _)| room_id.clone())
            .collect();
        if expired.is_empty() {
            return;
        }

        tracing::warn!(rooms = expired.len(), link_up = link_up, "Reconnect window expired");

        for room_id in expired {
            let Some(room) = self.rooms.remove(&room_id) else {
                continue;
            };
            if link_up {
                out.send(Request::Logout { room_id });
            } else {
                self.orphaned.push(room_id);
            }
            self.teardown(room, ErrorCode::ROOM_RECONNECT_FAILED, out);
        }
    }

    pub(crate) fn on_user_update(
        &mut self,
        room_id: &RoomId,
        update_type: UpdateType,
        users: Vec<User>,
        out: &mut Outbox,
    ) {
        let Some(room) = self.rooms.get_mut(room_id).filter(|r| r.is_connected()) else {
            tracing::debug!(room = %room_id, "User update before snapshot dropped");
            return;
        };

        let own = room.user.user_id.clone();
        let mut changed = Vec::new();
        for user in users.into_iter().filter(|u| u.user_id != own) {
            let applied = match update_type {
                UpdateType::Add => room.users.insert(user.user_id.clone(), user.clone()).is_none(),
                UpdateType::Delete => room.users.remove(&user.user_id).is_some(),
            };
            if applied {
                changed.push(user);
            }
        }

        if room.config.is_user_status_notify && !changed.is_empty() {
            out.emit(Event::RoomUserUpdate {
                room_id: room_id.clone(),
                update_type,
                users: changed,
            });
        }
    }

    pub(crate) fn on_stream_update(
        &mut self,
        room_id: &RoomId,
        update_type: UpdateType,
        streams: Vec<StreamInfo>,
        out: &mut Outbox,
    ) {
        let Some(room) = self.rooms.get_mut(room_id).filter(|r| r.is_connected()) else {
            tracing::debug!(room = %room_id, "Stream update before snapshot dropped");
            return;
        };

        let own = room.user.user_id.clone();
        let mut changed = Vec::new();
        for stream in streams.into_iter().filter(|s| s.user.user_id != own) {
            let applied = match update_type {
                UpdateType::Add => room
                    .streams
                    .insert(stream.stream_id.clone(), stream.clone())
                    .is_none(),
                UpdateType::Delete => room.streams.remove(&stream.stream_id).is_some(),
            };
            if applied {
                changed.push(stream);
            }
        }

        if !changed.is_empty() {
            out.emit(Event::RoomStreamUpdate {
                room_id: room_id.clone(),
                update_type,
                streams: changed,
            });
        }
    }

    pub(crate) fn on_stream_extra_info_update(
        &mut self,
        room_id: &RoomId,
        streams: Vec<StreamInfo>,
        out: &mut Outbox,
    ) {
        let Some(room) = self.rooms.get_mut(room_id).filter(|r| r.is_connected()) else {
            return;
        };

        let mut changed = Vec::new();
        for stream in streams {
            if let Some(known) = room.streams.get_mut(&stream.stream_id) {
                if known.extra_info != stream.extra_info {
                    known.extra_info = stream.extra_info.clone();
                    changed.push(stream);
                }
            }
        }

        if !changed.is_empty() {
            out.emit(Event::RoomStreamExtraInfoUpdate {
                room_id: room_id.clone(),
                streams: changed,
            });
        }
    }
}

/// Deltas between the members and streams known before a reconnect and the
/// fresh snapshot
fn emit_reconnect_diff(
    room: &RoomSession,
    users: &BTreeMap<UserId, User>,
    streams: &BTreeMap<StreamId, StreamInfo>,
    out: &mut Outbox,
) {
    if room.config.is_user_status_notify {
        let gone: Vec<User> = room
            .users
            .values()
            .filter(|u| !users.contains_key(&u.user_id))
            .cloned()
            .collect();
        let joined: Vec<User> = users
            .values()
            .filter(|u| !room.users.contains_key(&u.user_id))
            .cloned()
            .collect();

        if !gone.is_empty() {
            out.emit(Event::RoomUserUpdate {
                room_id: room.room_id.clone(),
                update_type: UpdateType::Delete,
                users: gone,
            });
        }
        if !joined.is_empty() {
            out.emit(Event::RoomUserUpdate {
                room_id: room.room_id.clone(),
                update_type: UpdateType::Add,
                users: joined,
            });
        }
    }

    let removed: Vec<StreamInfo> = room
        .streams
        .values()
        .filter(|s| !streams.contains_key(&s.stream_id))
        .cloned()
        .collect();
    let added: Vec<StreamInfo> = streams
        .values()
        .filter(|s| !room.streams.contains_key(&s.stream_id))
        .cloned()
        .collect();
    let updated: Vec<StreamInfo> = streams
        .values()
        .filter(|s| {
            room.streams
                .get(&s.stream_id)
                .map_or(false, |known| known.extra_info != s.extra_info)
        })
        .cloned()
        .collect();

    if !removed.is_empty() {
        out.emit(Event::RoomStreamUpdate {
            room_id: room.room_id.clone(),
            update_type: UpdateType::Delete,
            streams: removed,
        });
    }
    if !added.is_empty() {
        out.emit(Event::RoomStreamUpdate {
            room_id: room.room_id.clone(),
            update_type: UpdateType::Add,
            streams: added,
        });
    }
    if !updated.is_empty() {
        out.emit(Event::RoomStreamExtraInfoUpdate {
            room_id: room.room_id.clone(),
            streams: updated,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::testing::*;
    use crate::engine::state::EngineInput;
    use crate::signaling::Inbound;

    fn stream(user: &str, id: &str) -> StreamInfo {
        StreamInfo {
            user: User::with_id(user).unwrap(),
            stream_id: StreamId::new(id).unwrap(),
            extra_info: String::new(),
        }
    }

    fn login(state: &mut EngineState, id: &str, config: RoomConfig) -> Outbox {
        let mut out = Outbox::default();
        state.login(room(id), User::with_id("me").unwrap(), config, None, &mut out);
        out
    }

    #[test]
    fn test_login_is_connecting_immediately() {
        let mut state = state();
        let out = login(&mut state, "r1", RoomConfig::default());

        assert_eq!(kinds(&out), vec!["room_state_update"]);
        assert_eq!(state.rooms[&room("r1")].state, RoomState::Connecting);
        assert!(matches!(out.requests[..], [Request::Login { .. }]));
        assert!(matches!(
            out.timers[..],
            [(_, TimerEvent::LoginTimeout { .. })]
        ));
    }

    #[test]
    fn test_login_then_logout_before_ack() {
        let mut state = state();
        let out = login(&mut state, "r1", RoomConfig::default());
        let seq = login_seq(&out);

        let mut out = Outbox::default();
        state.logout(&room("r1"), &mut out);
        assert_eq!(
            out.events,
            vec![room_state_event(&room("r1"), RoomState::Disconnected, ErrorCode::SUCCESS)]
        );
        assert!(state.rooms.is_empty());

        // The late ack changes nothing
        let out = input(
            &mut state,
            Inbound::LoginResult {
                seq,
                room_id: room("r1"),
                error_code: ErrorCode::SUCCESS,
                users: Vec::new(),
                streams: Vec::new(),
            },
        );
        assert!(out.events.is_empty());
        assert!(state.rooms.is_empty());
    }

    #[test]
    fn test_snapshot_precedes_deltas() {
        let mut state = state();
        let out = login(
            &mut state,
            "r1",
            RoomConfig::default().user_status_notify(true),
        );
        let seq = login_seq(&out);

        // Deltas before the snapshot are folded into it by the service
        let out = input(
            &mut state,
            Inbound::StreamUpdate {
                room_id: room("r1"),
                update_type: UpdateType::Add,
                streams: vec![stream("u2", "early")],
            },
        );
        assert!(out.events.is_empty());

        let out = input(
            &mut state,
            Inbound::LoginResult {
                seq,
                room_id: room("r1"),
                error_code: ErrorCode::SUCCESS,
                users: vec![User::with_id("u2").unwrap(), User::with_id("me").unwrap()],
                streams: vec![stream("u2", "s1")],
            },
        );
        assert_eq!(
            kinds(&out),
            vec!["room_state_update", "room_user_update", "room_stream_update"]
        );
        match &out.events[1] {
            Event::RoomUserUpdate { users, .. } => assert_eq!(users.len(), 1),
            other => panic!("unexpected {:?}", other),
        }

        let out = input(
            &mut state,
            Inbound::StreamUpdate {
                room_id: room("r1"),
                update_type: UpdateType::Add,
                streams: vec![stream("u2", "s2")],
            },
        );
        assert_eq!(kinds(&out), vec!["room_stream_update"]);
    }

    #[test]
    fn test_user_updates_need_notify_flag() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");

        let out = input(
            &mut state,
            Inbound::UserUpdate {
                room_id,
                update_type: UpdateType::Add,
                users: vec![User::with_id("u2").unwrap()],
            },
        );
        assert!(out.events.is_empty());
        assert_eq!(state.rooms[&room("r1")].users.len(), 1);
    }

    #[test]
    fn test_login_rejected() {
        let mut state = state();
        let out = login(&mut state, "r1", RoomConfig::default());
        let seq = login_seq(&out);

        let out = input(
            &mut state,
            Inbound::LoginResult {
                seq,
                room_id: room("r1"),
                error_code: ErrorCode::ROOM_AUTH_FAILED,
                users: Vec::new(),
                streams: Vec::new(),
            },
        );
        assert_eq!(
            out.events,
            vec![room_state_event(&room("r1"), RoomState::Disconnected, ErrorCode::ROOM_AUTH_FAILED)]
        );
        assert!(state.rooms.is_empty());
    }

    #[test]
    fn test_login_timeout() {
        let mut state = state();
        let out = login(&mut state, "r1", RoomConfig::default());
        let seq = login_seq(&out);

        let mut out = Outbox::default();
        state.handle_input(
            EngineInput::Timer(TimerEvent::LoginTimeout {
                room_id: room("r1"),
                seq,
            }),
            &mut out,
        );
        assert_eq!(
            out.events,
            vec![room_state_event(&room("r1"), RoomState::Disconnected, ErrorCode::ROOM_LOGIN_TIMEOUT)]
        );
        assert!(matches!(out.requests[..], [Request::Logout { .. }]));
    }

    #[test]
    fn test_link_loss_and_recovery() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");

        let out = input(&mut state, Inbound::LinkDown);
        assert_eq!(
            out.events,
            vec![room_state_event(&room_id, RoomState::Connecting, ErrorCode::SUCCESS)]
        );
        assert!(out.requests.is_empty());

        let out = input(&mut state, Inbound::LinkUp);
        assert!(out.events.is_empty());
        let seq = login_seq(&out);

        let out = input(
            &mut state,
            Inbound::LoginResult {
                seq,
                room_id: room_id.clone(),
                error_code: ErrorCode::SUCCESS,
                users: Vec::new(),
                streams: vec![stream("u2", "s9")],
            },
        );
        assert_eq!(kinds(&out), vec!["room_state_update", "room_stream_update"]);
        assert_eq!(state.rooms[&room_id].state, RoomState::Connected);
    }

    #[test]
    fn test_reconnect_window_expires() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");
        input(&mut state, Inbound::LinkDown);
        let epoch = state.reconnect_epoch;

        let mut out = Outbox::default();
        state.handle_input(EngineInput::Timer(TimerEvent::ReconnectExpired { epoch }), &mut out);
        assert_eq!(
            out.events,
            vec![room_state_event(&room_id, RoomState::Disconnected, ErrorCode::ROOM_RECONNECT_FAILED)]
        );

        // The service learns about the dropped room once the link returns
        let out = input(&mut state, Inbound::LinkUp);
        assert_eq!(out.requests, vec![Request::Logout { room_id }]);
    }

    #[test]
    fn test_stale_reconnect_deadline_ignored() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");
        input(&mut state, Inbound::LinkDown);
        let epoch = state.reconnect_epoch;
        let out = input(&mut state, Inbound::LinkUp);
        input(
            &mut state,
            Inbound::LoginResult {
                seq: login_seq(&out),
                room_id,
                error_code: ErrorCode::SUCCESS,
                users: Vec::new(),
                streams: Vec::new(),
            },
        );

        let mut out = Outbox::default();
        state.handle_input(EngineInput::Timer(TimerEvent::ReconnectExpired { epoch }), &mut out);
        assert!(out.events.is_empty());
        assert_eq!(state.rooms.len(), 1);
    }

    #[test]
    fn test_slow_relogin_retried_until_window_ends() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");
        input(&mut state, Inbound::LinkDown);
        let epoch = state.reconnect_epoch;
        let out = input(&mut state, Inbound::LinkUp);
        let seq = login_seq(&out);

        let mut out = Outbox::default();
        state.handle_input(
            EngineInput::Timer(TimerEvent::LoginTimeout {
                room_id: room_id.clone(),
                seq,
            }),
            &mut out,
        );
        assert!(out.events.is_empty());
        let retry = login_seq(&out);
        assert_ne!(retry, seq);
        assert!(matches!(
            out.timers[..],
            [(_, TimerEvent::LoginTimeout { .. })]
        ));
        assert_eq!(state.rooms[&room_id].state, RoomState::Connecting);

        let mut out = Outbox::default();
        state.handle_input(EngineInput::Timer(TimerEvent::ReconnectExpired { epoch }), &mut out);
        assert_eq!(
            out.events,
            vec![room_state_event(&room_id, RoomState::Disconnected, ErrorCode::ROOM_RECONNECT_FAILED)]
        );
        assert_eq!(out.requests, vec![Request::Logout { room_id }]);
        assert!(state.rooms.is_empty());
    }

    #[test]
    fn test_kicked() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");

        let out = input(
            &mut state,
            Inbound::Kicked {
                room_id: room_id.clone(),
                error_code: ErrorCode::ROOM_KICKED_LOGIN_ELSEWHERE,
            },
        );
        assert_eq!(
            out.events,
            vec![room_state_event(
                &room_id,
                RoomState::Disconnected,
                ErrorCode::ROOM_KICKED_LOGIN_ELSEWHERE
            )]
        );
    }

    #[test]
    fn test_extra_info_update_only_reports_changes() {
        let mut state = state();
        let out = login(&mut state, "r1", RoomConfig::default());
        input(
            &mut state,
            Inbound::LoginResult {
                seq: login_seq(&out),
                room_id: room("r1"),
                error_code: ErrorCode::SUCCESS,
                users: Vec::new(),
                streams: vec![stream("u2", "s1")],
            },
        );

        let mut updated = stream("u2", "s1");
        updated.extra_info = "v2".into();
        let out = input(
            &mut state,
            Inbound::StreamExtraInfoUpdate {
                room_id: room("r1"),
                streams: vec![updated.clone(), stream("u3", "unknown")],
            },
        );
        assert_eq!(
            out.events,
            vec![Event::RoomStreamExtraInfoUpdate {
                room_id: room("r1"),
                streams: vec![updated.clone()],
            }]
        );

        let out = input(
            &mut state,
            Inbound::StreamExtraInfoUpdate {
                room_id: room("r1"),
                streams: vec![updated],
            },
        );
        assert!(out.events.is_empty());
    }

    #[test]
    fn test_duplicate_login_ignored() {
        let mut state = state();
        connected(&mut state, "r1");

        let out = login(&mut state, "r1", RoomConfig::default());
        assert!(out.events.is_empty());
        assert_eq!(state.rooms[&room("r1")].state, RoomState::Connected);
    }
}
