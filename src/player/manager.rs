//! Playback lifecycle per stream
//!
//! `NoPlay -> PlayRequesting -> Playing`. A play request for a stream that
//! does not exist yet stays pending on the service and resolves the moment
//! the stream appears; there is no timeout. When a played stream goes away
//! the session drops back to `PlayRequesting` and waits again.

use bytes::Bytes;

use crate::dispatch::{Event, ExtendedData};
use crate::engine::state::{EngineState, Outbox};
use crate::error::ErrorCode;
use crate::ids::{RoomId, StreamId};
use crate::media::Canvas;
use crate::signaling::{MediaNotice, Request, RequestId};

use super::session::{PlayerConfig, PlayerInfo, PlayerSession};
use super::state::PlayerState;

/// Maximum playback volume
pub const MAX_PLAY_VOLUME: u32 = 100;

fn player_event(
    stream_id: &StreamId,
    state: PlayerState,
    error_code: ErrorCode,
    extended_data: ExtendedData,
) -> Event {
    Event::PlayerStateUpdate {
        stream_id: stream_id.clone(),
        state,
        error_code,
        extended_data,
    }
}

impl EngineState {
    fn player_mut(&mut self, stream_id: &StreamId) -> Option<&mut PlayerSession> {
        self.rooms
            .values_mut()
            .find_map(|room| room.players.get_mut(stream_id))
    }

    pub(crate) fn player_state(&self, stream_id: &StreamId) -> PlayerState {
        self.rooms
            .values()
            .find_map(|room| room.players.get(stream_id))
            .map_or(PlayerState::NoPlay, |p| p.state)
    }

    pub(crate) fn player_info(&self, stream_id: &StreamId) -> Option<PlayerInfo> {
        self.rooms.iter().find_map(|(room_id, room)| {
            room.players.get(stream_id).map(|player| PlayerInfo {
                room_id: room_id.clone(),
                stream_id: stream_id.clone(),
                state: player.state,
                canvas: player.canvas,
                volume: player.volume,
                audio_muted: player.audio_muted,
                video_muted: player.video_muted,
                via_cdn: player.via_cdn(),
            })
        })
    }

    pub(crate) fn start_playing(
        &mut self,
        room_id: &RoomId,
        stream_id: StreamId,
        canvas: Option<Canvas>,
        config: PlayerConfig,
        out: &mut Outbox,
    ) {
        let link_up = self.link_up;
        if !self.rooms.contains_key(room_id) {
            tracing::warn!(room = %room_id, stream = %stream_id, "Play outside a room");
            out.emit(player_event(
                &stream_id,
                PlayerState::NoPlay,
                ErrorCode::PLAYER_NOT_IN_ROOM,
                ExtendedData::new(),
            ));
            return;
        }

        // One session per stream across all rooms
        if let Some(player) = self.player_mut(&stream_id) {
            tracing::debug!(stream = %stream_id, "Play target updated");
            player.canvas = canvas;
            return;
        }

        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        room.players
            .insert(stream_id.clone(), PlayerSession::new(canvas, config));
        let ready = room.is_connected() && link_up;

        tracing::info!(room = %room_id, stream = %stream_id, "Play requested");
        out.emit(player_event(
            &stream_id,
            PlayerState::PlayRequesting,
            ErrorCode::SUCCESS,
            ExtendedData::new(),
        ));

        if ready {
            self.send_play(room_id, &stream_id, out);
        }
    }

    /// Issue the play request of a requesting session
    pub(crate) fn send_play(&mut self, room_id: &RoomId, stream_id: &StreamId, out: &mut Outbox) {
        let seq = self.next_seq();
        let Some(player) = self
            .rooms
            .get_mut(room_id)
            .and_then(|room| room.players.get_mut(stream_id))
        else {
            return;
        };

        player.request = Some(seq);
        out.send(Request::Play {
            seq,
            room_id: room_id.clone(),
            stream_id: stream_id.clone(),
            cdn: player.config.cdn_config.clone(),
        });
    }

    pub(crate) fn stop_playing(&mut self, stream_id: &StreamId, out: &mut Outbox) {
        let link_up = self.link_up;
        let found = self.rooms.iter_mut().find_map(|(room_id, room)| {
            room.players
                .remove(stream_id)
                .map(|player| (room_id.clone(), player))
        });
        let Some((room_id, player)) = found else {
            tracing::debug!(stream = %stream_id, "Stop for a stream not played");
            return;
        };

        if link_up && player.request.is_some() {
            out.send(Request::StopPlay {
                room_id: room_id.clone(),
                stream_id: stream_id.clone(),
            });
        }

        tracing::info!(room = %room_id, stream = %stream_id, "Play stopped");
        out.emit(player_event(
            stream_id,
            PlayerState::NoPlay,
            ErrorCode::SUCCESS,
            ExtendedData::new(),
        ));
    }

    pub(crate) fn on_play_result(
        &mut self,
        seq: RequestId,
        error_code: ErrorCode,
        extended_data: ExtendedData,
        out: &mut Outbox,
    ) {
        let found = self.rooms.iter().find_map(|(room_id, room)| {
            room.players
                .iter()
                .find(|(_, p)| p.request == Some(seq) && p.state == PlayerState::PlayRequesting)
                .map(|(stream_id, _)| (room_id.clone(), stream_id.clone()))
        });
        let Some((room_id, stream_id)) = found else {
            tracing::debug!(seq = seq, "Stale play result dropped");
            return;
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };

        if !error_code.is_success() {
            room.players.remove(&stream_id);
            tracing::warn!(room = %room_id, stream = %stream_id, error_code = %error_code, "Play rejected");
            out.emit(player_event(&stream_id, PlayerState::NoPlay, error_code, extended_data));
            return;
        }

        if let Some(player) = room.players.get_mut(&stream_id) {
            player.state = PlayerState::Playing;
            tracing::info!(room = %room_id, stream = %stream_id, "Playing");
            out.emit(player_event(
                &stream_id,
                PlayerState::Playing,
                ErrorCode::SUCCESS,
                extended_data,
            ));
        }
    }

    pub(crate) fn on_play_interrupted(&mut self, room_id: &RoomId, stream_id: &StreamId, out: &mut Outbox) {
        let Some(player) = self
            .rooms
            .get_mut(room_id)
            .and_then(|room| room.players.get_mut(stream_id))
            .filter(|p| p.state == PlayerState::Playing)
        else {
            return;
        };

        player.state = PlayerState::PlayRequesting;
        tracing::info!(room = %room_id, stream = %stream_id, "Played stream went away, waiting");
        out.emit(player_event(
            stream_id,
            PlayerState::PlayRequesting,
            ErrorCode::SUCCESS,
            ExtendedData::new(),
        ));
    }

    pub(crate) fn on_recv_sei(&mut self, room_id: &RoomId, stream_id: &StreamId, data: Bytes, out: &mut Outbox) {
        let playing = self
            .rooms
            .get(room_id)
            .and_then(|room| room.players.get(stream_id))
            .map_or(false, |p| p.state == PlayerState::Playing);

        if playing {
            out.emit(Event::PlayerRecvSei {
                stream_id: stream_id.clone(),
                data,
            });
        }
    }

    /// Forward a media notice about a remote stream while it is playing
    pub(crate) fn on_player_notice(&mut self, notice: MediaNotice, out: &mut Outbox) {
        let event = match notice {
            MediaNotice::PlayerQuality { stream_id, quality } => {
                Event::PlayerQualityUpdate { stream_id, quality }
            }
            MediaNotice::PlayerMediaEvent { stream_id, event } => {
                Event::PlayerMediaEvent { stream_id, event }
            }
            MediaNotice::PlayerRecvAudioFirstFrame { stream_id } => {
                Event::PlayerRecvAudioFirstFrame { stream_id }
            }
            MediaNotice::PlayerRecvVideoFirstFrame { stream_id } => {
                Event::PlayerRecvVideoFirstFrame { stream_id }
            }
            MediaNotice::PlayerRenderVideoFirstFrame { stream_id } => {
                Event::PlayerRenderVideoFirstFrame { stream_id }
            }
            MediaNotice::PlayerVideoSizeChanged { stream_id, size } => {
                Event::PlayerVideoSizeChanged { stream_id, size }
            }
            MediaNotice::RemoteCameraState { stream_id, state } => {
                Event::RemoteCameraStateUpdate { stream_id, state }
            }
            MediaNotice::RemoteMicState { stream_id, state } => {
                Event::RemoteMicStateUpdate { stream_id, state }
            }
            other => {
                tracing::debug!(notice = ?other, "Publisher notice routed to player");
                return;
            }
        };

        let stream_id = match &event {
            Event::PlayerQualityUpdate { stream_id, .. }
            | Event::PlayerMediaEvent { stream_id, .. }
            | Event::PlayerRecvAudioFirstFrame { stream_id }
            | Event::PlayerRecvVideoFirstFrame { stream_id }
            | Event::PlayerRenderVideoFirstFrame { stream_id }
            | Event::PlayerVideoSizeChanged { stream_id, .. }
            | Event::RemoteCameraStateUpdate { stream_id, .. }
            | Event::RemoteMicStateUpdate { stream_id, .. } => stream_id.clone(),
            _ => return,
        };

        if self.player_state(&stream_id) == PlayerState::Playing {
            out.emit(event);
        } else {
            tracing::trace!(stream = %stream_id, kind = event.kind(), "Notice for idle player dropped");
        }
    }

    /// Set playback volume, clamped to `0..=100`
    pub(crate) fn set_play_volume(&mut self, stream_id: &StreamId, volume: u32) {
        match self.player_mut(stream_id) {
            Some(player) => player.volume = volume.min(MAX_PLAY_VOLUME),
            None => tracing::warn!(stream = %stream_id, "Volume for a stream not played ignored"),
        }
    }

    pub(crate) fn mute_play(&mut self, stream_id: &StreamId, audio: Option<bool>, video: Option<bool>) {
        let Some(player) = self.player_mut(stream_id) else {
            tracing::warn!(stream = %stream_id, "Mute for a stream not played ignored");
            return;
        };
        if player.via_cdn() {
            tracing::warn!(stream = %stream_id, "Mute has no effect on a CDN pull");
            return;
        }

        player.audio_muted = audio.unwrap_or(player.audio_muted);
        player.video_muted = video.unwrap_or(player.video_muted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::testing::*;
    use crate::media::{Size, ViewId};
    use crate::player::CdnConfig;
    use crate::signaling::Inbound;

    fn stream(id: &str) -> StreamId {
        StreamId::new(id).unwrap()
    }

    fn play_seq(out: &Outbox) -> RequestId {
        out.requests
            .iter()
            .find_map(|r| match r {
                Request::Play { seq, .. } => Some(*seq),
                _ => None,
            })
            .expect("play request")
    }

    fn states(out: &Outbox) -> Vec<(PlayerState, ErrorCode)> {
        out.events
            .iter()
            .filter_map(|e| match e {
                Event::PlayerStateUpdate {
                    state, error_code, ..
                } => Some((*state, *error_code)),
                _ => None,
            })
            .collect()
    }

    fn result(state: &mut EngineState, seq: RequestId, error_code: ErrorCode) -> Outbox {
        input(
            state,
            Inbound::PlayResult {
                seq,
                error_code,
                extended_data: ExtendedData::new(),
            },
        )
    }

    fn play(state: &mut EngineState, room_id: &RoomId, id: &str, config: PlayerConfig) -> Outbox {
        let mut out = Outbox::default();
        state.start_playing(room_id, stream(id), Some(Canvas::new(ViewId(1))), config, &mut out);
        out
    }

    #[test]
    fn test_play_lifecycle() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");

        let out = play(&mut state, &room_id, "s1", PlayerConfig::default());
        assert_eq!(states(&out), vec![(PlayerState::PlayRequesting, ErrorCode::SUCCESS)]);

        let out = result(&mut state, play_seq(&out), ErrorCode::SUCCESS);
        assert_eq!(states(&out), vec![(PlayerState::Playing, ErrorCode::SUCCESS)]);

        let mut out = Outbox::default();
        state.stop_playing(&stream("s1"), &mut out);
        assert_eq!(states(&out), vec![(PlayerState::NoPlay, ErrorCode::SUCCESS)]);
        assert!(state.player_info(&stream("s1")).is_none());
    }

    #[test]
    fn test_play_outside_room() {
        let mut state = state();
        let out = play(&mut state, &room("none"), "s1", PlayerConfig::default());
        assert_eq!(
            states(&out),
            vec![(PlayerState::NoPlay, ErrorCode::PLAYER_NOT_IN_ROOM)]
        );
    }

    #[test]
    fn test_canvas_swap_has_no_transition() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");
        play(&mut state, &room_id, "s1", PlayerConfig::default());

        let mut out = Outbox::default();
        state.start_playing(
            &room_id,
            stream("s1"),
            Some(Canvas::new(ViewId(2))),
            PlayerConfig::default(),
            &mut out,
        );
        assert!(out.events.is_empty());
        assert!(out.requests.is_empty());
        assert_eq!(
            state.player_info(&stream("s1")).unwrap().canvas,
            Some(Canvas::new(ViewId(2)))
        );
    }

    #[test]
    fn test_same_stream_from_second_room_shares_session() {
        let mut state = state();
        let r1 = connected(&mut state, "r1");
        let r2 = connected(&mut state, "r2");
        play(&mut state, &r1, "s1", PlayerConfig::default());

        let mut out = Outbox::default();
        state.start_playing(
            &r2,
            stream("s1"),
            Some(Canvas::new(ViewId(2))),
            PlayerConfig::default(),
            &mut out,
        );
        assert!(out.events.is_empty());
        assert!(out.requests.is_empty());

        let info = state.player_info(&stream("s1")).unwrap();
        assert_eq!(info.room_id, r1);
        assert_eq!(info.canvas, Some(Canvas::new(ViewId(2))));

        let mut out = Outbox::default();
        state.stop_playing(&stream("s1"), &mut out);
        assert_eq!(states(&out), vec![(PlayerState::NoPlay, ErrorCode::SUCCESS)]);
        assert_eq!(state.player_state(&stream("s1")), PlayerState::NoPlay);
    }

    #[test]
    fn test_stop_suppresses_late_result() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");
        let out = play(&mut state, &room_id, "s1", PlayerConfig::default());
        let seq = play_seq(&out);

        state.stop_playing(&stream("s1"), &mut Outbox::default());
        let out = result(&mut state, seq, ErrorCode::SUCCESS);
        assert!(out.events.is_empty());
        assert_eq!(state.player_state(&stream("s1")), PlayerState::NoPlay);
    }

    #[test]
    fn test_interrupt_waits_on_same_request() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");
        let out = play(&mut state, &room_id, "s1", PlayerConfig::default());
        let seq = play_seq(&out);
        result(&mut state, seq, ErrorCode::SUCCESS);

        let out = input(
            &mut state,
            Inbound::PlayInterrupted {
                room_id: room_id.clone(),
                stream_id: stream("s1"),
            },
        );
        assert_eq!(states(&out), vec![(PlayerState::PlayRequesting, ErrorCode::SUCCESS)]);
        assert!(out.requests.is_empty());

        let out = result(&mut state, seq, ErrorCode::SUCCESS);
        assert_eq!(states(&out), vec![(PlayerState::Playing, ErrorCode::SUCCESS)]);
    }

    #[test]
    fn test_rejected_play_is_removed() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");
        let out = play(&mut state, &room_id, "s1", PlayerConfig::default());

        let out = result(&mut state, play_seq(&out), ErrorCode::INVALID_STREAM_ID);
        assert_eq!(
            states(&out),
            vec![(PlayerState::NoPlay, ErrorCode::INVALID_STREAM_ID)]
        );
        assert!(state.player_info(&stream("s1")).is_none());
    }

    #[test]
    fn test_volume_and_mute() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");
        play(&mut state, &room_id, "s1", PlayerConfig::default());
        play(
            &mut state,
            &room_id,
            "cdn",
            PlayerConfig::default().cdn(CdnConfig::new("rtmp://cdn/live/cdn")),
        );

        state.set_play_volume(&stream("s1"), 250);
        state.mute_play(&stream("s1"), Some(true), None);
        state.mute_play(&stream("cdn"), Some(true), Some(true));

        let direct = state.player_info(&stream("s1")).unwrap();
        assert_eq!(direct.volume, MAX_PLAY_VOLUME);
        assert!(direct.audio_muted);
        assert!(!direct.video_muted);

        let cdn = state.player_info(&stream("cdn")).unwrap();
        assert!(cdn.via_cdn);
        assert!(!cdn.audio_muted);
        assert!(!cdn.video_muted);
    }

    #[test]
    fn test_notices_only_while_playing() {
        let mut state = state();
        let room_id = connected(&mut state, "r1");
        let out = play(&mut state, &room_id, "s1", PlayerConfig::default());
        let seq = play_seq(&out);

        let notice = MediaNotice::PlayerVideoSizeChanged {
            stream_id: stream("s1"),
            size: Size::new(360, 640),
        };
        let out = input(&mut state, Inbound::Media(notice.clone()));
        assert!(out.events.is_empty());

        result(&mut state, seq, ErrorCode::SUCCESS);
        let out = input(&mut state, Inbound::Media(notice));
        assert_eq!(kinds(&out), vec!["player_video_size_changed"]);

        let out = input(
            &mut state,
            Inbound::Sei {
                room_id,
                stream_id: stream("s1"),
                data: Bytes::from_static(b"meta"),
            },
        );
        assert_eq!(kinds(&out), vec!["player_recv_sei"]);
    }
}
