//! Engine state and input routing
//!
//! All session state lives in one [`EngineState`]. Public calls and service
//! input mutate it under a single lock and record their side effects in an
//! [`Outbox`]: events for observers, requests for the service, and timers.
//! The engine flushes the outbox before releasing the lock, so side effects
//! leave in exactly the order the state machines produced them.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::dispatch::Event;
use crate::error::ErrorCode;
use crate::ids::RoomId;
use crate::mixer::MixerCoordinator;
use crate::publisher::ChannelTable;
use crate::room::RoomSession;
use crate::signaling::{Inbound, MediaNotice, Request, RequestId};

use super::completion::{CompletionTable, Responder};
use super::config::EngineConfig;

/// Input applied by the engine's driver task
#[derive(Debug)]
pub(crate) enum EngineInput {
    Server(Inbound),
    Timer(TimerEvent),
}

/// Deadlines fed back into the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TimerEvent {
    /// A login (first or after reconnect) was not acknowledged
    LoginTimeout { room_id: RoomId, seq: RequestId },
    /// The link stayed down for the whole reconnect window
    ReconnectExpired { epoch: u64 },
}

/// Side effects of one state mutation
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    pub(crate) events: Vec<Event>,
    pub(crate) requests: Vec<Request>,
    pub(crate) timers: Vec<(Duration, TimerEvent)>,
}

impl Outbox {
    pub(crate) fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub(crate) fn send(&mut self, request: Request) {
        self.requests.push(request);
    }

    pub(crate) fn schedule(&mut self, after: Duration, timer: TimerEvent) {
        self.timers.push((after, timer));
    }
}

/// Everything the engine knows about its rooms, channels and mixer tasks
pub(crate) struct EngineState {
    pub(crate) config: EngineConfig,
    pub(crate) rooms: BTreeMap<RoomId, RoomSession>,
    pub(crate) channels: ChannelTable,
    pub(crate) mixer: MixerCoordinator,
    pub(crate) completions: CompletionTable,
    next_seq: RequestId,
    /// Whether the transport is connected
    pub(crate) link_up: bool,
    /// Bumped on every link loss; stale reconnect deadlines compare against it
    pub(crate) reconnect_epoch: u64,
    /// Rooms dropped while the link was down; the service is told on reconnect
    pub(crate) orphaned: Vec<RoomId>,
    pub(crate) destroyed: bool,
}

impl EngineState {
    pub(crate) fn new(config: EngineConfig) -> Self {
        let channels = ChannelTable::new(config.sei_rate_limit);
        Self {
            config,
            rooms: BTreeMap::new(),
            channels,
            mixer: MixerCoordinator::default(),
            completions: CompletionTable::default(),
            next_seq: 1,
            link_up: true,
            reconnect_epoch: 0,
            orphaned: Vec::new(),
            destroyed: false,
        }
    }

    /// Allocate a request ID
    pub(crate) fn next_seq(&mut self) -> RequestId {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Apply one input from the driver task
    pub(crate) fn handle_input(&mut self, input: EngineInput, out: &mut Outbox) {
        if self.destroyed {
            tracing::debug!(input = ?input, "Input after destroy ignored");
            return;
        }

        match input {
            EngineInput::Server(message) => self.handle_inbound(message, out),
            EngineInput::Timer(timer) => self.handle_timer(timer, out),
        }
    }

    fn handle_inbound(&mut self, message: Inbound, out: &mut Outbox) {
        tracing::trace!(message = message.kind(), "Inbound");

        match message {
            Inbound::LinkDown => self.on_link_down(out),
            Inbound::LinkUp => self.on_link_up(out),

            Inbound::LoginResult {
                seq,
                room_id,
                error_code,
                users,
                streams,
            } => self.on_login_result(seq, &room_id, error_code, users, streams, out),
            Inbound::Kicked {
                room_id,
                error_code,
            } => self.on_kicked(&room_id, error_code, out),
            Inbound::UserUpdate {
                room_id,
                update_type,
                users,
            } => self.on_user_update(&room_id, update_type, users, out),
            Inbound::StreamUpdate {
                room_id,
                update_type,
                streams,
            } => self.on_stream_update(&room_id, update_type, streams, out),
            Inbound::StreamExtraInfoUpdate { room_id, streams } => {
                self.on_stream_extra_info_update(&room_id, streams, out)
            }

            Inbound::PublishResult {
                seq,
                error_code,
                extended_data,
            } => self.on_publish_result(seq, error_code, extended_data, out),
            Inbound::PublisherRelayCdnUpdate { stream_id, infos } => {
                self.on_publisher_relay_update(&stream_id, infos, out)
            }

            Inbound::PlayResult {
                seq,
                error_code,
                extended_data,
            } => self.on_play_result(seq, error_code, extended_data, out),
            Inbound::PlayInterrupted { room_id, stream_id } => {
                self.on_play_interrupted(&room_id, &stream_id, out)
            }
            Inbound::Sei {
                room_id,
                stream_id,
                data,
            } => self.on_recv_sei(&room_id, &stream_id, data, out),

            Inbound::RequestResult { seq, error_code } => {
                self.on_request_result(seq, error_code)
            }
            Inbound::BarrageResult {
                seq,
                error_code,
                message_id,
            } => self.on_barrage_result(seq, error_code, message_id),
            Inbound::BroadcastMessage { room_id, messages } => {
                self.on_recv_broadcast(&room_id, messages, out)
            }
            Inbound::BarrageMessage { room_id, messages } => {
                self.on_recv_barrage(&room_id, messages, out)
            }
            Inbound::CustomCommand {
                room_id,
                from_user,
                command,
            } => self.on_recv_custom_command(&room_id, from_user, command, out),

            Inbound::MixerStartResult {
                seq,
                error_code,
                extended_data,
            } => self.on_mixer_start_result(seq, error_code, extended_data),
            Inbound::MixerRelayCdnUpdate { task_id, infos } => {
                self.on_mixer_relay_update(&task_id, infos, out)
            }
            Inbound::MixerSoundLevel { levels } => {
                out.emit(Event::MixerSoundLevelUpdate { levels })
            }

            Inbound::Media(notice) => self.handle_media(notice, out),
        }
    }

    fn handle_media(&mut self, notice: MediaNotice, out: &mut Outbox) {
        match notice {
            MediaNotice::CapturedAudioFirstFrame => self.on_captured_audio_first_frame(out),
            MediaNotice::CapturedVideoFirstFrame { channel } => {
                self.on_captured_video_first_frame(channel, out)
            }
            MediaNotice::PublisherVideoSizeChanged { channel, size } => {
                self.on_publisher_video_size(channel, size, out)
            }
            MediaNotice::PublisherQuality { channel, quality } => {
                self.on_publisher_quality(channel, quality, out)
            }
            notice => self.on_player_notice(notice, out),
        }
    }

    fn handle_timer(&mut self, timer: TimerEvent, out: &mut Outbox) {
        match timer {
            TimerEvent::LoginTimeout { room_id, seq } => self.on_login_timeout(&room_id, seq, out),
            TimerEvent::ReconnectExpired { epoch } => self.on_reconnect_expired(epoch, out),
        }
    }

    /// Resolve a generic acknowledgement
    fn on_request_result(&mut self, seq: RequestId, error_code: ErrorCode) {
        self.mixer.on_stop_result(seq, error_code);

        match self.completions.take(seq) {
            Some(Responder::Code(tx)) => {
                let _ = tx.send(error_code);
            }
            Some(other) => other.fail(error_code),
            None => tracing::debug!(seq = seq, "Result for unknown request dropped"),
        }
    }

    /// Tear everything down without notifying observers
    pub(crate) fn destroy(&mut self, out: &mut Outbox) {
        let room_ids: Vec<RoomId> = self.rooms.keys().cloned().collect();
        for room_id in room_ids {
            if self.link_up {
                out.send(Request::Logout {
                    room_id: room_id.clone(),
                });
            }
            self.rooms.remove(&room_id);
        }

        self.mixer.clear();
        self.completions.fail_all(ErrorCode::ENGINE_NOT_CREATED);
        self.channels.reset_capture();
        self.destroyed = true;

        tracing::info!("Engine destroyed");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Drive an [`EngineState`] directly and inspect its outbox

    use super::*;
    use crate::ids::User;
    use crate::room::RoomConfig;

    pub(crate) fn room(id: &str) -> RoomId {
        RoomId::new(id).unwrap()
    }

    pub(crate) fn state() -> EngineState {
        EngineState::new(EngineConfig::default())
    }

    /// Log into a room and acknowledge it, discarding the side effects
    pub(crate) fn connected(state: &mut EngineState, room_id: &str) -> RoomId {
        let room_id = room(room_id);
        let mut out = Outbox::default();
        state.login(
            room_id.clone(),
            User::with_id("me").unwrap(),
            RoomConfig::default(),
            None,
            &mut out,
        );
        let seq = login_seq(&out);
        state.handle_input(
            EngineInput::Server(Inbound::LoginResult {
                seq,
                room_id: room_id.clone(),
                error_code: ErrorCode::SUCCESS,
                users: Vec::new(),
                streams: Vec::new(),
            }),
            &mut Outbox::default(),
        );
        room_id
    }

    pub(crate) fn login_seq(out: &Outbox) -> RequestId {
        out.requests
            .iter()
            .find_map(|r| match r {
                Request::Login { seq, .. } => Some(*seq),
                _ => None,
            })
            .expect("login request")
    }

    pub(crate) fn input(state: &mut EngineState, message: Inbound) -> Outbox {
        let mut out = Outbox::default();
        state.handle_input(EngineInput::Server(message), &mut out);
        out
    }

    pub(crate) fn kinds(out: &Outbox) -> Vec<&'static str> {
        out.events.iter().map(|e| e.kind()).collect()
    }
}
