//! Publish lifecycle per channel
//!
//! `NoPublish -> PublishRequesting -> Publishing`. A channel publishes at most
//! one stream in one room at a time. The request is sent once the room is
//! connected and the link is up; a reply for a request that is no longer
//! current is dropped, so a stopped session never comes back.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::dispatch::{Event, ExtendedData};
use crate::engine::completion::Completion;
use crate::engine::state::{EngineState, Outbox};
use crate::error::{Error, ErrorCode, Result};
use crate::ids::{RoomId, StreamId, MAX_EXTRA_INFO_LEN};
use crate::media::{Canvas, Size, Watermark};
use crate::relay::RelayCdnInfo;
use crate::room::RoomSession;
use crate::signaling::{Request, RequestId};
use crate::stats::PublishStreamQuality;

use super::session::{PublisherInfo, PublisherSession};
use super::state::{PublishChannel, PublisherState};

/// Maximum CDN relay URL length
pub const MAX_CDN_URL_LEN: usize = 1024;

fn publisher_event(
    stream_id: &StreamId,
    channel: PublishChannel,
    state: PublisherState,
    error_code: ErrorCode,
    extended_data: ExtendedData,
) -> Event {
    Event::PublisherStateUpdate {
        stream_id: stream_id.clone(),
        channel,
        state,
        error_code,
        extended_data,
    }
}

/// The room and session currently holding a channel
fn active_publisher(
    rooms: &mut BTreeMap<RoomId, RoomSession>,
    channel: PublishChannel,
) -> Option<(&RoomId, &mut PublisherSession)> {
    rooms.iter_mut().find_map(|(room_id, room)| {
        room.publishers
            .get_mut(&channel)
            .filter(|p| p.state.is_active())
            .map(|p| (room_id, p))
    })
}

fn validate_cdn_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(Error::InvalidParam("empty CDN URL".into()));
    }
    if url.len() > MAX_CDN_URL_LEN {
        return Err(Error::TooLong {
            what: "CDN URL",
            limit: MAX_CDN_URL_LEN,
        });
    }
    Ok(())
}

/// Whether captured frames of a channel are visible to the application
enum Capture {
    Inactive,
    /// Publishing was requested; frames wait for the acknowledgement
    Requesting,
    Live,
}

impl EngineState {
    fn publisher_room(&self, channel: PublishChannel) -> Option<&RoomId> {
        self.rooms
            .iter()
            .find(|(_, room)| room.holds_channel(channel))
            .map(|(room_id, _)| room_id)
    }

    pub(crate) fn publisher_state(&self, channel: PublishChannel) -> PublisherState {
        self.rooms
            .values()
            .find_map(|room| room.publishers.get(&channel))
            .map_or(PublisherState::NoPublish, |p| p.state)
    }

    pub(crate) fn publisher_info(&self, channel: PublishChannel) -> Option<PublisherInfo> {
        self.rooms.iter().find_map(|(room_id, room)| {
            let publisher = room.publishers.get(&channel)?;
            Some(PublisherInfo {
                room_id: room_id.clone(),
                channel,
                stream_id: publisher.stream_id.clone()?,
                state: publisher.state,
                extra_info: publisher.attributes.extra_info.clone(),
                audio_muted: publisher.attributes.audio_muted,
                video_muted: publisher.attributes.video_muted,
                watermark: publisher.attributes.watermark.clone(),
                cdn_urls: publisher.attributes.cdn_urls.iter().cloned().collect(),
                relays: publisher.relays.snapshot(),
            })
        })
    }

    pub(crate) fn start_publishing(
        &mut self,
        room_id: &RoomId,
        stream_id: StreamId,
        channel: PublishChannel,
        out: &mut Outbox,
    ) {
        let Some(room) = self.rooms.get(room_id) else {
            tracing::warn!(room = %room_id, stream = %stream_id, "Publish outside a room");
            out.emit(publisher_event(
                &stream_id,
                channel,
                PublisherState::NoPublish,
                ErrorCode::PUBLISHER_NOT_IN_ROOM,
                ExtendedData::new(),
            ));
            return;
        };

        if let Some(owner) = self.publisher_room(channel).filter(|owner| *owner != room_id) {
            tracing::warn!(room = %room_id, owner = %owner, channel = ?channel, "Channel publishes in another room");
            out.emit(publisher_event(
                &stream_id,
                channel,
                PublisherState::NoPublish,
                ErrorCode::PUBLISHER_CHANNEL_IN_USE,
                ExtendedData::new(),
            ));
            return;
        }

        if let Some(current) = room.publishers.get(&channel) {
            if current.stream_id.as_ref() == Some(&stream_id) {
                tracing::debug!(stream = %stream_id, channel = ?channel, "Already publishing");
                return;
            }
            self.stop_publishing(channel, out);
        }

        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        if room.channel_of(&stream_id).is_some() {
            out.emit(publisher_event(
                &stream_id,
                channel,
                PublisherState::NoPublish,
                ErrorCode::PUBLISHER_DUPLICATE_STREAM,
                ExtendedData::new(),
            ));
            return;
        }

        let attributes = std::mem::take(&mut self.channels.slot_mut(channel).staged);
        room.publishers
            .insert(channel, PublisherSession::new(stream_id.clone(), attributes));
        let ready = room.is_connected() && self.link_up;

        tracing::info!(room = %room_id, stream = %stream_id, channel = ?channel, "Publish requested");
        out.emit(publisher_event(
            &stream_id,
            channel,
            PublisherState::PublishRequesting,
            ErrorCode::SUCCESS,
            ExtendedData::new(),
        ));

        if ready {
            self.send_publish(room_id, channel, out);
        }
    }

    /// Issue the publish request of a requesting session
    pub(crate) fn send_publish(&mut self, room_id: &RoomId, channel: PublishChannel, out: &mut Outbox) {
        let seq = self.next_seq();
        let Some(publisher) = self
            .rooms
            .get_mut(room_id)
            .and_then(|room| room.publishers.get_mut(&channel))
        else {
            return;
        };
        let Some(stream_id) = publisher.stream_id.clone() else {
            return;
        };

        let params = publisher.attributes.params();
        publisher.request = Some(seq);
        publisher.sent = params.clone();

        out.send(Request::Publish {
            seq,
            room_id: room_id.clone(),
            channel,
            stream_id,
            params,
        });
    }

    pub(crate) fn stop_publishing(&mut self, channel: PublishChannel, out: &mut Outbox) {
        self.channels.slot_mut(channel).staged = Default::default();

        let owner = self.publisher_room(channel).cloned();
        let Some(room_id) = owner else {
            tracing::debug!(channel = ?channel, "Stop on idle channel");
            return;
        };
        let Some(publisher) = self
            .rooms
            .get_mut(&room_id)
            .and_then(|room| room.publishers.remove(&channel))
        else {
            return;
        };
        let Some(stream_id) = publisher.stream_id else {
            return;
        };

        if self.link_up && publisher.request.is_some() {
            out.send(Request::StopPublish {
                room_id: room_id.clone(),
                stream_id: stream_id.clone(),
            });
        }

        tracing::info!(room = %room_id, stream = %stream_id, channel = ?channel, "Publish stopped");
        out.emit(publisher_event(
            &stream_id,
            channel,
            PublisherState::NoPublish,
            ErrorCode::SUCCESS,
            ExtendedData::new(),
        ));
        self.release_capture(channel);
    }

    pub(crate) fn on_publish_result(
        &mut self,
        seq: RequestId,
        error_code: ErrorCode,
        extended_data: ExtendedData,
        out: &mut Outbox,
    ) {
        let found = self.rooms.iter().find_map(|(room_id, room)| {
            room.publishers
                .iter()
                .find(|(_, p)| p.request == Some(seq) && p.state == PublisherState::PublishRequesting)
                .map(|(channel, _)| (room_id.clone(), *channel))
        });
        let Some((room_id, channel)) = found else {
            tracing::debug!(seq = seq, "Stale publish result dropped");
            return;
        };

        if !error_code.is_success() {
            let Some(publisher) = self
                .rooms
                .get_mut(&room_id)
                .and_then(|room| room.publishers.remove(&channel))
            else {
                return;
            };
            tracing::warn!(room = %room_id, channel = ?channel, error_code = %error_code, "Publish rejected");

            self.channels.slot_mut(channel).staged = publisher.attributes;
            if let Some(stream_id) = &publisher.stream_id {
                out.emit(publisher_event(
                    stream_id,
                    channel,
                    PublisherState::NoPublish,
                    error_code,
                    extended_data,
                ));
            }
            self.release_capture(channel);
            return;
        }

        let Some(publisher) = self
            .rooms
            .get_mut(&room_id)
            .and_then(|room| room.publishers.get_mut(&channel))
        else {
            return;
        };
        publisher.state = PublisherState::Publishing;
        if let Some(stream_id) = &publisher.stream_id {
            tracing::info!(room = %room_id, stream = %stream_id, channel = ?channel, "Publishing");
            out.emit(publisher_event(
                stream_id,
                channel,
                PublisherState::Publishing,
                ErrorCode::SUCCESS,
                extended_data,
            ));
        }

        self.flush_deferred_frames(channel, out);
        self.sync_attributes(&room_id, channel, out);
    }

    /// Send attribute changes made while the publish request was in flight
    fn sync_attributes(&mut self, room_id: &RoomId, channel: PublishChannel, out: &mut Outbox) {
        let Some(publisher) = self
            .rooms
            .get_mut(room_id)
            .and_then(|room| room.publishers.get_mut(&channel))
        else {
            return;
        };
        let Some(stream_id) = publisher.stream_id.clone() else {
            return;
        };
        let current = publisher.attributes.params();
        let sent = std::mem::replace(&mut publisher.sent, current.clone());

        if current.extra_info != sent.extra_info {
            let seq = self.next_seq();
            out.send(Request::SetExtraInfo {
                seq,
                room_id: room_id.clone(),
                stream_id: stream_id.clone(),
                extra_info: current.extra_info.clone(),
            });
        }
        if current.audio_muted != sent.audio_muted || current.video_muted != sent.video_muted {
            out.send(Request::MutePublish {
                room_id: room_id.clone(),
                stream_id: stream_id.clone(),
                audio_muted: current.audio_muted,
                video_muted: current.video_muted,
            });
        }
        for url in current.cdn_urls.difference(&sent.cdn_urls) {
            let seq = self.next_seq();
            out.send(Request::AddCdnUrl {
                seq,
                stream_id: stream_id.clone(),
                url: url.clone(),
            });
        }
        for url in sent.cdn_urls.difference(&current.cdn_urls) {
            let seq = self.next_seq();
            out.send(Request::RemoveCdnUrl {
                seq,
                stream_id: stream_id.clone(),
                url: url.clone(),
            });
        }
    }

    pub(crate) fn on_publisher_relay_update(
        &mut self,
        stream_id: &StreamId,
        infos: Vec<RelayCdnInfo>,
        out: &mut Outbox,
    ) {
        let publisher = self.rooms.values_mut().find_map(|room| {
            room.publishers
                .values_mut()
                .find(|p| p.stream_id.as_ref() == Some(stream_id))
        });
        let Some(publisher) = publisher else {
            tracing::debug!(stream = %stream_id, "Relay update for unknown stream dropped");
            return;
        };

        if publisher.relays.apply_all(infos) {
            out.emit(Event::PublisherRelayCdnStateUpdate {
                stream_id: stream_id.clone(),
                infos: publisher.relays.snapshot(),
            });
        }
    }

    pub(crate) fn set_stream_extra_info(
        &mut self,
        extra_info: String,
        channel: PublishChannel,
        out: &mut Outbox,
    ) -> Result<Completion<ErrorCode>> {
        if extra_info.len() > MAX_EXTRA_INFO_LEN {
            return Err(Error::TooLong {
                what: "extra info",
                limit: MAX_EXTRA_INFO_LEN,
            });
        }

        let seq = self.next_seq();
        let Some((room_id, publisher)) = active_publisher(&mut self.rooms, channel) else {
            self.channels.slot_mut(channel).staged.extra_info = extra_info;
            return Ok(Completion::ready(ErrorCode::SUCCESS));
        };

        publisher.attributes.extra_info = extra_info.clone();
        let Some(stream_id) = publisher.stream_id.clone().filter(|_| publisher.is_publishing()) else {
            return Ok(Completion::ready(ErrorCode::SUCCESS));
        };
        if !self.link_up {
            return Ok(Completion::ready(ErrorCode::NETWORK_INTERRUPTED));
        }

        publisher.sent.extra_info = extra_info.clone();
        out.send(Request::SetExtraInfo {
            seq,
            room_id: room_id.clone(),
            stream_id,
            extra_info,
        });
        Ok(self.completions.code(seq, Some(room_id.clone())))
    }

    pub(crate) fn mute_publish(
        &mut self,
        audio: Option<bool>,
        video: Option<bool>,
        channel: PublishChannel,
        out: &mut Outbox,
    ) {
        let link_up = self.link_up;
        let Some((room_id, publisher)) = active_publisher(&mut self.rooms, channel) else {
            let staged = &mut self.channels.slot_mut(channel).staged;
            staged.audio_muted = audio.unwrap_or(staged.audio_muted);
            staged.video_muted = video.unwrap_or(staged.video_muted);
            return;
        };

        let attributes = &mut publisher.attributes;
        attributes.audio_muted = audio.unwrap_or(attributes.audio_muted);
        attributes.video_muted = video.unwrap_or(attributes.video_muted);
        let (audio_muted, video_muted) = (attributes.audio_muted, attributes.video_muted);

        if !publisher.is_publishing() || !link_up {
            return;
        }
        if publisher.sent.audio_muted == audio_muted && publisher.sent.video_muted == video_muted {
            return;
        }
        let Some(stream_id) = publisher.stream_id.clone() else {
            return;
        };

        publisher.sent.audio_muted = audio_muted;
        publisher.sent.video_muted = video_muted;
        out.send(Request::MutePublish {
            room_id: room_id.clone(),
            stream_id,
            audio_muted,
            video_muted,
        });
    }

    pub(crate) fn set_publish_watermark(
        &mut self,
        watermark: Option<Watermark>,
        preview_visible: bool,
        channel: PublishChannel,
    ) {
        let attributes = match active_publisher(&mut self.rooms, channel) {
            Some((_, publisher)) => &mut publisher.attributes,
            None => &mut self.channels.slot_mut(channel).staged,
        };
        attributes.watermark = watermark;
        attributes.watermark_preview_visible = preview_visible;
    }

    /// Add or remove a CDN relay target
    pub(crate) fn update_cdn_url(
        &mut self,
        url: String,
        add: bool,
        channel: PublishChannel,
        out: &mut Outbox,
    ) -> Result<Completion<ErrorCode>> {
        validate_cdn_url(&url)?;

        let seq = self.next_seq();
        let link_up = self.link_up;
        let Some((room_id, publisher)) = active_publisher(&mut self.rooms, channel) else {
            let staged = &mut self.channels.slot_mut(channel).staged;
            if add {
                staged.cdn_urls.insert(url);
            } else {
                staged.cdn_urls.remove(&url);
            }
            return Ok(Completion::ready(ErrorCode::SUCCESS));
        };

        let changed = if add {
            publisher.attributes.cdn_urls.insert(url.clone())
        } else {
            publisher.attributes.cdn_urls.remove(&url)
        };
        let Some(stream_id) = publisher.stream_id.clone().filter(|_| publisher.is_publishing()) else {
            return Ok(Completion::ready(ErrorCode::SUCCESS));
        };
        if !changed {
            return Ok(Completion::ready(ErrorCode::SUCCESS));
        }
        if !link_up {
            return Ok(Completion::ready(ErrorCode::NETWORK_INTERRUPTED));
        }

        if add {
            publisher.sent.cdn_urls.insert(url.clone());
            out.send(Request::AddCdnUrl { seq, stream_id, url });
        } else {
            publisher.sent.cdn_urls.remove(&url);
            out.send(Request::RemoveCdnUrl { seq, stream_id, url });
        }
        Ok(self.completions.code(seq, Some(room_id.clone())))
    }

    /// Attach SEI to the channel's outgoing video
    pub(crate) fn send_sei(&mut self, data: Bytes, channel: PublishChannel, out: &mut Outbox) -> Result<()> {
        if data.len() > self.config.max_sei_size {
            return Err(Error::TooLong {
                what: "SEI",
                limit: self.config.max_sei_size,
            });
        }

        let stream_id = active_publisher(&mut self.rooms, channel)
            .filter(|(_, p)| p.is_publishing())
            .and_then(|(_, p)| p.stream_id.clone());
        let Some(stream_id) = stream_id else {
            tracing::warn!(channel = ?channel, "SEI on a channel that is not publishing dropped");
            return Ok(());
        };

        if !self.channels.slot_mut(channel).sei_limiter.try_acquire() {
            return Err(Error::RateLimited("SEI"));
        }
        if self.link_up {
            out.send(Request::SendSei { stream_id, data });
        }
        Ok(())
    }

    /// Start or retarget the local preview (last call wins)
    pub(crate) fn start_preview(&mut self, canvas: Canvas, channel: PublishChannel) {
        tracing::debug!(channel = ?channel, view = canvas.view.0, "Preview started");
        self.channels.config_mut(channel).preview = Some(canvas);
    }

    pub(crate) fn stop_preview(&mut self, channel: PublishChannel) {
        self.channels.config_mut(channel).preview = None;
        self.release_capture(channel);
    }

    /// Forget first-frame bookkeeping once nothing captures on the channel
    pub(crate) fn release_capture(&mut self, channel: PublishChannel) {
        if self.channels.is_previewing(channel) || self.publisher_state(channel).is_active() {
            return;
        }
        self.channels.slot_mut(channel).first_frames = Default::default();
    }

    fn capture(&self, channel: PublishChannel) -> Capture {
        match self.publisher_state(channel) {
            PublisherState::Publishing => Capture::Live,
            _ if self.channels.is_previewing(channel) => Capture::Live,
            PublisherState::PublishRequesting => Capture::Requesting,
            PublisherState::NoPublish => Capture::Inactive,
        }
    }

    pub(crate) fn on_captured_audio_first_frame(&mut self, out: &mut Outbox) {
        let channel = PublishChannel::Main;
        let capture = self.capture(channel);
        let frames = &mut self.channels.slot_mut(channel).first_frames;
        if frames.audio_reported {
            return;
        }

        match capture {
            Capture::Live => {
                frames.audio_reported = true;
                out.emit(Event::PublisherCapturedAudioFirstFrame);
            }
            Capture::Requesting => frames.audio_deferred = true,
            Capture::Inactive => tracing::debug!("Captured audio frame without capture dropped"),
        }
    }

    pub(crate) fn on_captured_video_first_frame(&mut self, channel: PublishChannel, out: &mut Outbox) {
        let capture = self.capture(channel);
        let frames = &mut self.channels.slot_mut(channel).first_frames;
        if frames.video_reported {
            return;
        }

        match capture {
            Capture::Live => {
                frames.video_reported = true;
                out.emit(Event::PublisherCapturedVideoFirstFrame { channel });
            }
            Capture::Requesting => frames.video_deferred = true,
            Capture::Inactive => {
                tracing::debug!(channel = ?channel, "Captured video frame without capture dropped")
            }
        }
    }

    /// Report first frames that arrived while publishing was being requested
    fn flush_deferred_frames(&mut self, channel: PublishChannel, out: &mut Outbox) {
        let frames = &mut self.channels.slot_mut(channel).first_frames;
        if frames.audio_deferred && !frames.audio_reported {
            frames.audio_reported = true;
            out.emit(Event::PublisherCapturedAudioFirstFrame);
        }
        if frames.video_deferred && !frames.video_reported {
            frames.video_reported = true;
            out.emit(Event::PublisherCapturedVideoFirstFrame { channel });
        }
        frames.audio_deferred = false;
        frames.video_deferred = false;
    }

    pub(crate) fn on_publisher_video_size(&mut self, channel: PublishChannel, size: Size, out: &mut Outbox) {
        match self.capture(channel) {
            Capture::Inactive => {}
            _ => out.emit(Event::PublisherVideoSizeChanged { channel, size }),
        }
    }

    pub(crate) fn on_publisher_quality(
        &mut self,
        channel: PublishChannel,
        quality: PublishStreamQuality,
        out: &mut Outbox,
    ) {
        let stream_id = active_publisher(&mut self.rooms, channel)
            .filter(|(_, p)| p.is_publishing())
            .and_then(|(_, p)| p.stream_id.clone());
        if let Some(stream_id) = stream_id {
            out.emit(Event::PublisherQualityUpdate {
                stream_id,
                channel,
                quality,
            });
        }
    }
}
