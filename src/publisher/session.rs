//! Publish session of one channel

use std::collections::BTreeSet;

use crate::ids::{RoomId, StreamId};
use crate::media::Watermark;
use crate::relay::{RelayCdnInfo, RelayTable};
use crate::signaling::{PublishParams, RequestId};

use super::state::{PublishChannel, PublisherState};

/// Per-stream attributes; discarded when the stream stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct StreamAttributes {
    pub(crate) extra_info: String,
    pub(crate) audio_muted: bool,
    pub(crate) video_muted: bool,
    pub(crate) watermark: Option<Watermark>,
    pub(crate) watermark_preview_visible: bool,
    pub(crate) cdn_urls: BTreeSet<String>,
}

impl StreamAttributes {
    /// The part of the attributes the service knows about
    pub(crate) fn params(&self) -> PublishParams {
        PublishParams {
            extra_info: self.extra_info.clone(),
            audio_muted: self.audio_muted,
            video_muted: self.video_muted,
            cdn_urls: self.cdn_urls.clone(),
        }
    }
}

/// An active (requesting or publishing) stream on a channel
pub(crate) struct PublisherSession {
    pub(crate) stream_id: Option<StreamId>,
    pub(crate) state: PublisherState,
    /// Outstanding or acknowledged publish request
    pub(crate) request: Option<RequestId>,
    pub(crate) attributes: StreamAttributes,
    /// Attributes as last sent to the service
    pub(crate) sent: PublishParams,
    pub(crate) relays: RelayTable,
}

impl PublisherSession {
    pub(crate) fn new(stream_id: StreamId, attributes: StreamAttributes) -> Self {
        Self {
            stream_id: Some(stream_id),
            state: PublisherState::PublishRequesting,
            request: None,
            attributes,
            sent: PublishParams::default(),
            relays: RelayTable::new(),
        }
    }

    pub(crate) fn is_publishing(&self) -> bool {
        self.state == PublisherState::Publishing
    }
}

/// Snapshot of a channel's publish session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherInfo {
    pub room_id: RoomId,
    pub channel: PublishChannel,
    pub stream_id: StreamId,
    pub state: PublisherState,
    pub extra_info: String,
    pub audio_muted: bool,
    pub video_muted: bool,
    pub watermark: Option<Watermark>,
    pub cdn_urls: Vec<String>,
    pub relays: Vec<RelayCdnInfo>,
}
