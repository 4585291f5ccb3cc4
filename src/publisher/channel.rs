//! Engine-wide per-channel capture settings
//!
//! Settings in [`ChannelConfig`] belong to the channel, not to a stream: they
//! survive `stop_publishing` and apply to every later publish on the channel.
//! Stream attributes staged while nothing is published also live here until
//! the next publish claims them.

use crate::engine::rate_limit::RateLimiter;
use crate::media::{
    AudioConfig, BeautifyFeature, BeautifyOption, Canvas, MirrorMode, TrafficControlMinVideoBitrateMode,
    TrafficControlProperty, VideoConfig,
};

use super::session::StreamAttributes;
use super::state::PublishChannel;

/// Capture and encoder settings of one publish channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Local preview target, `None` when preview is stopped
    pub preview: Option<Canvas>,
    pub video_config: VideoConfig,
    pub audio_config: AudioConfig,
    pub mirror_mode: MirrorMode,

    pub traffic_control: bool,
    pub traffic_control_property: TrafficControlProperty,
    /// Bits per second; 0 disables the floor
    pub min_video_bitrate: u32,
    pub min_video_bitrate_mode: TrafficControlMinVideoBitrateMode,

    /// Capture gain, 0..=100
    pub capture_volume: u32,
    pub beautify_feature: BeautifyFeature,
    pub beautify_option: BeautifyOption,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            preview: None,
            video_config: VideoConfig::default(),
            audio_config: AudioConfig::default(),
            mirror_mode: MirrorMode::default(),
            traffic_control: true,
            traffic_control_property: TrafficControlProperty::default(),
            min_video_bitrate: 0,
            min_video_bitrate_mode: TrafficControlMinVideoBitrateMode::default(),
            capture_volume: 100,
            beautify_feature: BeautifyFeature::empty(),
            beautify_option: BeautifyOption::default(),
        }
    }
}

/// Which captured first frames were seen in the current capture session
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct FirstFrames {
    pub(crate) audio_reported: bool,
    pub(crate) audio_deferred: bool,
    pub(crate) video_reported: bool,
    pub(crate) video_deferred: bool,
}

pub(crate) struct ChannelSlot {
    pub(crate) config: ChannelConfig,
    /// Attributes set while the channel publishes nothing
    pub(crate) staged: StreamAttributes,
    pub(crate) sei_limiter: RateLimiter,
    pub(crate) first_frames: FirstFrames,
}

/// Settings for every [`PublishChannel`]
pub(crate) struct ChannelTable {
    slots: [ChannelSlot; 2],
}

impl ChannelTable {
    pub(crate) fn new(sei_rate_limit: u32) -> Self {
        let slot = || ChannelSlot {
            config: ChannelConfig::default(),
            staged: StreamAttributes::default(),
            sei_limiter: RateLimiter::per_second(sei_rate_limit),
            first_frames: FirstFrames::default(),
        };
        Self {
            slots: [slot(), slot()],
        }
    }

    pub(crate) fn slot(&self, channel: PublishChannel) -> &ChannelSlot {
        &self.slots[channel.index()]
    }

    pub(crate) fn slot_mut(&mut self, channel: PublishChannel) -> &mut ChannelSlot {
        &mut self.slots[channel.index()]
    }

    pub(crate) fn config(&self, channel: PublishChannel) -> &ChannelConfig {
        &self.slot(channel).config
    }

    pub(crate) fn config_mut(&mut self, channel: PublishChannel) -> &mut ChannelConfig {
        &mut self.slot_mut(channel).config
    }

    pub(crate) fn is_previewing(&self, channel: PublishChannel) -> bool {
        self.config(channel).preview.is_some()
    }

    /// Forget first-frame bookkeeping of every channel
    pub(crate) fn reset_capture(&mut self) {
        for slot in &mut self.slots {
            slot.first_frames = FirstFrames::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ViewId;

    #[test]
    fn test_channels_are_independent() {
        let mut table = ChannelTable::new(30);
        table.config_mut(PublishChannel::Aux).capture_volume = 20;
        table.config_mut(PublishChannel::Main).preview = Some(Canvas::new(ViewId(1)));

        assert_eq!(table.config(PublishChannel::Main).capture_volume, 100);
        assert_eq!(table.config(PublishChannel::Aux).capture_volume, 20);
        assert!(table.is_previewing(PublishChannel::Main));
        assert!(!table.is_previewing(PublishChannel::Aux));
    }

    #[test]
    fn test_reset_capture() {
        let mut table = ChannelTable::new(30);
        table.slot_mut(PublishChannel::Main).first_frames.video_reported = true;
        table.slot_mut(PublishChannel::Aux).first_frames.audio_deferred = true;

        table.reset_capture();
        assert!(!table.slot(PublishChannel::Main).first_frames.video_reported);
        assert!(!table.slot(PublishChannel::Aux).first_frames.audio_deferred);
    }
}
