//! Mixer task descriptor

use serde::{Deserialize, Serialize};

use crate::dispatch::ExtendedData;
use crate::error::{Error, ErrorCode, Result};
use crate::ids::{StreamId, TaskId};
use crate::media::{Rect, Resolution, Size, VideoConfig, Watermark};

/// What a mixer input contributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MixerInputContentType {
    #[default]
    Video,
    /// Audio only, layout is ignored
    Audio,
}

/// One stream composited into the mix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixerInput {
    pub stream_id: StreamId,
    pub content_type: MixerInputContentType,
    /// Placement in the output canvas
    pub layout: Rect,
    /// Key of this input in sound-level updates
    pub sound_level_id: u32,
}

impl MixerInput {
    pub fn new(stream_id: StreamId, content_type: MixerInputContentType, layout: Rect) -> Self {
        Self {
            stream_id,
            content_type,
            layout,
            sound_level_id: 0,
        }
    }

    /// Set the sound-level key
    pub fn sound_level_id(mut self, id: u32) -> Self {
        self.sound_level_id = id;
        self
    }
}

/// Where the mix is delivered: a CDN URL or a stream ID
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MixerOutput {
    pub target: String,
}

impl MixerOutput {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

/// Mix audio encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixerAudioConfig {
    /// Bits per second
    pub bitrate: u32,
}

impl Default for MixerAudioConfig {
    fn default() -> Self {
        Self { bitrate: 48_000 }
    }
}

/// Mix video encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixerVideoConfig {
    pub resolution: Size,
    pub fps: u32,
    /// Bits per second
    pub bitrate: u32,
}

impl MixerVideoConfig {
    /// Configuration for a preset resolution
    pub fn with_resolution(resolution: Resolution) -> Self {
        let video = VideoConfig::with_resolution(resolution);
        Self {
            resolution: video.encode_resolution,
            fps: video.fps,
            bitrate: video.bitrate,
        }
    }
}

impl Default for MixerVideoConfig {
    fn default() -> Self {
        Self::with_resolution(Resolution::R360x640)
    }
}

/// Server-side compositing job
///
/// # Example
/// ```
/// use rtc_session::ids::StreamId;
/// use rtc_session::media::Rect;
/// use rtc_session::mixer::{MixerInput, MixerInputContentType, MixerOutput, MixerTask};
///
/// let task = MixerTask::new("mix-1")
///     .unwrap()
///     .input(MixerInput::new(
///         StreamId::new("s1").unwrap(),
///         MixerInputContentType::Video,
///         Rect::new(0, 0, 360, 640),
///     ))
///     .output(MixerOutput::new("rtmp://cdn.example.com/live/mix-1"));
///
/// assert!(task.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixerTask {
    pub task_id: TaskId,
    pub inputs: Vec<MixerInput>,
    pub outputs: Vec<MixerOutput>,
    pub audio_config: MixerAudioConfig,
    pub video_config: MixerVideoConfig,
    pub watermark: Option<Watermark>,
    pub background_image_url: Option<String>,
    /// Report per-input sound levels through `on_mixer_sound_level_update`
    pub sound_level: bool,
}

impl MixerTask {
    /// Empty task with default audio/video configuration
    pub fn new(task_id: &str) -> Result<Self> {
        Ok(Self {
            task_id: TaskId::new(task_id)?,
            inputs: Vec::new(),
            outputs: Vec::new(),
            audio_config: MixerAudioConfig::default(),
            video_config: MixerVideoConfig::default(),
            watermark: None,
            background_image_url: None,
            sound_level: false,
        })
    }

    /// Append an input
    pub fn input(mut self, input: MixerInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Append an output target
    pub fn output(mut self, output: MixerOutput) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn audio_config(mut self, config: MixerAudioConfig) -> Self {
        self.audio_config = config;
        self
    }

    pub fn video_config(mut self, config: MixerVideoConfig) -> Self {
        self.video_config = config;
        self
    }

    pub fn watermark(mut self, watermark: Watermark) -> Self {
        self.watermark = Some(watermark);
        self
    }

    pub fn background_image_url(mut self, url: impl Into<String>) -> Self {
        self.background_image_url = Some(url.into());
        self
    }

    /// Enable sound-level reporting
    pub fn sound_level(mut self, enable: bool) -> Self {
        self.sound_level = enable;
        self
    }

    /// Check the descriptor before it is sent
    ///
    /// Inputs whose streams do not exist yet are fine; the service waits for
    /// them.
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(Error::InvalidParam("mixer task has no inputs".into()));
        }
        if self.outputs.is_empty() {
            return Err(Error::InvalidParam("mixer task has no outputs".into()));
        }
        if let Some(output) = self.outputs.iter().find(|o| o.target.is_empty()) {
            return Err(Error::InvalidParam(format!(
                "empty mixer output target: {:?}",
                output
            )));
        }
        for (i, input) in self.inputs.iter().enumerate() {
            if self.inputs[..i]
                .iter()
                .any(|other| other.stream_id == input.stream_id)
            {
                return Err(Error::InvalidParam(format!(
                    "duplicate mixer input: {}",
                    input.stream_id
                )));
            }
        }
        Ok(())
    }

    /// Output targets in declaration order
    pub fn output_targets(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|o| o.target.as_str())
    }
}

/// Outcome of `start_mixer_task`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MixerStartResult {
    pub error_code: ErrorCode,
    /// Playback URLs of the mix, when the service provides them
    pub extended_data: ExtendedData,
}

impl From<ErrorCode> for MixerStartResult {
    fn from(error_code: ErrorCode) -> Self {
        Self {
            error_code,
            extended_data: ExtendedData::new(),
        }
    }
}
