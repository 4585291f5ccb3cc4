//! Render targets and encoder configuration

use serde::{Deserialize, Serialize};

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Layout rectangle, origin at top-left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Opaque handle of a platform view owned by the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewId(pub u64);

/// How video is scaled into its view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ViewMode {
    /// Scale proportionally, may letterbox
    #[default]
    AspectFit,
    /// Scale proportionally to fill, may crop
    AspectFill,
    /// Stretch to fill
    ScaleToFill,
}

/// Render target for preview or playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canvas {
    /// View to render into
    pub view: ViewId,
    /// Scaling mode
    pub view_mode: ViewMode,
    /// Background color as 0xRRGGBB
    pub background_color: u32,
}

impl Canvas {
    /// Canvas with aspect-fit scaling on a black background
    pub fn new(view: ViewId) -> Self {
        Self {
            view,
            view_mode: ViewMode::AspectFit,
            background_color: 0x000000,
        }
    }

    /// Set the scaling mode
    pub fn view_mode(mut self, mode: ViewMode) -> Self {
        self.view_mode = mode;
        self
    }

    /// Set the background color (0xRRGGBB)
    pub fn background_color(mut self, color: u32) -> Self {
        self.background_color = color & 0x00FF_FFFF;
        self
    }
}

/// Preset capture/encode resolutions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// 180x320, 15 fps, 300 kbps
    R180x320,
    /// 270x480, 15 fps, 400 kbps
    R270x480,
    /// 360x640, 15 fps, 600 kbps
    R360x640,
    /// 540x960, 15 fps, 1200 kbps
    R540x960,
    /// 720x1280, 15 fps, 1500 kbps
    R720x1280,
    /// 1080x1920, 15 fps, 3000 kbps
    R1080x1920,
}

impl Resolution {
    fn size(self) -> Size {
        match self {
            Resolution::R180x320 => Size::new(180, 320),
            Resolution::R270x480 => Size::new(270, 480),
            Resolution::R360x640 => Size::new(360, 640),
            Resolution::R540x960 => Size::new(540, 960),
            Resolution::R720x1280 => Size::new(720, 1280),
            Resolution::R1080x1920 => Size::new(1080, 1920),
        }
    }

    fn bitrate(self) -> u32 {
        match self {
            Resolution::R180x320 => 300_000,
            Resolution::R270x480 => 400_000,
            Resolution::R360x640 => 600_000,
            Resolution::R540x960 => 1_200_000,
            Resolution::R720x1280 => 1_500_000,
            Resolution::R1080x1920 => 3_000_000,
        }
    }
}

/// Video capture and encode configuration for a publish channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConfig {
    pub capture_resolution: Size,
    pub encode_resolution: Size,
    /// Bits per second
    pub bitrate: u32,
    pub fps: u32,
}

impl VideoConfig {
    /// Configuration for a preset resolution
    pub fn with_resolution(resolution: Resolution) -> Self {
        let size = resolution.size();
        Self {
            capture_resolution: size,
            encode_resolution: size,
            bitrate: resolution.bitrate(),
            fps: 15,
        }
    }

    /// Set the frame rate
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the bitrate in bits per second
    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self::with_resolution(Resolution::R360x640)
    }
}

/// Mirroring of local preview and published video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MirrorMode {
    /// Mirror only the local preview
    #[default]
    OnlyPreview,
    /// Mirror both preview and published stream
    Both,
    /// Mirror neither
    None,
    /// Mirror only what remote players see
    OnlyPublish,
}

/// Audio codec family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioCodec {
    /// Low-latency codec
    LowLatency,
    /// Normal-latency codec, compatible with CDN pulls
    Normal,
}

/// Audio encoder presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioConfigPreset {
    LowLatencyBasicQuality,
    LowLatencyStandardQuality,
    LowLatencyStandardQualityStereo,
    LowLatencyHighQuality,
    LowLatencyHighQualityStereo,
    NormalLatencyStandardQuality,
    NormalLatencyStandardQualityStereo,
    NormalLatencyHighQuality,
    NormalLatencyHighQualityStereo,
}

/// Audio encoder configuration for a publish channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Bits per second
    pub bitrate: u32,
    pub channels: u8,
    pub codec: AudioCodec,
}

impl AudioConfig {
    /// Configuration for a preset
    pub fn with_preset(preset: AudioConfigPreset) -> Self {
        use AudioConfigPreset::*;

        let (bitrate, channels, codec) = match preset {
            LowLatencyBasicQuality => (16_000, 1, AudioCodec::LowLatency),
            LowLatencyStandardQuality => (48_000, 1, AudioCodec::LowLatency),
            LowLatencyStandardQualityStereo => (56_000, 2, AudioCodec::LowLatency),
            LowLatencyHighQuality => (128_000, 1, AudioCodec::LowLatency),
            LowLatencyHighQualityStereo => (192_000, 2, AudioCodec::LowLatency),
            NormalLatencyStandardQuality => (48_000, 1, AudioCodec::Normal),
            NormalLatencyStandardQualityStereo => (56_000, 2, AudioCodec::Normal),
            NormalLatencyHighQuality => (128_000, 1, AudioCodec::Normal),
            NormalLatencyHighQualityStereo => (192_000, 2, AudioCodec::Normal),
        };

        Self {
            bitrate,
            channels,
            codec,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self::with_preset(AudioConfigPreset::LowLatencyStandardQuality)
    }
}

/// Image overlaid on published or mixed video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    /// Image location, `preset-id://` or `file://` URL
    pub image_url: String,
    /// Placement within the frame
    pub layout: Rect,
}

impl Watermark {
    pub fn new(image_url: impl Into<String>, layout: Rect) -> Self {
        Self {
            image_url: image_url.into(),
            layout,
        }
    }
}
