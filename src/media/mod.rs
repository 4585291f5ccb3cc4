//! Media descriptors
//!
//! This module provides the value types that travel with publish and play
//! requests:
//! - Render targets and video/audio encoder configuration
//! - Preprocessing flags (beautify, traffic control)
//! - Remote capture device state
//!
//! Nothing here touches real capture or rendering; the engine only records
//! these settings and forwards them to the service.

pub mod config;
pub mod device;
pub mod preprocess;

pub use config::{
    AudioCodec, AudioConfig, AudioConfigPreset, Canvas, MirrorMode, Rect, Resolution, Size,
    VideoConfig, ViewId, ViewMode, Watermark,
};
pub use device::RemoteDeviceState;
pub use preprocess::{
    BeautifyFeature, BeautifyOption, TrafficControlMinVideoBitrateMode, TrafficControlProperty,
};
