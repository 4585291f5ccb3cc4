//! Capture preprocessing options

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Beautify effects applied to captured video
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BeautifyFeature: u32 {
        const POLISH = 1 << 0;
        const WHITEN = 1 << 1;
        const SKIN_WHITEN = 1 << 2;
        const SHARPEN = 1 << 3;
    }
}

bitflags! {
    /// What traffic control may adjust when the uplink degrades
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TrafficControlProperty: u32 {
        const ADAPTIVE_FPS = 1 << 0;
        const ADAPTIVE_RESOLUTION = 1 << 1;
        const ADAPTIVE_AUDIO_BITRATE = 1 << 2;
    }
}

impl Default for TrafficControlProperty {
    fn default() -> Self {
        TrafficControlProperty::ADAPTIVE_FPS
    }
}

/// Beautify strengths, each in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeautifyOption {
    pub polish_step: f64,
    pub whiten_factor: f64,
    pub sharpen_factor: f64,
}

impl BeautifyOption {
    /// Clamp every factor into `[0, 1]`
    pub fn clamped(self) -> Self {
        Self {
            polish_step: self.polish_step.clamp(0.0, 1.0),
            whiten_factor: self.whiten_factor.clamp(0.0, 1.0),
            sharpen_factor: self.sharpen_factor.clamp(0.0, 1.0),
        }
    }
}

impl Default for BeautifyOption {
    fn default() -> Self {
        Self {
            polish_step: 0.2,
            whiten_factor: 0.5,
            sharpen_factor: 0.1,
        }
    }
}

/// Behavior when bandwidth falls below the minimum video bitrate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrafficControlMinVideoBitrateMode {
    /// Stop sending video
    #[default]
    NoVideo,
    /// Keep sending at a very low frame rate
    UltraLowFps,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beautify_flags_combine() {
        let features = BeautifyFeature::POLISH | BeautifyFeature::SHARPEN;

        assert!(features.contains(BeautifyFeature::POLISH));
        assert!(!features.contains(BeautifyFeature::WHITEN));
        assert_eq!(features.bits(), 0b1001);
        assert!(BeautifyFeature::default().is_empty());
    }

    #[test]
    fn test_traffic_control_default() {
        assert_eq!(
            TrafficControlProperty::default(),
            TrafficControlProperty::ADAPTIVE_FPS
        );
    }

    #[test]
    fn test_beautify_option_clamped() {
        let option = BeautifyOption {
            polish_step: -1.0,
            whiten_factor: 2.0,
            sharpen_factor: 0.3,
        }
        .clamped();

        assert_eq!(option.polish_step, 0.0);
        assert_eq!(option.whiten_factor, 1.0);
        assert_eq!(option.sharpen_factor, 0.3);
    }
}
