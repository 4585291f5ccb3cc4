//! Quality snapshots for published and played streams

use serde::{Deserialize, Serialize};

/// Overall link quality of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum QualityLevel {
    #[default]
    Excellent,
    Good,
    Medium,
    Bad,
    /// Media is not flowing
    Die,
}

impl QualityLevel {
    /// Classify a link from round-trip time and packet loss rate (0.0..=1.0)
    pub fn classify(rtt_ms: u32, packet_lost_rate: f64) -> Self {
        if packet_lost_rate >= 0.5 {
            QualityLevel::Die
        } else if rtt_ms > 800 || packet_lost_rate >= 0.2 {
            QualityLevel::Bad
        } else if rtt_ms > 300 || packet_lost_rate >= 0.1 {
            QualityLevel::Medium
        } else if rtt_ms > 100 || packet_lost_rate >= 0.02 {
            QualityLevel::Good
        } else {
            QualityLevel::Excellent
        }
    }
}

/// Uplink statistics for a published stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishStreamQuality {
    pub video_capture_fps: f64,
    pub video_encode_fps: f64,
    pub video_send_fps: f64,
    pub video_kbps: f64,
    pub audio_capture_fps: f64,
    pub audio_send_fps: f64,
    pub audio_kbps: f64,
    /// Round-trip time in milliseconds
    pub rtt: u32,
    /// Packet loss rate, 0.0..=1.0
    pub packet_lost_rate: f64,
    pub level: QualityLevel,
    pub is_hardware_encode: bool,
}

impl PublishStreamQuality {
    /// Combined audio and video send rate
    pub fn total_kbps(&self) -> f64 {
        self.video_kbps + self.audio_kbps
    }
}

/// Downlink statistics for a played stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayStreamQuality {
    pub video_recv_fps: f64,
    pub video_decode_fps: f64,
    pub video_render_fps: f64,
    pub video_kbps: f64,
    pub audio_recv_fps: f64,
    pub audio_decode_fps: f64,
    pub audio_render_fps: f64,
    pub audio_kbps: f64,
    /// Round-trip time in milliseconds
    pub rtt: u32,
    /// Packet loss rate, 0.0..=1.0
    pub packet_lost_rate: f64,
    pub level: QualityLevel,
    /// End-to-end delay in milliseconds
    pub delay: u32,
    pub is_hardware_decode: bool,
}

impl PlayStreamQuality {
    /// Combined audio and video receive rate
    pub fn total_kbps(&self) -> f64 {
        self.video_kbps + self.audio_kbps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_levels() {
        assert_eq!(QualityLevel::classify(20, 0.0), QualityLevel::Excellent);
        assert_eq!(QualityLevel::classify(150, 0.0), QualityLevel::Good);
        assert_eq!(QualityLevel::classify(50, 0.12), QualityLevel::Medium);
        assert_eq!(QualityLevel::classify(900, 0.0), QualityLevel::Bad);
        assert_eq!(QualityLevel::classify(20, 0.6), QualityLevel::Die);
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(QualityLevel::Excellent < QualityLevel::Bad);
        assert!(QualityLevel::Bad < QualityLevel::Die);
    }

    #[test]
    fn test_total_kbps() {
        let quality = PublishStreamQuality {
            video_kbps: 580.0,
            audio_kbps: 48.0,
            ..Default::default()
        };

        assert_eq!(quality.total_kbps(), 628.0);
        assert_eq!(PlayStreamQuality::default().total_kbps(), 0.0);
    }
}
