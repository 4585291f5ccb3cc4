//! Stream quality statistics
//!
//! Periodic snapshots reported through `on_publisher_quality_update` and
//! `on_player_quality_update`.

pub mod quality;

pub use quality::{PlayStreamQuality, PublishStreamQuality, QualityLevel};
