//! Server-side mixing
//!
//! A [`MixerTask`] describes inputs, layout and outputs; the service does the
//! compositing. The engine tracks the tasks it started and reports relay
//! states of their outputs.

pub(crate) mod coordinator;
pub mod task;

pub use coordinator::MixerTaskPhase;
pub(crate) use coordinator::MixerCoordinator;
pub use task::{
    MixerAudioConfig, MixerInput, MixerInputContentType, MixerOutput, MixerStartResult, MixerTask,
    MixerVideoConfig,
};
