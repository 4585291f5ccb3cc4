//! Publishing local streams
//!
//! Each [`PublishChannel`] runs its own publish session. Channel settings
//! (preview, encoder configuration, preprocessing) persist across publishes;
//! per-stream attributes (extra info, mute, watermark, CDN relays) end with
//! the stream.

pub(crate) mod channel;
pub(crate) mod manager;
pub(crate) mod session;
pub mod state;

pub use channel::ChannelConfig;
pub(crate) use channel::ChannelTable;
pub use manager::MAX_CDN_URL_LEN;
pub use session::PublisherInfo;
pub(crate) use session::PublisherSession;
pub use state::{PublishChannel, PublisherState};
