//! Remote capture device state

use serde::{Deserialize, Serialize};

/// State of a remote publisher's camera or microphone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteDeviceState {
    Open,
    GenericError,
    InvalidId,
    NoAuthorization,
    ZeroFps,
    InUseByOther,
    Unplugged,
    RebootRequired,
    SystemMediaServicesLost,
    /// Capture disabled by the remote user
    Disable,
    /// Remote user muted the device
    Mute,
    Interruption,
    InBackground,
    MultiForegroundApp,
    BySystemPressure,
}

impl RemoteDeviceState {
    /// Whether the device is delivering media
    pub fn is_open(self) -> bool {
        self == RemoteDeviceState::Open
    }
}
