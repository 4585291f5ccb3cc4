//! Loopback service configuration

use std::time::Duration;

/// Loopback service configuration options
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Token every login must present (`None` accepts any login)
    pub required_token: Option<String>,

    /// How long a stream survives its publisher's lost link before it is
    /// withdrawn from the room
    pub publisher_grace_period: Duration,

    /// How long a mixer input may be missing before it is dropped from the mix
    pub mixer_input_grace: Duration,

    /// Interval of the sweep task
    pub sweep_interval: Duration,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            required_token: None,
            publisher_grace_period: Duration::from_secs(10),
            mixer_input_grace: Duration::from_secs(90),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

impl LoopbackConfig {
    /// Require a login token
    pub fn required_token(mut self, token: impl Into<String>) -> Self {
        self.required_token = Some(token.into());
        self
    }

    /// Set the publisher grace period
    pub fn publisher_grace_period(mut self, period: Duration) -> Self {
        self.publisher_grace_period = period;
        self
    }

    /// Set the mixer input grace window
    pub fn mixer_input_grace(mut self, window: Duration) -> Self {
        self.mixer_input_grace = window;
        self
    }

    /// Set the sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}
