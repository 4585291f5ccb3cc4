//! Engine configuration

use std::time::Duration;

use serde::Deserialize;

/// Application scenario the engine is tuned for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Scenario {
    #[default]
    General,
    Communication,
    Live,
}

/// Engine configuration options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Application ID issued by the service
    pub app_id: u32,

    /// Application signature issued by the service
    pub app_sign: String,

    /// Scenario preset
    pub scenario: Scenario,

    /// A first login not acknowledged within this time fails with
    /// `ROOM_LOGIN_TIMEOUT`
    #[serde(with = "secs")]
    pub login_timeout: Duration,

    /// Rooms are torn down with `ROOM_RECONNECT_FAILED` if the link stays
    /// down longer than this
    #[serde(with = "secs")]
    pub reconnect_timeout: Duration,

    /// Maximum registered event handlers
    pub max_event_handlers: usize,

    /// Broadcast messages plus custom commands allowed per room per window
    pub im_rate_limit: u32,

    /// Window for `im_rate_limit`
    #[serde(with = "secs")]
    pub im_rate_window: Duration,

    /// SEI sends allowed per channel per second
    pub sei_rate_limit: u32,

    /// Maximum SEI payload in bytes
    pub max_sei_size: usize,

    /// Maximum IM message or command size in bytes
    pub max_message_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_id: 0,
            app_sign: String::new(),
            scenario: Scenario::General,
            login_timeout: Duration::from_secs(30),
            reconnect_timeout: Duration::from_secs(300),
            max_event_handlers: 16,
            im_rate_limit: 600,
            im_rate_window: Duration::from_secs(60),
            sei_rate_limit: 30,
            max_sei_size: 4096,
            max_message_size: 256,
        }
    }
}

impl EngineConfig {
    /// Create a config for an application
    pub fn with_app(app_id: u32, app_sign: impl Into<String>) -> Self {
        Self {
            app_id,
            app_sign: app_sign.into(),
            ..Default::default()
        }
    }

    /// Set the scenario
    pub fn scenario(mut self, scenario: Scenario) -> Self {
        self.scenario = scenario;
        self
    }

    /// Set the first-login timeout
    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Set how long a lost link may stay down before rooms are dropped
    pub fn reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.reconnect_timeout = timeout;
        self
    }

    /// Set the event handler limit
    pub fn max_event_handlers(mut self, max: usize) -> Self {
        self.max_event_handlers = max.max(1);
        self
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        f64::deserialize(deserializer).map(Duration::from_secs_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();

        assert_eq!(config.login_timeout, Duration::from_secs(30));
        assert_eq!(config.reconnect_timeout, Duration::from_secs(300));
        assert_eq!(config.max_event_handlers, 16);
        assert_eq!(config.im_rate_limit, 600);
        assert_eq!(config.im_rate_window, Duration::from_secs(60));
        assert_eq!(config.sei_rate_limit, 30);
        assert_eq!(config.max_sei_size, 4096);
        assert_eq!(config.max_message_size, 256);
    }

    #[test]
    fn test_with_app() {
        let config = EngineConfig::with_app(1234, "sign");

        assert_eq!(config.app_id, 1234);
        assert_eq!(config.app_sign, "sign");
        assert_eq!(config.scenario, Scenario::General);
    }

    #[test]
    fn test_builder_chaining() {
        let config = EngineConfig::default()
            .scenario(Scenario::Live)
            .login_timeout(Duration::from_secs(5))
            .reconnect_timeout(Duration::from_secs(60))
            .max_event_handlers(0);

        assert_eq!(config.scenario, Scenario::Live);
        assert_eq!(config.login_timeout, Duration::from_secs(5));
        assert_eq!(config.reconnect_timeout, Duration::from_secs(60));
        // At least one handler is always allowed
        assert_eq!(config.max_event_handlers, 1);
    }

    #[test]
    fn test_deserialize_json() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"app_id": 7, "reconnect_timeout": 12.5, "scenario": "Communication"}"#,
        )
        .unwrap();

        assert_eq!(config.app_id, 7);
        assert_eq!(config.reconnect_timeout, Duration::from_millis(12_500));
        assert_eq!(config.scenario, Scenario::Communication);
        assert_eq!(config.login_timeout, Duration::from_secs(30));
    }
}
