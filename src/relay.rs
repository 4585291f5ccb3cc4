//! CDN relay state
//!
//! Both direct publishes and mixer outputs can be forwarded to CDN URLs.
//! Each (stream, URL) pair is in exactly one [`RelayCdnState`] at a time;
//! transitions carry a reason and a monotonic timestamp. [`RelayTable`]
//! keeps the latest state per URL and discards out-of-order updates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Relay state of one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayCdnState {
    /// Not relaying
    Stop,
    /// Relaying
    Start,
    /// Relay is being (re)requested
    Retry,
}

/// Why the relay state changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RelayCdnUpdateReason {
    #[default]
    None,
    ServerError,
    HandshakeFailed,
    AccessPointError,
    CreateStreamFailed,
    BadName,
    /// The CDN closed the connection
    CdnServerDisconnected,
    /// Relay was stopped on request
    Disconnected,
}

/// Relay state report for one URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayCdnInfo {
    /// Target URL
    pub url: String,
    pub state: RelayCdnState,
    pub update_reason: RelayCdnUpdateReason,
    /// Milliseconds since the service started, monotonic per URL
    pub state_time: u64,
}

impl RelayCdnInfo {
    pub fn new(
        url: impl Into<String>,
        state: RelayCdnState,
        update_reason: RelayCdnUpdateReason,
        state_time: u64,
    ) -> Self {
        Self {
            url: url.into(),
            state,
            update_reason,
            state_time,
        }
    }
}

/// Latest relay state per URL
#[derive(Debug, Clone, Default)]
pub struct RelayTable {
    entries: BTreeMap<String, RelayCdnInfo>,
}

impl RelayTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an update
    ///
    /// Returns `true` if the stored state changed. Updates older than the
    /// stored one are ignored; an update with the same timestamp replaces the
    /// stored one only if it differs.
    pub fn apply(&mut self, info: RelayCdnInfo) -> bool {
        match self.entries.get(&info.url) {
            Some(current) if info.state_time < current.state_time => {
                tracing::debug!(
                    url = %info.url,
                    stale = info.state_time,
                    current = current.state_time,
                    "Out-of-order relay update dropped"
                );
                false
            }
            Some(current) if *current == info => false,
            _ => {
                self.entries.insert(info.url.clone(), info);
                true
            }
        }
    }

    /// Record a batch, returning whether anything changed
    pub fn apply_all(&mut self, infos: impl IntoIterator<Item = RelayCdnInfo>) -> bool {
        infos
            .into_iter()
            .fold(false, |changed, info| self.apply(info) | changed)
    }

    /// Current state of a URL
    pub fn state(&self, url: &str) -> Option<RelayCdnState> {
        self.entries.get(url).map(|info| info.state)
    }

    /// Whether every known URL is stopped
    pub fn all_stopped(&self) -> bool {
        self.entries
            .values()
            .all(|info| info.state == RelayCdnState::Stop)
    }

    /// All entries ordered by URL
    pub fn snapshot(&self) -> Vec<RelayCdnInfo> {
        self.entries.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(url: &str, state: RelayCdnState, t: u64) -> RelayCdnInfo {
        RelayCdnInfo::new(url, state, RelayCdnUpdateReason::None, t)
    }

    #[test]
    fn test_apply_tracks_one_state_per_url() {
        let mut table = RelayTable::new();

        assert!(table.apply(info("rtmp://a", RelayCdnState::Retry, 1)));
        assert!(table.apply(info("rtmp://a", RelayCdnState::Start, 2)));
        assert!(table.apply(info("rtmp://b", RelayCdnState::Start, 2)));

        assert_eq!(table.state("rtmp://a"), Some(RelayCdnState::Start));
        assert_eq!(table.snapshot().len(), 2);
    }

    #[test]
    fn test_out_of_order_update_ignored() {
        let mut table = RelayTable::new();

        table.apply(info("rtmp://a", RelayCdnState::Start, 10));
        assert!(!table.apply(info("rtmp://a", RelayCdnState::Retry, 5)));
        assert_eq!(table.state("rtmp://a"), Some(RelayCdnState::Start));

        // Same update twice is not a change
        assert!(!table.apply(info("rtmp://a", RelayCdnState::Start, 10)));
    }

    #[test]
    fn test_all_stopped() {
        let mut table = RelayTable::new();
        assert!(table.all_stopped());

        table.apply_all([
            info("rtmp://a", RelayCdnState::Start, 1),
            info("rtmp://b", RelayCdnState::Stop, 1),
        ]);
        assert!(!table.all_stopped());

        table.apply(info("rtmp://a", RelayCdnState::Stop, 2));
        assert!(table.all_stopped());
    }
}
