//! Collector configuration
//!
//! Deserialized from JSON; every field has a default so a partial document
//! (or `{}`) is valid input. Call [`CollectorConfig::validate`] before use;
//! [`Collector::new`](crate::collector::Collector::new) does so.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use types::ids::InstrumentId;

use crate::clock::{SystemClock, TimeSource};
use crate::dataset::InstrumentRole;
use crate::feed::{Channel, Subscription};
use crate::order_book::{DepthConfig, DEFAULT_MAX_LEN};

pub const DEFAULT_KEEP_TIME_SECS: u64 = 60;
pub const DEFAULT_TIME_SERVER: &str = "ntp.nict.jp:123";
pub const DEFAULT_TIME_SYNC_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Parse(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("expected exactly one {role:?} instrument, found {found}")]
    Role { role: InstrumentRole, found: usize },

    #[error("instrument {0} listed twice")]
    Duplicate(InstrumentId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub id: InstrumentId,
    pub role: InstrumentRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Age window for ticks and executions, in seconds
    pub keep_time_secs: u64,
    pub depth_max_len: usize,
    pub mid_price_filter: bool,
    pub instruments: Vec<InstrumentConfig>,
    /// `host:port` of the SNTP server; `None` runs on the local clock
    pub time_server: Option<String>,
    pub time_sync_timeout_ms: u64,
    /// Bound of the feed → collector channel
    pub channel_capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            keep_time_secs: DEFAULT_KEEP_TIME_SECS,
            depth_max_len: DEFAULT_MAX_LEN,
            mid_price_filter: true,
            instruments: vec![
                InstrumentConfig {
                    id: InstrumentId::new("BTC_JPY"),
                    role: InstrumentRole::Spot,
                },
                InstrumentConfig {
                    id: InstrumentId::new("FX_BTC_JPY"),
                    role: InstrumentRole::Leveraged,
                },
            ],
            time_server: Some(DEFAULT_TIME_SERVER.to_string()),
            time_sync_timeout_ms: DEFAULT_TIME_SYNC_TIMEOUT_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl CollectorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keep_time_secs == 0 {
            return Err(ConfigError::Zero { field: "keep_time_secs" });
        }
        if self.depth_max_len == 0 {
            return Err(ConfigError::Zero { field: "depth_max_len" });
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Zero { field: "channel_capacity" });
        }
        if self.time_server.is_some() && self.time_sync_timeout_ms == 0 {
            return Err(ConfigError::Zero { field: "time_sync_timeout_ms" });
        }

        for role in [InstrumentRole::Spot, InstrumentRole::Leveraged] {
            let found = self.instruments.iter().filter(|i| i.role == role).count();
            if found != 1 {
                return Err(ConfigError::Role { role, found });
            }
        }
        for (i, instrument) in self.instruments.iter().enumerate() {
            if self.instruments[..i].iter().any(|other| other.id == instrument.id) {
                return Err(ConfigError::Duplicate(instrument.id.clone()));
            }
        }
        Ok(())
    }

    pub fn keep_time(&self) -> Duration {
        Duration::from_secs(self.keep_time_secs)
    }

    pub fn time_sync_timeout(&self) -> Duration {
        Duration::from_millis(self.time_sync_timeout_ms)
    }

    pub fn depth_config(&self) -> DepthConfig {
        DepthConfig {
            max_len: self.depth_max_len,
            mid_price_filter: self.mid_price_filter,
        }
    }

    /// Time source on the system clock, SNTP-corrected when a server is set.
    pub fn time_source(&self) -> TimeSource {
        match &self.time_server {
            Some(server) => TimeSource::sntp(server.clone(), self.time_sync_timeout()),
            None => TimeSource::local(Arc::new(SystemClock)),
        }
    }

    /// Fixed channel list: board snapshot, board diffs and executions for
    /// the leveraged instrument, ticker for every instrument.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let mut subscriptions = Vec::new();
        for instrument in &self.instruments {
            if instrument.role == InstrumentRole::Leveraged {
                for channel in [Channel::BoardSnapshot, Channel::Board, Channel::Executions] {
                    subscriptions.push(Subscription::new(channel, instrument.id.clone()));
                }
            }
        }
        for instrument in &self.instruments {
            subscriptions.push(Subscription::new(Channel::Ticker, instrument.id.clone()));
        }
        subscriptions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CollectorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.keep_time(), Duration::from_secs(60));
        assert_eq!(config.depth_config(), DepthConfig::default());
        assert_eq!(config.time_server.as_deref(), Some("ntp.nict.jp:123"));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = CollectorConfig::from_json(r#"{"keep_time_secs": 120, "time_server": null}"#).unwrap();
        assert_eq!(config.keep_time_secs, 120);
        assert_eq!(config.depth_max_len, DEFAULT_MAX_LEN);
        assert!(config.time_server.is_none());
        assert_eq!(config.instruments.len(), 2);
    }

    #[test]
    fn test_instrument_roles_from_json() {
        let json = r#"{"instruments": [
            {"id": "ETH_JPY", "role": "Spot"},
            {"id": "FX_ETH_JPY", "role": "Leveraged"}
        ]}"#;
        let config = CollectorConfig::from_json(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.instruments[1].id.as_str(), "FX_ETH_JPY");
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(CollectorConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        let config = CollectorConfig { keep_time_secs: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::Zero { field: "keep_time_secs" }));

        let config = CollectorConfig { depth_max_len: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::Zero { field: "depth_max_len" }));

        let config = CollectorConfig { channel_capacity: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::Zero { field: "channel_capacity" }));
    }

    #[test]
    fn test_validate_requires_one_of_each_role() {
        let mut config = CollectorConfig::default();
        config.instruments.retain(|i| i.role == InstrumentRole::Leveraged);
        assert_eq!(
            config.validate(),
            Err(ConfigError::Role { role: InstrumentRole::Spot, found: 0 })
        );
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut config = CollectorConfig::default();
        config.instruments[0].id = InstrumentId::new("FX_BTC_JPY");
        assert_eq!(
            config.validate(),
            Err(ConfigError::Duplicate(InstrumentId::new("FX_BTC_JPY")))
        );
    }

    #[tokio::test]
    async fn test_time_source_without_server_stays_local() {
        let config = CollectorConfig {
            time_server: None,
            ..Default::default()
        };
        let source = config.time_source();
        assert!(!source.resync().await);
        assert_eq!(source.drift(), chrono::Duration::zero());
    }

    #[test]
    fn test_time_source_with_server_uses_sntp() {
        let config = CollectorConfig {
            time_sync_timeout_ms: 250,
            ..Default::default()
        };
        let debug = format!("{:?}", config.time_source());
        assert!(debug.contains("has_service: true"));
        assert!(debug.contains("250ms"));
    }

    #[test]
    fn test_subscriptions() {
        let names: Vec<String> = CollectorConfig::default()
            .subscriptions()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "lightning_board_snapshot_FX_BTC_JPY",
                "lightning_board_FX_BTC_JPY",
                "lightning_executions_FX_BTC_JPY",
                "lightning_ticker_BTC_JPY",
                "lightning_ticker_FX_BTC_JPY",
            ]
        );
    }
}
