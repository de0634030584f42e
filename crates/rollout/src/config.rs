//! Scheduler configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default run name.
pub const DEFAULT_NAME: &str = "rollout";

/// Default heartbeat cadence.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration passed to `Scheduler::with_config`.
///
/// Missing fields take their defaults when deserialized:
///
/// ```
/// use rollout::SchedulerConfig;
/// use std::time::Duration;
///
/// let config: SchedulerConfig = serde_json::from_str(r#"{"name": "api-release"}"#)?;
/// assert_eq!(config.name, "api-release");
/// assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Name of the run, attached to every log line it emits.
    pub name: String,
    #[serde(rename = "heartbeat_interval_ms", with = "duration_ms")]
    heartbeat_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl SchedulerConfig {
    /// Creates a config with the given run name and the default heartbeat.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the heartbeat cadence.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Heartbeat cadence. A zero interval falls back to the default.
    pub fn heartbeat_interval(&self) -> Duration {
        if self.heartbeat_interval.is_zero() {
            DEFAULT_HEARTBEAT_INTERVAL
        } else {
            self.heartbeat_interval
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.name, "rollout");
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_heartbeat_falls_back() {
        let config = SchedulerConfig::new("ci").with_heartbeat_interval(Duration::ZERO);
        assert_eq!(config.heartbeat_interval(), DEFAULT_HEARTBEAT_INTERVAL);
    }

    #[test]
    fn test_round_trips_millis() {
        let config =
            SchedulerConfig::new("nightly").with_heartbeat_interval(Duration::from_millis(250));
        let json = serde_json::to_value(&config).expect("serializable");
        assert_eq!(json["heartbeat_interval_ms"], 250);

        let parsed: SchedulerConfig = serde_json::from_value(json).expect("deserializable");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let parsed: SchedulerConfig = serde_json::from_str("{}").expect("deserializable");
        assert_eq!(parsed, SchedulerConfig::default());
    }
}
