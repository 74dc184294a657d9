use std::time::{Duration, Instant};

use imlink_frame::DEFAULT_MAX_PAYLOAD;
use serde::{Deserialize, Serialize};

/// Liveness probing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Time between probes.
    #[serde(rename = "interval_ms", with = "millis")]
    pub interval: Duration,
    /// Unanswered probes tolerated before the channel is declared dead.
    pub timeout_threshold: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            timeout_threshold: 3,
        }
    }
}

/// Automatic reconnection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Time between reconnect attempts.
    #[serde(rename = "interval_ms", with = "millis")]
    pub interval: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
        }
    }
}

/// Resend of messages submitted while the channel is down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResendConfig {
    /// Delay before each retry.
    #[serde(rename = "interval_ms", with = "millis")]
    pub interval: Duration,
    /// Retries allowed before a send is reported as exhausted. The budget is shared by
    /// every in-flight send.
    pub max_attempts: u32,
}

impl Default for ResendConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_attempts: 5,
        }
    }
}

/// Tuning for [`crate::ConnectionEngine`].
///
/// Every field has a default, so a JSON config file only needs the keys it overrides:
///
/// ```
/// let cfg: imlink_engine::EngineConfig =
///     serde_json::from_str(r#"{ "heartbeat": { "interval_ms": 2000 } }"#).unwrap();
/// assert_eq!(cfg.heartbeat.interval.as_millis(), 2000);
/// assert_eq!(cfg.heartbeat.timeout_threshold, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub heartbeat: HeartbeatConfig,
    pub reconnect: ReconnectConfig,
    pub resend: ResendConfig,
    /// How long an acknowledged seq keeps its callback, for late duplicate DELIVERED.
    #[serde(rename = "ack_grace_ms", with = "millis")]
    pub ack_grace: Duration,
    /// Time allowed from opening a channel to receiving the HELLO reply.
    #[serde(rename = "handshake_timeout_ms", with = "millis")]
    pub handshake_timeout: Duration,
    /// Largest frame payload accepted from the server.
    pub max_frame_payload: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
            resend: ResendConfig::default(),
            ack_grace: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            max_frame_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Longest span any engine timer is armed for, about thirty years. Longer intervals are
/// clamped to it.
pub const MAX_TIMER: Duration = Duration::from_secs(30 * 365 * 24 * 3600);

/// The instant `after` from `now`, with `after` clamped to [`MAX_TIMER`].
pub(crate) fn deadline(now: Instant, after: Duration) -> Instant {
    now.checked_add(after.min(MAX_TIMER)).unwrap_or(now)
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
