//! Link configuration.
//!
//! Everything tunable about the link lives in [`LinkConfig`]: the two channel
//! endpoints, the watchdog periods, the transport backoffs, and the recorder
//! defaults. The struct deserializes from any serde format so deployments can
//! load it from a config file; defaults match the reference deployment
//! (100 ms status poll, 3 s frame timeout).

use serde::Deserialize;
use std::time::Duration;

/// Configuration for a controller link.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Device host for both channels.
    pub host: String,

    /// Request/reply control channel port.
    pub control_port: u16,

    /// Publish/subscribe event channel port.
    pub event_port: u16,

    /// Watchdog status poll period in milliseconds while connected.
    pub poll_period_ms: u64,

    /// Probe retry period in milliseconds while disconnected.
    pub retry_period_ms: u64,

    /// Delay between reconnection attempts in milliseconds.
    pub reconnect_backoff_ms: u64,

    /// Pause after a failed socket write in milliseconds.
    pub write_backoff_ms: u64,

    /// Pause of the send loop while the socket is down, in milliseconds.
    pub closed_backoff_ms: u64,

    /// Seconds without a frame before the open dataset is closed
    /// automatically.
    pub frame_timeout_secs: f64,

    /// Initial dataset target path, if any.
    pub dataset_path: Option<String>,

    /// Upper bound on a single wire message.
    pub max_message_bytes: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            control_port: 9000,
            event_port: 9001,
            poll_period_ms: 100,
            retry_period_ms: 50,
            reconnect_backoff_ms: 1000,
            write_backoff_ms: 1000,
            closed_backoff_ms: 5000,
            frame_timeout_secs: 3.0,
            dataset_path: None,
            max_message_bytes: 1024 * 1024,
        }
    }
}

impl LinkConfig {
    /// Create a configuration for a device at `host` with the given channel
    /// ports.
    pub fn new(host: impl Into<String>, control_port: u16, event_port: u16) -> Self {
        Self { host: host.into(), control_port, event_port, ..Self::default() }
    }

    /// Set the initial dataset target path.
    pub fn with_dataset_path(mut self, path: impl Into<String>) -> Self {
        self.dataset_path = Some(path.into());
        self
    }

    /// Set the frame timeout used by the automatic close policy.
    pub fn with_frame_timeout(mut self, secs: f64) -> Self {
        self.frame_timeout_secs = secs;
        self
    }

    /// Set the watchdog poll period.
    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period_ms = period.as_millis() as u64;
        self
    }

    /// Control channel endpoint as `host:port`.
    pub fn control_addr(&self) -> String {
        format!("{}:{}", self.host, self.control_port)
    }

    /// Event channel endpoint as `host:port`.
    pub fn event_addr(&self) -> String {
        format!("{}:{}", self.host, self.event_port)
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    pub fn retry_period(&self) -> Duration {
        Duration::from_millis(self.retry_period_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn write_backoff(&self) -> Duration {
        Duration::from_millis(self.write_backoff_ms)
    }

    pub fn closed_backoff(&self) -> Duration {
        Duration::from_millis(self.closed_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = LinkConfig::default();
        assert_eq!(config.poll_period(), Duration::from_millis(100));
        assert_eq!(config.frame_timeout_secs, 3.0);
        assert!(config.dataset_path.is_none());
    }

    #[test]
    fn addresses_combine_host_and_port() {
        let config = LinkConfig::new("10.0.0.5", 9100, 9101);
        assert_eq!(config.control_addr(), "10.0.0.5:9100");
        assert_eq!(config.event_addr(), "10.0.0.5:9101");
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: LinkConfig =
            serde_json::from_str(r#"{"host":"device-01","poll_period_ms":250}"#).unwrap();
        assert_eq!(config.host, "device-01");
        assert_eq!(config.poll_period(), Duration::from_millis(250));
        // untouched fields fall back to defaults
        assert_eq!(config.control_port, 9000);
    }

    #[test]
    fn builder_setters_compose() {
        let config = LinkConfig::new("127.0.0.1", 9000, 9001)
            .with_dataset_path("/data/attenuation.dat")
            .with_frame_timeout(5.0)
            .with_poll_period(Duration::from_millis(20));
        assert_eq!(config.dataset_path.as_deref(), Some("/data/attenuation.dat"));
        assert_eq!(config.frame_timeout_secs, 5.0);
        assert_eq!(config.poll_period_ms, 20);
    }
}
