//! Client configuration.

use std::time::Duration;

/// Connection and pacing settings for a [`Client`](super::Client).
///
/// Loading this from a file is left to the application; with the `serde`
/// feature enabled it deserializes from any serde format.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Nickname, also used for the `USER` registration fields.
    pub nickname: String,
    /// NickServ password; `IDENTIFY` is only sent when set.
    pub password: Option<String>,
    /// Channels joined after the settle delay.
    pub channels: Vec<String>,
    /// Minimum gap between two outbound lines.
    pub pacing_interval_ms: u64,
    /// Outbound queue capacity. Zero means unlimited.
    pub queue_capacity: usize,
    /// Delay between connection attempts.
    pub connect_retry_ms: u64,
    /// Wait after registration before identifying and joining.
    pub settle_delay_ms: u64,
    /// Upper bound on waiting for the receiver to stop during teardown.
    pub shutdown_wait_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6667,
            nickname: "ircbot".to_string(),
            password: None,
            channels: Vec::new(),
            pacing_interval_ms: 800,
            queue_capacity: 10,
            connect_retry_ms: 5000,
            settle_delay_ms: 5000,
            shutdown_wait_ms: 5000,
        }
    }
}

impl ClientConfig {
    /// Defaults with the given server and nickname.
    pub fn new(host: impl Into<String>, port: u16, nickname: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            nickname: nickname.into(),
            ..Default::default()
        }
    }

    /// [`pacing_interval_ms`](Self::pacing_interval_ms) as a `Duration`.
    pub fn pacing_interval(&self) -> Duration {
        Duration::from_millis(self.pacing_interval_ms)
    }

    /// Delay between connection attempts.
    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }

    /// Wait before identifying and joining.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Bound on the teardown wait.
    pub fn shutdown_wait(&self) -> Duration {
        Duration::from_millis(self.shutdown_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 6667);
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.pacing_interval(), Duration::from_millis(800));
        assert_eq!(config.connect_retry(), Duration::from_secs(5));
        assert!(config.password.is_none());
    }

    #[test]
    fn test_new_keeps_other_defaults() {
        let config = ClientConfig::new("irc.example.net", 6697, "snaibot");
        assert_eq!(config.host, "irc.example.net");
        assert_eq!(config.nickname, "snaibot");
        assert_eq!(config.settle_delay(), Duration::from_secs(5));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_partial_toml() {
        let config: ClientConfig = toml::from_str(
            r##"
            host = "irc.libera.chat"
            nickname = "snaibot"
            channels = ["#rust", "#tokio"]
            pacing_interval_ms = 1000
            "##,
        )
        .unwrap();

        assert_eq!(config.host, "irc.libera.chat");
        assert_eq!(config.port, 6667);
        assert_eq!(config.channels, vec!["#rust", "#tokio"]);
        assert_eq!(config.pacing_interval(), Duration::from_secs(1));
    }
}
