use std::net::{IpAddr, UdpSocket};
use std::time::Duration;

use thiserror::Error;

use crate::channel::BroadcastPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Role {
    Master,
    #[default]
    Slave,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub broadcast: BroadcastConfig,
    pub media: MediaConfig,
    pub network: NetworkConfig,
    pub role: Role,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Destination host for master broadcasts
    pub broadcast_address: String,
    /// Host the slave binds its listening socket to
    pub listen_address: String,
    /// Identity stamped on (master) or required of (slave) every message
    pub master_id: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Duration reported by the simulated engine
    pub simulated_duration_ms: u64,
    pub standby_image: String,
    pub video_path: String,
}

#[derive(Debug, Clone)]
pub struct TimingConfig {
    pub heartbeat_interval_ms: u64,
    /// Grace interval between `prepare` and the first synchronized start
    pub initial_prepare_ms: u64,
    /// How far in the future the master schedules each synchronized start
    pub lead_time_ms: u64,
    pub loop_delay_ms: u64,
    pub preroll_ms: u64,
    /// Local compensation for decoder start-up, may be negative
    pub start_delay_ms: i64,
    pub watchdog_period_ms: u64,
    pub watchdog_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub repeat: u32,
    pub spacing_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            broadcast_address: "255.255.255.255".to_string(),
            listen_address: "0.0.0.0".to_string(),
            master_id: String::new(),
            port: 5005,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            simulated_duration_ms: 10_000,
            standby_image: "/opt/video-sync/black.png".to_string(),
            video_path: String::new(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 1000,
            initial_prepare_ms: 7000,
            lead_time_ms: 1500,
            loop_delay_ms: 500,
            preroll_ms: 200,
            start_delay_ms: 0,
            watchdog_period_ms: 2000,
            watchdog_timeout_ms: 5000,
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            repeat: 3,
            spacing_ms: 50,
        }
    }
}

impl TimingConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn initial_prepare(&self) -> Duration {
        Duration::from_millis(self.initial_prepare_ms)
    }

    pub fn lead_time(&self) -> Duration {
        Duration::from_millis(self.lead_time_ms)
    }

    pub fn loop_delay(&self) -> Duration {
        Duration::from_millis(self.loop_delay_ms)
    }

    pub fn preroll(&self) -> Duration {
        Duration::from_millis(self.preroll_ms)
    }

    pub fn watchdog_period(&self) -> Duration {
        Duration::from_millis(self.watchdog_period_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }
}

impl BroadcastConfig {
    pub fn policy(&self) -> BroadcastPolicy {
        BroadcastPolicy {
            repeat: self.repeat,
            spacing: Duration::from_millis(self.spacing_ms),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let role = match lookup("SYNC_ROLE").map(|s| s.to_lowercase()) {
            Some(r) if r == "master" => Role::Master,
            Some(r) if r == "slave" || r.is_empty() => Role::Slave,
            None => Role::Slave,
            Some(other) => {
                return Err(ConfigError::ValidationError(format!(
                    "SYNC_ROLE must be 'master' or 'slave', got '{other}'"
                )))
            }
        };

        let network_defaults = NetworkConfig::default();
        let master_id = lookup("MASTER_ID")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| match role {
                Role::Master => detect_local_ip().map(|ip| ip.to_string()),
                Role::Slave => None,
            })
            .unwrap_or_default();

        let network = NetworkConfig {
            broadcast_address: lookup("BROADCAST_ADDRESS")
                .unwrap_or(network_defaults.broadcast_address),
            listen_address: lookup("LISTEN_ADDRESS").unwrap_or(network_defaults.listen_address),
            master_id,
            port: parse_var(&lookup, "SYNC_PORT").unwrap_or(network_defaults.port),
        };

        let media_defaults = MediaConfig::default();
        let media = MediaConfig {
            simulated_duration_ms: parse_var(&lookup, "MEDIA_DURATION_MS")
                .unwrap_or(media_defaults.simulated_duration_ms),
            standby_image: lookup("STANDBY_IMAGE").unwrap_or(media_defaults.standby_image),
            video_path: lookup("VIDEO_PATH").unwrap_or_default(),
        };

        let t = TimingConfig::default();
        let timing = TimingConfig {
            heartbeat_interval_ms: parse_var(&lookup, "HEARTBEAT_INTERVAL_MS")
                .unwrap_or(t.heartbeat_interval_ms),
            initial_prepare_ms: parse_var(&lookup, "INITIAL_PREPARE_MS")
                .unwrap_or(t.initial_prepare_ms),
            lead_time_ms: parse_var(&lookup, "LEAD_TIME_MS").unwrap_or(t.lead_time_ms),
            loop_delay_ms: parse_var(&lookup, "LOOP_DELAY_MS").unwrap_or(t.loop_delay_ms),
            preroll_ms: parse_var(&lookup, "PREROLL_MS").unwrap_or(t.preroll_ms),
            start_delay_ms: parse_var(&lookup, "START_DELAY_MS").unwrap_or(t.start_delay_ms),
            watchdog_period_ms: parse_var(&lookup, "WATCHDOG_PERIOD_MS")
                .unwrap_or(t.watchdog_period_ms),
            watchdog_timeout_ms: parse_var(&lookup, "WATCHDOG_TIMEOUT_MS")
                .unwrap_or(t.watchdog_timeout_ms),
        };

        let b = BroadcastConfig::default();
        let broadcast = BroadcastConfig {
            repeat: parse_var(&lookup, "BROADCAST_REPEAT").unwrap_or(b.repeat),
            spacing_ms: parse_var(&lookup, "BROADCAST_SPACING_MS").unwrap_or(b.spacing_ms),
        };

        let config = Config {
            broadcast,
            media,
            network,
            role,
            timing,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.network.port == 0 {
            return invalid("SYNC_PORT cannot be 0");
        }
        if self.network.master_id.is_empty() {
            return invalid("MASTER_ID is required");
        }
        if self.role == Role::Master && self.media.video_path.trim().is_empty() {
            return invalid("VIDEO_PATH is required on the master");
        }
        if self.broadcast.repeat == 0 {
            return invalid("BROADCAST_REPEAT must be at least 1");
        }
        if self.timing.heartbeat_interval_ms == 0
            || self.timing.watchdog_period_ms == 0
            || self.timing.watchdog_timeout_ms == 0
        {
            return invalid(
                "heartbeat interval, watchdog period and watchdog timeout must be non-zero",
            );
        }

        if self.timing.watchdog_timeout_ms <= self.timing.heartbeat_interval_ms {
            tracing::warn!(
                "Watchdog timeout ({}ms) does not exceed the heartbeat interval ({}ms). \
                 Slaves will drop to standby during normal playback.",
                self.timing.watchdog_timeout_ms,
                self.timing.heartbeat_interval_ms
            );
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|s| s.trim().parse().ok())
}

/// Detect the local IP address of this node
///
/// Asks the routing table which interface would reach a public address; no
/// data is sent.
fn detect_local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|a| a.ip())
}
