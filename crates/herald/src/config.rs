use crate::origin::AllowList;
use clap::{ArgAction, Parser};
use herald_common::types::{DEFAULT_MAX_INBOUND, DEFAULT_WS_PATH};
use std::net::SocketAddr;
use std::time::Duration;

/// CLI arguments for the broadcaster.
#[derive(Parser, Debug, Clone)]
#[command(name = "herald")]
#[command(about = "Broadcast stdin lines to every connected WebSocket subscriber")]
#[command(version)]
pub struct Args {
    /// Socket address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080", env = "HERALD_LISTEN")]
    pub listen: SocketAddr,
    /// Socket address for the metrics endpoint.
    #[arg(long, default_value = "127.0.0.1:9090", env = "HERALD_METRICS")]
    pub metrics_addr: SocketAddr,
    /// HTTP path accepting WebSocket upgrades.
    #[arg(long, default_value = DEFAULT_WS_PATH, env = "HERALD_WS_PATH")]
    pub ws_path: String,
    /// Scheme clients use to reach this server (`https` behind a TLS proxy).
    #[arg(long, default_value = "http", env = "HERALD_PUBLIC_SCHEME")]
    pub public_scheme: String,
    /// Comma-separated origins allowed to connect. Empty = same origin only.
    #[arg(long, default_value = "", env = "HERALD_ALLOWED_ORIGINS")]
    pub allowed_origins: String,
    /// Comma-separated `Host` values to serve. Empty = any host.
    #[arg(long, default_value = "", env = "HERALD_ALLOWED_HOSTS")]
    pub allowed_hosts: String,
    /// Send the last broadcast message to newly joined subscribers.
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "HERALD_REPLAY_LAST")]
    pub replay_last: bool,
    /// Maximum concurrent subscribers.
    #[arg(long, default_value = "10000", env = "HERALD_MAX_CONNS")]
    pub max_conns: usize,
    /// Maximum inbound WebSocket message size in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_INBOUND, env = "HERALD_MAX_MESSAGE_SIZE")]
    pub max_message_size: usize,
    /// Seconds a client gets to complete the WebSocket upgrade.
    #[arg(long, default_value = "5", env = "HERALD_HANDSHAKE_TIMEOUT")]
    pub handshake_timeout: u64,
    /// Per-connection write timeout in seconds.
    #[arg(long, default_value = "10", env = "HERALD_WRITE_TIMEOUT")]
    pub write_timeout: u64,
    /// Interval between WebSocket pings in seconds.
    #[arg(long, default_value = "30", env = "HERALD_PING_INTERVAL")]
    pub ping_interval: u64,
    /// Close a subscriber after this many seconds without inbound traffic.
    #[arg(long, default_value = "120", env = "HERALD_IDLE_TIMEOUT")]
    pub idle_timeout: u64,
    /// Seconds to wait for subscribers to disconnect on shutdown.
    #[arg(long, default_value = "5", env = "HERALD_SHUTDOWN_TIMEOUT")]
    pub shutdown_timeout: u64,
    /// Do not read broadcast lines from stdin.
    #[arg(long)]
    pub no_stdin: bool,
    /// Increase log verbosity (repeat for more detail).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub listen: SocketAddr,
    /// Socket address for the metrics endpoint.
    pub metrics_addr: SocketAddr,
    /// HTTP path accepting WebSocket upgrades.
    pub ws_path: String,
    /// Scheme used to build the expected same-origin value.
    pub public_scheme: String,
    /// Allowed `Origin` values.
    pub allowed_origins: AllowList,
    /// Allowed `Host` values.
    pub allowed_hosts: AllowList,
    /// Replay the last broadcast to joiners.
    pub replay_last: bool,
    /// Maximum concurrent subscribers.
    pub max_conns: usize,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Upgrade handshake timeout in seconds.
    pub handshake_timeout: u64,
    /// Per-connection write timeout in seconds.
    pub write_timeout: u64,
    /// Interval between WebSocket pings in seconds.
    pub ping_interval: u64,
    /// Idle timeout in seconds.
    pub idle_timeout: u64,
    /// Shutdown drain timeout in seconds.
    pub shutdown_timeout: u64,
}

impl ServerConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if !self.ws_path.starts_with('/') {
            return Err("ws_path must start with '/'".to_string());
        }

        if !matches!(self.public_scheme.as_str(), "http" | "https") {
            return Err("public_scheme must be 'http' or 'https'".to_string());
        }

        if self.max_conns == 0 {
            return Err("max_conns must be greater than 0".to_string());
        }
        if self.max_conns > 1_000_000 {
            return Err("max_conns exceeds reasonable limit (1,000,000)".to_string());
        }

        const MAX_ALLOWED_INBOUND: usize = 1 << 20;
        if self.max_message_size == 0 {
            return Err("max_message_size must be greater than 0".to_string());
        }
        if self.max_message_size > MAX_ALLOWED_INBOUND {
            return Err(format!(
                "max_message_size exceeds maximum allowed ({MAX_ALLOWED_INBOUND} bytes)"
            ));
        }

        if self.handshake_timeout == 0 {
            return Err("handshake_timeout must be greater than 0".to_string());
        }
        if self.handshake_timeout > 300 {
            return Err("handshake_timeout exceeds reasonable limit (300 seconds)".to_string());
        }

        if self.write_timeout == 0 {
            return Err("write_timeout must be greater than 0".to_string());
        }
        if self.write_timeout > 300 {
            return Err("write_timeout exceeds reasonable limit (300 seconds)".to_string());
        }

        if self.ping_interval == 0 {
            return Err("ping_interval must be greater than 0".to_string());
        }
        if self.ping_interval > 3600 {
            return Err("ping_interval exceeds reasonable limit (3600 seconds)".to_string());
        }

        if self.idle_timeout == 0 {
            return Err("idle_timeout must be greater than 0".to_string());
        }
        if self.idle_timeout > 86_400 {
            return Err(
                "idle_timeout exceeds reasonable limit (86400 seconds / 1 day)".to_string(),
            );
        }
        if self.idle_timeout < self.ping_interval {
            return Err("idle_timeout must not be shorter than ping_interval".to_string());
        }

        if self.shutdown_timeout == 0 {
            return Err("shutdown_timeout must be greater than 0".to_string());
        }
        if self.shutdown_timeout > 300 {
            return Err("shutdown_timeout exceeds reasonable limit (300 seconds)".to_string());
        }
        Ok(())
    }

    /// Upgrade handshake timeout.
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout)
    }

    /// Per-connection write timeout.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout)
    }

    /// Keepalive ping interval.
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval)
    }

    /// Idle timeout.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    /// Shutdown drain timeout.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }
}

#[cfg(test)]
impl ServerConfig {
    /// Loopback configuration with default limits.
    pub(crate) fn for_tests() -> Self {
        Self {
            listen: "127.0.0.1:8080".parse().unwrap(),
            metrics_addr: "127.0.0.1:9090".parse().unwrap(),
            ws_path: "/ws".to_string(),
            public_scheme: "http".to_string(),
            allowed_origins: AllowList::default(),
            allowed_hosts: AllowList::default(),
            replay_last: true,
            max_conns: 1000,
            max_message_size: 4096,
            handshake_timeout: 5,
            write_timeout: 10,
            ping_interval: 30,
            idle_timeout: 120,
            shutdown_timeout: 5,
        }
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            metrics_addr: args.metrics_addr,
            ws_path: args.ws_path,
            public_scheme: args.public_scheme.trim().to_ascii_lowercase(),
            allowed_origins: AllowList::parse(&args.allowed_origins),
            allowed_hosts: AllowList::parse(&args.allowed_hosts),
            replay_last: args.replay_last,
            max_conns: args.max_conns,
            max_message_size: args.max_message_size,
            handshake_timeout: args.handshake_timeout,
            write_timeout: args.write_timeout,
            ping_interval: args.ping_interval,
            idle_timeout: args.idle_timeout,
            shutdown_timeout: args.shutdown_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ServerConfig {
        ServerConfig::for_tests()
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn ws_path_without_slash() {
        let mut c = valid_config();
        c.ws_path = "ws".to_string();
        assert!(c.validate().unwrap_err().contains("ws_path"));
    }

    #[test]
    fn unknown_scheme() {
        let mut c = valid_config();
        c.public_scheme = "ftp".to_string();
        assert!(c.validate().unwrap_err().contains("public_scheme"));
    }

    #[test]
    fn max_conns_zero() {
        let mut c = valid_config();
        c.max_conns = 0;
        assert!(c.validate().unwrap_err().contains("max_conns"));
    }

    #[test]
    fn max_conns_too_large() {
        let mut c = valid_config();
        c.max_conns = 1_000_001;
        assert!(c.validate().unwrap_err().contains("max_conns"));
    }

    #[test]
    fn max_message_size_bounds() {
        let mut c = valid_config();
        c.max_message_size = 0;
        assert!(c.validate().unwrap_err().contains("max_message_size"));
        c.max_message_size = (1 << 20) + 1;
        assert!(c.validate().unwrap_err().contains("max_message_size"));
    }

    #[test]
    fn handshake_timeout_bounds() {
        let mut c = valid_config();
        c.handshake_timeout = 0;
        assert!(c.validate().unwrap_err().contains("handshake_timeout"));
        c.handshake_timeout = 301;
        assert!(c.validate().unwrap_err().contains("handshake_timeout"));
    }

    #[test]
    fn write_timeout_bounds() {
        let mut c = valid_config();
        c.write_timeout = 0;
        assert!(c.validate().unwrap_err().contains("write_timeout"));
        c.write_timeout = 301;
        assert!(c.validate().unwrap_err().contains("write_timeout"));
    }

    #[test]
    fn ping_interval_bounds() {
        let mut c = valid_config();
        c.ping_interval = 0;
        assert!(c.validate().unwrap_err().contains("ping_interval"));
        c.ping_interval = 3601;
        c.idle_timeout = 86_400;
        assert!(c.validate().unwrap_err().contains("ping_interval"));
    }

    #[test]
    fn idle_timeout_bounds() {
        let mut c = valid_config();
        c.idle_timeout = 0;
        assert!(c.validate().unwrap_err().contains("idle_timeout"));
        c.idle_timeout = 86_401;
        assert!(c.validate().unwrap_err().contains("idle_timeout"));
    }

    #[test]
    fn idle_timeout_shorter_than_ping() {
        let mut c = valid_config();
        c.ping_interval = 60;
        c.idle_timeout = 30;
        assert!(c.validate().unwrap_err().contains("idle_timeout"));
    }

    #[test]
    fn shutdown_timeout_bounds() {
        let mut c = valid_config();
        c.shutdown_timeout = 0;
        assert!(c.validate().unwrap_err().contains("shutdown_timeout"));
        c.shutdown_timeout = 301;
        assert!(c.validate().unwrap_err().contains("shutdown_timeout"));
    }

    #[test]
    fn boundary_values_valid() {
        let mut c = valid_config();
        c.max_conns = 1;
        c.max_message_size = 1;
        c.handshake_timeout = 1;
        c.write_timeout = 1;
        c.ping_interval = 1;
        c.idle_timeout = 1;
        c.shutdown_timeout = 1;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn args_parse_comma_separated_lists() {
        let args = Args::try_parse_from([
            "herald",
            "--allowed-origins",
            "https://a.com, HTTPS://B.com,",
            "--allowed-hosts",
            "a.com",
            "--replay-last",
            "false",
            "--public-scheme",
            "HTTPS",
        ])
        .unwrap();
        let config = ServerConfig::from(args);
        assert_eq!(config.allowed_origins.len(), 2);
        assert!(config.allowed_origins.contains("https://b.com"));
        assert!(config.allowed_hosts.contains("A.COM"));
        assert!(!config.replay_last);
        assert_eq!(config.public_scheme, "https");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn args_defaults_are_valid() {
        let args = Args::try_parse_from(["herald"]).unwrap();
        assert!(args.replay_last);
        assert_eq!(args.ws_path, "/ws");
        let config = ServerConfig::from(args);
        assert!(config.allowed_origins.is_empty());
        assert!(config.validate().is_ok());
    }
}
