use clap::Parser;
use std::time::Duration;

/// Subscribe to a herald broadcaster and print every message to stdout.
#[derive(Parser, Debug, Clone)]
#[command(name = "herald-listen", version)]
pub struct ListenArgs {
    /// Broadcaster WebSocket URL.
    #[arg(long, env = "HERALD_URL", default_value = "ws://127.0.0.1:8080/ws")]
    pub url: String,

    /// Origin header to send with the upgrade request.
    #[arg(long, env = "HERALD_ORIGIN")]
    pub origin: Option<String>,

    /// First reconnect delay in milliseconds.
    #[arg(long, env = "HERALD_RECONNECT_INITIAL_MS", default_value_t = 500)]
    pub reconnect_initial_ms: u64,

    /// Upper bound for the reconnect delay in milliseconds.
    #[arg(long, env = "HERALD_RECONNECT_MAX_MS", default_value_t = 30_000)]
    pub reconnect_max_ms: u64,

    /// Growth factor applied to the reconnect delay after each failure.
    #[arg(long, env = "HERALD_RECONNECT_FACTOR", default_value_t = 2.0)]
    pub reconnect_factor: f64,

    /// Exit when the first connection ends instead of reconnecting.
    #[arg(long)]
    pub once: bool,

    /// Increase log verbosity (repeat for more detail).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl ListenArgs {
    /// Validate the reconnect settings.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.reconnect_initial_ms == 0 {
            return Err("reconnect_initial_ms must be > 0".to_string());
        }
        if self.reconnect_max_ms < self.reconnect_initial_ms {
            return Err("reconnect_max_ms must be >= reconnect_initial_ms".to_string());
        }
        if !(1.0..=10.0).contains(&self.reconnect_factor) {
            return Err("reconnect_factor must be between 1.0 and 10.0".to_string());
        }
        Ok(())
    }

    /// Initial reconnect delay.
    #[must_use]
    pub const fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    /// Maximum reconnect delay.
    #[must_use]
    pub const fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }
}
