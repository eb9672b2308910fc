use rand::Rng;
use std::time::Duration;

/// Reconnect pacing: exponential growth with ±25% jitter, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    current: Duration,
}

impl Backoff {
    /// Creates a backoff starting at `initial`.
    ///
    /// # Examples
    ///
    /// ```
    /// use herald_listen::backoff::Backoff;
    /// use std::time::Duration;
    /// let mut backoff = Backoff::new(Duration::from_millis(200), Duration::from_secs(10), 2.0);
    /// let delay = backoff.next_delay();
    /// assert!(delay >= Duration::from_millis(150));
    /// assert!(delay <= Duration::from_millis(250));
    /// ```
    #[must_use]
    pub const fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        Self {
            initial,
            max,
            factor,
            current: initial,
        }
    }

    /// The un-jittered delay the next call to [`Backoff::next_delay`] is based on.
    #[must_use]
    pub const fn current(&self) -> Duration {
        self.current
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    /// Returns the jittered delay for this attempt and grows the base delay.
    pub fn next_delay(&mut self) -> Duration {
        let base_ms = self.current.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;

        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        let delay = Duration::from_millis((base_ms as f64 * jitter) as u64);

        let grown = (base_ms as f64 * self.factor) as u64;
        self.current = Duration::from_millis(grown.min(max_ms));

        delay
    }

    /// Start over from the initial delay, used once a connection succeeds.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
