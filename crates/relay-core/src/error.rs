use std::time::Duration;

/// Errors surfaced by the rate limiter.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// A configured cap was zero.
    #[error("{name} must be a positive integer")]
    InvalidLimit {
        /// Name of the offending option.
        name: &'static str,
    },

    /// A window is at capacity and the caller asked not to wait.
    #[error("rate limit reached, retry in {retry_after:?}")]
    Exhausted {
        /// Time until at least one slot frees up.
        retry_after: Duration,
    },

    /// `acquire_timeout` gave up before a slot was granted.
    #[error("no send capacity within {0:?}")]
    Timeout(Duration),
}

impl RateLimitError {
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Exhausted { retry_after } => Some(*retry_after),
            Self::InvalidLimit { .. } | Self::Timeout(_) => None,
        }
    }
}
