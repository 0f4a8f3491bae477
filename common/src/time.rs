//! Time utilities and default limits for ledger operations.

use chrono::{DateTime, Utc};

/// Default limits and timeouts.
pub mod constants {
    use std::time::Duration;

    /// Pool connection acquisition timeout (10 seconds).
    pub fn acquire_timeout() -> Duration {
        Duration::from_secs(10)
    }

    /// Budget of one ledger operation attempt, unit of work included (5 seconds).
    pub fn operation_timeout() -> Duration {
        Duration::from_secs(5)
    }

    /// Base backoff between retries of a transient store failure (50 milliseconds).
    pub fn retry_backoff() -> Duration {
        Duration::from_millis(50)
    }

    /// Number of records returned by a transaction history listing.
    pub const HISTORY_LIMIT: usize = 10;

    /// Retries of a transient store failure before giving up.
    pub const MAX_RETRIES: u32 = 2;
}

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Milliseconds in a duration, saturating.
pub fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults_are_sane() {
        assert!(constants::operation_timeout() < constants::acquire_timeout());
        assert!(constants::retry_backoff() < constants::operation_timeout());
        assert_eq!(constants::HISTORY_LIMIT, 10);
    }

    #[test]
    fn test_millis() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
