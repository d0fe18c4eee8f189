//! Client token issuance and lifetime policy.
//!
//! Client tokens are opaque random secrets stored with the client row. They
//! are time-window based rather than single use:
//!
//! - a token is rejected once `now >= expiration`
//! - a token with less than the renewal window left is rotated on the next
//!   successful authentication
//!
//! Since the renewal window is shorter than the validity, a client that
//! connects at least once per window never sees a hard expiry.

use crate::config::ServerConfig;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Length of a generated client token.
pub const TOKEN_LENGTH: usize = 48;

/// Generates a new random client token.
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Current Unix time in milliseconds.
pub fn unix_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Next value of a settings logical clock.
///
/// Wall-clock milliseconds, but never less than `previous + 1` so the clock
/// stays strictly increasing even if the system time goes backwards.
pub fn next_logical_timestamp(previous: u64) -> u64 {
    unix_now_millis().max(previous.saturating_add(1))
}

/// State of a client token at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// Usable, no rotation needed.
    Valid,
    /// Usable, but inside the renewal window.
    Renew,
    /// No longer usable.
    Expired,
}

/// Token lifetime policy.
#[derive(Debug, Clone, Copy)]
pub struct TokenPolicy {
    validity: Duration,
    renewal_window: Duration,
}

impl TokenPolicy {
    /// Creates a policy.
    pub fn new(validity: Duration, renewal_window: Duration) -> Self {
        Self {
            validity,
            renewal_window,
        }
    }

    /// Creates the policy configured for a server.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.token_validity, config.token_renewal_window)
    }

    /// Expiration for a token issued at `now` (Unix seconds).
    pub fn expiration_from(&self, now: u64) -> u64 {
        now.saturating_add(self.validity.as_secs())
    }

    /// Classifies a token expiring at `expiration` as seen at `now`.
    pub fn status(&self, expiration: u64, now: u64) -> TokenStatus {
        if now >= expiration {
            TokenStatus::Expired
        } else if expiration - now > self.renewal_window.as_secs() {
            TokenStatus::Valid
        } else {
            TokenStatus::Renew
        }
    }
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_random_alphanumeric() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn status_boundaries() {
        let policy = TokenPolicy::new(Duration::from_secs(100), Duration::from_secs(40));
        let expiration = policy.expiration_from(1_000);
        assert_eq!(expiration, 1_100);

        assert_eq!(policy.status(expiration, 1_000), TokenStatus::Valid);
        assert_eq!(policy.status(expiration, 1_059), TokenStatus::Valid);
        assert_eq!(policy.status(expiration, 1_060), TokenStatus::Renew);
        assert_eq!(policy.status(expiration, 1_099), TokenStatus::Renew);
        assert_eq!(policy.status(expiration, 1_100), TokenStatus::Expired);
        assert_eq!(policy.status(expiration, 5_000), TokenStatus::Expired);
    }

    #[test]
    fn logical_clock_is_strictly_increasing() {
        let far_future = unix_now_millis() + 1_000_000;
        assert_eq!(next_logical_timestamp(far_future), far_future + 1);
        assert!(next_logical_timestamp(0) > 0);
    }
}
