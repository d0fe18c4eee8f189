//! Server configuration.

use crate::error::{ServerError, ServerResult};
use std::time::Duration;

const DAY: u64 = 24 * 60 * 60;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Lifetime of a freshly issued client token.
    pub token_validity: Duration,
    /// Remaining lifetime under which authentication rotates the token.
    pub token_renewal_window: Duration,
    /// Maximum number of paths accepted in one reconciliation snapshot.
    ///
    /// A larger snapshot is rejected as a whole with `BadRequest`, so a
    /// client holding more mappings than this never reconciles. Set it above
    /// the largest number of sync paths a single client may own.
    pub max_reconcile_paths: usize,
    /// Run background side effects on the calling thread.
    ///
    /// When false, the server must be built inside a Tokio runtime. Built
    /// outside one, it logs a warning and falls back to inline execution.
    pub inline_background: bool,
}

impl ServerConfig {
    /// Creates a configuration with default token windows.
    pub fn new() -> Self {
        Self {
            token_validity: Duration::from_secs(120 * DAY),
            token_renewal_window: Duration::from_secs(60 * DAY),
            max_reconcile_paths: 1000,
            inline_background: false,
        }
    }

    /// Sets the token validity.
    pub fn with_token_validity(mut self, validity: Duration) -> Self {
        self.token_validity = validity;
        self
    }

    /// Sets the token renewal window.
    pub fn with_token_renewal_window(mut self, window: Duration) -> Self {
        self.token_renewal_window = window;
        self
    }

    /// Sets the maximum reconciliation snapshot size.
    pub fn with_max_reconcile_paths(mut self, max: usize) -> Self {
        self.max_reconcile_paths = max;
        self
    }

    /// Runs background side effects inline instead of on the runtime.
    pub fn with_inline_background(mut self, inline: bool) -> Self {
        self.inline_background = inline;
        self
    }

    /// Checks the configuration for consistency.
    ///
    /// The renewal window must be shorter than the validity, so that a
    /// client connecting at least once per window never hits a hard expiry.
    pub fn validate(&self) -> ServerResult<()> {
        if self.token_validity.is_zero() {
            return Err(ServerError::Config("token validity must be positive".into()));
        }
        if self.token_renewal_window >= self.token_validity {
            return Err(ServerError::Config(format!(
                "token renewal window ({}s) must be shorter than token validity ({}s)",
                self.token_renewal_window.as_secs(),
                self.token_validity.as_secs()
            )));
        }
        if self.max_reconcile_paths == 0 {
            return Err(ServerError::Config(
                "max_reconcile_paths must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
