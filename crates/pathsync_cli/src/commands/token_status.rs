//! Token status command implementation.

use pathsync_server::{unix_now, TokenPolicy, TokenStatus};
use serde::Serialize;

/// Token classification result.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TokenReport {
    /// `valid`, `renew` or `expired`.
    pub status: &'static str,
    /// Token expiration (Unix seconds).
    pub expires_at: u64,
    /// Reference time (Unix seconds).
    pub now: u64,
    /// Seconds left before expiry, zero once expired.
    pub remaining_secs: u64,
}

/// Runs the token-status command.
pub fn run(expires_at: u64, now: Option<u64>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = classify(&TokenPolicy::default(), expires_at, now.unwrap_or_else(unix_now));

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => println!(
            "{} ({} left, expires at {})",
            report.status,
            format_duration(report.remaining_secs),
            report.expires_at
        ),
    }
    Ok(())
}

/// Classifies a token expiration at `now`.
pub fn classify(policy: &TokenPolicy, expires_at: u64, now: u64) -> TokenReport {
    let status = match policy.status(expires_at, now) {
        TokenStatus::Valid => "valid",
        TokenStatus::Renew => "renew",
        TokenStatus::Expired => "expired",
    };
    TokenReport {
        status,
        expires_at,
        now,
        remaining_secs: expires_at.saturating_sub(now),
    }
}

fn format_duration(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
