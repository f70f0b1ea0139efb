//! Per-request deadlines.
//!
//! Callers state how long they are willing to wait with the gRPC
//! `grpc-timeout` header: an ASCII integer of at most eight digits followed
//! by a unit (`H` hours, `M` minutes, `S` seconds, `m` millis, `u` micros,
//! `n` nanos). Requests without one get the configured default.

use std::time::Duration;

use axum::http::HeaderMap;
use tokio::time::Instant;

/// Header carrying the caller's timeout.
pub const GRPC_TIMEOUT: &str = "grpc-timeout";

/// Point in time after which work on a request is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    /// A deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    /// Deadline from request headers, or `default` from now.
    ///
    /// A malformed header is ignored rather than rejected.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, default: Duration) -> Self {
        let timeout = headers
            .get(GRPC_TIMEOUT)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_grpc_timeout)
            .unwrap_or(default);
        Self::after(timeout)
    }

    /// The instant itself, for `tokio::time::timeout_at`.
    #[must_use]
    pub fn instant(self) -> Instant {
        self.0
    }

    /// Time left; zero once expired.
    #[must_use]
    pub fn remaining(self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(self) -> bool {
        self.remaining().is_zero()
    }
}

/// Parse a `grpc-timeout` value.
#[must_use]
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.len() < 2 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;
    let duration = match unit {
        "H" => Duration::from_secs(amount * 3600),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(duration)
}
