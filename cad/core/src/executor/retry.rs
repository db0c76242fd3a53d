//! Retry classification and backoff for action execution.

use std::time::Duration;

use rand::Rng as _;

/// Hard cap on a single backoff interval.
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Message fragments marking an error as transient. Matched
/// case-insensitively against the full error chain rendering.
const TRANSIENT_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "rate limit",
    "too many requests",
    "timeout",
    "timed out",
    "429",
    "500 internal server error",
    "502",
    "503",
    "504",
];

/// Whether a failed attempt is worth repeating. Covers I/O timeouts,
/// HTTP-level transients (5xx, 429), and the known transient message
/// classes; anything else fails the action immediately.
#[must_use]
pub fn is_retryable(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            if matches!(
                io_err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
            ) {
                return true;
            }
        }
        if let Some(http_err) = err.downcast_ref::<reqwest::Error>() {
            if http_err.is_timeout() || http_err.is_connect() {
                return true;
            }
            if let Some(status) = http_err.status() {
                if status.is_server_error() || status.as_u16() == 429 {
                    return true;
                }
            }
        }
        let message = err.to_string().to_ascii_lowercase();
        if TRANSIENT_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
        {
            return true;
        }
        current = err.source();
    }
    false
}

/// Exponential backoff: `attempt²` seconds, capped, with up to 10% jitter.
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    let base = Duration::from_secs(u64::from(attempt).pow(2)).min(MAX_BACKOFF);
    let jitter_ceiling = base.as_millis() as u64 / 10;
    if jitter_ceiling == 0 {
        return base;
    }
    let jitter = rand::thread_rng().gen_range(0..=jitter_ceiling);
    base + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_messages_are_retryable() {
        for message in [
            "connection refused",
            "upstream said 503 Service Unavailable",
            "Rate Limit exceeded",
            "request timed out",
        ] {
            let err: crate::DynError = message.into();
            assert!(is_retryable(err.as_ref()), "{message}");
        }
    }

    #[test]
    fn plain_failures_are_not_retryable() {
        for message in ["forbidden", "cluster not found", "invalid payload"] {
            let err: crate::DynError = message.into();
            assert!(!is_retryable(err.as_ref()), "{message}");
        }
    }

    #[test]
    fn io_timeouts_are_retryable_through_the_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline elapsed");
        assert!(is_retryable(&io));
    }

    #[test]
    fn backoff_grows_quadratically_and_caps() {
        let first = backoff_delay(1);
        assert!(first >= Duration::from_secs(1) && first <= Duration::from_millis(1100));

        let third = backoff_delay(3);
        assert!(third >= Duration::from_secs(9) && third <= Duration::from_millis(9900));

        let huge = backoff_delay(60);
        assert!(huge >= MAX_BACKOFF && huge <= MAX_BACKOFF + MAX_BACKOFF / 10);
    }
}
