use chrono::Duration;

/// Base delay before the first retry.
const BASE_DELAY_MINUTES: i64 = 5;

/// Backoff delay before retry number `retry_count` (1-based).
///
/// Doubles each step: 5 min, 10 min, 20 min, … There is no jitter and no
/// delay ceiling; `max_retries` on the item bounds the sequence instead.
/// Callers wanting an absolute ceiling should clamp the result themselves.
pub fn backoff(retry_count: u32) -> Duration {
    // Shift capped well inside chrono::Duration's range; a count that high
    // only occurs with an absurd max_retries.
    let exponent = retry_count.saturating_sub(1).min(32);
    Duration::minutes(BASE_DELAY_MINUTES << exponent)
}
