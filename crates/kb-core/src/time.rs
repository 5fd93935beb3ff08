//! Unix-second timestamp helpers. All persisted timestamps in §3 are Unix seconds.

use chrono::Utc;

pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// `true` iff `captured_day` (Unix seconds of a capture event) is fresh relative to
/// `now`: fresh means captured on or after `now - 1 day` (§4.5 AUTO crawl decision).
pub fn is_fresh(captured_at: i64, now: i64) -> bool {
    captured_at >= now - 86_400
}
