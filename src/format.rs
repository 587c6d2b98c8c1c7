//! Human-readable "last seen" labels for the peer table.

use chrono::{DateTime, Utc};

const RECENT_SECS: i64 = 10 * 60;
const HOUR_SECS: i64 = 60 * 60;
const DAY_SECS: i64 = 24 * HOUR_SECS;

/// Describe how long ago `last_seen_secs` (Unix seconds) was, relative to `now`
///
/// A zero timestamp means "never" and yields an empty label. Timestamps in
/// the future count as recent, including values too large for an `i64`.
pub fn time_elapsed(last_seen_secs: u64, now: DateTime<Utc>) -> String {
    if last_seen_secs == 0 {
        return String::new();
    }

    let diff = match i64::try_from(last_seen_secs) {
        Ok(secs) => now.timestamp().saturating_sub(secs),
        Err(_) => return "Recently".to_string(),
    };

    if diff < RECENT_SECS {
        "Recently".to_string()
    } else if diff < HOUR_SECS {
        format!("{} mins ago", diff / 60)
    } else if diff < DAY_SECS {
        format!("{} hours ago", diff / HOUR_SECS)
    } else {
        match diff / DAY_SECS {
            1 => "A day ago".to_string(),
            days => format!("{} days ago", days),
        }
    }
}
