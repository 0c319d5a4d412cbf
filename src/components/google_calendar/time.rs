use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;

/// Current time in `tz`, formatted for the `timeMin` query parameter
pub fn now_in_zone(tz: Tz) -> String {
    format_time_min(Utc::now().with_timezone(&tz))
}

/// RFC 3339 with whole seconds and a numeric offset, e.g. `2024-01-02T03:04:05+08:00`
pub fn format_time_min(time: DateTime<Tz>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, false)
}
