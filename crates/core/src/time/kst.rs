use chrono::{DateTime, FixedOffset, Offset, Utc};

const KST_OFFSET_SECS: i32 = 9 * 3600;

pub const LAST_UPDATED_PLACEHOLDER: &str = "N/A";

pub fn kst() -> FixedOffset {
    FixedOffset::east_opt(KST_OFFSET_SECS).unwrap_or(Utc.fix())
}

/// Renders a file mtime for the dashboard header, in KST (UTC+9).
pub fn format_last_updated(modified: Option<DateTime<Utc>>) -> String {
    match modified {
        Some(ts) => ts
            .with_timezone(&kst())
            .format("%Y-%m-%d %H:%M:%S KST")
            .to_string(),
        None => LAST_UPDATED_PLACEHOLDER.to_string(),
    }
}
