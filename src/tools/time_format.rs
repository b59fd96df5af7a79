use std::time::Duration;

/// 格式化為 `HH:MM:SS`（捨去小數秒）
#[must_use]
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    format!("{h:02}:{m:02}:{s:02}")
}
