//! 均勻取樣排程
//!
//! 從片頭偏移之後，以固定的整數秒間隔取 N 張縮圖：
//! `interval = floor((duration - start_offset) / N)`

use crate::error::{MontageError, Result};
use crate::tools::VideoMetadata;
use log::debug;
use std::time::Duration;

/// 擷取工具回報的第一張影格（編號 1）一定是重複影格，
/// 真正的取樣從編號 2 開始
pub const FIRST_RETAINED_FRAME_INDEX: u64 = 2;

/// 編號是否為擷取工具開頭的已知重複影格
#[must_use]
pub const fn is_known_duplicate(index: u64) -> bool {
    index < FIRST_RETAINED_FRAME_INDEX
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPlan {
    start_offset_secs: u64,
    interval_secs: u64,
    thumbnail_count: u32,
}

impl SamplingPlan {
    #[must_use]
    pub const fn start_offset_secs(&self) -> u64 {
        self.start_offset_secs
    }

    #[must_use]
    pub const fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    #[must_use]
    pub const fn thumbnail_count(&self) -> u32 {
        self.thumbnail_count
    }

    /// 要求擷取工具輸出的影格數（含開頭的重複影格）
    #[must_use]
    pub const fn frames_to_request(&self) -> u64 {
        self.thumbnail_count as u64 + 1
    }

    /// 影格編號對應的實際時間點；重複影格回傳 `None`
    #[must_use]
    pub const fn timestamp_for_index(&self, index: u64) -> Option<Duration> {
        if is_known_duplicate(index) {
            return None;
        }
        let offset = self.interval_secs * (index - FIRST_RETAINED_FRAME_INDEX);
        Some(Duration::from_secs(self.start_offset_secs + offset))
    }
}

/// 計算取樣計畫
///
/// 影片長度不超過片頭偏移、縮圖數為 0，或間隔不足一秒時回傳 `InvalidSchedule`
pub fn plan_sampling(
    metadata: &VideoMetadata,
    start_offset_secs: u64,
    thumbnail_count: u32,
) -> Result<SamplingPlan> {
    if thumbnail_count == 0 {
        return Err(MontageError::InvalidSchedule("縮圖數量必須大於 0".to_string()));
    }

    let duration = metadata.duration_seconds();
    let start = start_offset_secs as f64;
    if duration <= start {
        return Err(MontageError::InvalidSchedule(format!(
            "影片長度 {duration:.2}s 不超過起始偏移 {start_offset_secs}s"
        )));
    }

    let interval_secs = ((duration - start) / f64::from(thumbnail_count)).floor() as u64;
    if interval_secs == 0 {
        return Err(MontageError::InvalidSchedule(format!(
            "{duration:.2}s 的影片無法在 {start_offset_secs}s 後取 {thumbnail_count} 張縮圖（間隔不足 1 秒）"
        )));
    }

    debug!(
        "取樣計畫 {}: start={}s, interval={}s, count={}",
        metadata.display_name, start_offset_secs, interval_secs, thumbnail_count
    );

    Ok(SamplingPlan {
        start_offset_secs,
        interval_secs,
        thumbnail_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn metadata(duration: Duration) -> VideoMetadata {
        VideoMetadata {
            path: PathBuf::from("/videos/movie.mp4"),
            display_name: "movie.mp4".to_string(),
            width: 1920,
            height: 1080,
            codec: "h264".to_string(),
            duration,
            frame_rate: 25.0,
        }
    }

    #[test]
    fn test_ten_minute_video() {
        let plan = plan_sampling(&metadata(Duration::from_secs(600)), 30, 9).unwrap();

        assert_eq!(plan.interval_secs(), 63);
        assert_eq!(plan.frames_to_request(), 10);

        let timestamps: Vec<u64> = (FIRST_RETAINED_FRAME_INDEX..=plan.frames_to_request())
            .filter_map(|i| plan.timestamp_for_index(i))
            .map(|t| t.as_secs())
            .collect();
        assert_eq!(timestamps, vec![30, 93, 156, 219, 282, 345, 408, 471, 534]);
    }

    #[test]
    fn test_duplicate_index_has_no_timestamp() {
        let plan = plan_sampling(&metadata(Duration::from_secs(600)), 30, 9).unwrap();
        assert!(is_known_duplicate(1));
        assert!(!is_known_duplicate(2));
        assert_eq!(plan.timestamp_for_index(0), None);
        assert_eq!(plan.timestamp_for_index(1), None);
        assert_eq!(plan.timestamp_for_index(2), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_interval_stays_within_duration() {
        for duration_secs in [61_u64, 100, 599, 3600, 7322] {
            for start in [0_u64, 10, 60] {
                for count in [1_u32, 4, 9, 25, 60] {
                    let Ok(plan) =
                        plan_sampling(&metadata(Duration::from_secs(duration_secs)), start, count)
                    else {
                        continue;
                    };
                    assert!(plan.interval_secs() > 0);
                    assert!(start + plan.interval_secs() * u64::from(count) <= duration_secs);
                }
            }
        }
    }

    #[test]
    fn test_start_offset_past_end_is_rejected() {
        let result = plan_sampling(&metadata(Duration::from_secs(30)), 30, 9);
        assert!(matches!(result, Err(MontageError::InvalidSchedule(_))));

        let result = plan_sampling(&metadata(Duration::from_secs(10)), 120, 9);
        assert!(matches!(result, Err(MontageError::InvalidSchedule(_))));
    }

    #[test]
    fn test_zero_thumbnails_is_rejected() {
        let result = plan_sampling(&metadata(Duration::from_secs(600)), 30, 0);
        assert!(matches!(result, Err(MontageError::InvalidSchedule(_))));
    }

    #[test]
    fn test_sub_second_interval_is_rejected() {
        let result = plan_sampling(&metadata(Duration::from_secs(40)), 30, 25);
        assert!(matches!(result, Err(MontageError::InvalidSchedule(_))));
    }

    #[test]
    fn test_fractional_duration_is_floored() {
        let plan = plan_sampling(&metadata(Duration::from_millis(100_990)), 0, 10).unwrap();
        assert_eq!(plan.interval_secs(), 10);
    }
}
