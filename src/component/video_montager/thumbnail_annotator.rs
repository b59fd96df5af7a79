use super::frame_extractor::{ExtractedFrame, ExtractedFrames};
use crate::error::{MontageError, Result};
use crate::tools::{ExternalTools, RunError, format_hms, run_to_completion};
use log::debug;
use rayon::prelude::*;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};

/// 時間戳文字樣式
const TIMESTAMP_POINTSIZE: u32 = 18;
const TIMESTAMP_OFFSET: &str = "+8+8";
const TIMESTAMP_STROKE_WIDTH: u32 = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct PostProcessOptions {
    pub include_timestamps: bool,
    /// 每張縮圖縮放後的寬度
    pub thumbnail_width: Option<u32>,
    /// 平行處理的執行緒數，`None` 使用 rayon 預設值
    pub workers: Option<usize>,
}

impl PostProcessOptions {
    /// 沒有縮放也沒有時間戳時整個階段可略過
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        !self.include_timestamps && self.thumbnail_width.is_none()
    }
}

/// 對每張影格縮放並加上時間戳，直接覆寫原檔
///
/// 任一張失敗時，尚未開始的影格不再處理
pub fn post_process_frames(
    tools: &ExternalTools,
    frames: &ExtractedFrames,
    options: &PostProcessOptions,
    cancel: &AtomicBool,
) -> Result<()> {
    if options.is_noop() {
        debug!("未設定縮放與時間戳，略過縮圖處理");
        return Ok(());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers.unwrap_or(0))
        .build()
        .map_err(|e| MontageError::Extraction(format!("無法建立執行緒池: {e}")))?;

    let failed = AtomicBool::new(false);

    let results: Vec<Result<()>> = pool.install(|| {
        frames
            .frames()
            .par_iter()
            .map(|frame| {
                if failed.load(Ordering::SeqCst) {
                    return Ok(());
                }
                if cancel.load(Ordering::SeqCst) {
                    return Err(MontageError::Cancelled);
                }

                let result = process_frame(tools, frame, options, cancel);
                if result.is_err() {
                    failed.store(true, Ordering::SeqCst);
                }
                result
            })
            .collect()
    });

    let mut first_error = None;
    for result in results {
        match result {
            Ok(()) => {}
            Err(MontageError::Cancelled) => return Err(MontageError::Cancelled),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    first_error.map_or(Ok(()), Err)
}

fn process_frame(
    tools: &ExternalTools,
    frame: &ExtractedFrame,
    options: &PostProcessOptions,
    cancel: &AtomicBool,
) -> Result<()> {
    let command = build_frame_command(tools.convert(), frame, options);

    match run_to_completion(command, cancel) {
        Ok(completed) if completed.success() => Ok(()),
        Ok(completed) => Err(MontageError::Extraction(format!(
            "處理影格 {} 失敗: {}",
            frame.path.display(),
            completed.describe_failure()
        ))),
        Err(RunError::Cancelled) => Err(MontageError::Cancelled),
        Err(e) => Err(MontageError::Extraction(format!(
            "處理影格 {} 失敗: {e}",
            frame.path.display()
        ))),
    }
}

/// `convert <frame> [-resize W -quality 100] [時間戳] <frame>`
fn build_frame_command(
    mut command: Command,
    frame: &ExtractedFrame,
    options: &PostProcessOptions,
) -> Command {
    command.arg(&frame.path);

    if let Some(width) = options.thumbnail_width {
        command.args(["-resize".to_string(), width.to_string()]);
        command.args(["-quality", "100"]);
    }

    if options.include_timestamps {
        let text = format_hms(frame.timestamp);
        // 先畫黑色外框，再畫白色字
        command
            .args(["-gravity", "SouthEast"])
            .args(["-pointsize".to_string(), TIMESTAMP_POINTSIZE.to_string()])
            .args(["-stroke", "black"])
            .args(["-strokewidth".to_string(), TIMESTAMP_STROKE_WIDTH.to_string()])
            .args(["-annotate", TIMESTAMP_OFFSET, text.as_str()])
            .args(["-stroke", "none", "-fill", "white"])
            .args(["-annotate", TIMESTAMP_OFFSET, text.as_str()]);
    }

    command.arg(&frame.path);
    command
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn frame() -> ExtractedFrame {
        ExtractedFrame {
            path: PathBuf::from("/tmp/work/movie_002.jpg"),
            timestamp: Duration::from_secs(3725),
            index: 2,
        }
    }

    fn args_of(command: &Command) -> Vec<&str> {
        command
            .get_args()
            .map(|a| a.to_str().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_resize_only() {
        let options = PostProcessOptions {
            thumbnail_width: Some(435),
            ..PostProcessOptions::default()
        };
        let command = build_frame_command(Command::new("convert"), &frame(), &options);

        assert_eq!(
            args_of(&command),
            vec![
                "/tmp/work/movie_002.jpg",
                "-resize",
                "435",
                "-quality",
                "100",
                "/tmp/work/movie_002.jpg"
            ]
        );
    }

    #[test]
    fn test_timestamp_drawn_twice() {
        let options = PostProcessOptions {
            include_timestamps: true,
            ..PostProcessOptions::default()
        };
        let command = build_frame_command(Command::new("convert"), &frame(), &options);
        let args = args_of(&command);

        assert_eq!(args.iter().filter(|a| **a == "01:02:05").count(), 2);
        assert!(args.contains(&"SouthEast"));
        assert_eq!(args.first(), Some(&"/tmp/work/movie_002.jpg"));
        assert_eq!(args.last(), Some(&"/tmp/work/movie_002.jpg"));

        let stroke = args.iter().position(|a| *a == "black").unwrap_or(usize::MAX);
        let fill = args.iter().position(|a| *a == "white").unwrap_or(0);
        assert!(stroke < fill);
    }

    #[test]
    fn test_noop_options() {
        assert!(PostProcessOptions::default().is_noop());
        assert!(
            !PostProcessOptions {
                include_timestamps: true,
                ..PostProcessOptions::default()
            }
            .is_noop()
        );
    }
}
