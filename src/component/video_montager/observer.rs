use crate::error::MontageError;
use std::fmt;
use std::path::{Path, PathBuf};

/// 單支影片的處理狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    Probed,
    Scheduled,
    Extracting,
    Annotating,
    Assembling,
    Done,
    Skipped,
    Error,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Probed => "probed",
            Self::Scheduled => "scheduled",
            Self::Extracting => "extracting",
            Self::Annotating => "annotating",
            Self::Assembling => "assembling",
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// 單支影片的處理結果
#[derive(Debug)]
pub enum VideoOutcome {
    /// 預覽圖已建立
    Done(PathBuf),
    /// 預覽圖已存在且未要求覆寫
    Skipped(PathBuf),
    Failed(MontageError),
}

/// 處理進度通知，僅供顯示用
///
/// 所有方法都有空的預設實作
pub trait PipelineObserver: Send + Sync {
    fn on_video_start(&self, _index: usize, _total: usize, _path: &Path) {}

    fn on_state(&self, _path: &Path, _state: PipelineState) {}

    /// 已擷取 `current` / `total` 張影格
    fn on_frame_progress(&self, _current: u64, _total: u64) {}

    fn on_video_finish(&self, _path: &Path, _outcome: &VideoOutcome) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}
